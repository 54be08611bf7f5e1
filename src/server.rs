//! Server loop
//!
//! Runs on one thread and owns the [`RootlessScreen`]. Each pass drains the
//! event queue, lets the screen flush due damage, then blocks in `mio` on
//! the queue's wakeup pipe until input arrives or the redisplay timer is
//! due.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, trace};

use crate::events::{ClientMessage, EventQueue, InputDispatcher, InputSink, MessageKind, Modifiers};
use crate::native::{SurfaceId, WindowId, WindowState};
use crate::rootless::{RootlessScreen, SurfaceNotifyKind};

const QUEUE_TOKEN: Token = Token(0);

/// Input sink that only logs, for running without a protocol layer
#[derive(Debug, Default)]
pub struct TraceSink;

impl InputSink for TraceSink {
    fn motion(&mut self, x: i32, y: i32, _time: u32) {
        trace!("Pointer at ({}, {})", x, y);
    }

    fn button(&mut self, button: u8, pressed: bool, x: i32, y: i32, state: Modifiers, _time: u32) {
        debug!("Button {} {} at ({}, {}) {:?}", button, if pressed { "down" } else { "up" }, x, y, state);
    }

    fn key(&mut self, keycode: u8, pressed: bool, state: Modifiers, _time: u32) {
        debug!("Key {} {} {:?}", keycode, if pressed { "down" } else { "up" }, state);
    }
}

pub struct Server {
    screen: RootlessScreen,
    queue: Arc<EventQueue>,
    dispatcher: InputDispatcher,
    sink: Box<dyn InputSink>,
    poll: Poll,
    events: Events,
    running: bool,
}

impl Server {
    pub fn new(
        screen: RootlessScreen,
        queue: Arc<EventQueue>,
        dispatcher: InputDispatcher,
        sink: Box<dyn InputSink>,
    ) -> Result<Self> {
        let poll = Poll::new()
            .context("Failed to create mio Poll")?;
        let fd = queue.wakeup_fd();
        poll.registry()
            .register(&mut SourceFd(&fd), QUEUE_TOKEN, Interest::READABLE)
            .context("Failed to register event queue with mio")?;

        Ok(Self {
            screen,
            queue,
            dispatcher,
            sink,
            poll,
            events: Events::with_capacity(4),
            running: true,
        })
    }

    pub fn screen(&self) -> &RootlessScreen {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut RootlessScreen {
        &mut self.screen
    }

    pub fn dispatcher(&self) -> &InputDispatcher {
        &self.dispatcher
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Loop until a quit message arrives
    pub fn run(&mut self) -> Result<()> {
        info!("Server loop started");
        while self.running {
            self.run_once(None)?;
        }
        info!("Server loop finished");
        Ok(())
    }

    /// One pass: dispatch, flush, wait. `max_wait` caps the wait.
    pub fn run_once(&mut self, max_wait: Option<Duration>) -> Result<()> {
        self.process_events();
        if !self.running {
            return Ok(());
        }

        self.screen.block_handler();

        let timeout = self.poll_timeout(max_wait);
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e).context("Failed to wait for events"),
        }

        self.screen.run_timers();
        self.process_events();
        Ok(())
    }

    /// How long the next wait may block: until the redisplay timer is due,
    /// capped by `max_wait`
    fn poll_timeout(&self, max_wait: Option<Duration>) -> Option<Duration> {
        let now = self.screen.clock.now();
        let timer = self.screen.next_timer_deadline().map(|d| d.saturating_sub(now));
        match (timer, max_wait) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Dispatch everything queued; returns the number of events handled
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.queue.dequeue() {
            handled += 1;
            if let Some(msg) = self.dispatcher.dispatch(event, self.sink.as_mut()) {
                self.handle_message(msg);
            }
        }
        handled
    }

    fn handle_message(&mut self, msg: ClientMessage) {
        debug!("Client message {:?} {:?}", msg.kind, msg.args);
        match msg.kind {
            MessageKind::Quit => {
                info!("Quit requested");
                self.running = false;
            }
            MessageKind::Activate => {
                if self.screen.windows_hidden() {
                    self.screen.show_all_windows();
                }
            }
            MessageKind::Deactivate => {}
            MessageKind::DisplayChanged => {
                self.screen.reposition_windows();
                self.dispatcher.set_origin(self.screen.origin());
            }
            MessageKind::WindowState => {
                let state = WindowState::from_bits_truncate(msg.args[1]);
                self.screen.native_window_state_changed(WindowId(msg.args[0]), state);
            }
            MessageKind::WindowMoved => self.screen.native_window_moved(WindowId(msg.args[0])),
            MessageKind::SurfaceChanged => {
                self.screen.surface_notify(SurfaceId(msg.args[0]), SurfaceNotifyKind::Changed);
            }
            MessageKind::SurfaceDestroyed => {
                self.screen.surface_notify(SurfaceId(msg.args[0]), SurfaceNotifyKind::Destroyed);
            }
            MessageKind::SetRootless => {
                if msg.args[0] != 0 {
                    self.screen.disable_root();
                } else if !self.screen.enable_root() {
                    debug!("Root window frame unavailable");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{FakeButtons, InputEvent};
    use crate::rootless::testing::*;
    use crate::shared::{Point, Rect};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<(u8, bool)>>>);

    impl InputSink for SharedSink {
        fn motion(&mut self, _x: i32, _y: i32, _time: u32) {}

        fn button(&mut self, _button: u8, _pressed: bool, _x: i32, _y: i32, _state: Modifiers, _time: u32) {}

        fn key(&mut self, keycode: u8, pressed: bool, _state: Modifiers, _time: u32) {
            self.0.lock().unwrap().push((keycode, pressed));
        }
    }

    fn server_for(fixture: Fixture, sink: Box<dyn InputSink>) -> (Server, Arc<EventQueue>) {
        let queue = Arc::new(EventQueue::new(32, true).unwrap());
        let dispatcher = InputDispatcher::new(FakeButtons::default(), Point::new(0, 0));
        let server = Server::new(fixture.screen, queue.clone(), dispatcher, sink).unwrap();
        (server, queue)
    }

    #[test]
    fn test_quit_stops_loop() {
        let (mut server, queue) = server_for(fixture(), Box::new(TraceSink));
        queue.enqueue(InputEvent::message(MessageKind::Quit, &[]));
        server.run().unwrap();
        assert!(!server.is_running());
    }

    #[test]
    fn test_keys_reach_sink() {
        let sink = SharedSink::default();
        let (mut server, queue) = server_for(fixture(), Box::new(sink.clone()));
        queue.enqueue(InputEvent::KeyPress { keycode: 3, state: Modifiers::empty(), time: 0 });
        queue.enqueue(InputEvent::KeyRelease { keycode: 3, state: Modifiers::empty(), time: 1 });
        server.run_once(Some(Duration::ZERO)).unwrap();
        assert_eq!(*sink.0.lock().unwrap(), vec![(11, true), (11, false)]);
    }

    #[test]
    fn test_window_moved_message_follows_host() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 10, 10, 1);
        let wid = f.wid(win);
        let host = f.host.clone();
        let (mut server, queue) = server_for(f, Box::new(TraceSink));
        host.move_window_natively(wid, 40, 30).unwrap();
        queue.enqueue(InputEvent::message(MessageKind::WindowMoved, &[wid.0]));
        server.run_once(Some(Duration::ZERO)).unwrap();
        let d = server.screen().tree().get(win).unwrap();
        assert_eq!((d.x, d.y), (41, 31));
    }

    #[test]
    fn test_window_state_message_marks_offscreen() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 10, 10, 0);
        let wid = f.wid(win);
        let (mut server, queue) = server_for(f, Box::new(TraceSink));
        queue.enqueue(InputEvent::message(
            MessageKind::WindowState,
            &[wid.0, WindowState::OFFSCREEN.bits()],
        ));
        server.process_events();
        assert!(server.screen().record(win).unwrap().is_offscreen);
    }

    #[test]
    fn test_set_rootless_toggles_root_frame() {
        let (mut server, queue) = server_for(fixture(), Box::new(TraceSink));
        queue.enqueue(InputEvent::message(MessageKind::SetRootless, &[0]));
        server.process_events();
        assert!(server.screen().has_root_frame());
        queue.enqueue(InputEvent::message(MessageKind::SetRootless, &[1]));
        server.process_events();
        assert!(!server.screen().has_root_frame());
    }

    #[test]
    fn test_wait_is_bounded_by_redisplay_timer() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 10, 10, 0);
        f.screen.redisplay_screen();
        f.screen.poly_fill_rect(win, &[Rect::new(0, 0, 2, 2)], 1);
        let clock = f.clock.clone();
        let (server, _queue) = server_for(f, Box::new(TraceSink));
        clock.advance(Duration::from_millis(4));
        assert_eq!(server.poll_timeout(None), Some(Duration::from_millis(6)));
        assert_eq!(
            server.poll_timeout(Some(Duration::from_millis(2))),
            Some(Duration::from_millis(2))
        );
    }

    #[test]
    fn test_idle_wait_has_no_timer() {
        let (server, _queue) = server_for(fixture(), Box::new(TraceSink));
        assert_eq!(server.poll_timeout(None), None);
    }
}
