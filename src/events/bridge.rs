//! Native event bridge
//!
//! A dedicated thread waits on the host windowing system and turns its
//! notifications into client messages on the [`EventQueue`]. The thread
//! never touches window records; the only server state it reads are the
//! native id registries, to drop notifications for ids that are already
//! gone.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bitflags::bitflags;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use crate::error::{NativeResult, RootlessError};
use crate::events::event::{InputEvent, MessageKind};
use crate::events::queue::EventQueue;
use crate::native::{SurfaceId, WindowId, WindowState};
use crate::rootless::SurfaceRegistry;

bitflags! {
    /// Host notification kinds the bridge asks for
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HostEventMask: u32 {
        const DISPLAY_CHANGED = 1 << 0;
        const WINDOW_STATE = 1 << 1;
        const WINDOW_MOVED = 1 << 2;
        const SURFACE_CHANGED = 1 << 3;
        const SURFACE_DESTROYED = 1 << 4;
    }
}

/// Something the native window server told us
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    DisplayChanged,
    WindowStateChanged(WindowId, WindowState),
    WindowMoved(WindowId),
    SurfaceChanged(SurfaceId),
    SurfaceDestroyed(SurfaceId),
    /// Input already translated by the host
    Input(InputEvent),
}

impl HostEvent {
    /// Notification kind; `None` for input, which is always delivered
    pub fn kind(&self) -> Option<HostEventMask> {
        match self {
            HostEvent::DisplayChanged => Some(HostEventMask::DISPLAY_CHANGED),
            HostEvent::WindowStateChanged(..) => Some(HostEventMask::WINDOW_STATE),
            HostEvent::WindowMoved(_) => Some(HostEventMask::WINDOW_MOVED),
            HostEvent::SurfaceChanged(_) => Some(HostEventMask::SURFACE_CHANGED),
            HostEvent::SurfaceDestroyed(_) => Some(HostEventMask::SURFACE_DESTROYED),
            HostEvent::Input(_) => None,
        }
    }

    /// The queue event carrying this notification
    pub fn to_event(&self) -> InputEvent {
        match *self {
            HostEvent::DisplayChanged => InputEvent::message(MessageKind::DisplayChanged, &[]),
            HostEvent::WindowStateChanged(wid, state) => {
                InputEvent::message(MessageKind::WindowState, &[wid.0, state.bits()])
            }
            HostEvent::WindowMoved(wid) => InputEvent::message(MessageKind::WindowMoved, &[wid.0]),
            HostEvent::SurfaceChanged(sid) => InputEvent::message(MessageKind::SurfaceChanged, &[sid.0]),
            HostEvent::SurfaceDestroyed(sid) => InputEvent::message(MessageKind::SurfaceDestroyed, &[sid.0]),
            HostEvent::Input(event) => event,
        }
    }
}

/// Connection to the native window server's notification stream
pub trait HostEventSource: Send + 'static {
    /// Open the connection and ask for the notifications in `interest`
    fn connect(&mut self, interest: HostEventMask) -> NativeResult<()>;

    /// Block for at most `timeout` waiting for the next event
    fn wait_event(&mut self, timeout: Duration) -> Option<HostEvent>;
}

/// Posts client messages to the server thread from any thread
#[derive(Clone)]
pub struct EventPoster {
    queue: Arc<EventQueue>,
}

impl EventPoster {
    pub fn new(queue: Arc<EventQueue>) -> Self {
        Self { queue }
    }

    /// Queue a client message with up to four arguments
    pub fn post_message(&self, kind: MessageKind, args: &[u32]) {
        debug!("Posting {:?} {:?}", kind, args);
        self.queue.enqueue(InputEvent::message(kind, args));
    }

    /// Queue an input event
    pub fn post(&self, event: InputEvent) {
        self.queue.enqueue(event);
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }
}

/// Registries the bridge checks before forwarding id-carrying notifications
#[derive(Clone)]
pub struct BridgeRegistries {
    pub windows: Arc<SurfaceRegistry<WindowId>>,
    pub surfaces: Arc<SurfaceRegistry<SurfaceId>>,
}

impl BridgeRegistries {
    /// Whether the server still knows the id `event` refers to
    fn is_live(&self, event: &HostEvent) -> bool {
        match *event {
            HostEvent::WindowStateChanged(wid, _) | HostEvent::WindowMoved(wid) => self.windows.contains(wid),
            HostEvent::SurfaceChanged(sid) | HostEvent::SurfaceDestroyed(sid) => {
                self.surfaces.lookup(sid).is_some()
            }
            HostEvent::DisplayChanged | HostEvent::Input(_) => true,
        }
    }
}

/// Owns the native event thread
pub struct NativeEventBridge {
    poster: EventPoster,
    thread: Option<JoinHandle<()>>,
    task_guard: Option<oneshot::Receiver<()>>,
}

impl NativeEventBridge {
    const POLL_TIMEOUT: Duration = Duration::from_millis(100);

    /// Connect `source` and start forwarding its events into the queue
    pub fn start<S: HostEventSource>(
        mut source: S,
        poster: EventPoster,
        registries: BridgeRegistries,
    ) -> Result<Self, RootlessError> {
        source.connect(HostEventMask::all())?;

        let (guard, task_guard) = oneshot::channel::<()>();
        let thread_poster = poster.clone();
        let thread = std::thread::Builder::new()
            .name("native-events".into())
            .spawn(move || {
                info!("Native event thread started");
                loop {
                    if guard.is_closed() {
                        info!("Native event thread shutting down");
                        return;
                    }
                    let Some(event) = source.wait_event(Self::POLL_TIMEOUT) else {
                        continue;
                    };
                    if !registries.is_live(&event) {
                        trace!("Dropping {:?} for a gone native id", event);
                        continue;
                    }
                    thread_poster.post(event.to_event());
                }
            })?;

        Ok(Self {
            poster,
            thread: Some(thread),
            task_guard: Some(task_guard),
        })
    }

    pub fn poster(&self) -> EventPoster {
        self.poster.clone()
    }

    pub fn post_message(&self, kind: MessageKind, args: &[u32]) {
        self.poster.post_message(kind, args);
    }

    /// Stop the thread and wait for it
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.task_guard.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Native event thread panicked");
            }
        }
    }
}

impl Drop for NativeEventBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event::Modifiers;
    use crate::native::headless::ChannelEventSource;
    use crate::protocol::DrawableId;
    use std::time::Instant;

    fn registries() -> BridgeRegistries {
        BridgeRegistries {
            windows: Arc::new(SurfaceRegistry::new()),
            surfaces: Arc::new(SurfaceRegistry::new()),
        }
    }

    fn wait_for(queue: &EventQueue, count: usize) -> Vec<InputEvent> {
        let mut out = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while out.len() < count && Instant::now() < deadline {
            match queue.dequeue() {
                Some(event) => out.push(event),
                None => std::thread::sleep(Duration::from_millis(1)),
            }
        }
        out
    }

    #[test]
    fn test_host_events_become_client_messages() {
        let queue = Arc::new(EventQueue::new(64, true).unwrap());
        let regs = registries();
        regs.windows.register(WindowId(5), DrawableId(10));
        regs.surfaces.register(SurfaceId(8), DrawableId(11));

        let (tx, source) = ChannelEventSource::new();
        let bridge = NativeEventBridge::start(source, EventPoster::new(queue.clone()), regs.clone()).unwrap();

        tx.send(HostEvent::WindowMoved(WindowId(99)));
        tx.send(HostEvent::WindowMoved(WindowId(5)));
        tx.send(HostEvent::WindowStateChanged(WindowId(5), WindowState::OBSCURED));
        tx.send(HostEvent::SurfaceDestroyed(SurfaceId(8)));
        tx.send(HostEvent::Input(InputEvent::KeyPress {
            keycode: 4,
            state: Modifiers::empty(),
            time: 1,
        }));
        tx.send(HostEvent::DisplayChanged);

        let events = wait_for(&queue, 5);
        bridge.shutdown();
        assert_eq!(
            events,
            vec![
                InputEvent::message(MessageKind::WindowMoved, &[5]),
                InputEvent::message(MessageKind::WindowState, &[5, WindowState::OBSCURED.bits()]),
                InputEvent::message(MessageKind::SurfaceDestroyed, &[8]),
                InputEvent::KeyPress { keycode: 4, state: Modifiers::empty(), time: 1 },
                InputEvent::message(MessageKind::DisplayChanged, &[]),
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_post_message_from_other_threads() {
        let queue = Arc::new(EventQueue::new(64, true).unwrap());
        let (_tx, source) = ChannelEventSource::new();
        let bridge = NativeEventBridge::start(source, EventPoster::new(queue.clone()), registries()).unwrap();

        let handles: Vec<_> = (0..4u32)
            .map(|i| {
                let poster = bridge.poster();
                std::thread::spawn(move || poster.post_message(MessageKind::SetRootless, &[i]))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let mut args: Vec<u32> = wait_for(&queue, 4)
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::Client(msg) if msg.kind == MessageKind::SetRootless => Some(msg.args[0]),
                _ => None,
            })
            .collect();
        args.sort_unstable();
        assert_eq!(args, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_drop_stops_thread() {
        let queue = Arc::new(EventQueue::new(8, true).unwrap());
        let (tx, source) = ChannelEventSource::new();
        let bridge = NativeEventBridge::start(source, EventPoster::new(queue.clone()), registries()).unwrap();
        drop(bridge);
        tx.send(HostEvent::DisplayChanged);
        std::thread::sleep(Duration::from_millis(20));
        assert!(queue.is_empty());
    }
}
