//! Event queue between the native thread and the server thread
//!
//! A fixed ring under a mutex. The native thread enqueues, the server
//! thread dequeues. Each queued event is mirrored by one byte in a
//! non-blocking pipe so the server can wait for input with `mio` on the
//! pipe's read end. Consecutive pointer motion collapses into one slot, and
//! when the ring is full new events are dropped.

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::{Mutex, MutexGuard};

use mio::unix::pipe;
use tracing::{error, warn};

use crate::events::event::InputEvent;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

struct Ring {
    slots: Vec<Option<InputEvent>>,
    head: usize,
    tail: usize,
    dropped: u64,
}

impl Ring {
    fn len(&self) -> usize {
        (self.tail + self.slots.len() - self.head) % self.slots.len()
    }
}

pub struct EventQueue {
    ring: Mutex<Ring>,
    coalesce_motion: bool,
    wake_tx: pipe::Sender,
    wake_rx: pipe::Receiver,
}

impl EventQueue {
    /// Create a queue with `capacity` slots. One slot stays free to tell a
    /// full ring from an empty one, so `capacity - 1` events fit.
    pub fn new(capacity: usize, coalesce_motion: bool) -> io::Result<Self> {
        let capacity = capacity.max(2);
        let (wake_tx, wake_rx) = pipe::new()?;
        Ok(Self {
            ring: Mutex::new(Ring {
                slots: vec![None; capacity],
                head: 0,
                tail: 0,
                dropped: 0,
            }),
            coalesce_motion,
            wake_tx,
            wake_rx,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue `event`. Never blocks on a full ring; the event is dropped.
    pub fn enqueue(&self, event: InputEvent) {
        {
            let mut ring = self.lock();
            let n = ring.slots.len();
            if self.coalesce_motion && event.is_motion() && ring.head != ring.tail {
                let last = (ring.tail + n - 1) % n;
                if ring.slots[last].is_some_and(|e| e.is_motion()) {
                    ring.slots[last] = Some(event);
                    return;
                }
            }
            let new_tail = (ring.tail + 1) % n;
            if new_tail == ring.head {
                ring.dropped += 1;
                warn!("Event queue full, dropping {:?}", event);
                return;
            }
            let tail = ring.tail;
            ring.slots[tail] = Some(event);
            ring.tail = new_tail;
        }
        if let Err(e) = (&self.wake_tx).write(&[1u8]) {
            error!("Failed to signal event queue wakeup pipe: {}", e);
        }
    }

    /// Take the oldest event
    pub fn dequeue(&self) -> Option<InputEvent> {
        let event = {
            let mut ring = self.lock();
            if ring.head == ring.tail {
                return None;
            }
            let head = ring.head;
            let event = ring.slots[head].take();
            ring.head = (head + 1) % ring.slots.len();
            event
        };
        let mut byte = [0u8; 1];
        match (&self.wake_rx).read(&mut byte) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => error!("Failed to drain event queue wakeup pipe: {}", e),
        }
        event
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots in the ring, one more than the number of events that fit
    pub fn capacity(&self) -> usize {
        self.lock().slots.len()
    }

    /// Events lost to a full ring since creation
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// Read end of the wakeup pipe; readable while events are queued
    pub fn wakeup_fd(&self) -> RawFd {
        self.wake_rx.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event::{InputEvent, MessageKind, Modifiers};
    use mio::unix::SourceFd;
    use mio::{Events, Interest, Poll, Token};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn key(keycode: u8) -> InputEvent {
        InputEvent::KeyPress { keycode, state: Modifiers::empty(), time: 0 }
    }

    fn motion(x: i32) -> InputEvent {
        InputEvent::Motion { x, y: 0, state: Modifiers::empty(), time: 0 }
    }

    fn drain(q: &EventQueue) -> Vec<InputEvent> {
        std::iter::from_fn(|| q.dequeue()).collect()
    }

    #[test]
    fn test_fifo_order() {
        let q = EventQueue::new(16, true).unwrap();
        for k in 1..=5 {
            q.enqueue(key(k));
        }
        assert_eq!(q.len(), 5);
        assert_eq!(drain(&q), (1..=5).map(key).collect::<Vec<_>>());
        assert!(q.is_empty());
    }

    #[test]
    fn test_consecutive_motion_coalesces() {
        let q = EventQueue::new(16, true).unwrap();
        q.enqueue(motion(1));
        q.enqueue(motion(2));
        q.enqueue(motion(3));
        assert_eq!(drain(&q), vec![motion(3)]);
    }

    #[test]
    fn test_motion_does_not_coalesce_across_other_events() {
        let q = EventQueue::new(16, true).unwrap();
        q.enqueue(motion(1));
        q.enqueue(key(9));
        q.enqueue(motion(2));
        q.enqueue(motion(3));
        assert_eq!(drain(&q), vec![motion(1), key(9), motion(3)]);
    }

    #[test]
    fn test_coalescing_can_be_disabled() {
        let q = EventQueue::new(16, false).unwrap();
        q.enqueue(motion(1));
        q.enqueue(motion(2));
        assert_eq!(drain(&q), vec![motion(1), motion(2)]);
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let q = EventQueue::new(4, true).unwrap();
        for k in 1..=5 {
            q.enqueue(key(k));
        }
        assert_eq!(q.dropped(), 2);
        assert_eq!(drain(&q), vec![key(1), key(2), key(3)]);
        // Ring is still consistent after the overflow
        q.enqueue(key(6));
        assert_eq!(drain(&q), vec![key(6)]);
    }

    #[test]
    fn test_motion_into_full_queue_still_coalesces() {
        let q = EventQueue::new(3, true).unwrap();
        q.enqueue(key(1));
        q.enqueue(motion(1));
        q.enqueue(motion(2));
        assert_eq!(q.dropped(), 0);
        assert_eq!(drain(&q), vec![key(1), motion(2)]);
    }

    #[test]
    fn test_pipe_tracks_queue_length() {
        let q = EventQueue::new(16, true).unwrap();
        q.enqueue(key(1));
        q.enqueue(InputEvent::message(MessageKind::Activate, &[]));
        drain(&q);
        let mut byte = [0u8; 1];
        let err = (&q.wake_rx).read(&mut byte).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_consumer_wakes_for_producer_thread() {
        let q = Arc::new(EventQueue::new(DEFAULT_QUEUE_CAPACITY, true).unwrap());
        let mut poll = Poll::new().unwrap();
        let fd = q.wakeup_fd();
        poll.registry()
            .register(&mut SourceFd(&fd), Token(0), Interest::READABLE)
            .unwrap();

        let producer = {
            let q = q.clone();
            std::thread::spawn(move || {
                for k in 0..100u8 {
                    q.enqueue(key(k));
                }
            })
        };

        let mut events = Events::with_capacity(4);
        let mut received = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while received.len() < 100 && Instant::now() < deadline {
            poll.poll(&mut events, Some(Duration::from_millis(50))).unwrap();
            received.extend(drain(&q));
        }
        producer.join().unwrap();
        received.extend(drain(&q));
        assert_eq!(received, (0..100u8).map(key).collect::<Vec<_>>());
    }
}
