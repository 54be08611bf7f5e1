//! Event plumbing between the native host and the server thread

pub mod bridge;
pub mod event;
pub mod input;
pub mod queue;

pub use bridge::{BridgeRegistries, EventPoster, HostEvent, HostEventMask, HostEventSource, NativeEventBridge};
pub use event::{ClientMessage, InputEvent, MessageKind, Modifiers};
pub use input::{FakeButtons, InputDispatcher, InputSink};
pub use queue::EventQueue;
