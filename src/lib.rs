//! Rootless window compositing
//!
//! Bridges a protocol window tree onto a native windowing host: every
//! top-level window gets its own native frame, drawing is redirected into
//! the frame's backing store, damage is flushed on a short timer, and
//! native notifications come back to the server thread through a lossy
//! event queue.

pub mod config;
pub mod error;
pub mod events;
pub mod native;
pub mod protocol;
pub mod rootless;
pub mod server;
pub mod shared;

pub use error::{NativeError, RootlessError};
