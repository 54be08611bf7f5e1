//! Error types
//!
//! `NativeError` covers failures reported by the native windowing host.
//! `RootlessError` covers the few fallible setup paths of the core; per-window
//! hooks report failure through `bool` / `Option` returns instead.

use thiserror::Error;

use crate::native::{SurfaceId, WindowId};

/// Failures reported by a [`NativeHost`](crate::native::NativeHost)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NativeError {
    #[error("native window {0:?} does not exist")]
    BadWindow(WindowId),

    #[error("native surface {0:?} does not exist")]
    BadSurface(SurfaceId),

    #[error("native allocation failed: {0}")]
    AllocationFailed(String),

    #[error("failed to lock {0} for direct access")]
    LockFailed(String),

    #[error("request does not match the target: {0}")]
    BadMatch(String),
}

/// Core setup failures
#[derive(Debug, Error)]
pub enum RootlessError {
    #[error("no native backing available for the root window")]
    RootFrameUnavailable,

    #[error("{0} is already initialized")]
    AlreadyInitialized(&'static str),

    #[error(transparent)]
    Native(#[from] NativeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type NativeResult<T> = std::result::Result<T, NativeError>;
