//! Protocol-layer model
//!
//! The window tree, pixmaps, colormaps and default window operations that the
//! rootless layer bridges onto native windows.

pub mod colormap;
pub mod drawable;
pub mod lower;
pub mod pixmap;

pub use drawable::{Background, BitGravity, Drawable, DrawableId, DrawableKind, DrawableTree, WindowClass};
pub use lower::{CopyRequest, FbWindowOps, LowerOutcome, WindowOps};
pub use pixmap::{PixelBuffer, PixmapHeader};
