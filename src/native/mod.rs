//! Native windowing host boundary
//!
//! The rootless core drives individual native windows and accelerated
//! surfaces through the [`NativeHost`] trait. Everything the host needs to
//! know about a window travels in a [`WindowChanges`] value together with a
//! [`ConfigureMask`] naming the fields that are valid.

pub mod headless;

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::error::NativeResult;
use crate::protocol::pixmap::PixelBuffer;
use crate::shared::Rect;

/// Native window id (0 is never handed out)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u32);

/// Native accelerated surface id (0 is never handed out)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u32);

/// Client connection allowed to import an exported surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u32);

bitflags! {
    /// Fields of [`WindowChanges`] a configure call applies
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ConfigureMask: u32 {
        const ORIGIN = 1 << 0;
        const SIZE = 1 << 1;
        const BOUNDS = Self::ORIGIN.bits() | Self::SIZE.bits();
        const SHAPE = 1 << 2;
        const STACKING = 1 << 3;
        const DEPTH = 1 << 4;
        const COLORMAP = 1 << 5;
        const WINDOW_LEVEL = 1 << 6;
    }
}

bitflags! {
    /// Visibility state reported by the host for a native window
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WindowState: u32 {
        const OFFSCREEN = 1 << 0;
        const OBSCURED = 1 << 1;
    }
}

/// Corner of the native backing store that keeps its pixels on resize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gravity {
    #[default]
    None,
    NorthWest,
    NorthEast,
    SouthWest,
    SouthEast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StackMode {
    #[default]
    Unmapped,
    MappedAbove,
    MappedBelow,
}

/// Pixel format of a native window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelDepth {
    #[default]
    Nil,
    Index8,
    Rgb555,
    Argb8888,
}

impl PixelDepth {
    /// Map a protocol depth onto a native format
    pub fn from_protocol_depth(depth: u8) -> Self {
        match depth {
            8 => PixelDepth::Index8,
            15 => PixelDepth::Rgb555,
            24 => PixelDepth::Argb8888,
            _ => PixelDepth::Nil,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelDepth::Index8 => 1,
            PixelDepth::Rgb555 => 2,
            PixelDepth::Argb8888 | PixelDepth::Nil => 4,
        }
    }
}

/// Resolve `colors.len()` palette cells starting at the given index into
/// ARGB. Returns false when no indexed colormap is installed.
pub type ColormapCallback = Arc<dyn Fn(u32, &mut [u32]) -> bool + Send + Sync>;

/// Requested window or surface state
#[derive(Clone, Default)]
pub struct WindowChanges {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub bit_gravity: Gravity,
    /// `None` removes any shape
    pub shape: Option<Vec<Rect>>,
    pub shape_offset: (i32, i32),
    pub stack_mode: StackMode,
    pub sibling: Option<WindowId>,
    pub depth: PixelDepth,
    pub colormap: Option<ColormapCallback>,
    pub window_level: i32,
}

impl fmt::Debug for WindowChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowChanges")
            .field("x", &self.x)
            .field("y", &self.y)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bit_gravity", &self.bit_gravity)
            .field("shape", &self.shape)
            .field("stack_mode", &self.stack_mode)
            .field("sibling", &self.sibling)
            .field("depth", &self.depth)
            .field("colormap", &self.colormap.is_some())
            .field("window_level", &self.window_level)
            .finish()
    }
}

impl WindowChanges {
    pub fn bounds(x: i32, y: i32, width: u32, height: u32, bit_gravity: Gravity) -> Self {
        Self { x, y, width, height, bit_gravity, ..Default::default() }
    }

    pub fn origin(x: i32, y: i32) -> Self {
        Self { x, y, ..Default::default() }
    }

    pub fn stacking(stack_mode: StackMode, sibling: Option<WindowId>) -> Self {
        Self { stack_mode, sibling, ..Default::default() }
    }
}

/// Something the host can lock, flush and mark dirty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeTarget {
    Window(WindowId),
    Surface(SurfaceId),
}

/// Backing store of a locked window or surface
#[derive(Debug, Clone)]
pub struct LockedBuffer {
    pub pixels: PixelBuffer,
    pub rowbytes: usize,
    /// Bounds in native coordinates
    pub bounds: Rect,
}

/// The native windowing system
///
/// Calls are made from the server thread only, except
/// [`lookup_native_window`](NativeHost::lookup_native_window) which may be
/// called from any thread.
pub trait NativeHost: Send + Sync {
    fn create_window(&self, mask: ConfigureMask, changes: &WindowChanges) -> NativeResult<WindowId>;
    fn destroy_window(&self, id: WindowId) -> NativeResult<()>;
    fn configure_window(&self, id: WindowId, mask: ConfigureMask, changes: &WindowChanges) -> NativeResult<()>;
    fn get_window_bounds(&self, id: WindowId) -> NativeResult<Rect>;

    /// Host-wide window number, as seen by other native applications
    fn get_native_window(&self, id: WindowId) -> NativeResult<u32>;
    fn lookup_native_window(&self, number: u32) -> Option<WindowId>;

    /// Make the backing store directly addressable until `unlock`
    fn lock(&self, target: NativeTarget) -> NativeResult<LockedBuffer>;
    fn unlock(&self, target: NativeTarget, flush: bool) -> NativeResult<()>;
    fn flush(&self, target: NativeTarget) -> NativeResult<()>;

    /// Mark `rects` dirty after translating them by (`dx`, `dy`)
    fn mark(&self, target: NativeTarget, rects: &[Rect], dx: i32, dy: i32) -> NativeResult<()>;

    /// Copy `rects` (window-local, destination) from `src` displaced by (`dx`, `dy`)
    fn copy_window(&self, src: WindowId, dst: WindowId, rects: &[Rect], dx: i32, dy: i32) -> NativeResult<()>;

    /// Copies larger than this many pixels are cheaper natively
    fn scroll_area_threshold(&self) -> u32;

    fn disable_update(&self);
    fn reenable_update(&self);

    /// Allocate a surface bound to `window`, or an offscreen one
    fn create_surface(&self, window: Option<WindowId>) -> NativeResult<SurfaceId>;
    fn destroy_surface(&self, id: SurfaceId) -> NativeResult<()>;
    fn configure_surface(&self, id: SurfaceId, mask: ConfigureMask, changes: &WindowChanges) -> NativeResult<()>;
    fn export_surface(&self, window: WindowId, surface: SurfaceId, client: ClientId) -> NativeResult<[u32; 2]>;
}
