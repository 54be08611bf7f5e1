//! Headless native host
//!
//! An in-memory [`NativeHost`] with real pixel storage. It keeps a journal
//! of every call so the bridging logic can be observed, emulates bit gravity
//! on resize the way a compositing window server does, and refuses to change
//! the size of a window whose buffer is locked.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{NativeError, NativeResult};
use crate::events::bridge::{HostEvent, HostEventMask, HostEventSource};
use crate::native::{
    ClientId, ConfigureMask, Gravity, LockedBuffer, NativeHost, NativeTarget, PixelDepth, StackMode,
    SurfaceId, WindowChanges, WindowId,
};
use crate::protocol::pixmap::{copy_area, padded_stride, PixelBuffer, PixmapHeader};
use crate::shared::Rect;

/// Native calls observed by the headless host
#[derive(Debug, Clone)]
pub enum HostCall {
    CreateWindow(WindowId),
    DestroyWindow(WindowId),
    ConfigureWindow { id: WindowId, mask: ConfigureMask, changes: WindowChanges },
    Lock(NativeTarget),
    Unlock { target: NativeTarget, flush: bool },
    Flush(NativeTarget),
    Mark { target: NativeTarget, rects: Vec<Rect>, dx: i32, dy: i32 },
    CopyWindow { src: WindowId, dst: WindowId, rects: Vec<Rect>, dx: i32, dy: i32 },
    DisableUpdate,
    ReenableUpdate,
    CreateSurface { id: SurfaceId, window: Option<WindowId> },
    DestroySurface(SurfaceId),
    ConfigureSurface { id: SurfaceId, mask: ConfigureMask, changes: WindowChanges },
    ExportSurface { window: WindowId, surface: SurfaceId, client: ClientId },
}

struct Backing {
    bounds: Rect,
    depth: PixelDepth,
    pixels: PixelBuffer,
    rowbytes: usize,
    locked: bool,
    shape: Option<Vec<Rect>>,
}

impl Backing {
    fn new(bounds: Rect, depth: PixelDepth) -> Self {
        let bpp = depth.bytes_per_pixel();
        let rowbytes = padded_stride(bounds.width() as u32, bpp);
        Self {
            bounds,
            depth,
            pixels: PixelBuffer::zeroed(rowbytes * bounds.height() as usize),
            rowbytes,
            locked: false,
            shape: None,
        }
    }

    fn header(&self) -> PixmapHeader {
        PixmapHeader::new(
            self.pixels.clone(),
            self.rowbytes,
            self.depth.bytes_per_pixel(),
            self.bounds.width() as u32,
            self.bounds.height() as u32,
        )
    }

    /// Reallocate for `bounds`, keeping the pixels `gravity` anchors
    fn resize(&mut self, bounds: Rect, gravity: Gravity) {
        let (old_w, old_h) = (self.bounds.width(), self.bounds.height());
        let (new_w, new_h) = (bounds.width(), bounds.height());
        if (old_w, old_h) == (new_w, new_h) {
            self.bounds = bounds;
            return;
        }
        let old = self.header();
        let fresh = Backing::new(bounds, self.depth);
        let shift = match gravity {
            Gravity::NorthWest => Some((0, 0)),
            Gravity::NorthEast => Some((new_w - old_w, 0)),
            Gravity::SouthWest => Some((0, new_h - old_h)),
            Gravity::SouthEast => Some((new_w - old_w, new_h - old_h)),
            Gravity::None => None,
        };
        if let Some((ox, oy)) = shift {
            let dst = fresh.header();
            copy_area(&old, &dst, &dst.bounds(), -ox, -oy);
        }
        self.pixels = fresh.pixels;
        self.rowbytes = fresh.rowbytes;
        self.bounds = bounds;
    }
}

struct HeadlessWindow {
    backing: Backing,
    level: i32,
    number: u32,
    palette: Vec<u32>,
    dirty: Vec<Rect>,
}

struct HeadlessSurface {
    window: Option<WindowId>,
    backing: Backing,
    exported: Vec<ClientId>,
}

#[derive(Default)]
struct HeadlessState {
    next_window: u32,
    next_surface: u32,
    windows: BTreeMap<WindowId, HeadlessWindow>,
    surfaces: BTreeMap<SurfaceId, HeadlessSurface>,
    /// Mapped windows, front to back
    order: Vec<WindowId>,
    update_disabled: u32,
    calls: Vec<HostCall>,
    fail_create: bool,
    fail_lock: bool,
    fail_export: bool,
}

impl HeadlessState {
    fn backing_mut(&mut self, target: NativeTarget) -> NativeResult<&mut Backing> {
        match target {
            NativeTarget::Window(id) => self
                .windows
                .get_mut(&id)
                .map(|w| &mut w.backing)
                .ok_or(NativeError::BadWindow(id)),
            NativeTarget::Surface(id) => self
                .surfaces
                .get_mut(&id)
                .map(|s| &mut s.backing)
                .ok_or(NativeError::BadSurface(id)),
        }
    }

    fn restack(&mut self, id: WindowId, mode: StackMode, sibling: Option<WindowId>) {
        self.order.retain(|w| *w != id);
        let sibling_index = sibling.and_then(|s| self.order.iter().position(|w| *w == s));
        match (mode, sibling_index) {
            (StackMode::Unmapped, _) => {}
            (StackMode::MappedAbove, None) => self.order.insert(0, id),
            (StackMode::MappedAbove, Some(i)) => self.order.insert(i, id),
            (StackMode::MappedBelow, None) => self.order.push(id),
            (StackMode::MappedBelow, Some(i)) => self.order.insert(i + 1, id),
        }
    }
}

/// In-memory native host
pub struct HeadlessHost {
    state: Mutex<HeadlessState>,
    scroll_threshold: AtomicU32,
}

impl Default for HeadlessHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HeadlessState {
                next_window: 1,
                next_surface: 1,
                ..Default::default()
            }),
            scroll_threshold: AtomicU32::new(u32::MAX),
        }
    }

    fn state(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copies above `area` pixels go through the native copy path
    pub fn set_scroll_threshold(&self, area: u32) {
        self.scroll_threshold.store(area, Ordering::Relaxed);
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.state().fail_create = fail;
    }

    pub fn set_fail_lock(&self, fail: bool) {
        self.state().fail_lock = fail;
    }

    pub fn set_fail_export(&self, fail: bool) {
        self.state().fail_export = fail;
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Mark calls made against `target`, in order
    pub fn marks(&self, target: NativeTarget) -> Vec<Vec<Rect>> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                HostCall::Mark { target: t, rects, dx, dy } if *t == target => {
                    Some(rects.iter().map(|r| r.translate(*dx, *dy)).collect())
                }
                _ => None,
            })
            .collect()
    }

    pub fn window_count(&self) -> usize {
        self.state().windows.len()
    }

    pub fn surface_count(&self) -> usize {
        self.state().surfaces.len()
    }

    pub fn window_bounds(&self, id: WindowId) -> Option<Rect> {
        self.state().windows.get(&id).map(|w| w.backing.bounds)
    }

    pub fn window_level(&self, id: WindowId) -> Option<i32> {
        self.state().windows.get(&id).map(|w| w.level)
    }

    pub fn window_shape(&self, id: WindowId) -> Option<Vec<Rect>> {
        self.state().windows.get(&id).and_then(|w| w.backing.shape.clone())
    }

    pub fn palette(&self, id: WindowId) -> Vec<u32> {
        self.state().windows.get(&id).map(|w| w.palette.clone()).unwrap_or_default()
    }

    /// Accumulated dirty rectangles (window-local) since the last flush
    pub fn dirty(&self, id: WindowId) -> Vec<Rect> {
        self.state().windows.get(&id).map(|w| w.dirty.clone()).unwrap_or_default()
    }

    /// Mapped windows, front to back
    pub fn stacking_order(&self) -> Vec<WindowId> {
        self.state().order.clone()
    }

    pub fn is_locked(&self, target: NativeTarget) -> bool {
        self.state().backing_mut(target).map(|b| b.locked).unwrap_or(false)
    }

    pub fn update_disabled_depth(&self) -> u32 {
        self.state().update_disabled
    }

    /// Pixel view of a window's backing store, in window-local coordinates
    pub fn window_pixmap(&self, id: WindowId) -> Option<PixmapHeader> {
        self.state().windows.get(&id).map(|w| w.backing.header())
    }

    pub fn surface_window(&self, id: SurfaceId) -> Option<Option<WindowId>> {
        self.state().surfaces.get(&id).map(|s| s.window)
    }

    pub fn surface_bounds(&self, id: SurfaceId) -> Option<Rect> {
        self.state().surfaces.get(&id).map(|s| s.backing.bounds)
    }

    /// Move a window as if the user dragged it
    pub fn move_window_natively(&self, id: WindowId, x: i32, y: i32) -> NativeResult<()> {
        let mut state = self.state();
        let win = state.windows.get_mut(&id).ok_or(NativeError::BadWindow(id))?;
        let b = win.backing.bounds;
        win.backing.bounds = b.translate(x - b.x1, y - b.y1);
        Ok(())
    }
}

impl NativeHost for HeadlessHost {
    fn create_window(&self, mask: ConfigureMask, changes: &WindowChanges) -> NativeResult<WindowId> {
        let mut state = self.state();
        if state.fail_create {
            return Err(NativeError::AllocationFailed("window creation disabled".into()));
        }
        let id = WindowId(state.next_window);
        state.next_window += 1;

        let bounds = if mask.contains(ConfigureMask::BOUNDS) {
            Rect::from_xywh(changes.x, changes.y, changes.width, changes.height)
        } else {
            Rect::default()
        };
        let depth = if mask.contains(ConfigureMask::DEPTH) {
            changes.depth
        } else {
            PixelDepth::Nil
        };
        let mut backing = Backing::new(bounds, depth);
        if mask.contains(ConfigureMask::SHAPE) {
            backing.shape = changes.shape.clone();
        }
        let mut palette = Vec::new();
        if mask.contains(ConfigureMask::COLORMAP) {
            if let Some(cb) = &changes.colormap {
                palette = vec![0; 256];
                cb(0, &mut palette);
            }
        }
        state.windows.insert(
            id,
            HeadlessWindow {
                backing,
                level: changes.window_level,
                number: 1000 + id.0,
                palette,
                dirty: Vec::new(),
            },
        );
        state.calls.push(HostCall::CreateWindow(id));
        debug!("headless: created window {:?} at {:?}", id, bounds);
        Ok(id)
    }

    fn destroy_window(&self, id: WindowId) -> NativeResult<()> {
        let mut state = self.state();
        state.windows.remove(&id).ok_or(NativeError::BadWindow(id))?;
        state.order.retain(|w| *w != id);
        state.calls.push(HostCall::DestroyWindow(id));
        Ok(())
    }

    fn configure_window(&self, id: WindowId, mask: ConfigureMask, changes: &WindowChanges) -> NativeResult<()> {
        let mut state = self.state();
        let win = state.windows.get_mut(&id).ok_or(NativeError::BadWindow(id))?;

        if mask.contains(ConfigureMask::SIZE) {
            if win.backing.locked {
                return Err(NativeError::BadMatch(format!("{:?} resized while locked", id)));
            }
            let bounds = Rect::from_xywh(changes.x, changes.y, changes.width, changes.height);
            win.backing.resize(bounds, changes.bit_gravity);
        } else if mask.contains(ConfigureMask::ORIGIN) {
            let b = win.backing.bounds;
            win.backing.bounds = b.translate(changes.x - b.x1, changes.y - b.y1);
        }
        if mask.contains(ConfigureMask::SHAPE) {
            win.backing.shape = changes.shape.clone();
        }
        if mask.contains(ConfigureMask::WINDOW_LEVEL) {
            win.level = changes.window_level;
        }
        if mask.contains(ConfigureMask::COLORMAP) {
            if let Some(cb) = &changes.colormap {
                let mut palette = vec![0; 256];
                if cb(0, &mut palette) {
                    win.palette = palette;
                }
            }
        }
        if mask.contains(ConfigureMask::STACKING) {
            state.restack(id, changes.stack_mode, changes.sibling);
        }
        state.calls.push(HostCall::ConfigureWindow { id, mask, changes: changes.clone() });
        Ok(())
    }

    fn get_window_bounds(&self, id: WindowId) -> NativeResult<Rect> {
        self.window_bounds(id).ok_or(NativeError::BadWindow(id))
    }

    fn get_native_window(&self, id: WindowId) -> NativeResult<u32> {
        self.state()
            .windows
            .get(&id)
            .map(|w| w.number)
            .ok_or(NativeError::BadWindow(id))
    }

    fn lookup_native_window(&self, number: u32) -> Option<WindowId> {
        self.state()
            .windows
            .iter()
            .find(|(_, w)| w.number == number)
            .map(|(id, _)| *id)
    }

    fn lock(&self, target: NativeTarget) -> NativeResult<LockedBuffer> {
        let mut state = self.state();
        if state.fail_lock {
            return Err(NativeError::LockFailed(format!("{:?}", target)));
        }
        let backing = state.backing_mut(target)?;
        if backing.locked {
            return Err(NativeError::LockFailed(format!("{:?} already locked", target)));
        }
        backing.locked = true;
        let locked = LockedBuffer {
            pixels: backing.pixels.clone(),
            rowbytes: backing.rowbytes,
            bounds: backing.bounds,
        };
        state.calls.push(HostCall::Lock(target));
        trace!("headless: locked {:?}", target);
        Ok(locked)
    }

    fn unlock(&self, target: NativeTarget, flush: bool) -> NativeResult<()> {
        let mut state = self.state();
        state.backing_mut(target)?.locked = false;
        if flush {
            if let NativeTarget::Window(id) = target {
                if let Some(w) = state.windows.get_mut(&id) {
                    w.dirty.clear();
                }
            }
        }
        state.calls.push(HostCall::Unlock { target, flush });
        Ok(())
    }

    fn flush(&self, target: NativeTarget) -> NativeResult<()> {
        let mut state = self.state();
        state.backing_mut(target)?;
        if let NativeTarget::Window(id) = target {
            if let Some(w) = state.windows.get_mut(&id) {
                w.dirty.clear();
            }
        }
        state.calls.push(HostCall::Flush(target));
        Ok(())
    }

    fn mark(&self, target: NativeTarget, rects: &[Rect], dx: i32, dy: i32) -> NativeResult<()> {
        let mut state = self.state();
        state.backing_mut(target)?;
        if let NativeTarget::Window(id) = target {
            if let Some(w) = state.windows.get_mut(&id) {
                w.dirty.extend(rects.iter().map(|r| r.translate(dx, dy)));
            }
        }
        state.calls.push(HostCall::Mark { target, rects: rects.to_vec(), dx, dy });
        Ok(())
    }

    fn copy_window(&self, src: WindowId, dst: WindowId, rects: &[Rect], dx: i32, dy: i32) -> NativeResult<()> {
        let mut state = self.state();
        let from = state.windows.get(&src).ok_or(NativeError::BadWindow(src))?.backing.header();
        let to = state.windows.get(&dst).ok_or(NativeError::BadWindow(dst))?.backing.header();
        for r in rects {
            copy_area(&from, &to, r, dx, dy);
        }
        state.calls.push(HostCall::CopyWindow { src, dst, rects: rects.to_vec(), dx, dy });
        Ok(())
    }

    fn scroll_area_threshold(&self) -> u32 {
        self.scroll_threshold.load(Ordering::Relaxed)
    }

    fn disable_update(&self) {
        let mut state = self.state();
        state.update_disabled += 1;
        state.calls.push(HostCall::DisableUpdate);
    }

    fn reenable_update(&self) {
        let mut state = self.state();
        state.update_disabled = state.update_disabled.saturating_sub(1);
        state.calls.push(HostCall::ReenableUpdate);
    }

    fn create_surface(&self, window: Option<WindowId>) -> NativeResult<SurfaceId> {
        let mut state = self.state();
        if state.fail_create {
            return Err(NativeError::AllocationFailed("surface creation disabled".into()));
        }
        if let Some(w) = window {
            if !state.windows.contains_key(&w) {
                return Err(NativeError::BadWindow(w));
            }
        }
        let id = SurfaceId(state.next_surface);
        state.next_surface += 1;
        state.surfaces.insert(
            id,
            HeadlessSurface {
                window,
                backing: Backing::new(Rect::default(), PixelDepth::Argb8888),
                exported: Vec::new(),
            },
        );
        state.calls.push(HostCall::CreateSurface { id, window });
        Ok(id)
    }

    fn destroy_surface(&self, id: SurfaceId) -> NativeResult<()> {
        let mut state = self.state();
        state.surfaces.remove(&id).ok_or(NativeError::BadSurface(id))?;
        state.calls.push(HostCall::DestroySurface(id));
        Ok(())
    }

    fn configure_surface(&self, id: SurfaceId, mask: ConfigureMask, changes: &WindowChanges) -> NativeResult<()> {
        let mut state = self.state();
        let surface = state.surfaces.get_mut(&id).ok_or(NativeError::BadSurface(id))?;
        if mask.contains(ConfigureMask::DEPTH) {
            surface.backing.depth = changes.depth;
        }
        if mask.contains(ConfigureMask::SIZE) {
            if surface.backing.locked {
                return Err(NativeError::BadMatch(format!("{:?} resized while locked", id)));
            }
            let bounds = Rect::from_xywh(changes.x, changes.y, changes.width, changes.height);
            surface.backing = Backing::new(bounds, surface.backing.depth);
        }
        if mask.contains(ConfigureMask::SHAPE) {
            surface.backing.shape = changes.shape.as_ref().map(|rects| {
                let (tx, ty) = changes.shape_offset;
                rects.iter().map(|r| r.translate(tx, ty)).collect()
            });
        }
        state.calls.push(HostCall::ConfigureSurface { id, mask, changes: changes.clone() });
        Ok(())
    }

    fn export_surface(&self, window: WindowId, surface: SurfaceId, client: ClientId) -> NativeResult<[u32; 2]> {
        let mut state = self.state();
        if state.fail_export {
            return Err(NativeError::BadMatch("export refused".into()));
        }
        let s = state.surfaces.get_mut(&surface).ok_or(NativeError::BadSurface(surface))?;
        s.exported.push(client);
        state.calls.push(HostCall::ExportSurface { window, surface, client });
        Ok([surface.0 ^ 0x5eed_0000, client.0])
    }
}

/// Sending half of a [`ChannelEventSource`]
#[derive(Clone)]
pub struct HostEventSender(mpsc::Sender<HostEvent>);

impl HostEventSender {
    /// Deliver an event as the native window server would
    pub fn send(&self, event: HostEvent) -> bool {
        self.0.send(event).is_ok()
    }
}

/// Host event source fed through a channel
pub struct ChannelEventSource {
    rx: mpsc::Receiver<HostEvent>,
    interest: HostEventMask,
}

impl ChannelEventSource {
    pub fn new() -> (HostEventSender, Self) {
        let (tx, rx) = mpsc::channel();
        (
            HostEventSender(tx),
            Self {
                rx,
                interest: HostEventMask::empty(),
            },
        )
    }
}

impl HostEventSource for ChannelEventSource {
    fn connect(&mut self, interest: HostEventMask) -> NativeResult<()> {
        self.interest = interest;
        Ok(())
    }

    fn wait_event(&mut self, timeout: Duration) -> Option<HostEvent> {
        loop {
            let event = self.rx.recv_timeout(timeout).ok()?;
            if event.kind().is_none_or(|kind| self.interest.contains(kind)) {
                return Some(event);
            }
        }
    }
}
