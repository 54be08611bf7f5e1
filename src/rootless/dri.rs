//! Accelerated surfaces
//!
//! A drawable can be given a native surface that clients render into
//! directly. Windows get a surface attached to their top-level's frame,
//! positioned over the window's inner area and shaped to its clip list;
//! pixmaps get an offscreen one. Surfaces are reference counted per
//! drawable and handed out as [`SurfaceLease`]s.
//!
//! While a drawable with a surface is drawn to, the surface buffer is locked
//! and installed as the drawable's pixmap, the same way frames are.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::native::{ClientId, ConfigureMask, Gravity, NativeTarget, PixelDepth, StackMode, SurfaceId, WindowChanges};
use crate::protocol::pixmap::PixmapHeader;
use crate::protocol::DrawableId;
use crate::rootless::{RootlessScreen, SurfaceRegistry};
use crate::shared::{Overlap, Point, Region};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceNotifyKind {
    /// The host tore the surface down
    Destroyed,
    /// The surface changed in a way its users should know about
    Changed,
}

/// What a surface notifier is told
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceNotifyArg {
    pub kind: SurfaceNotifyKind,
    pub id: SurfaceId,
    pub drawable: DrawableId,
}

pub type SurfaceNotifier = Box<dyn FnMut(&SurfaceNotifyArg)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingRelease {
    drawable: DrawableId,
    serial: u64,
    token: u64,
}

/// One reference to a drawable's surface.
///
/// Dropping a lease releases it at the next block handler; passing it to
/// [`RootlessScreen::destroy_surface`] releases it at once.
#[must_use = "dropping a lease releases the surface"]
pub struct SurfaceLease {
    drawable: DrawableId,
    surface: SurfaceId,
    keys: Option<[u32; 2]>,
    serial: u64,
    token: u64,
    releases: Rc<RefCell<Vec<PendingRelease>>>,
    released: bool,
}

impl SurfaceLease {
    pub fn drawable(&self) -> DrawableId {
        self.drawable
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    /// Import keys for the client the surface was exported to
    pub fn keys(&self) -> Option<[u32; 2]> {
        self.keys
    }

    fn release(mut self) -> PendingRelease {
        self.released = true;
        self.pending()
    }

    fn pending(&self) -> PendingRelease {
        PendingRelease {
            drawable: self.drawable,
            serial: self.serial,
            token: self.token,
        }
    }
}

impl Drop for SurfaceLease {
    fn drop(&mut self) {
        if !self.released {
            self.releases.borrow_mut().push(self.pending());
        }
    }
}

impl std::fmt::Debug for SurfaceLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceLease")
            .field("drawable", &self.drawable)
            .field("surface", &self.surface)
            .field("keys", &self.keys)
            .finish()
    }
}

struct DriRecord {
    sid: SurfaceId,
    serial: u64,
    refcount: u32,
    keys: Option<[u32; 2]>,
    notifiers: Vec<(u64, SurfaceNotifier)>,
    /// Screen position of the surface's top-left pixel
    x: i32,
    y: i32,
    lock: Option<PixmapHeader>,
    old_pixmap: Option<Option<PixmapHeader>>,
}

/// Per-screen surface bookkeeping
pub struct DriSurfaceManager {
    enabled: bool,
    records: HashMap<DrawableId, DriRecord>,
    registry: Arc<SurfaceRegistry<SurfaceId>>,
    /// Drawables drawn to since their last flush, most recent first
    drawing: Vec<DrawableId>,
    releases: Rc<RefCell<Vec<PendingRelease>>>,
    next_serial: u64,
    next_token: u64,
}

impl DriSurfaceManager {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            records: HashMap::new(),
            registry: Arc::new(SurfaceRegistry::new()),
            drawing: Vec::new(),
            releases: Rc::new(RefCell::new(Vec::new())),
            next_serial: 1,
            next_token: 1,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn registry(&self) -> &Arc<SurfaceRegistry<SurfaceId>> {
        &self.registry
    }

    /// Number of drawables holding a live surface
    pub fn surface_count(&self) -> usize {
        self.records.len()
    }

    pub fn surface_of(&self, drawable: DrawableId) -> Option<SurfaceId> {
        self.records.get(&drawable).map(|r| r.sid)
    }

    pub fn refcount(&self, drawable: DrawableId) -> u32 {
        self.records.get(&drawable).map(|r| r.refcount).unwrap_or(0)
    }

    /// True while `drawable` has unflushed surface drawing
    pub fn is_drawing(&self, drawable: DrawableId) -> bool {
        self.drawing.contains(&drawable)
    }

    fn is_locked(&self, drawable: DrawableId) -> bool {
        self.records.get(&drawable).is_some_and(|r| r.lock.is_some())
    }
}

impl RootlessScreen {
    /// Give `drawable` a surface, or another reference to the one it has.
    ///
    /// A new window surface is exported to `client` unless it is 0.
    pub fn create_surface(
        &mut self,
        drawable: DrawableId,
        client: ClientId,
        notifier: Option<SurfaceNotifier>,
    ) -> Option<SurfaceLease> {
        if !self.dri.enabled {
            return None;
        }
        let is_window = self.tree.get(drawable)?.is_window();

        if !self.dri.records.contains_key(&drawable) {
            let mut wid = None;
            let sid = if is_window {
                let top = self.tree.top_level(drawable)?;
                let frame = self.get_physical_window(top, true)?;
                wid = Some(frame);
                let sid = match self.host.create_surface(Some(frame)) {
                    Ok(sid) => sid,
                    Err(e) => {
                        warn!("Failed to create surface for {:?}: {}", drawable, e);
                        return None;
                    }
                };
                let changes = WindowChanges::stacking(StackMode::MappedAbove, None);
                if let Err(e) = self.host.configure_surface(sid, ConfigureMask::STACKING, &changes) {
                    warn!("Failed to show surface {:?}: {}", sid, e);
                    self.discard_surface(sid);
                    return None;
                }
                sid
            } else {
                match self.host.create_surface(None) {
                    Ok(sid) => sid,
                    Err(e) => {
                        warn!("Failed to create offscreen surface for {:?}: {}", drawable, e);
                        return None;
                    }
                }
            };

            let mut keys = None;
            if let (Some(wid), true) = (wid, client.0 != 0) {
                match self.host.export_surface(wid, sid, client) {
                    Ok(k) => keys = Some(k),
                    Err(e) => {
                        warn!("Failed to export {:?} to {:?}: {}", sid, client, e);
                        self.discard_surface(sid);
                        return None;
                    }
                }
            }

            self.dri.registry.register(sid, drawable);
            let serial = self.dri.next_serial;
            self.dri.next_serial += 1;
            self.dri.records.insert(
                drawable,
                DriRecord {
                    sid,
                    serial,
                    refcount: 0,
                    keys,
                    notifiers: Vec::new(),
                    x: 0,
                    y: 0,
                    lock: None,
                    old_pixmap: None,
                },
            );
            info!("Created surface {:?} for {:?}", sid, drawable);
            self.update_surface(drawable);
        }

        let token = self.dri.next_token;
        self.dri.next_token += 1;
        let releases = self.dri.releases.clone();
        let rec = self.dri.records.get_mut(&drawable)?;
        let surface = rec.sid;
        rec.refcount += 1;
        if let Some(notifier) = notifier {
            rec.notifiers.push((token, notifier));
        }
        Some(SurfaceLease {
            drawable,
            surface,
            keys: rec.keys,
            serial: rec.serial,
            token,
            releases,
            released: false,
        })
    }

    fn discard_surface(&self, sid: SurfaceId) {
        if let Err(e) = self.host.destroy_surface(sid) {
            warn!("Failed to destroy surface {:?}: {}", sid, e);
        }
    }

    /// Release a lease now
    pub fn destroy_surface(&mut self, lease: SurfaceLease) {
        let pending = lease.release();
        self.release_surface(pending);
    }

    /// Release the leases dropped since the last call
    pub fn process_dri_releases(&mut self) {
        let pending: Vec<PendingRelease> = self.dri.releases.borrow_mut().drain(..).collect();
        for release in pending {
            self.release_surface(release);
        }
    }

    fn release_surface(&mut self, release: PendingRelease) {
        let Some(rec) = self
            .dri
            .records
            .get_mut(&release.drawable)
            .filter(|r| r.serial == release.serial)
        else {
            trace!("Stale surface lease for {:?}", release.drawable);
            return;
        };
        rec.notifiers.retain(|(token, _)| *token != release.token);
        rec.refcount = rec.refcount.saturating_sub(1);
        if rec.refcount == 0 {
            self.free_dri_record(release.drawable);
        }
    }

    /// Tear down `drawable`'s surface and tell whoever is still listening
    fn free_dri_record(&mut self, drawable: DrawableId) {
        self.dri_stop_drawing(drawable, false);
        self.dri.drawing.retain(|d| *d != drawable);
        let Some(mut rec) = self.dri.records.remove(&drawable) else { return };
        let sid = rec.sid;
        self.discard_surface(sid);
        self.dri.registry.unregister(sid);
        debug!("Freed surface {:?} of {:?}", sid, drawable);
        let arg = SurfaceNotifyArg {
            kind: SurfaceNotifyKind::Destroyed,
            id: sid,
            drawable,
        };
        for (_, notifier) in rec.notifiers.iter_mut() {
            notifier(&arg);
        }
    }

    /// The drawable is going away; its surface goes with it
    pub fn dri_destroy_drawable(&mut self, drawable: DrawableId) {
        if self.dri.records.contains_key(&drawable) {
            self.free_dri_record(drawable);
        }
    }

    /// Handle a surface notification from the host
    pub fn surface_notify(&mut self, sid: SurfaceId, kind: SurfaceNotifyKind) {
        let Some(drawable) = self.dri.registry.lookup(sid) else {
            trace!("Notify for unknown surface {:?}", sid);
            return;
        };
        let arg = SurfaceNotifyArg { kind, id: sid, drawable };
        match kind {
            SurfaceNotifyKind::Destroyed => {
                self.dri.registry.unregister(sid);
                self.dri.drawing.retain(|d| *d != drawable);
                let Some(mut rec) = self.dri.records.remove(&drawable) else { return };
                if let Some(old) = rec.old_pixmap.take() {
                    if let Some(d) = self.tree.get_mut(drawable) {
                        d.pixmap = old;
                    }
                }
                info!("Surface {:?} of {:?} destroyed by the host", sid, drawable);
                for (_, notifier) in rec.notifiers.iter_mut() {
                    notifier(&arg);
                }
            }
            SurfaceNotifyKind::Changed => {
                let Some(rec) = self.dri.records.get_mut(&drawable) else { return };
                for (_, notifier) in rec.notifiers.iter_mut() {
                    notifier(&arg);
                }
            }
        }
    }

    /// Bring the surface's position, size and shape in line with its drawable
    pub fn update_surface(&mut self, drawable: DrawableId) {
        let Some(sid) = self.dri.surface_of(drawable) else { return };
        let Some(d) = self.tree.get(drawable) else { return };

        let depth = match d.bits_per_pixel {
            32 => PixelDepth::Argb8888,
            16 => PixelDepth::Rgb555,
            _ => PixelDepth::Nil,
        };
        let mut mask = ConfigureMask::BOUNDS;
        let mut changes = WindowChanges {
            depth,
            bit_gravity: Gravity::None,
            ..Default::default()
        };
        if depth != PixelDepth::Nil {
            mask |= ConfigureMask::DEPTH;
        }

        let origin = if d.is_window() {
            let (x, y, width, height) = (d.x, d.y, d.width, d.height);
            let shape = d.clip_list.rects().to_vec();
            let Some(frame) = self.tree.top_level(drawable).and_then(|t| self.tree.get(t)).map(|t| t.outer_rect())
            else {
                return;
            };
            self.dri_stop_drawing(drawable, false);
            changes.x = x - frame.x1;
            changes.y = y - frame.y1;
            changes.width = width;
            changes.height = height;
            changes.shape = Some(shape);
            changes.shape_offset = (-frame.x1, -frame.y1);
            mask |= ConfigureMask::SHAPE;
            Point::new(x, y)
        } else {
            changes.width = d.width;
            changes.height = d.height;
            Point::default()
        };

        if let Some(rec) = self.dri.records.get_mut(&drawable) {
            rec.x = origin.x;
            rec.y = origin.y;
        }
        trace!("Surface {:?} at {:?} {}x{}", sid, origin, changes.width, changes.height);
        if let Err(e) = self.host.configure_surface(sid, mask, &changes) {
            warn!("Failed to configure surface {:?}: {}", sid, e);
        }
    }

    /// Clip or position of the windows under `id` changed
    pub fn dri_clip_notify(&mut self, id: DrawableId) {
        if self.dri.records.is_empty() {
            return;
        }
        for w in self.tree.subtree(id) {
            if self.dri.records.contains_key(&w) {
                self.update_surface(w);
            }
        }
    }

    /// Start drawing into the surface of window `id`. Returns false when it
    /// has none or the lock failed.
    pub fn dri_start_drawing(&mut self, id: DrawableId) -> bool {
        let Some(d) = self.tree.get(id).filter(|d| d.is_window()) else { return false };
        let bytes_per_pixel = d.bytes_per_pixel();
        let Some(rec) = self.dri.records.get_mut(&id) else { return false };
        let sid = rec.sid;

        if rec.lock.is_none() {
            let locked = match self.host.lock(NativeTarget::Surface(sid)) {
                Ok(locked) => locked,
                Err(e) => {
                    warn!("Failed to lock surface {:?}: {}", sid, e);
                    return false;
                }
            };
            let width = locked.bounds.width().max(0) as u32;
            let height = locked.bounds.height().max(0) as u32;
            let pixmap = PixmapHeader::new(locked.pixels, locked.rowbytes, bytes_per_pixel, width, height)
                .at(Point::new(rec.x, rec.y));
            rec.lock = Some(pixmap);
            self.dri.drawing.retain(|w| *w != id);
            self.dri.drawing.insert(0, id);
        }

        let pixmap = rec.lock.clone();
        if let Some(d) = self.tree.get_mut(id) {
            if rec.old_pixmap.is_none() {
                rec.old_pixmap = Some(d.pixmap.clone());
            }
            d.pixmap = pixmap;
        }
        true
    }

    /// Stop drawing into `id`'s surface; `flush` pushes it to the screen
    pub fn dri_stop_drawing(&mut self, id: DrawableId, flush: bool) {
        let Some(rec) = self.dri.records.get_mut(&id) else { return };
        let sid = rec.sid;
        let target = NativeTarget::Surface(sid);

        if rec.lock.take().is_some() {
            if let Err(e) = self.host.unlock(target, flush) {
                warn!("Failed to unlock {:?}: {}", target, e);
            }
            if let Some(old) = rec.old_pixmap.take() {
                if let Some(d) = self.tree.get_mut(id) {
                    d.pixmap = old;
                }
            }
            // Unflushed drawing stays listed until someone flushes it
            if flush {
                self.dri.drawing.retain(|w| *w != id);
            }
        } else if flush {
            if let Err(e) = self.host.flush(target) {
                warn!("Failed to flush {:?}: {}", target, e);
            }
            self.dri.drawing.retain(|w| *w != id);
        }
    }

    /// Report `region` (screen coordinates) drawn into `id`'s surface.
    /// Returns false when the damage belongs to the frame instead.
    pub fn dri_damage_region(&mut self, id: DrawableId, region: &Region) -> bool {
        if self.no_dri_drawing > 0 {
            return false;
        }
        let Some(d) = self.tree.get(id).filter(|d| d.is_window()) else { return false };
        let Some(rec) = self.dri.records.get(&id) else { return false };
        let sid = rec.sid;

        let clipped = if region.num_rects() == 1 {
            match d.border_clip.contains_rect(&region.extents()) {
                Overlap::In => region.clone(),
                Overlap::Out => return true,
                Overlap::Partial => region.intersect(&d.border_clip),
            }
        } else {
            region.intersect(&d.border_clip)
        };
        if clipped.is_empty() {
            return true;
        }
        if let Err(e) = self.host.mark(NativeTarget::Surface(sid), clipped.rects(), -rec.x, -rec.y) {
            warn!("Failed to mark surface {:?}: {}", sid, e);
        }
        self.queue_redisplay();
        true
    }

    /// Stop surface drawing anywhere in `id`'s top-level window
    pub fn synchronize_drawable(&mut self, id: DrawableId, flush: bool) {
        if self.dri.drawing.is_empty() {
            return;
        }
        let Some(d) = self.tree.get(id) else { return };
        if !d.is_window() {
            self.dri_stop_drawing(id, flush);
            return;
        }
        let top = self.tree.top_level(id);
        for w in self.dri.drawing.clone() {
            if self.tree.top_level(w) == top {
                self.dri_stop_drawing(w, flush);
            }
        }
    }

    /// Stop every surface drawing on the screen
    pub fn synchronize(&mut self, flush: bool) {
        for w in self.dri.drawing.clone() {
            self.dri_stop_drawing(w, flush);
        }
    }

    pub fn is_surface_locked(&self, id: DrawableId) -> bool {
        self.dri.is_locked(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::headless::HostCall;
    use crate::rootless::testing::*;
    use crate::rootless::ScreenOptions;
    use crate::shared::Rect;
    use std::cell::Cell;

    fn recorder() -> (Rc<RefCell<Vec<SurfaceNotifyArg>>>, SurfaceNotifier) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, Box::new(move |arg: &SurfaceNotifyArg| sink.borrow_mut().push(*arg)))
    }

    #[test]
    fn test_window_surface_sits_over_inner_area() {
        let mut f = fixture();
        let top = f.top_level(100, 50, 200, 100, 2);
        let child = f.child(top, 10, 20, 30, 40, 0);
        let lease = f.screen.create_surface(child, ClientId(0), None).unwrap();
        let sid = lease.surface();

        assert_eq!(f.host.surface_window(sid), Some(Some(f.wid(top))));
        // Inner origin of the child relative to the frame's top-left
        assert_eq!(f.host.surface_bounds(sid), Some(Rect::new(12, 22, 42, 62)));
        assert_eq!(f.screen.surface_registry().lookup(sid), Some(child));
        assert_eq!(lease.keys(), None);
        assert_eq!(f.screen.dri().refcount(child), 1);
    }

    #[test]
    fn test_surface_creates_frame_for_unmapped_window() {
        let mut f = fixture();
        let root = f.screen.tree().root();
        let win = f
            .screen
            .tree_mut()
            .create_window(root, 0, 0, 10, 10, 0, crate::protocol::WindowClass::InputOutput)
            .unwrap();
        assert!(f.screen.record(win).is_none());
        let _lease = f.screen.create_surface(win, ClientId(0), None).unwrap();
        assert!(f.screen.record(win).is_some());
    }

    #[test]
    fn test_leases_share_one_surface() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 10, 10, 0);
        let first = f.screen.create_surface(win, ClientId(0), None).unwrap();
        let second = f.screen.create_surface(win, ClientId(0), None).unwrap();
        assert_eq!(first.surface(), second.surface());
        assert_eq!(f.host.surface_count(), 1);
        assert_eq!(f.screen.dri().refcount(win), 2);

        drop(first);
        assert_eq!(f.screen.dri().refcount(win), 2);
        f.screen.process_dri_releases();
        assert_eq!(f.screen.dri().refcount(win), 1);
        assert_eq!(f.host.surface_count(), 1);

        f.screen.destroy_surface(second);
        assert_eq!(f.host.surface_count(), 0);
        assert!(f.screen.surface_registry().is_empty());
        assert_eq!(f.screen.dri().surface_count(), 0);
    }

    #[test]
    fn test_export_to_client_returns_keys() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 10, 10, 0);
        let lease = f.screen.create_surface(win, ClientId(7), None).unwrap();
        assert_eq!(lease.keys(), Some([lease.surface().0 ^ 0x5eed_0000, 7]));
        assert!(f
            .host
            .calls()
            .iter()
            .any(|c| matches!(c, HostCall::ExportSurface { client: ClientId(7), .. })));
    }

    #[test]
    fn test_failed_export_leaves_nothing_behind() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 10, 10, 0);
        f.host.set_fail_export(true);
        assert!(f.screen.create_surface(win, ClientId(7), None).is_none());
        assert_eq!(f.host.surface_count(), 0);
        assert!(f.screen.surface_registry().is_empty());
        assert_eq!(f.screen.dri().refcount(win), 0);
    }

    #[test]
    fn test_disabled_manager_refuses() {
        let mut f = fixture_with(ScreenOptions {
            dri_enabled: false,
            ..Default::default()
        });
        let win = f.top_level(0, 0, 10, 10, 0);
        assert!(f.screen.create_surface(win, ClientId(0), None).is_none());
    }

    #[test]
    fn test_pixmap_surface_is_offscreen() {
        let mut f = fixture();
        let pixmap = f.screen.tree_mut().create_pixmap(64, 32, 24);
        let lease = f.screen.create_surface(pixmap, ClientId(3), None).unwrap();
        assert_eq!(f.host.surface_window(lease.surface()), Some(None));
        assert_eq!(f.host.surface_bounds(lease.surface()), Some(Rect::new(0, 0, 64, 32)));
        // Pixmap surfaces are never exported
        assert_eq!(lease.keys(), None);
    }

    #[test]
    fn test_host_destroy_notifies_and_forgets() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 10, 10, 0);
        let (seen, notifier) = recorder();
        let lease = f.screen.create_surface(win, ClientId(0), Some(notifier)).unwrap();
        let sid = lease.surface();

        f.screen.surface_notify(sid, SurfaceNotifyKind::Changed);
        f.screen.surface_notify(sid, SurfaceNotifyKind::Destroyed);
        let kinds: Vec<_> = seen.borrow().iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![SurfaceNotifyKind::Changed, SurfaceNotifyKind::Destroyed]);
        assert!(f.screen.surface_registry().is_empty());
        assert_eq!(f.screen.dri().surface_of(win), None);
        assert_eq!(f.screen.dri().surface_count(), 0);
        // Drawing falls back to the frame once the surface is gone
        assert!(!f.screen.dri_start_drawing(win));
        assert!(!f.screen.dri_damage_region(win, &Region::from_rect(Rect::new(0, 0, 5, 5))));

        // The stale lease is ignored, even once the drawable gets a new surface
        let fresh = f.screen.create_surface(win, ClientId(0), None).unwrap();
        drop(lease);
        f.screen.process_dri_releases();
        assert_eq!(f.screen.dri().refcount(win), 1);
        assert_eq!(f.screen.dri().surface_of(win), Some(fresh.surface()));
    }

    #[test]
    fn test_notify_for_unknown_surface_is_ignored() {
        let mut f = fixture();
        f.screen.surface_notify(SurfaceId(999), SurfaceNotifyKind::Destroyed);
        assert_eq!(f.screen.dri().surface_count(), 0);
    }

    #[test]
    fn test_released_notifier_is_not_called() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 10, 10, 0);
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let first = f
            .screen
            .create_surface(win, ClientId(0), Some(Box::new(move |_: &SurfaceNotifyArg| counter.set(counter.get() + 1))))
            .unwrap();
        let _second = f.screen.create_surface(win, ClientId(0), None).unwrap();
        let sid = first.surface();
        f.screen.destroy_surface(first);
        f.screen.surface_notify(sid, SurfaceNotifyKind::Changed);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_destroying_window_destroys_surface() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 10, 10, 0);
        let (seen, notifier) = recorder();
        let lease = f.screen.create_surface(win, ClientId(0), Some(notifier)).unwrap();
        f.screen.destroy_window(win);
        assert_eq!(f.host.surface_count(), 0);
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0].kind, SurfaceNotifyKind::Destroyed);
        drop(lease);
        f.screen.process_dri_releases();
    }

    #[test]
    fn test_drawing_goes_to_surface() {
        let mut f = fixture();
        let win = f.top_level(100, 50, 40, 40, 0);
        let lease = f.screen.create_surface(win, ClientId(0), None).unwrap();
        let sid = lease.surface();
        f.screen.redisplay_screen();
        f.host.clear_calls();

        f.screen.poly_fill_rect(win, &[Rect::new(10, 10, 20, 20)], 0xff);
        assert!(f.host.is_locked(NativeTarget::Surface(sid)));
        assert!(!f.host.is_locked(NativeTarget::Window(f.wid(win))));
        assert_eq!(f.host.marks(NativeTarget::Surface(sid)), vec![vec![Rect::new(10, 10, 20, 20)]]);
        assert!(f.screen.dri().is_drawing(win));
        let installed = f.screen.tree().get(win).unwrap().pixmap.clone().unwrap();
        assert_eq!(installed.origin(), Point::new(100, 50));

        f.screen.redisplay_screen();
        assert!(!f.host.is_locked(NativeTarget::Surface(sid)));
        assert!(!f.screen.dri().is_drawing(win));
        assert!(f.screen.tree().get(win).unwrap().pixmap.is_none());
        assert!(f
            .host
            .calls()
            .iter()
            .any(|c| matches!(c, HostCall::Unlock { target, flush: true } if *target == NativeTarget::Surface(sid))));
    }

    #[test]
    fn test_background_paint_bypasses_surface() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 40, 40, 0);
        let lease = f.screen.create_surface(win, ClientId(0), None).unwrap();
        f.screen.redisplay_screen();
        f.host.clear_calls();
        let clip = f.screen.tree().get(win).unwrap().clip_list.clone();
        f.screen.on_paint_background(win, &clip);
        assert!(f.host.marks(NativeTarget::Surface(lease.surface())).is_empty());
        assert!(!f.host.marks(NativeTarget::Window(f.wid(win))).is_empty());
    }

    #[test]
    fn test_unflushed_stop_keeps_drawing_listed() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 40, 40, 0);
        let lease = f.screen.create_surface(win, ClientId(0), None).unwrap();
        assert!(f.screen.dri_start_drawing(win));
        f.screen.dri_stop_drawing(win, false);
        assert!(!f.screen.is_surface_locked(win));
        assert!(f.screen.dri().is_drawing(win));

        f.host.clear_calls();
        f.screen.synchronize(true);
        let sid = lease.surface();
        assert!(matches!(f.host.calls().as_slice(), [HostCall::Flush(target)] if *target == NativeTarget::Surface(sid)));
        assert!(!f.screen.dri().is_drawing(win));
    }

    #[test]
    fn test_move_repositions_surface() {
        let mut f = fixture();
        let top = f.top_level(0, 0, 100, 100, 0);
        let child = f.child(top, 10, 10, 20, 20, 0);
        let lease = f.screen.create_surface(child, ClientId(0), None).unwrap();
        f.screen.move_window(child, 30, 40);
        assert_eq!(f.host.surface_bounds(lease.surface()), Some(Rect::new(30, 40, 50, 60)));
    }
}
