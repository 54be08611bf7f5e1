//! Frame lifecycle
//!
//! A frame is the native window backing a top-level protocol window. Frames
//! are created lazily on realize (or when a DRI surface needs a physical
//! window), follow the window through unrealize, reparent and restack, and
//! are destroyed with it.

use tracing::{debug, info, warn};

use crate::native::{ConfigureMask, Gravity, NativeHost, PixelDepth, StackMode, WindowChanges, WindowId, WindowState};
use crate::protocol::{Background, DrawableId, WindowClass};
use crate::rootless::registry::SurfaceRegistry;
use crate::rootless::{
    RootlessScreen, WindowRecord, NATIVE_SCREEN_ORIGIN_PROPERTY, NATIVE_WINDOW_PROPERTY, NORMAL_WINDOW_LEVELS,
    NUM_WINDOW_LEVELS, ROOTED_WINDOW_LEVELS,
};
use crate::shared::Rect;

/// Windows carrying this property stay ordered out until the host orders
/// them in itself
pub const NO_ORDER_IN_PROPERTY: &str = "_NATIVE_NO_ORDER_IN";

/// Whether the host window `number` is one of ours. Safe on any thread.
pub fn knows_native_window(host: &dyn NativeHost, registry: &SurfaceRegistry<WindowId>, number: u32) -> bool {
    host.lookup_native_window(number).is_some_and(|wid| registry.contains(wid))
}

impl RootlessScreen {
    /// True once the root window has a frame of its own
    pub fn has_root_frame(&self) -> bool {
        self.records.contains_key(&self.tree.root())
    }

    /// Native window level for a level index
    pub fn native_level(&self, level: usize) -> i32 {
        let table = if self.has_root_frame() {
            &ROOTED_WINDOW_LEVELS
        } else {
            &NORMAL_WINDOW_LEVELS
        };
        table[level.min(NUM_WINDOW_LEVELS)]
    }

    pub(crate) fn configure_frame(&self, wid: WindowId, mask: ConfigureMask, changes: &WindowChanges) -> bool {
        match self.host.configure_window(wid, mask, changes) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to configure {:?} ({:?}): {}", wid, mask, e);
                false
            }
        }
    }

    /// Bounding shape relative to the outer corner of the window
    fn frame_shape(&self, id: DrawableId) -> Option<Vec<Rect>> {
        let d = self.tree.get(id)?;
        let shape = d.bounding_shape.as_ref()?;
        let bw = d.border_width as i32;
        Some(shape.translated(bw, bw).rects().to_vec())
    }

    /// Native bounds for a record's geometry
    pub(crate) fn frame_bounds(&self, rec: &WindowRecord) -> WindowChanges {
        let origin = self.options.origin;
        WindowChanges::bounds(origin.x + rec.x, origin.y + rec.y, rec.width, rec.height, Gravity::None)
    }

    /// Create the frame for `id` if it has none.
    ///
    /// Only InputOutput windows get frames. On failure nothing is left
    /// registered.
    pub fn ensure_frame(&mut self, id: DrawableId) -> Option<WindowId> {
        if let Some(rec) = self.records.get(&id) {
            return Some(rec.wid);
        }
        let d = self.tree.get(id).filter(|d| d.is_window())?;
        if d.class != WindowClass::InputOutput {
            return None;
        }
        let outer = d.outer_rect();
        let border_width = d.border_width;
        let depth = d.depth;
        let level = if self.tree.is_root(id) { NUM_WINDOW_LEVELS } else { 0 };

        let origin = self.options.origin;
        let mut changes = WindowChanges::bounds(
            origin.x + outer.x1,
            origin.y + outer.y1,
            outer.width() as u32,
            outer.height() as u32,
            Gravity::None,
        );
        let mut mask = ConfigureMask::BOUNDS | ConfigureMask::DEPTH | ConfigureMask::WINDOW_LEVEL;
        changes.depth = PixelDepth::from_protocol_depth(depth);
        if depth == 8 {
            changes.colormap = Some(self.colormap_callback());
            mask |= ConfigureMask::COLORMAP;
        }
        if let Some(shape) = self.frame_shape(id) {
            changes.shape = Some(shape);
            mask |= ConfigureMask::SHAPE;
        }
        changes.window_level = if self.tree.is_root(id) {
            ROOTED_WINDOW_LEVELS[level]
        } else {
            self.native_level(level)
        };

        let wid = match self.host.create_window(mask, &changes) {
            Ok(wid) => wid,
            Err(e) => {
                warn!("Failed to create frame for {:?}: {}", id, e);
                return None;
            }
        };
        if !self.window_registry.register(wid, id) {
            if let Err(e) = self.host.destroy_window(wid) {
                warn!("Failed to destroy duplicate frame {:?}: {}", wid, e);
            }
            return None;
        }
        self.records.insert(id, WindowRecord::new(id, wid, outer, border_width, level));
        self.set_native_property(id);
        debug!("Created frame {:?} for {:?} at {:?}", wid, id, outer);
        Some(wid)
    }

    /// Destroy the frame of `id`, dropping its record
    pub(crate) fn destroy_frame(&mut self, id: DrawableId) {
        self.stop_drawing_record(id, false);
        let Some(rec) = self.records.remove(&id) else { return };
        self.window_registry.unregister(rec.wid);
        if let Err(e) = self.host.destroy_window(rec.wid) {
            warn!("Failed to destroy frame {:?}: {}", rec.wid, e);
        }
        debug!("Destroyed frame {:?} of {:?}", rec.wid, id);
    }

    fn set_native_property(&mut self, id: DrawableId) {
        let Some(wid) = self.records.get(&id).map(|r| r.wid) else { return };
        match self.host.get_native_window(wid) {
            Ok(number) => self.tree.set_property(id, NATIVE_WINDOW_PROPERTY, vec![number]),
            Err(e) => debug!("No native number for {:?}: {}", wid, e),
        }
    }

    /// Publish the native origin of the protocol screen on the root
    pub(crate) fn set_screen_origin(&mut self) {
        let origin = self.options.origin;
        let root = self.tree.root();
        self.tree
            .set_property(root, NATIVE_SCREEN_ORIGIN_PROPERTY, vec![origin.x as u32, origin.y as u32]);
    }

    pub fn on_realize(&mut self, id: DrawableId) -> bool {
        let top_level_io = self.tree.is_top_level(id)
            && self.tree.get(id).is_some_and(|d| d.class == WindowClass::InputOutput);
        if top_level_io {
            if self.ensure_frame(id).is_none() {
                return false;
            }
            if let Some(rec) = self.records.get_mut(&id) {
                rec.is_reorder_pending = true;
            }
            self.forbid_parent_relative(id);
        }
        self.lower.realize_window(&self.tree, id)
    }

    /// Framed windows cannot show their parent's background
    fn forbid_parent_relative(&mut self, id: DrawableId) {
        if let Some(d) = self.tree.get_mut(id) {
            if d.background == Background::ParentRelative {
                d.background = Background::Pixel(0);
            }
        }
    }

    /// Hook run after window attributes changed
    pub fn on_change_window_attributes(&mut self, id: DrawableId) {
        if self.records.contains_key(&id) {
            self.forbid_parent_relative(id);
        }
    }

    pub fn on_unrealize(&mut self, id: DrawableId) -> bool {
        if let Some(wid) = self.records.get(&id).map(|r| r.wid) {
            self.stop_drawing(id, false);
            self.configure_frame(wid, ConfigureMask::STACKING, &WindowChanges::stacking(StackMode::Unmapped, None));
            let now = self.clock.now();
            if let Some(rec) = self.records.get_mut(&id) {
                rec.unrealize_time = Some(now);
                rec.is_reorder_pending = false;
            }
            self.reenable_update(id);
        }
        self.lower.unrealize_window(&self.tree, id)
    }

    pub fn on_destroy(&mut self, id: DrawableId) -> bool {
        self.dri_destroy_drawable(id);
        if self.records.contains_key(&id) {
            self.destroy_frame(id);
        }
        self.lower.destroy_window(&self.tree, id)
    }

    /// Hook run after `id` moved under a new parent.
    ///
    /// A record on a window that stopped being top-level moves onto its new
    /// top-level when that one has no frame, otherwise it is destroyed.
    pub fn on_reparent(&mut self, id: DrawableId, _old_parent: Option<DrawableId>) {
        let root = self.tree.root();
        if id == root
            || self.tree.parent(id) == Some(root)
            || !self.records.contains_key(&id)
        {
            return;
        }
        let Some(top) = self.tree.top_level(id) else { return };

        if let Some(d) = self.tree.get_mut(id) {
            d.unhittable = false;
        }
        self.tree.delete_property(id, NATIVE_WINDOW_PROPERTY);

        if self.records.contains_key(&top) {
            self.destroy_frame(id);
            return;
        }

        let top_realized = self.tree.get(top).is_some_and(|d| d.realized);
        let win_realized = self.tree.get(id).is_some_and(|d| d.realized);
        self.stop_drawing_record(id, false);
        let Some(mut rec) = self.records.remove(&id) else { return };
        if !top_realized && win_realized {
            self.configure_frame(rec.wid, ConfigureMask::STACKING, &WindowChanges::stacking(StackMode::Unmapped, None));
        }

        if let Some(t) = self.tree.get(top) {
            let outer = t.outer_rect();
            rec.x = outer.x1;
            rec.y = outer.y1;
            rec.width = outer.width() as u32;
            rec.height = outer.height() as u32;
            rec.border_width = t.border_width;
        }
        rec.window = top;
        if top_realized && !win_realized {
            rec.is_reorder_pending = true;
        }
        let wid = rec.wid;
        let changes = self.frame_bounds(&rec);
        self.records.insert(top, rec);
        self.window_registry.rebind(wid, top);
        info!("Moved frame {:?} from {:?} to its new top-level {:?}", wid, id, top);

        self.set_shape(top);
        self.configure_frame(wid, ConfigureMask::BOUNDS, &changes);
        self.set_native_property(top);
    }

    /// Order the frame of `id` directly below the nearest framed, realized
    /// sibling above it, or above everything when there is none
    pub fn reorder_window(&mut self, id: DrawableId) {
        let realized = self.tree.get(id).is_some_and(|d| d.realized);
        let Some(rec) = self.records.get(&id) else { return };
        if !realized || rec.is_reorder_pending || self.windows_hidden {
            return;
        }
        if self.tree.property(id, NO_ORDER_IN_PROPERTY).is_some() {
            return;
        }
        let wid = rec.wid;
        self.stop_drawing(id, false);

        let changes = if self.tree.is_root(id) {
            WindowChanges::stacking(StackMode::MappedBelow, None)
        } else {
            let mut above = self.tree.prev_sibling(id);
            while let Some(p) = above {
                let framed = self.records.contains_key(&p) && self.tree.get(p).is_some_and(|d| d.realized);
                if framed {
                    break;
                }
                above = self.tree.prev_sibling(p);
            }
            match above {
                None => WindowChanges::stacking(StackMode::MappedAbove, None),
                Some(p) => {
                    let pending = self.records.get(&p).is_some_and(|r| r.is_reorder_pending);
                    if pending {
                        if let Some(r) = self.records.get_mut(&p) {
                            r.is_reorder_pending = false;
                        }
                        self.reorder_window(p);
                    }
                    let sibling = self.records.get(&p).map(|r| r.wid);
                    WindowChanges::stacking(StackMode::MappedBelow, sibling)
                }
            }
        };
        self.configure_frame(wid, ConfigureMask::STACKING, &changes);
    }

    pub fn on_restack(&mut self, id: DrawableId, _old_next: Option<DrawableId>) {
        let viewable = self.tree.get(id).is_some_and(|d| d.is_viewable());
        if self.records.contains_key(&id) && viewable {
            self.reorder_window(id);
        }
    }

    /// Hook run after `id` was positioned with its inner origin at (`x`, `y`).
    /// An active drawing pixmap follows the frame.
    pub fn on_position(&mut self, id: DrawableId, x: i32, y: i32) -> bool {
        if let Some(rec) = self.records.get_mut(&id) {
            let bw = self.tree.get(id).map(|d| d.border_width as i32).unwrap_or(0);
            if let Some(lock) = rec.lock.as_mut() {
                lock.pixmap = lock.pixmap.clone().at(crate::shared::Point::new(x - bw, y - bw));
                let pixmap = lock.pixmap.clone();
                let installed: Vec<DrawableId> = rec.old_pixmaps.iter().map(|(w, _)| *w).collect();
                for w in installed {
                    if let Some(d) = self.tree.get_mut(w) {
                        d.pixmap = Some(pixmap.clone());
                    }
                }
            }
        }
        self.lower.position_window(&self.tree, id, x, y)
    }

    /// Push the window's bounding shape to its frame
    pub fn set_shape(&mut self, id: DrawableId) {
        let Some(wid) = self.records.get(&id).map(|r| r.wid) else { return };
        self.stop_drawing(id, false);
        let shape = self.frame_shape(id);
        self.disable_update(id);
        let changes = WindowChanges {
            shape,
            ..Default::default()
        };
        self.configure_frame(wid, ConfigureMask::SHAPE, &changes);
    }

    pub fn set_window_level(&mut self, id: DrawableId, level: usize) {
        if !self.tree.is_top_level(id) {
            return;
        }
        let Some(rec) = self.records.get(&id) else { return };
        if rec.level == level {
            return;
        }
        let wid = rec.wid;
        self.stop_drawing(id, false);
        if let Some(rec) = self.records.get_mut(&id) {
            rec.level = level;
        }
        let changes = WindowChanges {
            window_level: self.native_level(level),
            ..Default::default()
        };
        self.configure_frame(wid, ConfigureMask::WINDOW_LEVEL, &changes);
    }

    /// Order every frame out, e.g. while the application is inactive
    pub fn hide_all_windows(&mut self) {
        if self.windows_hidden {
            return;
        }
        self.windows_hidden = true;
        for w in self.tree.top_level_windows() {
            if !self.tree.get(w).is_some_and(|d| d.realized) {
                continue;
            }
            self.stop_drawing(w, false);
            if let Some(wid) = self.records.get(&w).map(|r| r.wid) {
                self.configure_frame(wid, ConfigureMask::STACKING, &WindowChanges::stacking(StackMode::Unmapped, None));
            }
        }
        info!("All windows hidden");
    }

    pub fn show_all_windows(&mut self) {
        if !self.windows_hidden {
            return;
        }
        self.windows_hidden = false;
        for w in self.tree.top_level_windows() {
            if !self.tree.get(w).is_some_and(|d| d.realized) {
                continue;
            }
            if self.ensure_frame(w).is_none() {
                continue;
            }
            self.reorder_window(w);
        }
        self.screen_expose();
        info!("All windows shown");
    }

    /// Repaint every framed window from scratch
    pub fn screen_expose(&mut self) {
        let root = self.tree.root();
        for w in self.tree.subtree(root) {
            if w == root && !self.has_root_frame() {
                continue;
            }
            let Some(d) = self.tree.get(w).filter(|d| d.is_viewable()) else { continue };
            let background = d.clip_list.clone();
            let border = d.border_clip.subtract_rect(&d.inner_rect());
            if !border.is_empty() {
                self.on_paint_border(w, &border);
            }
            if !background.is_empty() {
                self.on_paint_background(w, &background);
            }
        }
    }

    /// Re-send origin and level of a frame, e.g. after a display change
    pub fn reposition_window(&mut self, id: DrawableId) {
        if self.tree.is_root(id) {
            self.set_screen_origin();
        }
        let Some(rec) = self.records.get(&id) else { return };
        let wid = rec.wid;
        let level = rec.level;
        let origin = self.options.origin;
        let (x, y) = (origin.x + rec.x, origin.y + rec.y);
        self.stop_drawing(id, false);
        let changes = WindowChanges {
            window_level: self.native_level(level),
            ..WindowChanges::origin(x, y)
        };
        self.configure_frame(wid, ConfigureMask::ORIGIN | ConfigureMask::WINDOW_LEVEL, &changes);
        self.reorder_window(id);
    }

    pub fn reposition_windows(&mut self) {
        let root = self.tree.root();
        self.reposition_window(root);
        for w in self.tree.top_level_windows() {
            self.reposition_window(w);
        }
    }

    /// Move the protocol screen to a new native origin
    pub fn set_origin(&mut self, origin: crate::shared::Point) {
        self.options.origin = origin;
        self.reposition_windows();
    }

    /// Give the root window a frame (rooted mode)
    pub fn enable_root(&mut self) -> bool {
        let root = self.tree.root();
        if self.ensure_frame(root).is_none() {
            return false;
        }
        if let Some(clip) = self.tree.get(root).map(|r| r.clip_list.clone()) {
            self.on_paint_background(root, &clip);
        }
        self.reorder_window(root);
        info!("Root window framed");
        true
    }

    pub fn disable_root(&mut self) {
        let root = self.tree.root();
        if self.records.contains_key(&root) {
            self.destroy_frame(root);
            self.tree.delete_property(root, NATIVE_WINDOW_PROPERTY);
            info!("Root window frame removed");
        }
    }

    /// The host moved a frame; follow it without configuring the frame back
    pub fn native_window_moved(&mut self, wid: WindowId) {
        let Some(id) = self.window_registry.lookup(wid) else { return };
        let bounds = match self.host.get_window_bounds(wid) {
            Ok(b) => b,
            Err(e) => {
                debug!("Bounds of moved window {:?} unavailable: {}", wid, e);
                return;
            }
        };
        let origin = self.options.origin;
        let parent_origin = self.tree.parent_origin(id);
        let x = bounds.x1 - origin.x - parent_origin.x;
        let y = bounds.y1 - origin.y - parent_origin.y;
        self.no_configure_window = true;
        self.move_window(id, x, y);
        self.no_configure_window = false;
    }

    pub fn native_window_state_changed(&mut self, wid: WindowId, state: WindowState) {
        let Some(id) = self.window_registry.lookup(wid) else { return };
        let Some(rec) = self.records.get_mut(&id) else { return };
        rec.is_offscreen = state.contains(WindowState::OFFSCREEN);
        rec.is_obscured = state.contains(WindowState::OBSCURED);
        let offscreen = rec.is_offscreen;
        if let Some(d) = self.tree.get_mut(id) {
            d.unhittable = offscreen;
        }
    }

    /// Native window showing `id`, optionally creating its frame
    pub fn get_physical_window(&mut self, id: DrawableId, create: bool) -> Option<WindowId> {
        self.tree.top_level(id)?;
        if let Some(rec) = self.records.get(&id) {
            return Some(rec.wid);
        }
        let io = self.tree.get(id).is_some_and(|d| d.class == WindowClass::InputOutput);
        if create && !self.tree.is_root(id) && io {
            return self.ensure_frame(id);
        }
        None
    }

    pub fn knows_native_window(&self, number: u32) -> bool {
        knows_native_window(self.host.as_ref(), &self.window_registry, number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::headless::HostCall;
    use crate::native::NativeTarget;
    use crate::rootless::testing::*;
    use crate::shared::{Point, Region};

    #[test]
    fn test_realize_creates_frame_with_outer_bounds() {
        let mut f = fixture();
        let win = f.top_level(10, 20, 100, 50, 2);
        let wid = f.wid(win);
        assert_eq!(f.host.window_bounds(wid), Some(Rect::new(10, 20, 114, 74)));
        assert_eq!(f.host.window_level(wid), Some(0));
        assert_eq!(f.screen.window_registry().lookup(wid), Some(win));
        let number = f.screen.tree().property(win, NATIVE_WINDOW_PROPERTY).unwrap()[0];
        assert!(f.screen.knows_native_window(number));
        assert!(f.screen.record(win).unwrap().is_reorder_pending);
    }

    #[test]
    fn test_frame_bounds_follow_screen_origin() {
        let mut f = fixture_with(crate::rootless::ScreenOptions {
            origin: Point::new(100, 50),
            ..Default::default()
        });
        let win = f.top_level(0, 0, 10, 10, 0);
        assert_eq!(f.host.window_bounds(f.wid(win)), Some(Rect::new(100, 50, 110, 60)));
    }

    #[test]
    fn test_frame_creation_failure_leaves_nothing_behind() {
        let mut f = fixture();
        f.host.set_fail_create(true);
        let win = f.top_level(0, 0, 10, 10, 0);
        assert!(f.screen.record(win).is_none());
        assert!(f.screen.window_registry().is_empty());
        assert_eq!(f.host.window_count(), 0);
        // Retried lazily once the host recovers
        f.host.set_fail_create(false);
        assert!(f.screen.get_physical_window(win, true).is_some());
        assert_eq!(f.screen.window_registry().len(), 1);
    }

    #[test]
    fn test_input_only_windows_get_no_frame() {
        let mut f = fixture();
        let root = f.screen.tree().root();
        let win = f
            .screen
            .tree_mut()
            .create_window(root, 0, 0, 10, 10, 0, WindowClass::InputOnly)
            .unwrap();
        f.screen.map_window(win);
        assert!(f.screen.record(win).is_none());
        assert_eq!(f.screen.get_physical_window(win, true), None);
    }

    #[test]
    fn test_shape_is_relative_to_outer_corner() {
        let mut f = fixture();
        let root = f.screen.tree().root();
        let win = f
            .screen
            .tree_mut()
            .create_window(root, 0, 0, 10, 10, 2, WindowClass::InputOutput)
            .unwrap();
        f.screen.tree_mut().get_mut(win).unwrap().bounding_shape = Some(Region::from_rect(Rect::new(0, 0, 4, 4)));
        f.screen.map_window(win);
        assert_eq!(f.host.window_shape(f.wid(win)), Some(vec![Rect::new(2, 2, 6, 6)]));
    }

    #[test]
    fn test_reorder_stacks_below_nearest_framed_sibling_above() {
        let mut f = fixture();
        let lower = f.top_level(0, 0, 10, 10, 0);
        let upper = f.top_level(0, 0, 10, 10, 0);
        f.screen.redisplay_screen();
        let (lw, uw) = (f.wid(lower), f.wid(upper));
        assert_eq!(f.host.stacking_order(), vec![uw, lw]);

        // A new window below `upper` is ordered directly beneath it
        let middle = f.top_level(0, 0, 10, 10, 0);
        f.screen.restack_window(middle, Some(upper), false);
        f.screen.redisplay_screen();
        assert_eq!(f.host.stacking_order(), vec![uw, f.wid(middle), lw]);
    }

    #[test]
    fn test_no_order_in_property_keeps_window_out() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 10, 10, 0);
        f.screen.tree_mut().set_property(win, NO_ORDER_IN_PROPERTY, vec![1]);
        f.screen.redisplay_screen();
        assert!(f.host.stacking_order().is_empty());
        f.screen.tree_mut().delete_property(win, NO_ORDER_IN_PROPERTY);
        f.screen.reorder_window(win);
        assert_eq!(f.host.stacking_order(), vec![f.wid(win)]);
    }

    #[test]
    fn test_unrealize_orders_out_and_clears_pending() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 10, 10, 0);
        f.screen.redisplay_screen();
        f.clock.advance(std::time::Duration::from_secs(3));
        f.screen.unmap_window(win);
        let rec = f.screen.record(win).unwrap();
        assert!(!rec.is_reorder_pending);
        assert_eq!(rec.unrealize_time, Some(std::time::Duration::from_secs(3)));
        assert!(f.host.stacking_order().is_empty());
    }

    #[test]
    fn test_destroy_removes_frame_and_registry_entry() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 10, 10, 0);
        let wid = f.wid(win);
        f.screen.start_drawing(win);
        f.screen.destroy_window(win);
        assert!(f.screen.record(win).is_none());
        assert!(!f.screen.window_registry().contains(wid));
        assert_eq!(f.host.window_count(), 0);
        assert!(f.host.calls().iter().any(|c| matches!(c, HostCall::Unlock { target: NativeTarget::Window(w), .. } if *w == wid)));
    }

    #[test]
    fn test_reparent_transplants_record_to_frameless_top_level() {
        let mut f = fixture();
        let root = f.screen.tree().root();
        // Unmapped, so it has no frame
        let new_top = f
            .screen
            .tree_mut()
            .create_window(root, 50, 50, 200, 200, 0, WindowClass::InputOutput)
            .unwrap();
        let child = f.top_level(0, 0, 20, 20, 0);
        let wid = f.wid(child);
        f.screen.reparent_window(child, new_top, 5, 5);
        assert!(f.screen.record(child).is_none());
        let rec = f.screen.record(new_top).unwrap();
        assert_eq!(rec.wid, wid);
        assert_eq!((rec.x, rec.y, rec.width, rec.height), (50, 50, 200, 200));
        assert_eq!(f.screen.window_registry().lookup(wid), Some(new_top));
        assert_eq!(f.host.window_bounds(wid), Some(Rect::new(50, 50, 250, 250)));
    }

    #[test]
    fn test_reparent_under_framed_top_level_destroys_frame() {
        let mut f = fixture();
        let top = f.top_level(0, 0, 100, 100, 0);
        let other = f.top_level(0, 0, 20, 20, 0);
        let wid = f.wid(other);
        f.screen.reparent_window(other, top, 1, 1);
        assert!(f.screen.record(other).is_none());
        assert!(!f.screen.window_registry().contains(wid));
        assert_eq!(f.host.window_count(), 1);
    }

    #[test]
    fn test_native_move_does_not_configure_back() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 10, 10, 1);
        let wid = f.wid(win);
        f.host.move_window_natively(wid, 40, 30).unwrap();
        f.host.clear_calls();
        f.screen.native_window_moved(wid);
        let d = f.screen.tree().get(win).unwrap();
        assert_eq!((d.x, d.y), (41, 31));
        let rec = f.screen.record(win).unwrap();
        assert_eq!((rec.x, rec.y), (40, 30));
        assert!(!f
            .host
            .calls()
            .iter()
            .any(|c| matches!(c, HostCall::ConfigureWindow { mask, .. } if mask.contains(ConfigureMask::ORIGIN))));
    }

    #[test]
    fn test_state_change_marks_offscreen_unhittable() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 10, 10, 0);
        let wid = f.wid(win);
        f.screen.native_window_state_changed(wid, WindowState::OFFSCREEN | WindowState::OBSCURED);
        let rec = f.screen.record(win).unwrap();
        assert!(rec.is_offscreen && rec.is_obscured);
        assert!(f.screen.tree().get(win).unwrap().unhittable);
        // Unknown ids are ignored
        f.screen.native_window_state_changed(WindowId(999), WindowState::empty());
    }

    #[test]
    fn test_hide_and_show_all_windows() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 10, 10, 0);
        f.screen.redisplay_screen();
        f.screen.hide_all_windows();
        assert!(f.host.stacking_order().is_empty());
        // Reorders are suppressed while hidden
        f.screen.reorder_window(win);
        assert!(f.host.stacking_order().is_empty());
        f.screen.show_all_windows();
        assert_eq!(f.host.stacking_order(), vec![f.wid(win)]);
    }

    #[test]
    fn test_rooted_mode_levels() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 10, 10, 0);
        assert_eq!(f.screen.native_level(0), 0);
        assert!(f.screen.enable_root());
        let root = f.screen.tree().root();
        let root_wid = f.wid(root);
        assert_eq!(f.host.window_level(root_wid), Some(200));
        assert_eq!(f.screen.native_level(0), 202);
        f.screen.set_window_level(win, 2);
        assert_eq!(f.host.window_level(f.wid(win)), Some(204));
        assert_eq!(f.host.stacking_order().last(), Some(&root_wid));
        f.screen.disable_root();
        assert!(!f.screen.has_root_frame());
        assert!(f.screen.tree().property(root, NATIVE_WINDOW_PROPERTY).is_none());
    }

    #[test]
    fn test_reposition_publishes_screen_origin() {
        let mut f = fixture();
        let win = f.top_level(5, 5, 10, 10, 0);
        f.screen.set_origin(Point::new(20, 30));
        let root = f.screen.tree().root();
        assert_eq!(f.screen.tree().property(root, NATIVE_SCREEN_ORIGIN_PROPERTY), Some(&[20u32, 30][..]));
        assert_eq!(f.host.window_bounds(f.wid(win)), Some(Rect::new(25, 35, 35, 45)));
    }

    #[test]
    fn test_parent_relative_background_is_cleared_on_frames() {
        let mut f = fixture();
        let root = f.screen.tree().root();
        let win = f
            .screen
            .tree_mut()
            .create_window(root, 0, 0, 10, 10, 0, WindowClass::InputOutput)
            .unwrap();
        f.screen.tree_mut().get_mut(win).unwrap().background = Background::ParentRelative;
        f.screen.map_window(win);
        assert_eq!(f.screen.tree().get(win).unwrap().background, Background::Pixel(0));
    }
}
