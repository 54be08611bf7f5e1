//! Window requests
//!
//! Entry points for the protocol requests that change the window tree. Each
//! one updates the tree, recomputes clipping and runs the rootless hooks in
//! the order the default window operations expect them. Areas uncovered by
//! the change are repainted afterwards.

use tracing::debug;

use crate::protocol::{Background, DrawableId};
use crate::rootless::RootlessScreen;
use crate::shared::Region;

/// Visible areas of a set of windows before a structural change
struct ClipSnapshot(Vec<(DrawableId, Region, Region)>);

impl RootlessScreen {
    /// Windows whose clipping a change to `id` can affect. Top-levels never
    /// clip each other, so only the root sees a top-level's change.
    fn affected_windows(&self, id: DrawableId) -> Vec<DrawableId> {
        let root = self.tree.root();
        match self.tree.parent(id) {
            Some(parent) if parent == root => {
                let mut windows = vec![root];
                windows.extend(self.tree.subtree(id));
                windows
            }
            Some(parent) => self.tree.subtree(parent),
            None => self.tree.subtree(id),
        }
    }

    fn snapshot_clips(&self, windows: &[DrawableId]) -> ClipSnapshot {
        ClipSnapshot(
            windows
                .iter()
                .filter_map(|w| self.tree.get(*w).map(|d| (*w, d.border_clip.clone(), d.clip_list.clone())))
                .collect(),
        )
    }

    /// Paint whatever became visible since `before` was taken
    fn expose_uncovered(&mut self, before: ClipSnapshot) {
        for (w, old_border, old_clip) in before.0 {
            let Some(d) = self.tree.get(w).filter(|d| d.is_viewable()) else { continue };
            let border = d.border_clip.subtract(&old_border).subtract_rect(&d.inner_rect());
            let background = d.clip_list.subtract(&old_clip);
            if !border.is_empty() {
                self.on_paint_border(w, &border);
            }
            if !background.is_empty() {
                self.on_paint_background(w, &background);
            }
        }
    }

    pub fn map_window(&mut self, id: DrawableId) {
        let Some(d) = self.tree.get_mut(id).filter(|d| d.is_window()) else { return };
        if d.mapped {
            return;
        }
        d.mapped = true;
        let Some(parent) = self.tree.parent(id) else { return };
        if !self.tree.get(parent).is_some_and(|p| p.realized) {
            debug!("Mapped {:?} under unrealized parent", id);
            return;
        }

        let before = self.snapshot_clips(&self.affected_windows(id));
        let realized = self.tree.set_realized(id, true);
        for w in &realized {
            self.on_realize(*w);
        }
        self.tree.recompute_clips();
        self.expose_uncovered(before);
        self.dri_clip_notify(parent);
    }

    pub fn unmap_window(&mut self, id: DrawableId) {
        if self.tree.is_root(id) {
            return;
        }
        let Some(d) = self.tree.get_mut(id).filter(|d| d.is_window()) else { return };
        if !d.mapped {
            return;
        }
        d.mapped = false;
        if !d.realized {
            return;
        }

        let before = self.snapshot_clips(&self.affected_windows(id));
        for w in self.tree.set_realized(id, false) {
            self.on_unrealize(w);
        }
        self.tree.recompute_clips();
        self.expose_uncovered(before);
        if let Some(parent) = self.tree.parent(id) {
            self.dri_clip_notify(parent);
        }
    }

    /// Destroy `id` and everything under it, children first
    pub fn destroy_window(&mut self, id: DrawableId) {
        if self.tree.is_root(id) || !self.tree.get(id).is_some_and(|d| d.is_window()) {
            return;
        }
        self.unmap_window(id);
        for w in self.tree.subtree(id).into_iter().rev() {
            self.on_destroy(w);
            self.tree.remove(w);
        }
        self.tree.recompute_clips();
        debug!("Destroyed {:?}", id);
    }

    /// Move `id` under `parent` with its outer top-left at (`x`, `y`)
    pub fn reparent_window(&mut self, id: DrawableId, parent: DrawableId, x: i32, y: i32) -> bool {
        let Some(was_mapped) = self.tree.get(id).filter(|d| d.is_window()).map(|d| d.mapped) else {
            return false;
        };
        if was_mapped {
            self.unmap_window(id);
        }
        let old_parent = self.tree.parent(id);
        if !self.tree.reparent(id, parent, x, y) {
            if was_mapped {
                self.map_window(id);
            }
            return false;
        }
        self.on_reparent(id, old_parent);
        if was_mapped {
            self.map_window(id);
        }
        true
    }

    /// Restack `id` directly above or below `sibling`, or at the very top or
    /// bottom of its siblings when there is none
    pub fn restack_window(&mut self, id: DrawableId, sibling: Option<DrawableId>, above: bool) {
        let Some(parent) = self.tree.parent(id) else { return };
        let before = self.snapshot_clips(&self.affected_windows(id));
        let old_next = self.tree.next_sibling(id);
        self.tree.restack(id, sibling, above);
        self.on_restack(id, old_next);
        self.expose_uncovered(before);
        self.dri_clip_notify(parent);
    }

    pub fn move_window(&mut self, id: DrawableId, x: i32, y: i32) {
        self.on_move(id, x, y);
    }

    /// Configure the outer top-left and inner size of `id`
    pub fn resize_window(&mut self, id: DrawableId, x: i32, y: i32, width: u32, height: u32) {
        let Some(d) = self.tree.get(id) else { return };
        if (d.width, d.height) == (width, height) {
            self.on_move(id, x, y);
        } else {
            self.on_resize(id, x, y, width, height);
        }
    }

    pub fn set_border_width(&mut self, id: DrawableId, border_width: u32) {
        self.on_change_border_width(id, border_width);
    }

    /// Replace the bounding shape of `id`; `None` makes it rectangular again
    pub fn set_window_shape(&mut self, id: DrawableId, shape: Option<Region>) {
        let before = self.snapshot_clips(&self.affected_windows(id));
        let Some(d) = self.tree.get_mut(id) else { return };
        d.bounding_shape = shape;
        self.tree.recompute_clips();
        self.expose_uncovered(before);
        self.set_shape(id);
        self.dri_clip_notify(id);
    }

    pub fn set_background(&mut self, id: DrawableId, background: Background) {
        let Some(d) = self.tree.get_mut(id) else { return };
        d.background = background;
        self.on_change_window_attributes(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::NativeTarget;
    use crate::protocol::WindowClass;
    use crate::rootless::testing::*;
    use crate::shared::Rect;

    const RED: u32 = 0xff0000;
    const GREEN: u32 = 0x00ff00;
    const BLUE: u32 = 0x0000ff;

    fn painted(f: &mut Fixture, parent: DrawableId, rect: Rect, pixel: u32) -> DrawableId {
        let id = f
            .screen
            .tree_mut()
            .create_window(parent, rect.x1, rect.y1, rect.width() as u32, rect.height() as u32, 0, WindowClass::InputOutput)
            .unwrap();
        f.screen.set_background(id, Background::Pixel(pixel));
        f.screen.map_window(id);
        id
    }

    #[test]
    fn test_map_under_unmapped_parent_waits() {
        let mut f = fixture();
        let root = f.screen.tree().root();
        let top = f
            .screen
            .tree_mut()
            .create_window(root, 0, 0, 50, 50, 0, WindowClass::InputOutput)
            .unwrap();
        let child = f.child(top, 5, 5, 10, 10, 0);
        assert!(!f.screen.tree().get(child).unwrap().realized);
        assert!(f.screen.record(top).is_none());

        f.screen.map_window(top);
        assert!(f.screen.tree().get(child).unwrap().realized);
        assert!(f.screen.record(top).is_some());
        assert!(f.screen.record(child).is_none());
    }

    #[test]
    fn test_map_paints_background_into_frame() {
        let mut f = fixture();
        let root = f.screen.tree().root();
        let win = painted(&mut f, root, Rect::new(10, 10, 30, 30), RED);
        let wid = f.wid(win);
        assert_eq!(f.host.window_pixmap(wid).unwrap().read_pixel(5, 5), Some(0xFF00_0000 | RED));
        assert!(!f.host.marks(NativeTarget::Window(wid)).is_empty());
    }

    #[test]
    fn test_unmapping_child_repaints_parent() {
        let mut f = fixture();
        let root = f.screen.tree().root();
        let top = painted(&mut f, root, Rect::new(0, 0, 50, 50), RED);
        let child = painted(&mut f, top, Rect::new(10, 10, 20, 20), BLUE);
        let wid = f.wid(top);
        assert_eq!(f.host.window_pixmap(wid).unwrap().read_pixel(15, 15), Some(0xFF00_0000 | BLUE));

        f.screen.unmap_window(child);
        assert!(!f.screen.tree().get(child).unwrap().realized);
        assert_eq!(f.host.window_pixmap(wid).unwrap().read_pixel(15, 15), Some(0xFF00_0000 | RED));
    }

    #[test]
    fn test_raising_child_paints_its_hidden_part() {
        let mut f = fixture();
        let root = f.screen.tree().root();
        let top = painted(&mut f, root, Rect::new(0, 0, 50, 50), 0);
        let lower = painted(&mut f, top, Rect::new(0, 0, 20, 20), BLUE);
        let _upper = painted(&mut f, top, Rect::new(10, 10, 30, 30), GREEN);
        let wid = f.wid(top);
        assert_eq!(f.host.window_pixmap(wid).unwrap().read_pixel(15, 15), Some(0xFF00_0000 | GREEN));

        f.screen.restack_window(lower, None, true);
        assert_eq!(f.host.window_pixmap(wid).unwrap().read_pixel(15, 15), Some(0xFF00_0000 | BLUE));
        assert_eq!(f.host.window_pixmap(wid).unwrap().read_pixel(25, 25), Some(0xFF00_0000 | GREEN));
    }

    #[test]
    fn test_destroy_removes_whole_subtree() {
        let mut f = fixture();
        let top = f.top_level(0, 0, 50, 50, 0);
        let child = f.child(top, 5, 5, 10, 10, 0);
        f.screen.destroy_window(top);
        assert!(f.screen.tree().get(top).is_none());
        assert!(f.screen.tree().get(child).is_none());
        assert_eq!(f.host.window_count(), 0);
        assert!(f.screen.tree().top_level_windows().is_empty());
    }

    #[test]
    fn test_root_cannot_be_destroyed_or_unmapped() {
        let mut f = fixture();
        let root = f.screen.tree().root();
        f.screen.unmap_window(root);
        f.screen.destroy_window(root);
        let r = f.screen.tree().get(root).unwrap();
        assert!(r.mapped && r.realized);
    }

    #[test]
    fn test_reparent_keeps_mapping() {
        let mut f = fixture();
        let a = f.top_level(0, 0, 50, 50, 0);
        let b = f.top_level(100, 0, 50, 50, 0);
        let child = f.child(a, 5, 5, 10, 10, 0);
        assert!(f.screen.reparent_window(child, b, 1, 2));
        let d = f.screen.tree().get(child).unwrap();
        assert!(d.mapped && d.realized);
        assert_eq!((d.x, d.y), (101, 2));
        assert_eq!(f.screen.tree().parent(child), Some(b));
        // A window cannot move under its own descendant
        assert!(!f.screen.reparent_window(b, child, 0, 0));
        assert!(f.screen.tree().get(b).unwrap().realized);
    }

    #[test]
    fn test_shape_reaches_frame() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 20, 20, 0);
        let wid = f.wid(win);
        f.screen.set_window_shape(win, Some(Region::from_rect(Rect::new(0, 0, 5, 5))));
        assert_eq!(f.host.window_shape(wid), Some(vec![Rect::new(0, 0, 5, 5)]));
        assert_eq!(f.screen.tree().get(win).unwrap().clip_list.extents(), Rect::new(0, 0, 5, 5));
        f.screen.set_window_shape(win, None);
        assert_eq!(f.host.window_shape(wid), None);
    }

    #[test]
    fn test_same_size_configure_is_a_move() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 20, 20, 0);
        f.screen.redisplay_screen();
        let wid = f.wid(win);
        f.screen.resize_window(win, 30, 40, 20, 20);
        assert_eq!(f.host.window_bounds(wid), Some(Rect::new(30, 40, 50, 60)));
        assert!(f.screen.resize.is_none());
    }

    #[test]
    fn test_framed_window_loses_parent_relative_background() {
        let mut f = fixture();
        let win = f.top_level(0, 0, 20, 20, 0);
        f.screen.set_background(win, Background::ParentRelative);
        assert_eq!(f.screen.tree().get(win).unwrap().background, Background::Pixel(0));
    }
}
