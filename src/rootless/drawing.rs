//! Direct drawing into native buffers
//!
//! While a top-level is "drawing" its native buffer is locked and every
//! window of the tree that renders gets a pixmap wrapping that buffer. The
//! displaced pixmaps are kept on the record and put back when drawing stops.

use tracing::{trace, warn};

use crate::native::NativeTarget;
use crate::protocol::pixmap::PixmapHeader;
use crate::protocol::{Background, DrawableId};
use crate::rootless::{FrameLock, RootlessScreen};
use crate::shared::Point;

impl RootlessScreen {
    /// Start drawing to `id`, locking its frame's buffer if needed.
    ///
    /// Returns false when there is no frame to draw into or the host refused
    /// the lock; the window keeps rendering into its own pixmap then.
    pub fn start_drawing(&mut self, id: DrawableId) -> bool {
        if self.no_dri_drawing == 0 && self.dri_start_drawing(id) {
            return true;
        }
        let Some(top) = self.tree.top_level(id) else { return false };
        let Some(bytes_per_pixel) = self.tree.get(top).map(|d| d.bytes_per_pixel()) else {
            return false;
        };
        let Some(rec) = self.records.get_mut(&top) else { return false };

        if rec.lock.is_none() {
            let locked = match self.host.lock(NativeTarget::Window(rec.wid)) {
                Ok(locked) => locked,
                Err(e) => {
                    warn!("Failed to lock frame {:?} of {:?}: {}", rec.wid, top, e);
                    return false;
                }
            };
            let width = rec.width.min(locked.bounds.width().max(0) as u32);
            let height = rec.height.min(locked.bounds.height().max(0) as u32);
            let pixmap = PixmapHeader::new(locked.pixels.clone(), locked.rowbytes, bytes_per_pixel, width, height)
                .at(Point::new(rec.x, rec.y));
            trace!("Locked {:?} ({}x{}, {} bytes/row)", rec.wid, width, height, locked.rowbytes);
            rec.lock = Some(FrameLock {
                pixels: locked.pixels,
                rowbytes: locked.rowbytes,
                pixmap,
            });
        }
        self.install_frame_pixmap(top, id);
        true
    }

    /// Point `id` at the frame pixmap of `top`, remembering what it had
    fn install_frame_pixmap(&mut self, top: DrawableId, id: DrawableId) {
        let Some(rec) = self.records.get_mut(&top) else { return };
        let Some(pixmap) = rec.lock.as_ref().map(|l| l.pixmap.clone()) else { return };
        let Some(d) = self.tree.get_mut(id) else { return };
        if !rec.old_pixmaps.iter().any(|(w, _)| *w == id) {
            rec.old_pixmaps.push((id, d.pixmap.clone()));
        }
        d.pixmap = Some(pixmap);
    }

    /// Stop drawing to `id`'s frame. `flush` also pushes the buffer to the
    /// screen and runs the work deferred until then.
    pub fn stop_drawing(&mut self, id: DrawableId, flush: bool) {
        self.dri_stop_drawing(id, flush);
        if let Some(top) = self.tree.top_level(id) {
            self.stop_drawing_record(top, flush);
        }
    }

    /// Release the frame lock of the record stored under `key`
    pub(crate) fn stop_drawing_record(&mut self, key: DrawableId, flush: bool) {
        let Some(rec) = self.records.get_mut(&key) else { return };
        let target = NativeTarget::Window(rec.wid);
        if rec.lock.take().is_some() {
            if let Err(e) = self.host.unlock(target, flush) {
                warn!("Failed to unlock {:?}: {}", target, e);
            }
            for (w, old) in rec.old_pixmaps.drain(..) {
                if let Some(d) = self.tree.get_mut(w) {
                    d.pixmap = old;
                }
            }
        } else if flush {
            if let Err(e) = self.host.flush(target) {
                warn!("Failed to flush {:?}: {}", target, e);
            }
        }
        if !flush {
            return;
        }
        let pending = rec.is_reorder_pending;
        rec.is_reorder_pending = false;
        if pending {
            self.reorder_window(key);
        }
        self.reenable_update(key);
    }

    /// Hold screen updates until the frame is flushed again
    pub fn disable_update(&mut self, id: DrawableId) {
        let Some(rec) = self.records.get_mut(&id) else { return };
        if rec.is_offscreen || rec.is_reorder_pending || rec.is_update_disabled {
            return;
        }
        self.host.disable_update();
        rec.is_update_disabled = true;
    }

    pub fn reenable_update(&mut self, id: DrawableId) {
        let Some(rec) = self.records.get_mut(&id) else { return };
        if rec.is_update_disabled {
            self.host.reenable_update();
            rec.is_update_disabled = false;
        }
    }

    /// Let a ParentRelative window paint into its frame by giving its
    /// ancestors up to the top-level the frame pixmap
    pub(crate) fn set_pixmap_of_ancestors(&mut self, id: DrawableId) {
        let Some(top) = self.tree.top_level(id) else { return };
        let mut current = id;
        while let Some(d) = self.tree.get(current) {
            if d.background != Background::ParentRelative {
                break;
            }
            if current == top {
                if let Some(t) = self.tree.get_mut(top) {
                    t.background = Background::Pixel(0);
                }
                break;
            }
            let Some(parent) = d.parent else { break };
            current = parent;
            self.install_frame_pixmap(top, current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::headless::HostCall;
    use crate::rootless::testing::*;
    use crate::shared::Rect;

    #[test]
    fn test_start_locks_once_and_stop_restores_pixmaps() {
        let mut f = fixture();
        let top = f.top_level(10, 10, 100, 100, 1);
        let child = f.child(top, 5, 5, 20, 20, 0);
        f.screen.redisplay_screen();
        let wid = f.wid(top);
        let before = f.screen.tree().get(child).unwrap().pixmap.clone();

        assert!(f.screen.start_drawing(top));
        assert!(f.screen.start_drawing(child));
        let locks = f.host.calls().iter().filter(|c| matches!(c, HostCall::Lock(_))).count();
        assert_eq!(locks, 1);
        let installed = f.screen.tree().get(child).unwrap().pixmap.clone().unwrap();
        assert_eq!(installed.bounds(), Rect::new(10, 10, 112, 112));
        assert!(f.host.is_locked(NativeTarget::Window(wid)));

        f.screen.stop_drawing(child, false);
        assert!(!f.host.is_locked(NativeTarget::Window(wid)));
        assert!(!f.screen.record(top).unwrap().is_drawing());
        let after = f.screen.tree().get(child).unwrap().pixmap.clone();
        assert_eq!(after.is_some(), before.is_some());
        assert!(f.screen.tree().get(top).unwrap().pixmap.is_none());
    }

    #[test]
    fn test_lock_failure_leaves_window_untouched() {
        let mut f = fixture();
        let top = f.top_level(0, 0, 10, 10, 0);
        f.screen.redisplay_screen();
        f.host.set_fail_lock(true);
        assert!(!f.screen.start_drawing(top));
        assert!(!f.screen.record(top).unwrap().is_drawing());
        assert!(f.screen.tree().get(top).unwrap().pixmap.is_none());
    }

    #[test]
    fn test_unframed_windows_cannot_draw() {
        let mut f = fixture();
        let root = f.screen.tree().root();
        assert!(!f.screen.start_drawing(root));
        let pixmap = f.screen.tree_mut().create_pixmap(4, 4, 24);
        assert!(!f.screen.start_drawing(pixmap));
    }

    #[test]
    fn test_flush_without_lock_flushes_native_window() {
        let mut f = fixture();
        let top = f.top_level(0, 0, 10, 10, 0);
        f.screen.redisplay_screen();
        f.host.clear_calls();
        f.screen.stop_drawing(top, true);
        assert!(matches!(f.host.calls().as_slice(), [HostCall::Flush(NativeTarget::Window(_))]));
    }

    #[test]
    fn test_flush_runs_pending_reorder_and_reenables_update() {
        let mut f = fixture();
        let top = f.top_level(0, 0, 10, 10, 0);
        assert!(f.screen.record(top).unwrap().is_reorder_pending);
        // Updates stay enabled while a reorder is pending
        f.screen.disable_update(top);
        assert_eq!(f.host.update_disabled_depth(), 0);

        f.screen.stop_drawing(top, true);
        assert!(!f.screen.record(top).unwrap().is_reorder_pending);
        assert_eq!(f.host.stacking_order(), vec![f.wid(top)]);

        f.screen.disable_update(top);
        f.screen.disable_update(top);
        assert_eq!(f.host.update_disabled_depth(), 1);
        f.screen.stop_drawing(top, true);
        assert_eq!(f.host.update_disabled_depth(), 0);
        assert!(!f.screen.record(top).unwrap().is_update_disabled);
    }

    #[test]
    fn test_offscreen_frames_never_disable_update() {
        let mut f = fixture();
        let top = f.top_level(0, 0, 10, 10, 0);
        f.screen.redisplay_screen();
        f.screen.record_mut(top).unwrap().is_offscreen = true;
        f.screen.disable_update(top);
        assert_eq!(f.host.update_disabled_depth(), 0);
    }

    #[test]
    fn test_parent_relative_chain_shares_frame_pixmap() {
        let mut f = fixture();
        let top = f.top_level(0, 0, 50, 50, 0);
        let middle = f.child(top, 0, 0, 30, 30, 0);
        let inner = f.child(middle, 0, 0, 10, 10, 0);
        f.screen.redisplay_screen();
        f.screen.tree_mut().get_mut(middle).unwrap().background = Background::ParentRelative;
        f.screen.tree_mut().get_mut(inner).unwrap().background = Background::ParentRelative;

        assert!(f.screen.start_drawing(inner));
        f.screen.set_pixmap_of_ancestors(inner);
        let frame = f.screen.record(top).unwrap().pixmap().unwrap().clone();
        for w in [middle, top] {
            let pixmap = f.screen.tree().get(w).unwrap().pixmap.clone().unwrap();
            assert!(pixmap.buffer().ptr_eq(frame.buffer()));
        }
        f.screen.stop_drawing(inner, false);
        assert!(f.screen.tree().get(middle).unwrap().pixmap.is_none());
    }
}
