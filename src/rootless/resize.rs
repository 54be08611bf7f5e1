//! Move, resize and copy-window strategies
//!
//! Resizing a frame reallocates its native buffer. Before that happens the
//! pixels bit gravity still needs are kept somewhere: in the live buffer when
//! the top-left corner stays put and the host preserves it, in a snapshot of
//! the strip that gets cut off, or in a snapshot of the whole frame. While the
//! resize is in flight window copies read from those sources.

use tracing::{debug, trace, warn};

use crate::native::{ConfigureMask, Gravity, NativeTarget, WindowChanges};
use crate::protocol::pixmap::{copy_area, PixmapHeader};
use crate::protocol::{DrawableId, LowerOutcome};
use crate::rootless::RootlessScreen;
use crate::shared::{Point, Rect, Region};

/// How window contents are copied after a structural change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyMode {
    /// Copy inside the frame buffer, or natively for large areas
    #[default]
    Normal,
    /// The frame itself moves; its contents go along
    NoCopy,
    /// Copy from the sources saved for the resize in flight
    ResizeCopy,
}

/// State of a frame resize between start and finish
#[derive(Debug)]
pub(crate) struct ResizeState {
    window: DrawableId,
    weight: Gravity,
    resize_after: bool,
    /// Old pixels, each view positioned at its old screen location
    sources: Vec<PixmapHeader>,
    saved_copy_mode: CopyMode,
}

/// Corner of the frame that keeps its screen position, if any
pub fn resize_weighting(old: &Rect, new: &Rect, old_bw: u32, new_bw: u32) -> Gravity {
    if old_bw != new_bw {
        return Gravity::None;
    }
    if old.x1 == new.x1 && old.y1 == new.y1 {
        Gravity::NorthWest
    } else if old.x1 == new.x1 && old.y2 == new.y2 {
        Gravity::SouthWest
    } else if old.x2 == new.x2 && old.y2 == new.y2 {
        Gravity::SouthEast
    } else if old.x2 == new.x2 && old.y1 == new.y1 {
        Gravity::NorthEast
    } else {
        Gravity::None
    }
}

impl RootlessScreen {
    /// Copy `rect` of the locked frame of `id` into a fresh pixmap
    fn snapshot_frame(&mut self, id: DrawableId, rect: Rect) -> Option<PixmapHeader> {
        if rect.is_empty() || !self.start_drawing(id) {
            return None;
        }
        let live = self.records.get(&id)?.pixmap()?;
        let snapshot = PixmapHeader::allocate(rect.width() as u32, rect.height() as u32, live.bytes_per_pixel())
            .at(Point::new(rect.x1, rect.y1));
        copy_area(live, &snapshot, &snapshot.bounds(), 0, 0);
        trace!("Snapshot {:?} of {:?}", rect, id);
        Some(snapshot)
    }

    fn resize_frame(&mut self, id: DrawableId, weight: Gravity) {
        let Some(rec) = self.records.get(&id) else { return };
        let wid = rec.wid;
        let mut changes = self.frame_bounds(rec);
        changes.bit_gravity = weight;
        self.configure_frame(wid, ConfigureMask::BOUNDS, &changes);
    }

    /// Prepare the frame of `id` for a change from `old` to `new` (outer
    /// rectangles). With `gravity` the old pixels stay available to window
    /// copies until [`finish_frame_resize`](Self::finish_frame_resize).
    pub(crate) fn start_frame_resize(
        &mut self,
        id: DrawableId,
        gravity: bool,
        old: Rect,
        new: Rect,
        old_bw: u32,
        new_bw: u32,
    ) {
        if !self.records.contains_key(&id) {
            return;
        }
        let weight = resize_weighting(&old, &new, old_bw, new_bw);
        debug!("Resizing frame of {:?} {:?} -> {:?} (weight {:?}, gravity {})", id, old, new, weight, gravity);

        self.disable_update(id);
        self.redisplay(id);

        let mut sources = Vec::new();
        let mut need_window_source = false;
        let mut resize_after = false;
        let width_smaller = new.width() < old.width();
        let height_smaller = new.height() < old.height();

        if gravity && weight == Gravity::NorthWest {
            if width_smaller == height_smaller {
                // Everything still needed stays in place in the live buffer
                need_window_source = true;
                resize_after = width_smaller;
            } else if self.options.preserve_partial_strips
                && ((width_smaller && new.height() == old.height()) || (height_smaller && new.width() == old.width()))
            {
                let strip = if width_smaller {
                    Rect::new(new.x2, old.y1, old.x2, old.y2)
                } else {
                    Rect::new(old.x1, new.y2, old.x2, old.y2)
                };
                sources.extend(self.snapshot_frame(id, strip));
                need_window_source = true;
            } else {
                sources.extend(self.snapshot_frame(id, old));
            }
        } else if gravity {
            sources.extend(self.snapshot_frame(id, old));
        }

        self.stop_drawing(id, false);
        if let Some(rec) = self.records.get_mut(&id) {
            rec.x = new.x1;
            rec.y = new.y1;
            rec.width = new.width() as u32;
            rec.height = new.height() as u32;
            rec.border_width = new_bw;
        }
        if !resize_after {
            self.resize_frame(id, weight);
        }
        self.start_drawing(id);

        if need_window_source {
            let bytes_per_pixel = self.tree.get(id).map(|d| d.bytes_per_pixel()).unwrap_or(4);
            if let Some(lock) = self.records.get(&id).and_then(|r| r.lock.as_ref()) {
                let (w, h) = if resize_after {
                    (old.width(), old.height())
                } else {
                    (old.width().min(new.width()), old.height().min(new.height()))
                };
                let live = PixmapHeader::new(lock.pixels.clone(), lock.rowbytes, bytes_per_pixel, w as u32, h as u32)
                    .at(Point::new(old.x1, old.y1));
                sources.insert(0, live);
            }
        }

        let saved_copy_mode = self.copy_mode;
        if gravity {
            self.copy_mode = CopyMode::ResizeCopy;
        }

        // The host kept nothing; put the overlap back where it was on screen
        if gravity && weight == Gravity::None {
            let frame = self.records.get(&id).and_then(|r| r.pixmap().cloned());
            if let (Some(snapshot), Some(frame), Some(overlap)) = (sources.first(), frame, old.intersect(&new)) {
                copy_area(snapshot, &frame, &overlap, 0, 0);
            }
        }

        self.resize = Some(ResizeState {
            window: id,
            weight,
            resize_after,
            sources,
            saved_copy_mode,
        });
    }

    pub(crate) fn finish_frame_resize(&mut self, id: DrawableId) {
        let Some(state) = self.resize.take() else { return };
        if state.window != id {
            warn!("Resize of {:?} finished while {:?} was resizing", id, state.window);
        }
        self.stop_drawing(id, false);
        if state.resize_after {
            self.resize_frame(id, state.weight);
        }
        if let Some(rec) = self.records.get(&id) {
            let all = Rect::new(0, 0, rec.width as i32, rec.height as i32);
            if let Err(e) = self.host.mark(NativeTarget::Window(rec.wid), &[all], 0, 0) {
                warn!("Failed to mark {:?}: {}", rec.wid, e);
            }
        }
        self.copy_mode = state.saved_copy_mode;
        self.queue_redisplay();
    }

    /// Carry out the pixel work a structural change left behind
    pub(crate) fn apply_outcome(&mut self, outcome: LowerOutcome) {
        if let Some(copy) = outcome.copy {
            self.on_copy(copy.window, copy.old_origin, &copy.region);
        }
        for (w, region) in outcome.exposed {
            self.on_paint_background(w, &region);
        }
        if let Some((w, region)) = outcome.border {
            self.on_paint_border(w, &region);
        }
    }

    /// Repaint `id` and everything under it from scratch
    fn expose_subtree(&mut self, id: DrawableId) {
        for w in self.tree.subtree(id) {
            let Some(clip) = self.tree.get(w).filter(|d| d.is_viewable()).map(|d| d.clip_list.clone()) else {
                continue;
            };
            if !clip.is_empty() {
                self.on_paint_background(w, &clip);
            }
        }
    }

    /// Move the outer top-left of `id` to (`x`, `y`) relative to its parent
    pub fn on_move(&mut self, id: DrawableId, x: i32, y: i32) {
        let Some(outer) = self.tree.get(id).map(|d| d.outer_rect()) else { return };
        let parent_origin = self.tree.parent_origin(id);
        if (outer.x1, outer.y1) == (parent_origin.x + x, parent_origin.y + y) {
            return;
        }
        let framed_top = self.tree.is_top_level(id) && self.records.contains_key(&id);
        let mut saved_copy_mode = self.copy_mode;
        if framed_top {
            self.redisplay(id);
            self.start_drawing(id);
            saved_copy_mode = self.copy_mode;
            self.copy_mode = CopyMode::NoCopy;
        }

        let outcome = self.tree.move_window(id, x, y);
        if let Some((nx, ny)) = self.tree.get(id).map(|d| (d.x, d.y)) {
            self.on_position(id, nx, ny);
        }
        self.apply_outcome(outcome);

        if framed_top {
            self.copy_mode = saved_copy_mode;
            self.stop_drawing(id, false);
            let outer = self.tree.get(id).map(|d| d.outer_rect()).unwrap_or_default();
            let origin = self.options.origin;
            let mut wid = None;
            if let Some(rec) = self.records.get_mut(&id) {
                rec.x = outer.x1;
                rec.y = outer.y1;
                wid = Some(rec.wid);
            }
            if let Some(wid) = wid.filter(|_| !self.no_configure_window) {
                let changes = WindowChanges::origin(origin.x + outer.x1, origin.y + outer.y1);
                self.configure_frame(wid, ConfigureMask::ORIGIN, &changes);
            }
        }
        self.dri_clip_notify(id);
    }

    /// Move and resize `id`: outer top-left at (`x`, `y`) relative to the
    /// parent, inner size `width` x `height`
    pub fn on_resize(&mut self, id: DrawableId, x: i32, y: i32, width: u32, height: u32) {
        let Some(d) = self.tree.get(id) else { return };
        let bw = d.border_width;
        let parent_origin = self.tree.parent_origin(id);
        let old = d.outer_rect();
        let new = Rect::from_xywh(parent_origin.x + x, parent_origin.y + y, width + 2 * bw, height + 2 * bw);
        if old == new {
            return;
        }

        let framed_top = self.tree.is_top_level(id) && self.records.contains_key(&id);
        if framed_top {
            self.start_frame_resize(id, true, old, new, bw, bw);
        }
        let outcome = self.tree.resize_window(id, x, y, width, height);
        if let Some((nx, ny)) = self.tree.get(id).map(|d| (d.x, d.y)) {
            self.on_position(id, nx, ny);
        }
        self.apply_outcome(outcome);
        if framed_top {
            self.finish_frame_resize(id);
        }
        self.dri_clip_notify(id);
    }

    /// Change the border width of `id`, keeping its inner origin in place
    pub fn on_change_border_width(&mut self, id: DrawableId, border_width: u32) {
        let Some(d) = self.tree.get(id) else { return };
        if d.border_width == border_width {
            return;
        }
        let old = d.outer_rect();
        let bw = border_width as i32;
        let new = Rect::from_xywh(d.x - bw, d.y - bw, d.width + 2 * border_width, d.height + 2 * border_width);
        let old_bw = d.border_width;

        let framed_top = self.tree.is_top_level(id) && self.records.contains_key(&id);
        if framed_top {
            self.start_frame_resize(id, false, old, new, old_bw, border_width);
        }
        let outcome = self.tree.set_border_width(id, border_width);
        self.apply_outcome(outcome);
        if framed_top {
            // The frame was reallocated without gravity
            self.expose_subtree(id);
            self.finish_frame_resize(id);
        }
        self.dri_clip_notify(id);
    }

    /// Copy window contents drawn at `old_origin` over `region` (screen
    /// coordinates before the change) to the window's current position
    pub fn on_copy(&mut self, id: DrawableId, old_origin: Point, region: &Region) {
        // Window contents live in the frame even when a surface covers them
        self.no_dri_drawing += 1;
        match self.copy_mode {
            CopyMode::NoCopy => {}
            CopyMode::ResizeCopy => self.resize_copy_window(id, old_origin, region),
            CopyMode::Normal => self.copy_window(id, old_origin, region),
        }
        self.no_dri_drawing -= 1;
    }

    fn copy_destination(&self, id: DrawableId, old_origin: Point, region: &Region) -> Option<(Region, i32, i32)> {
        let d = self.tree.get(id)?;
        let (dx, dy) = (old_origin.x - d.x, old_origin.y - d.y);
        let dst = region.translated(-dx, -dy).intersect(&d.border_clip);
        Some((dst, dx, dy))
    }

    fn resize_copy_window(&mut self, id: DrawableId, old_origin: Point, region: &Region) {
        let has_sources = self.resize.as_ref().is_some_and(|r| !r.sources.is_empty());
        if !has_sources || !self.start_drawing(id) {
            return;
        }
        let Some((dst, dx, dy)) = self.copy_destination(id, old_origin, region) else { return };
        let Some(frame) = self.tree.get(id).and_then(|d| d.pixmap.clone()) else { return };
        let Some(state) = self.resize.as_ref() else { return };
        for source in &state.sources {
            let clipped = dst.intersect_rect(&source.bounds().translate(-dx, -dy));
            for r in clipped.rects() {
                copy_area(source, &frame, r, dx, dy);
            }
        }
        // The whole frame is marked when the resize finishes
    }

    fn copy_window(&mut self, id: DrawableId, old_origin: Point, region: &Region) {
        let Some(top) = self.tree.top_level(id) else { return };
        if !self.records.contains_key(&top) {
            self.lower.copy_window(&self.tree, id, old_origin, region);
            return;
        }
        let Some((dst, dx, dy)) = self.copy_destination(id, old_origin, region) else { return };
        if dst.is_empty() {
            return;
        }

        if dst.extents().area() > self.host.scroll_area_threshold() as i64 {
            self.stop_drawing(id, false);
            let Some(rec) = self.records.get(&top) else { return };
            let local = dst.translated(-rec.x, -rec.y);
            trace!("Native copy of {} rects by ({}, {})", local.num_rects(), dx, dy);
            if let Err(e) = self.host.copy_window(rec.wid, rec.wid, local.rects(), dx, dy) {
                warn!("Native copy in {:?} failed: {}", rec.wid, e);
            }
        } else {
            if !self.start_drawing(id) {
                return;
            }
            let Some(pixmap) = self.tree.get(id).and_then(|d| d.pixmap.clone()) else { return };
            for r in dst.rects() {
                copy_area(&pixmap, &pixmap, r, dx, dy);
            }
            self.damage_region(id, &dst);
        }
    }
}
