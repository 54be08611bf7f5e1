//! Damage tracking and drawing hooks
//!
//! Everything drawn into a frame is reported to the host as dirty,
//! translated into frame-local coordinates, and a redisplay is queued. The
//! drawing primitives here bracket the default operations with
//! `start_drawing` and damage.

use tracing::{trace, warn};

use crate::native::NativeTarget;
use crate::protocol::{Background, DrawableId};
use crate::rootless::RootlessScreen;
use crate::shared::{Overlap, Point, Rect, Region};

/// Glyph boxes rendered with one pixel value
#[derive(Debug, Clone)]
pub struct GlyphList {
    /// Drawable-local pen position the boxes are relative to
    pub origin: Point,
    pub boxes: Vec<Rect>,
    pub pixel: u32,
}

impl RootlessScreen {
    /// Report `region` (screen coordinates) of window `id` as drawn
    pub fn damage_region(&mut self, id: DrawableId, region: &Region) {
        if self.dri_damage_region(id, region) {
            return;
        }
        let Some(top) = self.tree.top_level(id) else { return };
        let Some(rec) = self.records.get(&top) else { return };
        let Some(d) = self.tree.get(id) else { return };

        let clipped = if region.num_rects() == 1 {
            match d.border_clip.contains_rect(&region.extents()) {
                Overlap::In => region.clone(),
                Overlap::Out => return,
                Overlap::Partial => region.intersect(&d.border_clip),
            }
        } else {
            region.intersect(&d.border_clip)
        };
        if clipped.is_empty() {
            return;
        }
        trace!("Damage {:?}: {} rects, extents {:?}", id, clipped.num_rects(), clipped.extents());
        if let Err(e) = self.host.mark(NativeTarget::Window(rec.wid), clipped.rects(), -rec.x, -rec.y) {
            warn!("Failed to mark {:?}: {}", rec.wid, e);
        }
        self.queue_redisplay();
    }

    /// Damage a drawable-local rectangle
    pub fn damage_rect(&mut self, id: DrawableId, rect: Rect) {
        let Some(d) = self.tree.get(id) else { return };
        let rect = if d.is_window() { rect.translate(d.x, d.y) } else { rect };
        self.damage_region(id, &Region::from_rect(rect));
    }

    /// Damage a screen rectangle
    pub fn damage_box(&mut self, id: DrawableId, rect: Rect) {
        self.damage_region(id, &Region::from_rect(rect));
    }

    /// Flush everything drawn to `id`'s frame and its DRI surfaces
    pub fn redisplay(&mut self, id: DrawableId) {
        self.synchronize_drawable(id, true);
        self.stop_drawing(id, true);
    }

    /// Flush every frame on the screen
    pub fn redisplay_screen(&mut self) {
        let root = self.tree.root();
        if self.records.contains_key(&root) {
            self.redisplay(root);
        }
        for w in self.tree.top_level_windows() {
            if self.records.contains_key(&w) {
                self.redisplay(w);
            }
        }
        let now = self.clock.now();
        self.scheduler.flushed(now);
    }

    pub fn on_paint_background(&mut self, id: DrawableId, region: &Region) {
        if self.is_framed(id) {
            // Background paint goes to the frame, never to a DRI surface
            self.no_dri_drawing += 1;
            self.start_drawing(id);
            self.damage_region(id, region);
            if self.tree.get(id).is_some_and(|d| d.background == Background::ParentRelative) {
                self.set_pixmap_of_ancestors(id);
            }
            self.lower.paint_window_background(&self.tree, id, region);
            self.no_dri_drawing -= 1;
        } else {
            self.lower.paint_window_background(&self.tree, id, region);
        }
    }

    pub fn on_paint_border(&mut self, id: DrawableId, region: &Region) {
        if self.is_framed(id) {
            self.start_drawing(id);
            self.damage_region(id, region);
        }
        self.lower.paint_window_border(&self.tree, id, region);
    }

    /// Fill drawable-local rectangles with `pixel`
    pub fn poly_fill_rect(&mut self, id: DrawableId, rects: &[Rect], pixel: u32) {
        let Some(d) = self.tree.get(id) else { return };
        let region = Region::from_rects(rects);
        let damage = if d.is_window() {
            region.translated(d.x, d.y).intersect(&d.clip_list)
        } else {
            region.clone()
        };
        self.start_drawing(id);
        self.lower.fill_region(&self.tree, id, &region, pixel);
        if !damage.is_empty() {
            self.damage_region(id, &damage);
        }
    }

    /// Copy `src` pixels at (`src_x`, `src_y`) onto `dst_rect` of `dst`
    pub fn composite(&mut self, src: DrawableId, dst: DrawableId, src_x: i32, src_y: i32, dst_rect: Rect) {
        if self.tree.get(src).is_some_and(|d| d.is_window()) {
            self.start_drawing(src);
        }
        self.start_drawing(dst);
        self.lower.composite(&self.tree, src, dst, src_x, src_y, dst_rect);
        self.damage_rect(dst, dst_rect);
    }

    /// Render glyph boxes; each list damages the box around its glyphs
    pub fn glyphs(&mut self, dst: DrawableId, lists: &[GlyphList]) {
        self.start_drawing(dst);
        for list in lists {
            let boxes: Vec<Rect> = list.boxes.iter().map(|b| b.translate(list.origin.x, list.origin.y)).collect();
            let region = Region::from_rects(&boxes);
            if region.is_empty() {
                continue;
            }
            self.lower.fill_region(&self.tree, dst, &region, list.pixel);
            self.damage_rect(dst, region.extents());
        }
    }

    /// Read back drawable-local `rect` of `id`
    pub fn get_image(&mut self, id: DrawableId, rect: Rect) -> Vec<u8> {
        self.redisplay_screen();
        let Some(d) = self.tree.get(id) else { return Vec::new() };
        let mut rect = rect;
        if d.is_window() {
            let origin = Point::new(d.x, d.y);
            let Some(frame) = self.top_level_record(id).map(|r| r.outer_rect()) else {
                return self.lower.get_image(&self.tree, id, rect);
            };
            match rect.translate(origin.x, origin.y).intersect(&frame) {
                Some(visible) => rect = visible.translate(-origin.x, -origin.y),
                None => return Vec::new(),
            }
        }
        self.start_drawing(id);
        self.lower.get_image(&self.tree, id, rect)
    }

    /// Make sure a drawable about to be read from has its pixels mapped
    pub fn source_validate(&mut self, id: DrawableId) {
        if self.is_framed(id) || self.tree.get(id).is_some_and(|d| !d.is_window()) {
            self.start_drawing(id);
        }
    }
}
