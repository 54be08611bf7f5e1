//! Default window operations
//!
//! [`WindowOps`] is the set of handlers the rootless screen wraps. Each
//! rootless hook brackets the default handler with drawing and damage
//! bookkeeping. [`FbWindowOps`] implements them by rendering straight into
//! whatever pixmap a drawable currently has installed.

use tracing::trace;

use crate::protocol::drawable::{Background, DrawableId, DrawableTree};
use crate::protocol::pixmap::{copy_area, PixmapHeader};
use crate::shared::{Point, Rect, Region};

/// Window contents that must be copied after a structural change
#[derive(Debug, Clone)]
pub struct CopyRequest {
    pub window: DrawableId,
    /// Inner origin the contents were drawn at
    pub old_origin: Point,
    /// Source area, screen coordinates before the change
    pub region: Region,
}

/// Pixel work left over by a move, resize or border change
#[derive(Debug, Clone, Default)]
pub struct LowerOutcome {
    pub copy: Option<CopyRequest>,
    /// Areas needing their background repainted
    pub exposed: Vec<(DrawableId, Region)>,
    /// Border area needing a repaint
    pub border: Option<(DrawableId, Region)>,
}

/// Handlers underneath the rootless hooks
pub trait WindowOps {
    fn realize_window(&mut self, _tree: &DrawableTree, _id: DrawableId) -> bool {
        true
    }

    fn unrealize_window(&mut self, _tree: &DrawableTree, _id: DrawableId) -> bool {
        true
    }

    fn destroy_window(&mut self, _tree: &DrawableTree, _id: DrawableId) -> bool {
        true
    }

    fn position_window(&mut self, _tree: &DrawableTree, _id: DrawableId, _x: i32, _y: i32) -> bool {
        true
    }

    fn paint_window_background(&mut self, tree: &DrawableTree, id: DrawableId, region: &Region);

    fn paint_window_border(&mut self, tree: &DrawableTree, id: DrawableId, region: &Region);

    /// Copy the contents drawn at `old_origin` to the window's current position
    fn copy_window(&mut self, tree: &DrawableTree, id: DrawableId, old_origin: Point, region: &Region);

    /// Solid fill, clipped to what the drawable can show
    fn fill_region(&mut self, tree: &DrawableTree, id: DrawableId, region: &Region, pixel: u32);

    /// Copy `src` pixels at (`src_x`, `src_y`) onto `dst_rect` of `dst`
    fn composite(&mut self, tree: &DrawableTree, src: DrawableId, dst: DrawableId, src_x: i32, src_y: i32, dst_rect: Rect);

    /// Packed pixels of `rect` (drawable-local)
    fn get_image(&mut self, tree: &DrawableTree, id: DrawableId, rect: Rect) -> Vec<u8>;
}

/// Opaque pixel value; 32 bit frames carry alpha the host composites with
fn opaque(pixel: u32, bytes_per_pixel: usize) -> u32 {
    if bytes_per_pixel == 4 {
        pixel | 0xFF00_0000
    } else {
        pixel
    }
}

/// Window operations against the installed pixmaps
#[derive(Debug, Default)]
pub struct FbWindowOps;

impl FbWindowOps {
    pub fn new() -> Self {
        Self
    }

    fn pixmap(tree: &DrawableTree, id: DrawableId) -> Option<PixmapHeader> {
        tree.get(id)?.pixmap.clone()
    }

    /// Drawable-local offset of a drawable's first pixel in screen space
    fn drawable_origin(tree: &DrawableTree, id: DrawableId) -> Point {
        tree.get(id)
            .filter(|d| d.is_window())
            .map(|d| Point::new(d.x, d.y))
            .unwrap_or_default()
    }

    fn fill(pixmap: &PixmapHeader, region: &Region, pixel: u32) {
        for r in region.rects() {
            pixmap.fill_rect(r, opaque(pixel, pixmap.bytes_per_pixel()));
        }
    }
}

impl WindowOps for FbWindowOps {
    fn paint_window_background(&mut self, tree: &DrawableTree, id: DrawableId, region: &Region) {
        let Some(pixmap) = Self::pixmap(tree, id) else { return };
        let Some(d) = tree.get(id) else { return };
        let pixel = match d.background {
            Background::None => return,
            Background::Pixel(p) => p,
            Background::ParentRelative => {
                let inherited = tree.ancestors(id).into_iter().find_map(|a| match tree.get(a)?.background {
                    Background::Pixel(p) => Some(p),
                    _ => None,
                });
                match inherited {
                    Some(p) => p,
                    None => return,
                }
            }
        };
        trace!("fb: paint background of {:?} over {} rects", id, region.num_rects());
        Self::fill(&pixmap, &region.intersect(&d.clip_list), pixel);
    }

    fn paint_window_border(&mut self, tree: &DrawableTree, id: DrawableId, region: &Region) {
        let Some(pixmap) = Self::pixmap(tree, id) else { return };
        let Some(d) = tree.get(id) else { return };
        let border = region.intersect(&d.border_clip).subtract_rect(&d.inner_rect());
        Self::fill(&pixmap, &border, d.border_pixel);
    }

    fn copy_window(&mut self, tree: &DrawableTree, id: DrawableId, old_origin: Point, region: &Region) {
        let Some(pixmap) = Self::pixmap(tree, id) else { return };
        let Some(d) = tree.get(id) else { return };
        let (dx, dy) = (old_origin.x - d.x, old_origin.y - d.y);
        let dst = region.translated(-dx, -dy).intersect(&d.border_clip);
        for r in dst.rects() {
            copy_area(&pixmap, &pixmap, r, dx, dy);
        }
    }

    fn fill_region(&mut self, tree: &DrawableTree, id: DrawableId, region: &Region, pixel: u32) {
        let Some(pixmap) = Self::pixmap(tree, id) else { return };
        let Some(d) = tree.get(id) else { return };
        let origin = Self::drawable_origin(tree, id);
        let mut screen = region.translated(origin.x, origin.y);
        if d.is_window() {
            screen = screen.intersect(&d.clip_list);
        }
        Self::fill(&pixmap, &screen, pixel);
    }

    fn composite(&mut self, tree: &DrawableTree, src: DrawableId, dst: DrawableId, src_x: i32, src_y: i32, dst_rect: Rect) {
        let (Some(from), Some(to)) = (Self::pixmap(tree, src), Self::pixmap(tree, dst)) else {
            return;
        };
        let so = Self::drawable_origin(tree, src);
        let d_origin = Self::drawable_origin(tree, dst);
        let screen_dst = dst_rect.translate(d_origin.x, d_origin.y);
        let (dx, dy) = (so.x + src_x - screen_dst.x1, so.y + src_y - screen_dst.y1);
        let clip = match tree.get(dst) {
            Some(d) if d.is_window() => d.clip_list.intersect_rect(&screen_dst),
            _ => Region::from_rect(screen_dst),
        };
        for r in clip.rects() {
            copy_area(&from, &to, r, dx, dy);
        }
    }

    fn get_image(&mut self, tree: &DrawableTree, id: DrawableId, rect: Rect) -> Vec<u8> {
        let Some(pixmap) = Self::pixmap(tree, id) else { return Vec::new() };
        let origin = Self::drawable_origin(tree, id);
        pixmap.read_rect(&rect.translate(origin.x, origin.y))
    }
}
