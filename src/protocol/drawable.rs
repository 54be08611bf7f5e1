//! Drawable tree
//!
//! Windows and pixmaps as the protocol layer keeps them: stacking order,
//! absolute geometry, visibility clips and the pixmap each drawable currently
//! renders into. Structural requests (move, resize, border change) update the
//! tree and describe the pixels that have to be copied or exposed as a
//! [`LowerOutcome`]; the screen decides how that copy is carried out.

use std::collections::HashMap;

use crate::protocol::lower::{CopyRequest, LowerOutcome};
use crate::protocol::pixmap::PixmapHeader;
use crate::shared::{Geometry, Point, Rect, Region};

/// Stable identity of a window or pixmap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrawableId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawableKind {
    Window,
    Pixmap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowClass {
    InputOutput,
    InputOnly,
}

/// Window background
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Background {
    None,
    Pixel(u32),
    /// Inherit whatever the parent shows behind the window
    ParentRelative,
}

/// Where window contents go when the window is resized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitGravity {
    #[default]
    Forget,
    NorthWest,
    North,
    NorthEast,
    West,
    Center,
    East,
    SouthWest,
    South,
    SouthEast,
    Static,
}

impl BitGravity {
    /// Displacement of the contents relative to the new inner origin when
    /// the inner size grows by (`dw`, `dh`). `None` for Forget and Static.
    pub fn offset(self, dw: i32, dh: i32) -> Option<(i32, i32)> {
        match self {
            BitGravity::NorthWest => Some((0, 0)),
            BitGravity::North => Some((dw / 2, 0)),
            BitGravity::NorthEast => Some((dw, 0)),
            BitGravity::West => Some((0, dh / 2)),
            BitGravity::Center => Some((dw / 2, dh / 2)),
            BitGravity::East => Some((dw, dh / 2)),
            BitGravity::SouthWest => Some((0, dh)),
            BitGravity::South => Some((dw / 2, dh)),
            BitGravity::SouthEast => Some((dw, dh)),
            BitGravity::Forget | BitGravity::Static => None,
        }
    }
}

/// A window or pixmap
#[derive(Debug, Clone)]
pub struct Drawable {
    pub id: DrawableId,
    pub kind: DrawableKind,
    /// Absolute inner origin (windows); always 0 for pixmaps
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub border_width: u32,
    pub depth: u8,
    pub bits_per_pixel: u8,
    pub class: WindowClass,
    pub parent: Option<DrawableId>,
    /// Topmost first
    pub children: Vec<DrawableId>,
    pub mapped: bool,
    pub realized: bool,
    pub background: Background,
    pub border_pixel: u32,
    pub bit_gravity: BitGravity,
    /// Visible area including the border, screen coordinates
    pub border_clip: Region,
    /// Visible inner area not covered by children, screen coordinates
    pub clip_list: Region,
    /// Bounding shape relative to the inner origin
    pub bounding_shape: Option<Region>,
    pub colormap: u32,
    pub unhittable: bool,
    /// Rendering target; windows without one have nothing to draw into
    pub pixmap: Option<PixmapHeader>,
    pub properties: HashMap<String, Vec<u32>>,
}

impl Drawable {
    fn new(id: DrawableId, kind: DrawableKind, width: u32, height: u32, depth: u8) -> Self {
        Self {
            id,
            kind,
            x: 0,
            y: 0,
            width,
            height,
            border_width: 0,
            depth,
            bits_per_pixel: bits_per_pixel(depth),
            class: WindowClass::InputOutput,
            parent: None,
            children: Vec::new(),
            mapped: false,
            realized: false,
            background: Background::None,
            border_pixel: 0,
            bit_gravity: BitGravity::Forget,
            border_clip: Region::new(),
            clip_list: Region::new(),
            bounding_shape: None,
            colormap: 0,
            unhittable: false,
            pixmap: None,
            properties: HashMap::new(),
        }
    }

    pub fn is_window(&self) -> bool {
        self.kind == DrawableKind::Window
    }

    pub fn is_viewable(&self) -> bool {
        self.is_window() && self.realized
    }

    pub fn geometry(&self) -> Geometry {
        Geometry::new(self.x, self.y, self.width, self.height, self.border_width)
    }

    pub fn inner_rect(&self) -> Rect {
        Rect::from_xywh(self.x, self.y, self.width, self.height)
    }

    pub fn outer_rect(&self) -> Rect {
        self.geometry().outer_rect()
    }

    pub fn bytes_per_pixel(&self) -> usize {
        (self.bits_per_pixel as usize / 8).max(1)
    }
}

/// Storage size for a protocol depth
pub fn bits_per_pixel(depth: u8) -> u8 {
    match depth {
        0..=8 => 8,
        9..=16 => 16,
        _ => 32,
    }
}

/// The protocol layer's window and pixmap tree
pub struct DrawableTree {
    drawables: HashMap<DrawableId, Drawable>,
    root: DrawableId,
    next_id: u32,
}

impl DrawableTree {
    /// Create a tree holding a realized root window of the given size
    pub fn new(width: u32, height: u32, depth: u8) -> Self {
        let root = DrawableId(1);
        let mut window = Drawable::new(root, DrawableKind::Window, width, height, depth);
        window.mapped = true;
        window.realized = true;
        window.background = Background::Pixel(0);
        let mut drawables = HashMap::new();
        drawables.insert(root, window);
        let mut tree = Self {
            drawables,
            root,
            next_id: 2,
        };
        tree.recompute_clips();
        tree
    }

    pub fn root(&self) -> DrawableId {
        self.root
    }

    pub fn get(&self, id: DrawableId) -> Option<&Drawable> {
        self.drawables.get(&id)
    }

    pub fn get_mut(&mut self, id: DrawableId) -> Option<&mut Drawable> {
        self.drawables.get_mut(&id)
    }

    pub fn contains(&self, id: DrawableId) -> bool {
        self.drawables.contains_key(&id)
    }

    fn allocate_id(&mut self) -> DrawableId {
        let id = DrawableId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Create an unmapped window on top of its siblings.
    ///
    /// `x`/`y` give the outer top-left relative to the parent's inner origin.
    pub fn create_window(
        &mut self,
        parent: DrawableId,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        border_width: u32,
        class: WindowClass,
    ) -> Option<DrawableId> {
        let p = self.get(parent).filter(|p| p.is_window())?;
        let (px, py, depth) = (p.x, p.y, p.depth);
        let id = self.allocate_id();
        let mut window = Drawable::new(id, DrawableKind::Window, width, height, depth);
        window.class = class;
        window.parent = Some(parent);
        window.border_width = border_width;
        window.x = px + x + border_width as i32;
        window.y = py + y + border_width as i32;
        self.drawables.insert(id, window);
        if let Some(p) = self.get_mut(parent) {
            p.children.insert(0, id);
        }
        Some(id)
    }

    /// Create a pixmap with its own zeroed storage
    pub fn create_pixmap(&mut self, width: u32, height: u32, depth: u8) -> DrawableId {
        let id = self.allocate_id();
        let mut pixmap = Drawable::new(id, DrawableKind::Pixmap, width, height, depth);
        pixmap.pixmap = Some(PixmapHeader::allocate(width, height, pixmap.bytes_per_pixel()));
        self.drawables.insert(id, pixmap);
        id
    }

    /// Detach and drop a single drawable; its children must already be gone
    pub fn remove(&mut self, id: DrawableId) -> Option<Drawable> {
        if id == self.root {
            return None;
        }
        let removed = self.drawables.remove(&id)?;
        if let Some(parent) = removed.parent.and_then(|p| self.drawables.get_mut(&p)) {
            parent.children.retain(|c| *c != id);
        }
        Some(removed)
    }

    pub fn parent(&self, id: DrawableId) -> Option<DrawableId> {
        self.get(id)?.parent
    }

    pub fn is_root(&self, id: DrawableId) -> bool {
        id == self.root
    }

    /// True for windows whose parent is the root
    pub fn is_top_level(&self, id: DrawableId) -> bool {
        self.parent(id) == Some(self.root)
    }

    /// The ancestor (or self) whose parent is the root. The root maps onto
    /// itself; pixmaps have no top-level.
    pub fn top_level(&self, id: DrawableId) -> Option<DrawableId> {
        let mut current = self.get(id).filter(|d| d.is_window())?.id;
        while let Some(parent) = self.parent(current) {
            if parent == self.root {
                return Some(current);
            }
            current = parent;
        }
        Some(current)
    }

    /// Sibling directly above `id`
    pub fn prev_sibling(&self, id: DrawableId) -> Option<DrawableId> {
        let siblings = &self.get(self.parent(id)?)?.children;
        let index = siblings.iter().position(|c| *c == id)?;
        index.checked_sub(1).map(|i| siblings[i])
    }

    /// Sibling directly below `id`
    pub fn next_sibling(&self, id: DrawableId) -> Option<DrawableId> {
        let siblings = &self.get(self.parent(id)?)?.children;
        let index = siblings.iter().position(|c| *c == id)?;
        siblings.get(index + 1).copied()
    }

    /// Children of the root, topmost first
    pub fn top_level_windows(&self) -> Vec<DrawableId> {
        self.get(self.root).map(|r| r.children.clone()).unwrap_or_default()
    }

    /// `id` and all its descendants, parents before children
    pub fn subtree(&self, id: DrawableId) -> Vec<DrawableId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(d) = self.get(current) else { continue };
            out.push(current);
            stack.extend(d.children.iter().rev());
        }
        out
    }

    /// Strict ancestors of `id`, nearest first
    pub fn ancestors(&self, id: DrawableId) -> Vec<DrawableId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            out.push(p);
            current = self.parent(p);
        }
        out
    }

    pub fn set_property(&mut self, id: DrawableId, name: &str, value: Vec<u32>) {
        if let Some(d) = self.get_mut(id) {
            d.properties.insert(name.to_string(), value);
        }
    }

    pub fn property(&self, id: DrawableId, name: &str) -> Option<&[u32]> {
        self.get(id)?.properties.get(name).map(Vec::as_slice)
    }

    pub fn delete_property(&mut self, id: DrawableId, name: &str) {
        if let Some(d) = self.get_mut(id) {
            d.properties.remove(name);
        }
    }

    /// Mark the mapped windows under `id` realized (or not).
    ///
    /// Returns the windows whose state changed, parents first. Realizing
    /// stops at unmapped windows; unrealizing walks the whole subtree.
    pub fn set_realized(&mut self, id: DrawableId, realized: bool) -> Vec<DrawableId> {
        let mut changed = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(d) = self.get_mut(current) else { continue };
            if realized && !d.mapped {
                continue;
            }
            if d.realized != realized {
                d.realized = realized;
                changed.push(current);
            }
            stack.extend(d.children.iter().rev());
        }
        changed
    }

    /// Move `id` within its parent's stacking order, directly above or
    /// below `sibling`, or to the top/bottom when there is none
    pub fn restack(&mut self, id: DrawableId, sibling: Option<DrawableId>, above: bool) {
        let Some(parent) = self.parent(id) else { return };
        let Some(p) = self.get_mut(parent) else { return };
        p.children.retain(|c| *c != id);
        let index = match sibling.and_then(|s| p.children.iter().position(|c| *c == s)) {
            Some(i) if above => i,
            Some(i) => i + 1,
            None if above => 0,
            None => p.children.len(),
        };
        p.children.insert(index, id);
        self.recompute_clips();
    }

    /// Move `id` under `new_parent`, on top, with its outer top-left at
    /// (`x`, `y`) relative to the new parent's inner origin
    pub fn reparent(&mut self, id: DrawableId, new_parent: DrawableId, x: i32, y: i32) -> bool {
        if id == self.root || self.subtree(id).contains(&new_parent) {
            return false;
        }
        let Some((px, py)) = self.get(new_parent).map(|p| (p.x, p.y)) else {
            return false;
        };
        if let Some(old) = self.parent(id).and_then(|p| self.drawables.get_mut(&p)) {
            old.children.retain(|c| *c != id);
        }
        let Some(d) = self.get_mut(id) else { return false };
        d.parent = Some(new_parent);
        let bw = d.border_width as i32;
        let (dx, dy) = (px + x + bw - d.x, py + y + bw - d.y);
        if let Some(p) = self.get_mut(new_parent) {
            p.children.insert(0, id);
        }
        self.shift_subtree(id, dx, dy);
        self.recompute_clips();
        true
    }

    fn shift_subtree(&mut self, id: DrawableId, dx: i32, dy: i32) {
        for w in self.subtree(id) {
            if let Some(d) = self.get_mut(w) {
                d.x += dx;
                d.y += dy;
            }
        }
    }

    /// Inner origin of the parent of `id`
    pub fn parent_origin(&self, id: DrawableId) -> Point {
        self.parent(id)
            .and_then(|p| self.get(p))
            .map(|p| Point::new(p.x, p.y))
            .unwrap_or_default()
    }

    /// Area of the parent newly uncovered after `id` stopped covering `old`
    fn parent_exposure(&self, id: DrawableId, old: Rect, outcome: &mut LowerOutcome) {
        let (Some(parent), Some(d)) = (self.parent(id), self.get(id)) else {
            return;
        };
        if parent == self.root {
            return;
        }
        if let Some(p) = self.get(parent) {
            let exposed = p.clip_list.intersect_rect(&old).subtract_rect(&d.outer_rect());
            if !exposed.is_empty() {
                outcome.exposed.push((parent, exposed));
            }
        }
    }

    /// Move the outer top-left of `id` to (`x`, `y`) relative to its parent
    pub fn move_window(&mut self, id: DrawableId, x: i32, y: i32) -> LowerOutcome {
        let mut outcome = LowerOutcome::default();
        let origin = self.parent_origin(id);
        let Some(d) = self.get(id) else { return outcome };
        let bw = d.border_width as i32;
        let (dx, dy) = (origin.x + x + bw - d.x, origin.y + y + bw - d.y);
        if dx == 0 && dy == 0 {
            return outcome;
        }
        let old_origin = Point::new(d.x, d.y);
        let old_outer = d.outer_rect();
        let old_clip = d.border_clip.clone();
        let viewable = d.is_viewable();

        self.shift_subtree(id, dx, dy);
        self.recompute_clips();

        if viewable {
            if let Some(d) = self.get(id) {
                let exposed = d.border_clip.subtract(&old_clip.translated(dx, dy));
                if !exposed.is_empty() {
                    outcome.exposed.push((id, exposed));
                }
            }
            if !old_clip.is_empty() {
                outcome.copy = Some(CopyRequest {
                    window: id,
                    old_origin,
                    region: old_clip,
                });
            }
            self.parent_exposure(id, old_outer, &mut outcome);
        }
        outcome
    }

    /// Move and resize `id`; contents follow its bit gravity
    pub fn resize_window(&mut self, id: DrawableId, x: i32, y: i32, width: u32, height: u32) -> LowerOutcome {
        let mut outcome = LowerOutcome::default();
        let origin = self.parent_origin(id);
        let Some(d) = self.get(id) else { return outcome };
        let bw = d.border_width as i32;
        let old_inner = Point::new(d.x, d.y);
        let old_outer = d.outer_rect();
        let old_clip = d.clip_list.clone();
        let gravity = d.bit_gravity;
        let viewable = d.is_viewable();
        let (dw, dh) = (width as i32 - d.width as i32, height as i32 - d.height as i32);
        let new_inner = Point::new(origin.x + x + bw, origin.y + y + bw);

        if let Some(d) = self.get_mut(id) {
            d.width = width;
            d.height = height;
        }
        let children: Vec<DrawableId> = self.get(id).map(|d| d.children.clone()).unwrap_or_default();
        if let Some(d) = self.get_mut(id) {
            d.x = new_inner.x;
            d.y = new_inner.y;
        }
        for child in children {
            self.shift_subtree(child, new_inner.x - old_inner.x, new_inner.y - old_inner.y);
        }
        self.recompute_clips();
        if !viewable {
            return outcome;
        }

        // Where the old contents land, as an absolute origin
        let content = match gravity {
            BitGravity::Static => Some(old_inner),
            g => g.offset(dw, dh).map(|(gx, gy)| Point::new(new_inner.x + gx, new_inner.y + gy)),
        };
        let Some(d) = self.get(id) else { return outcome };
        let mut exposed = d.clip_list.clone();
        if let Some(content) = content {
            let shift = (content.x - old_inner.x, content.y - old_inner.y);
            exposed = exposed.subtract(&old_clip.translated(shift.0, shift.1));
            if !old_clip.is_empty() && (shift != (0, 0) || new_inner != old_inner || dw != 0 || dh != 0) {
                outcome.copy = Some(CopyRequest {
                    window: id,
                    old_origin: Point::new(old_inner.x - (content.x - new_inner.x), old_inner.y - (content.y - new_inner.y)),
                    region: old_clip,
                });
            }
        }
        if !exposed.is_empty() {
            outcome.exposed.push((id, exposed));
        }
        let border = d.border_clip.subtract_rect(&d.inner_rect());
        if !border.is_empty() {
            outcome.border = Some((id, border));
        }
        self.parent_exposure(id, old_outer, &mut outcome);
        outcome
    }

    /// Change the border width, keeping the inner origin in place
    pub fn set_border_width(&mut self, id: DrawableId, border_width: u32) -> LowerOutcome {
        let mut outcome = LowerOutcome::default();
        let Some(d) = self.get_mut(id) else { return outcome };
        if d.border_width == border_width {
            return outcome;
        }
        let old_outer = d.outer_rect();
        d.border_width = border_width;
        let viewable = d.is_viewable();
        self.recompute_clips();
        if let Some(d) = self.get(id).filter(|_| viewable) {
            let border = d.border_clip.subtract_rect(&d.inner_rect());
            if !border.is_empty() {
                outcome.border = Some((id, border));
            }
        }
        if viewable {
            self.parent_exposure(id, old_outer, &mut outcome);
        }
        outcome
    }

    /// Recompute every window's border clip and clip list.
    ///
    /// Top-level windows are composited independently by the native host, so
    /// they neither clip each other nor get clipped by the root's bounds.
    pub fn recompute_clips(&mut self) {
        let root = self.root;
        let Some(r) = self.get(root) else { return };
        let outer = r.outer_rect();
        let available = Region::from_rect(outer);
        let children = r.children.clone();

        let mut remaining = available.intersect_rect(&r.inner_rect());
        for child in children {
            let Some(c) = self.get(child) else { continue };
            let child_outer = c.outer_rect();
            let clips = c.is_viewable() && c.class == WindowClass::InputOutput;
            self.compute_clips(child, Region::from_rect(child_outer));
            if clips {
                remaining = remaining.subtract_rect(&child_outer);
            }
        }
        if let Some(r) = self.get_mut(root) {
            r.border_clip = available;
            r.clip_list = remaining;
        }
    }

    fn compute_clips(&mut self, id: DrawableId, available: Region) {
        let Some(d) = self.get(id) else { return };
        if !d.is_viewable() {
            for w in self.subtree(id) {
                if let Some(d) = self.get_mut(w) {
                    d.border_clip = Region::new();
                    d.clip_list = Region::new();
                }
            }
            return;
        }
        let mut border_clip = available.intersect_rect(&d.outer_rect());
        if let Some(shape) = &d.bounding_shape {
            border_clip = border_clip.intersect(&shape.translated(d.x, d.y));
        }
        let mut remaining = border_clip.intersect_rect(&d.inner_rect());
        let children = d.children.clone();
        for child in children {
            let Some(c) = self.get(child) else { continue };
            let child_outer = c.outer_rect();
            let clips = c.is_viewable() && c.class == WindowClass::InputOutput;
            self.compute_clips(child, remaining.clone());
            if clips {
                remaining = remaining.subtract_rect(&child_outer);
            }
        }
        if let Some(d) = self.get_mut(id) {
            d.border_clip = border_clip;
            d.clip_list = remaining;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapped(tree: &mut DrawableTree, parent: DrawableId, x: i32, y: i32, w: u32, h: u32, bw: u32) -> DrawableId {
        let id = tree.create_window(parent, x, y, w, h, bw, WindowClass::InputOutput).unwrap();
        tree.get_mut(id).unwrap().mapped = true;
        tree.set_realized(id, true);
        tree.recompute_clips();
        id
    }

    #[test]
    fn test_create_window_positions_inner_origin() {
        let mut tree = DrawableTree::new(640, 480, 24);
        let root = tree.root();
        let win = tree.create_window(root, 10, 20, 100, 50, 2, WindowClass::InputOutput).unwrap();
        let d = tree.get(win).unwrap();
        assert_eq!((d.x, d.y), (12, 22));
        assert_eq!(d.outer_rect(), Rect::new(10, 20, 114, 74));
        assert_eq!(tree.top_level(win), Some(win));
        assert!(tree.is_top_level(win));
    }

    #[test]
    fn test_top_level_of_nested_child() {
        let mut tree = DrawableTree::new(640, 480, 24);
        let root = tree.root();
        let top = mapped(&mut tree, root, 0, 0, 100, 100, 0);
        let child = mapped(&mut tree, top, 5, 5, 10, 10, 0);
        let grandchild = mapped(&mut tree, child, 1, 1, 2, 2, 0);
        assert_eq!(tree.top_level(grandchild), Some(top));
        assert_eq!(tree.top_level(root), Some(root));
        assert_eq!(tree.ancestors(grandchild), vec![child, top, root]);
    }

    #[test]
    fn test_top_levels_do_not_clip_each_other() {
        let mut tree = DrawableTree::new(640, 480, 24);
        let root = tree.root();
        let below = mapped(&mut tree, root, 0, 0, 100, 100, 0);
        let _above = mapped(&mut tree, root, 50, 50, 100, 100, 0);
        assert_eq!(tree.get(below).unwrap().clip_list.area(), 100 * 100);
    }

    #[test]
    fn test_children_clip_parent() {
        let mut tree = DrawableTree::new(640, 480, 24);
        let root = tree.root();
        let top = mapped(&mut tree, root, 0, 0, 100, 100, 0);
        let _child = mapped(&mut tree, top, 0, 0, 10, 10, 0);
        let d = tree.get(top).unwrap();
        assert_eq!(d.clip_list.area(), 100 * 100 - 10 * 10);
        assert_eq!(d.border_clip.area(), 100 * 100);
    }

    #[test]
    fn test_stacking_siblings() {
        let mut tree = DrawableTree::new(640, 480, 24);
        let root = tree.root();
        let a = mapped(&mut tree, root, 0, 0, 10, 10, 0);
        let b = mapped(&mut tree, root, 0, 0, 10, 10, 0);
        assert_eq!(tree.prev_sibling(a), Some(b));
        assert_eq!(tree.next_sibling(b), Some(a));
        tree.restack(a, None, true);
        assert_eq!(tree.top_level_windows(), vec![a, b]);
        tree.restack(a, Some(b), false);
        assert_eq!(tree.top_level_windows(), vec![b, a]);
    }

    #[test]
    fn test_move_window_reports_copy_from_old_origin() {
        let mut tree = DrawableTree::new(640, 480, 24);
        let root = tree.root();
        let win = mapped(&mut tree, root, 10, 10, 20, 20, 1);
        let outcome = tree.move_window(win, 30, 40);
        let copy = outcome.copy.unwrap();
        assert_eq!(copy.old_origin, Point::new(11, 11));
        assert_eq!(copy.region.extents(), Rect::new(10, 10, 32, 32));
        assert_eq!(tree.get(win).unwrap().x, 31);
    }

    #[test]
    fn test_resize_north_west_gravity_exposes_new_area() {
        let mut tree = DrawableTree::new(640, 480, 24);
        let root = tree.root();
        let win = mapped(&mut tree, root, 0, 0, 10, 10, 0);
        tree.get_mut(win).unwrap().bit_gravity = BitGravity::NorthWest;
        let outcome = tree.resize_window(win, 0, 0, 20, 10);
        let copy = outcome.copy.unwrap();
        assert_eq!(copy.old_origin, Point::new(0, 0));
        let (exposed_id, exposed) = &outcome.exposed[0];
        assert_eq!(*exposed_id, win);
        assert_eq!(exposed.extents(), Rect::new(10, 0, 20, 10));
    }

    #[test]
    fn test_resize_forget_gravity_exposes_everything() {
        let mut tree = DrawableTree::new(640, 480, 24);
        let root = tree.root();
        let win = mapped(&mut tree, root, 0, 0, 10, 10, 0);
        let outcome = tree.resize_window(win, 0, 0, 12, 12);
        assert!(outcome.copy.is_none());
        assert_eq!(outcome.exposed[0].1.area(), 144);
    }

    #[test]
    fn test_unrealize_clears_clips() {
        let mut tree = DrawableTree::new(640, 480, 24);
        let root = tree.root();
        let win = mapped(&mut tree, root, 0, 0, 10, 10, 0);
        assert_eq!(tree.set_realized(win, false), vec![win]);
        tree.recompute_clips();
        assert!(tree.get(win).unwrap().border_clip.is_empty());
    }

    #[test]
    fn test_reparent_moves_subtree() {
        let mut tree = DrawableTree::new(640, 480, 24);
        let root = tree.root();
        let a = mapped(&mut tree, root, 100, 100, 50, 50, 0);
        let b = mapped(&mut tree, root, 0, 0, 10, 10, 0);
        assert!(tree.reparent(b, a, 5, 5));
        assert_eq!(tree.parent(b), Some(a));
        assert_eq!((tree.get(b).unwrap().x, tree.get(b).unwrap().y), (105, 105));
        assert!(!tree.reparent(a, b, 0, 0), "cannot reparent under a descendant");
    }

    #[test]
    fn test_shape_limits_border_clip() {
        let mut tree = DrawableTree::new(640, 480, 24);
        let root = tree.root();
        let win = tree.create_window(root, 0, 0, 10, 10, 0, WindowClass::InputOutput).unwrap();
        tree.get_mut(win).unwrap().bounding_shape = Some(Region::from_rect(Rect::new(0, 0, 5, 5)));
        tree.get_mut(win).unwrap().mapped = true;
        tree.set_realized(win, true);
        tree.recompute_clips();
        assert_eq!(tree.get(win).unwrap().border_clip.area(), 25);
    }
}
