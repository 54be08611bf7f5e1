//! Rectangle-list regions
//!
//! A [`Region`] is a set of non-overlapping rectangles. It carries damage,
//! clip lists and copy areas between the protocol model, the rootless core
//! and the native host.

use super::geometry::Rect;

/// How a rectangle relates to a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlap {
    /// Rectangle lies entirely inside the region
    In,
    /// Rectangle and region do not intersect
    Out,
    Partial,
}

/// Set of disjoint rectangles
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    rects: Vec<Rect>,
}

/// Pieces of `a` not covered by `b` (at most four)
fn rect_minus(a: &Rect, b: &Rect) -> Vec<Rect> {
    let Some(i) = a.intersect(b) else {
        return vec![*a];
    };
    let mut out = Vec::with_capacity(4);
    if a.y1 < i.y1 {
        out.push(Rect::new(a.x1, a.y1, a.x2, i.y1));
    }
    if i.y2 < a.y2 {
        out.push(Rect::new(a.x1, i.y2, a.x2, a.y2));
    }
    if a.x1 < i.x1 {
        out.push(Rect::new(a.x1, i.y1, i.x1, i.y2));
    }
    if i.x2 < a.x2 {
        out.push(Rect::new(i.x2, i.y1, a.x2, i.y2));
    }
    out
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: Rect) -> Self {
        if rect.is_empty() {
            Self::new()
        } else {
            Self { rects: vec![rect] }
        }
    }

    /// Build a region from possibly overlapping rectangles
    pub fn from_rects(rects: &[Rect]) -> Self {
        let mut region = Self::new();
        for r in rects {
            region.union_rect(*r);
        }
        region
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn num_rects(&self) -> usize {
        self.rects.len()
    }

    /// Bounding box of the region
    pub fn extents(&self) -> Rect {
        let mut iter = self.rects.iter();
        let Some(first) = iter.next() else {
            return Rect::default();
        };
        iter.fold(*first, |acc, r| Rect {
            x1: acc.x1.min(r.x1),
            y1: acc.y1.min(r.y1),
            x2: acc.x2.max(r.x2),
            y2: acc.y2.max(r.y2),
        })
    }

    pub fn area(&self) -> i64 {
        self.rects.iter().map(Rect::area).sum()
    }

    pub fn union_rect(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        let mut pieces = vec![rect];
        for existing in &self.rects {
            pieces = pieces.iter().flat_map(|p| rect_minus(p, existing)).collect();
            if pieces.is_empty() {
                return;
            }
        }
        self.rects.extend(pieces);
    }

    pub fn union(&mut self, other: &Region) {
        for r in &other.rects {
            self.union_rect(*r);
        }
    }

    pub fn intersect_rect(&self, rect: &Rect) -> Region {
        Region {
            rects: self.rects.iter().filter_map(|r| r.intersect(rect)).collect(),
        }
    }

    pub fn intersect(&self, other: &Region) -> Region {
        let mut rects = Vec::new();
        for a in &self.rects {
            for b in &other.rects {
                if let Some(i) = a.intersect(b) {
                    rects.push(i);
                }
            }
        }
        Region { rects }
    }

    pub fn subtract_rect(&self, rect: &Rect) -> Region {
        Region {
            rects: self.rects.iter().flat_map(|r| rect_minus(r, rect)).collect(),
        }
    }

    pub fn subtract(&self, other: &Region) -> Region {
        other
            .rects
            .iter()
            .fold(self.clone(), |acc, r| acc.subtract_rect(r))
    }

    pub fn translate(&mut self, dx: i32, dy: i32) {
        for r in &mut self.rects {
            *r = r.translate(dx, dy);
        }
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Region {
        let mut out = self.clone();
        out.translate(dx, dy);
        out
    }

    /// Classify `rect` against the region
    pub fn contains_rect(&self, rect: &Rect) -> Overlap {
        let covered = self.intersect_rect(rect).area();
        if covered == 0 {
            Overlap::Out
        } else if covered == rect.area() {
            Overlap::In
        } else {
            Overlap::Partial
        }
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        self.rects.iter().any(|r| r.contains(x, y))
    }
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Region::from_rect(rect)
    }
}
