//! Pixel buffers and pixmap headers
//!
//! A [`PixmapHeader`] is a view onto a shared [`PixelBuffer`]: stride, pixel
//! size, addressable extent and the screen coordinate that maps onto the
//! first addressable pixel. Re-basing a view is a value operation
//! ([`PixmapHeader::translated`]); no raw pointer arithmetic leaves this file.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::shared::{Point, Rect};

/// Shared, lockable pixel storage
#[derive(Clone)]
pub struct PixelBuffer(Arc<Mutex<Vec<u8>>>);

impl PixelBuffer {
    pub fn zeroed(len: usize) -> Self {
        Self(Arc::new(Mutex::new(vec![0; len])))
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(Arc::new(Mutex::new(bytes)))
    }

    fn guard(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when both handles refer to the same storage
    pub fn ptr_eq(&self, other: &PixelBuffer) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Copy of the first `len` bytes
    pub fn snapshot(&self, len: usize) -> Vec<u8> {
        let bytes = self.guard();
        bytes[..len.min(bytes.len())].to_vec()
    }

    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.guard())
    }

    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.guard())
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PixelBuffer({} bytes)", self.len())
    }
}

/// View of a pixel buffer positioned in screen coordinates
#[derive(Debug, Clone)]
pub struct PixmapHeader {
    buffer: PixelBuffer,
    stride: usize,
    bytes_per_pixel: usize,
    width: u32,
    height: u32,
    origin: Point,
}

impl PixmapHeader {
    /// Wrap `buffer` with its first pixel at coordinate (0, 0)
    pub fn new(buffer: PixelBuffer, stride: usize, bytes_per_pixel: usize, width: u32, height: u32) -> Self {
        Self {
            buffer,
            stride,
            bytes_per_pixel,
            width,
            height,
            origin: Point::default(),
        }
    }

    /// Freshly allocated, zero-filled pixmap
    pub fn allocate(width: u32, height: u32, bytes_per_pixel: usize) -> Self {
        let stride = padded_stride(width, bytes_per_pixel);
        let buffer = PixelBuffer::zeroed(stride * height as usize);
        Self::new(buffer, stride, bytes_per_pixel, width, height)
    }

    /// Same view with the first pixel mapped to `origin`
    pub fn at(mut self, origin: Point) -> Self {
        self.origin = origin;
        self
    }

    /// Shift the buffer base by (`dx`, `dy`) pixels.
    ///
    /// Coordinate `c` in the returned view addresses what `c + (dx, dy)`
    /// addressed before, so the origin moves by `-(dx, dy)`.
    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        let mut out = self.clone();
        out.origin = Point::new(self.origin.x - dx, self.origin.y - dy);
        out
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.bytes_per_pixel
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Addressable area in screen coordinates
    pub fn bounds(&self) -> Rect {
        Rect::from_xywh(self.origin.x, self.origin.y, self.width, self.height)
    }

    fn offset_of(&self, x: i32, y: i32) -> Option<usize> {
        if !self.bounds().contains(x, y) {
            return None;
        }
        let px = (x - self.origin.x) as usize;
        let py = (y - self.origin.y) as usize;
        Some(py * self.stride + px * self.bytes_per_pixel)
    }

    pub fn read_pixel(&self, x: i32, y: i32) -> Option<u32> {
        let offset = self.offset_of(x, y)?;
        let bpp = self.bytes_per_pixel;
        self.buffer.with_bytes(|bytes| {
            let src = bytes.get(offset..offset + bpp)?;
            let mut raw = [0u8; 4];
            raw[..bpp].copy_from_slice(src);
            Some(u32::from_ne_bytes(raw))
        })
    }

    pub fn write_pixel(&self, x: i32, y: i32, pixel: u32) {
        self.fill_rect(&Rect::new(x, y, x + 1, y + 1), pixel);
    }

    /// Fill the part of `rect` that lies inside the view
    pub fn fill_rect(&self, rect: &Rect, pixel: u32) {
        let Some(clip) = rect.intersect(&self.bounds()) else {
            return;
        };
        let bpp = self.bytes_per_pixel;
        let span = clip.width() as usize;
        let row: Vec<u8> = if bpp == 4 {
            bytemuck::cast_slice(&vec![pixel; span]).to_vec()
        } else {
            let raw = pixel.to_ne_bytes();
            raw[..bpp].iter().copied().cycle().take(span * bpp).collect()
        };

        self.buffer.with_bytes_mut(|bytes| {
            for y in clip.y1..clip.y2 {
                let Some(start) = self.offset_of(clip.x1, y) else { continue };
                if let Some(dst) = bytes.get_mut(start..start + row.len()) {
                    dst.copy_from_slice(&row);
                }
            }
        });
    }

    /// Tightly packed copy of the part of `rect` inside the view
    pub fn read_rect(&self, rect: &Rect) -> Vec<u8> {
        let Some(clip) = rect.intersect(&self.bounds()) else {
            return Vec::new();
        };
        let span = clip.width() as usize * self.bytes_per_pixel;
        let mut out = Vec::with_capacity(span * clip.height() as usize);
        self.buffer.with_bytes(|bytes| {
            for y in clip.y1..clip.y2 {
                if let Some(start) = self.offset_of(clip.x1, y) {
                    out.extend_from_slice(&bytes[start..start + span]);
                }
            }
        });
        out
    }
}

/// Row stride rounded up to 16 bytes
pub fn padded_stride(width: u32, bytes_per_pixel: usize) -> usize {
    (width as usize * bytes_per_pixel).div_ceil(16) * 16
}

/// Copy pixels into `dst` over `rect` (destination coordinates).
///
/// Destination pixel `(x, y)` takes the source pixel at `(x + dx, y + dy)`.
/// Pixels outside either view are skipped. Views sharing one buffer may
/// overlap.
pub fn copy_area(src: &PixmapHeader, dst: &PixmapHeader, rect: &Rect, dx: i32, dy: i32) {
    if src.bytes_per_pixel != dst.bytes_per_pixel {
        return;
    }
    let Some(clip) = rect
        .intersect(&dst.bounds())
        .and_then(|r| r.intersect(&src.bounds().translate(-dx, -dy)))
    else {
        return;
    };
    let span = clip.width() as usize * dst.bytes_per_pixel;
    let rows: Vec<(usize, usize)> = (clip.y1..clip.y2)
        .filter_map(|y| Some((src.offset_of(clip.x1 + dx, y + dy)?, dst.offset_of(clip.x1, y)?)))
        .collect();

    if src.buffer.ptr_eq(&dst.buffer) {
        dst.buffer.with_bytes_mut(|bytes| {
            // Source rows above their destination are copied bottom-up
            let ordered: Box<dyn Iterator<Item = &(usize, usize)>> = if dy < 0 {
                Box::new(rows.iter().rev())
            } else {
                Box::new(rows.iter())
            };
            for &(from, to) in ordered {
                bytes.copy_within(from..from + span, to);
            }
        });
    } else {
        let staged: Vec<Vec<u8>> = src
            .buffer
            .with_bytes(|bytes| rows.iter().map(|&(from, _)| bytes[from..from + span].to_vec()).collect());
        dst.buffer.with_bytes_mut(|bytes| {
            for (row, &(_, to)) in staged.iter().zip(&rows) {
                bytes[to..to + span].copy_from_slice(row);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translated_shifts_origin() {
        let pix = PixmapHeader::allocate(4, 4, 4).at(Point::new(10, 10));
        pix.write_pixel(11, 12, 0xdead);
        let moved = pix.translated(1, 2);
        assert_eq!(moved.origin(), Point::new(9, 8));
        assert_eq!(moved.read_pixel(10, 10), Some(0xdead));
    }

    #[test]
    fn test_fill_rect_clips_to_bounds() {
        let pix = PixmapHeader::allocate(4, 4, 2);
        pix.fill_rect(&Rect::new(-5, -5, 2, 2), 0x1234);
        assert_eq!(pix.read_pixel(0, 0), Some(0x1234));
        assert_eq!(pix.read_pixel(1, 1), Some(0x1234));
        assert_eq!(pix.read_pixel(2, 2), Some(0));
        assert_eq!(pix.read_pixel(4, 4), None);
    }

    #[test]
    fn test_copy_area_overlapping_same_buffer() {
        let pix = PixmapHeader::allocate(4, 4, 4);
        for y in 0..4 {
            pix.fill_rect(&Rect::new(0, y, 4, y + 1), y as u32 + 1);
        }
        // Scroll down by one row
        copy_area(&pix, &pix, &Rect::new(0, 1, 4, 4), 0, -1);
        let col: Vec<u32> = (0..4).filter_map(|y| pix.read_pixel(0, y)).collect();
        assert_eq!(col, vec![1, 1, 2, 3]);
    }

    #[test]
    fn test_copy_area_between_buffers() {
        let src = PixmapHeader::allocate(2, 2, 4).at(Point::new(5, 5));
        src.fill_rect(&src.bounds(), 7);
        let dst = PixmapHeader::allocate(8, 8, 4);
        copy_area(&src, &dst, &Rect::new(0, 0, 8, 8), 5, 5);
        assert_eq!(dst.read_pixel(0, 0), Some(7));
        assert_eq!(dst.read_pixel(1, 1), Some(7));
        assert_eq!(dst.read_pixel(2, 2), Some(0));
    }
}
