//! Colormaps
//!
//! Indexed palettes as the protocol layer stores them, and their resolution
//! to direct ARGB for the native host.

/// Visual class of a colormap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualClass {
    StaticGray,
    GrayScale,
    StaticColor,
    PseudoColor,
    TrueColor,
    DirectColor,
}

/// One palette cell, 16 bits per channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColormapEntry {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
    /// Number of clients holding the cell; zero means unallocated
    pub refcnt: u32,
}

#[derive(Debug, Clone)]
pub struct Colormap {
    pub id: u32,
    pub class: VisualClass,
    entries: Vec<ColormapEntry>,
}

impl Colormap {
    pub fn new(id: u32, class: VisualClass, size: usize) -> Self {
        Self {
            id,
            class,
            entries: vec![ColormapEntry::default(); size],
        }
    }

    pub fn entries(&self) -> &[ColormapEntry] {
        &self.entries
    }

    /// Allocate (or overwrite) cell `index`. Returns false when out of range.
    pub fn store_color(&mut self, index: usize, red: u16, green: u16, blue: u16) -> bool {
        let Some(entry) = self.entries.get_mut(index) else {
            return false;
        };
        entry.red = red;
        entry.green = green;
        entry.blue = blue;
        entry.refcnt = entry.refcnt.max(1);
        true
    }

    pub fn free_color(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.refcnt = entry.refcnt.saturating_sub(1);
        }
    }

    /// Resolve cells `first..first + colors.len()` into `colors`.
    ///
    /// Only PseudoColor maps resolve. Unallocated cells leave their slot
    /// untouched.
    pub fn resolve(&self, first: u32, colors: &mut [u32]) -> bool {
        if self.class != VisualClass::PseudoColor {
            return false;
        }
        let first = first as usize;
        let last = self.entries.len().min(first + colors.len());
        for i in first..last {
            let ent = &self.entries[i];
            if ent.refcnt == 0 {
                continue;
            }
            colors[i - first] = 0xFF00_0000
                | (ent.red as u32 & 0xff00) << 8
                | (ent.green as u32 & 0xff00)
                | (ent.blue as u32 >> 8);
        }
        true
    }
}
