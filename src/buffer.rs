//! Foreign copy of the search text.
//!
//! The engine reads text as fixed-width units (one `u32` per `char`) at a
//! stable address. A `TextBuffer` holds that copy for one logical text and
//! is reused for as long as callers keep passing the *same* text object.
//! Identity is pointer identity of the `Arc<str>`, not content: an equal
//! but distinct string causes a fresh copy. The buffer keeps its `Arc`
//! alive, so the address it is keyed on cannot be recycled by the
//! allocator while it is cached.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

/// Logical text handed to a session.
pub type Text = Arc<str>;

/// One fixed-width character unit as the engine reads it.
pub type Wide = u32;

/// Width of one unit in bytes.
pub const WIDE: usize = std::mem::size_of::<Wide>();

/// Source of allocation generations; unique for the life of the process.
static GENERATION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
pub(crate) struct TextBuffer {
    source: Option<Text>,
    /// Units of `source` followed by one NUL unit.
    units: Option<Box<[Wide]>>,
    /// Bumped on every allocation so engines can key derived data on it.
    generation: u64,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure the held copy was built from `text`. Returns true when a
    /// new copy had to be allocated.
    pub fn ensure(&mut self, text: &Text) -> bool {
        if let Some(source) = &self.source {
            if Arc::ptr_eq(source, text) {
                return false;
            }
        }
        self.free();
        let units: Box<[Wide]> = text
            .chars()
            .map(|c| c as Wide)
            .chain(std::iter::once(0))
            .collect();
        trace!(units = units.len() - 1, "allocated text buffer");
        #[cfg(test)]
        live::inc();
        self.units = Some(units);
        self.source = Some(Arc::clone(text));
        self.generation = GENERATION.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Release the held copy. Safe to call when nothing is held.
    pub fn free(&mut self) {
        if let Some(units) = self.units.take() {
            trace!(units = units.len() - 1, "freed text buffer");
            #[cfg(test)]
            live::dec();
        }
        self.source = None;
        self.generation = 0;
    }

    #[cfg(test)]
    pub fn is_allocated(&self) -> bool {
        self.units.is_some()
    }

    /// Number of characters in the held text (the NUL terminator excluded).
    pub fn len(&self) -> usize {
        self.units.as_ref().map_or(0, |u| u.len() - 1)
    }

    /// Address of the first unit, or null when nothing is held.
    pub fn base(&self) -> *const Wide {
        self.units
            .as_ref()
            .map_or(std::ptr::null(), |u| u.as_ptr())
    }

    /// A view of `[start, end)` for one engine call. Callers check bounds
    /// against `len()` first.
    pub fn range(&self, start: usize, end: usize) -> ForeignRange<'_> {
        let units = match &self.units {
            Some(u) => &u[..u.len() - 1],
            None => &[],
        };
        debug_assert!(start <= end && end <= units.len());
        ForeignRange {
            units,
            start,
            end,
            generation: self.generation,
        }
    }

    /// Convert a native position inside the buffer back to a logical offset.
    pub fn offset_of(&self, p: *const Wide) -> usize {
        (p as usize - self.base() as usize) / WIDE
    }
}

/// Borrowed view of the foreign buffer passed across the engine binding:
/// the whole text plus the `[start, end)` range to search.
#[derive(Debug, Clone, Copy)]
pub struct ForeignRange<'a> {
    units: &'a [Wide],
    start: usize,
    end: usize,
    generation: u64,
}

impl<'a> ForeignRange<'a> {
    /// Start of the text.
    pub fn base(&self) -> *const Wide {
        self.units.as_ptr()
    }

    /// First unit of the range.
    pub fn start_ptr(&self) -> *const Wide {
        self.units[self.start..].as_ptr()
    }

    /// One past the last unit of the range.
    pub fn end_ptr(&self) -> *const Wide {
        self.units[self.end..].as_ptr()
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// The whole held text, NUL terminator excluded.
    pub fn units(&self) -> &'a [Wide] {
        self.units
    }

    /// Allocation generation of the buffer this view was taken from. Two
    /// views with the same generation see the same units; 0 means nothing
    /// was ever allocated.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Text visible to the engine: from the base up to the range end.
    /// Look-behind may inspect units before `start`.
    pub fn haystack(&self) -> &'a [Wide] {
        &self.units[..self.end]
    }

    /// Native position of the unit at `index`.
    pub fn ptr_at(&self, index: usize) -> *const Wide {
        self.units[index..].as_ptr()
    }
}

/// Decode engine units back to a string. Returns `None` when a unit is not
/// a valid scalar value.
pub(crate) fn decode(units: &[Wide]) -> Option<String> {
    units.iter().map(|&u| char::from_u32(u)).collect()
}

/// Byte offset of the `index`th char of `text`, or `text.len()` past the end.
pub(crate) fn byte_offset(text: &str, index: usize) -> usize {
    if text.is_ascii() {
        return index.min(text.len());
    }
    text.char_indices()
        .nth(index)
        .map_or(text.len(), |(offset, _)| offset)
}

/// Slice `text` by logical (char) offsets.
pub(crate) fn slice_chars(text: &str, start: usize, len: usize) -> &str {
    let from = byte_offset(text, start);
    let to = from + byte_offset(&text[from..], len);
    &text[from..to]
}
