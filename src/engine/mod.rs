//! The narrow call surface of the matching engine.
//!
//! A session talks to its engine through three calls only: compile+match,
//! compile+substitute, and free. The engine keeps a compiled pattern, the
//! last compiled substitution template and the result of the most recent
//! call in an opaque handle; passing `None` for the pattern (or template)
//! means "reuse what the handle already holds".
//!
//! Positions cross this boundary as native pointers into the session's
//! foreign text buffer. Status values follow the usual convention:
//! `> 0` matched, `0` no match, `< 0` error with a message written to the
//! caller's message buffer.

pub mod fancy;
pub mod template;

use crate::buffer::{ForeignRange, Wide};

pub use fancy::FancyEngine;

/// Return value of an engine call.
pub type Status = i32;

/// Size of the engine's error message buffer, terminator included.
pub const MESSAGE_CAPACITY: usize = 80;

/// Result record an engine exposes through its handle after a successful
/// call.
///
/// `starts[i]`/`ends[i]` delimit group `i` (group 0 is the whole match) as
/// pointers into the text buffer the call was made with; a null start marks
/// a group that did not participate. After a substitution, `out_start` and
/// `out_end` delimit the rebuilt text of the searched range inside
/// engine-owned memory; both are null when that text is empty.
#[derive(Debug, Clone)]
pub struct RawRegion {
    pub starts: Vec<*const Wide>,
    pub ends: Vec<*const Wide>,
    pub out_start: *const Wide,
    pub out_end: *const Wide,
}

// SAFETY: the pointers are plain addresses into buffers owned by the
// session (text) or the handle (output). They are only dereferenced while
// the owning session's lock is held.
unsafe impl Send for RawRegion {}

impl RawRegion {
    pub fn new() -> Self {
        Self {
            starts: Vec::new(),
            ends: Vec::new(),
            out_start: std::ptr::null(),
            out_end: std::ptr::null(),
        }
    }

    /// Number of parenthesized groups (group 0 excluded).
    pub fn nparens(&self) -> usize {
        self.starts.len().saturating_sub(1)
    }

    pub fn clear(&mut self) {
        self.starts.clear();
        self.ends.clear();
        self.out_start = std::ptr::null();
        self.out_end = std::ptr::null();
    }
}

impl Default for RawRegion {
    fn default() -> Self {
        Self::new()
    }
}

/// A matching engine reachable through the three-call surface.
pub trait Engine: Send {
    /// Opaque compiled pattern plus its most recent result state.
    type Handle: Send;

    /// Compile `pattern` with `options` (when `pattern` is `Some`) into
    /// `handle`, then search `text` unless `one_shot` asks for compilation
    /// only. `options` is only read together with a pattern.
    fn compile_and_match(
        &self,
        pattern: Option<&str>,
        options: Option<&str>,
        text: ForeignRange<'_>,
        one_shot: bool,
        handle: &mut Option<Self::Handle>,
        msg: &mut String,
    ) -> Status;

    /// Compile whichever of `pattern`/`template` are given (reusing the
    /// handle's compiled ones otherwise) and substitute over `text`. A
    /// positive status is the number of occurrences replaced.
    fn compile_and_substitute(
        &self,
        pattern: Option<&str>,
        template: Option<&str>,
        options: Option<&str>,
        text: ForeignRange<'_>,
        handle: &mut Option<Self::Handle>,
        msg: &mut String,
    ) -> Status;

    /// Result record of the last successful call on `handle`.
    fn region<'h>(&self, handle: &'h Self::Handle) -> &'h RawRegion;

    /// Release engine-side resources of a handle.
    fn free(&self, handle: Self::Handle);
}

/// Write `text` into an engine message buffer, truncated to what fits.
pub(crate) fn write_message(msg: &mut String, text: &str) {
    msg.clear();
    msg.extend(text.chars().take(MESSAGE_CAPACITY - 1));
}
