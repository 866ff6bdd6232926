//! Pattern sessions.
//!
//! A session owns one compiled engine handle and at most one foreign text
//! buffer. The engine mutates the handle on every call, so every operation
//! that touches the handle or the buffer runs under the session's mutex.
//! Independent sessions share nothing and run in parallel.

use std::fmt;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::buffer::{Text, TextBuffer};
use crate::engine::{Engine, FancyEngine};
use crate::error::{Error, Result};
use crate::iter::Matches;
use crate::matched::{Capture, Match, Span};
use crate::options::Options;
use crate::subst::{self, SubstCache};

/// A compiled pattern plus the engine state that goes with it.
///
/// Dropping a session disposes it. Match results keep the underlying state
/// alive, but any call that needs the engine after disposal fails with
/// [`Error::Disposed`].
pub struct Session<E: Engine = FancyEngine> {
    shared: Arc<Shared<E>>,
}

pub(crate) struct Shared<E: Engine> {
    pub(crate) pattern: String,
    pub(crate) options: String,
    state: Mutex<State<E>>,
}

pub(crate) struct State<E: Engine> {
    pub(crate) engine: E,
    pub(crate) handle: Option<E::Handle>,
    pub(crate) buffer: TextBuffer,
    pub(crate) subst: SubstCache,
    disposed: bool,
}

impl<E: Engine> State<E> {
    /// Free the buffer and the handle. Safe to call more than once.
    fn release(&mut self) {
        self.buffer.free();
        if let Some(handle) = self.handle.take() {
            self.engine.free(handle);
        }
    }

    /// Fail with `Disposed` once the session has been released.
    pub(crate) fn check_live(&self) -> Result<()> {
        if self.disposed {
            return Err(Error::Disposed);
        }
        Ok(())
    }

    /// Make the buffer hold `text` and resolve `[start, start+len)` (the
    /// rest of the text when `len` is `None`) against it.
    pub(crate) fn bind(&mut self, text: &Text, start: usize, len: Option<usize>) -> Result<Range<usize>> {
        // Bind first: the buffer length is the char count, and a rejected
        // range leaves the text cached just like an accepted one.
        self.buffer.ensure(text);
        let limit = self.buffer.len();
        if start > limit {
            return Err(Error::Range {
                param: "start",
                value: start,
                limit,
            });
        }
        let len = len.unwrap_or(limit - start);
        match start.checked_add(len) {
            Some(end) if end <= limit => Ok(start..end),
            _ => Err(Error::Range {
                param: "length",
                value: len,
                limit,
            }),
        }
    }

    /// Snapshot the captures of the handle's last result as logical offsets.
    pub(crate) fn captures(&self) -> Option<Vec<Capture>> {
        let handle = self.handle.as_ref()?;
        let region = self.engine.region(handle);
        if region.starts.first().is_none_or(|p| p.is_null()) {
            return None;
        }
        let captures = region
            .starts
            .iter()
            .zip(&region.ends)
            .enumerate()
            .map(|(index, (&start, &end))| {
                let span = (!start.is_null()).then(|| {
                    let start = self.buffer.offset_of(start);
                    Span {
                        start,
                        len: self.buffer.offset_of(end) - start,
                    }
                });
                Capture { index, span }
            })
            .collect();
        Some(captures)
    }
}

impl<E: Engine> Shared<E> {
    pub(crate) fn lock(&self) -> MutexGuard<'_, State<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Search `text` from `start` over `len` characters (to the end when
    /// `None`), reusing the compiled pattern.
    pub(crate) fn search(
        self: &Arc<Self>,
        text: &Text,
        start: usize,
        len: Option<usize>,
    ) -> Result<Option<Match<E>>> {
        let mut guard = self.lock();
        let st = &mut *guard;
        st.check_live()?;
        let bounds = st.bind(text, start, len)?;

        let mut msg = String::new();
        let status = st.engine.compile_and_match(
            None,
            None,
            st.buffer.range(bounds.start, bounds.end),
            false,
            &mut st.handle,
            &mut msg,
        );
        if status < 0 {
            return Err(Error::compile(msg));
        }
        if status == 0 {
            return Ok(None);
        }
        let captures = st
            .captures()
            .ok_or_else(|| Error::compile("engine reported a match without a span"))?;
        Ok(Some(Match::new(
            captures,
            Arc::clone(self),
            Arc::clone(text),
            bounds,
        )))
    }

    fn dispose(&self) {
        let mut state = self.lock();
        if state.disposed {
            return;
        }
        state.release();
        state.disposed = true;
        debug!(pattern = %self.pattern, "session disposed");
    }
}

impl<E: Engine> Drop for Shared<E> {
    fn drop(&mut self) {
        // Secondary release path; a no-op after an explicit dispose.
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.release();
    }
}

impl Session<FancyEngine> {
    /// Compile `pattern` with the option letter code `options` using the
    /// bundled engine.
    pub fn new(pattern: &str, options: &str) -> Result<Self> {
        Self::with_engine(FancyEngine::new(), pattern, options)
    }

    /// Like [`Session::new`] with typed options.
    pub fn with_options(pattern: &str, options: Options) -> Result<Self> {
        Self::new(pattern, &options.to_string())
    }
}

impl<E: Engine> Session<E> {
    /// Compile `pattern` on `engine`. The pattern is validated by one
    /// compile-only call over an empty text; the buffer used for that call
    /// is released whether or not compilation succeeds.
    pub fn with_engine(engine: E, pattern: &str, options: &str) -> Result<Self> {
        let mut state = State {
            engine,
            handle: None,
            buffer: TextBuffer::new(),
            subst: SubstCache::new(options),
            disposed: false,
        };

        let empty = Text::from("");
        state.buffer.ensure(&empty);
        let mut msg = String::new();
        let status = state.engine.compile_and_match(
            Some(pattern),
            Some(options),
            state.buffer.range(0, 0),
            true,
            &mut state.handle,
            &mut msg,
        );
        state.buffer.free();
        if status < 0 {
            state.release();
            debug!(pattern, options, error = %msg, "pattern rejected");
            return Err(Error::compile(msg));
        }

        Ok(Self {
            shared: Arc::new(Shared {
                pattern: pattern.to_string(),
                options: options.to_string(),
                state: Mutex::new(state),
            }),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.shared.pattern
    }

    pub fn options(&self) -> &str {
        &self.shared.options
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    /// First match in `text`.
    pub fn find(&self, text: &Text) -> Result<Option<Match<E>>> {
        self.shared.search(text, 0, None)
    }

    /// First match in `text` at or after character `start`.
    pub fn find_at(&self, text: &Text, start: usize) -> Result<Option<Match<E>>> {
        self.shared.search(text, start, None)
    }

    /// First match inside the `len` characters starting at `start`.
    pub fn find_in(&self, text: &Text, start: usize, len: usize) -> Result<Option<Match<E>>> {
        self.shared.search(text, start, Some(len))
    }

    /// Successive matches in `text`.
    pub fn find_iter(&self, text: &Text) -> Matches<E> {
        self.find_iter_at(text, 0)
    }

    /// Successive matches in `text` starting at character `start`.
    pub fn find_iter_at(&self, text: &Text, start: usize) -> Matches<E> {
        Matches::new(Arc::clone(&self.shared), Arc::clone(text), start)
    }

    pub fn is_match(&self, text: &Text) -> Result<bool> {
        self.is_match_at(text, 0)
    }

    pub fn is_match_at(&self, text: &Text, start: usize) -> Result<bool> {
        Ok(self.find_at(text, start)?.is_some())
    }

    /// Replace occurrences of the pattern in `text` with `template`: every
    /// occurrence when the session options contain `g`, else the first.
    pub fn replace(&self, text: &Text, template: &str) -> Result<String> {
        self.replace_from(text, template, 0)
    }

    /// Like [`Session::replace`], leaving the text before `start` untouched.
    pub fn replace_from(&self, text: &Text, template: &str, start: usize) -> Result<String> {
        subst::replace_range(&self.shared, text, template, &self.shared.options, start, None)
    }

    /// Release the compiled handle and the text buffer. Idempotent; every
    /// later call on this session or its matches fails with `Disposed`.
    pub fn dispose(&self) {
        self.shared.dispose();
    }
}

impl<E: Engine> Drop for Session<E> {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}

impl<E: Engine> fmt::Display for Session<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.shared.pattern)
    }
}

impl<E: Engine> fmt::Debug for Session<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("pattern", &self.shared.pattern)
            .field("options", &self.shared.options)
            .finish()
    }
}
