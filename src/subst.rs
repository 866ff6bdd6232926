//! Substitution over a session.
//!
//! Two modes share one engine call: rebuilding the whole text
//! ([`replace_range`]) and extracting the patched span of a single,
//! previously found occurrence ([`patch`]). The session remembers the
//! options and template of the last substitution so that a template issued
//! repeatedly (typically once per match in a loop) is compiled once.

use std::sync::Arc;

use tracing::trace;

use crate::buffer::{Text, WIDE, Wide, byte_offset, decode, slice_chars};
use crate::engine::{Engine, RawRegion};
use crate::error::{Error, Result};
use crate::matched::Match;
use crate::options::without_global;
use crate::session::{Shared, State};

/// Options and template of the last substitution the engine accepted.
#[derive(Debug)]
pub(crate) struct SubstCache {
    /// `None` when the handle's compiled options are unknown, which forces
    /// a full recompile on the next call.
    prev_options: Option<String>,
    prev_template: Option<String>,
}

/// What to hand the engine for one substitution.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Plan<'a> {
    pub recompile: bool,
    pub options: Option<&'a str>,
    pub template: Option<&'a str>,
}

impl SubstCache {
    /// The handle starts out compiled with the session options.
    pub fn new(options: &str) -> Self {
        Self {
            prev_options: Some(options.to_string()),
            prev_template: None,
        }
    }

    pub fn plan<'a>(&self, options: &'a str, template: &'a str) -> Plan<'a> {
        if self.prev_options.as_deref() == Some(options) {
            let template = (self.prev_template.as_deref() != Some(template)).then_some(template);
            Plan {
                recompile: false,
                options: None,
                template,
            }
        } else {
            Plan {
                recompile: true,
                options: Some(options),
                template: Some(template),
            }
        }
    }

    pub fn commit(&mut self, options: &str, template: &str) {
        if self.prev_options.as_deref() != Some(options) {
            self.prev_options = Some(options.to_string());
        }
        if self.prev_template.as_deref() != Some(template) {
            self.prev_template = Some(template.to_string());
        }
    }

    /// Forget everything after a failed call; the engine may have replaced
    /// part of its compiled state before failing.
    pub fn invalidate(&mut self) {
        self.prev_options = None;
        self.prev_template = None;
    }
}

/// Rebuilt output of the last substitution, borrowed from the handle.
fn output(region: &RawRegion) -> &[Wide] {
    if region.out_start.is_null() {
        return &[];
    }
    let len = (region.out_end as usize - region.out_start as usize) / WIDE;
    // SAFETY: a non-null output range points into memory owned by the
    // handle the region was borrowed from, and stays valid while that
    // borrow lives.
    unsafe { std::slice::from_raw_parts(region.out_start, len) }
}

fn decode_output(units: &[Wide]) -> Result<String> {
    decode(units).ok_or_else(|| Error::compile("engine produced an invalid character"))
}

/// One compile+substitute call over `[start, start+len)` of `text` with the
/// given options, going through the compile cache. Returns the status.
fn run<E: Engine>(
    shared: &Shared<E>,
    st: &mut State<E>,
    options: &str,
    template: &str,
    bounds: std::ops::Range<usize>,
) -> Result<i32> {
    let plan = st.subst.plan(options, template);
    trace!(
        recompile = plan.recompile,
        new_template = plan.template.is_some(),
        "substitution plan"
    );
    let mut msg = String::new();
    let status = st.engine.compile_and_substitute(
        plan.recompile.then_some(shared.pattern.as_str()),
        plan.template,
        plan.options,
        st.buffer.range(bounds.start, bounds.end),
        &mut st.handle,
        &mut msg,
    );
    if status < 0 {
        st.subst.invalidate();
        return Err(Error::compile(msg));
    }
    st.subst.commit(options, template);
    Ok(status)
}

/// Replace within `[start, start+len)` of `text` (to the end when `len` is
/// `None`) and return the whole text: untouched prefix, rebuilt range,
/// untouched suffix. Returns the text unchanged when nothing matched.
pub(crate) fn replace_range<E: Engine>(
    shared: &Arc<Shared<E>>,
    text: &Text,
    template: &str,
    options: &str,
    start: usize,
    len: Option<usize>,
) -> Result<String> {
    let mut guard = shared.lock();
    let st = &mut *guard;
    st.check_live()?;
    let bounds = st.bind(text, start, len)?;

    let status = run(shared, st, options, template, bounds.clone())?;
    if status == 0 {
        return Ok(text.to_string());
    }
    let Some(handle) = st.handle.as_ref() else {
        return Err(Error::compile("no compiled pattern"));
    };
    let rebuilt = decode_output(output(st.engine.region(handle)))?;

    let suffix = &text[byte_offset(text, bounds.end)..];
    let prefix = slice_chars(text, 0, bounds.start);
    let mut result = String::with_capacity(prefix.len() + rebuilt.len() + suffix.len());
    result.push_str(prefix);
    result.push_str(&rebuilt);
    result.push_str(suffix);
    Ok(result)
}

/// Replacement text for the single occurrence `m`.
///
/// The substitution is re-run without `g` over the bounds `m` was found
/// with. The engine re-locates the occurrence as part of substituting, and
/// that span must be exactly `m`'s; only the patched part of the rebuilt
/// output is returned.
pub(crate) fn patch<E: Engine>(shared: &Arc<Shared<E>>, m: &Match<E>, template: &str) -> Result<String> {
    let options = without_global(&shared.options);
    let (index, len) = (m.index(), m.len());
    let lost = Error::OccurrenceLost { index, len };

    let mut guard = shared.lock();
    let st = &mut *guard;
    st.check_live()?;
    let bounds = m.bounds();
    st.bind(m.text(), bounds.start, Some(bounds.end - bounds.start))?;

    let status = run(shared, st, &options, template, bounds.clone())?;
    if status == 0 {
        return Err(lost);
    }

    let found = st.captures().ok_or(lost.clone())?;
    let Some(span) = found[0].span else {
        return Err(lost);
    };
    if (span.start, span.len) != (index, len) {
        return Err(Error::SpanMismatch {
            index,
            len,
            found_index: span.start,
            found_len: span.len,
        });
    }

    let Some(handle) = st.handle.as_ref() else {
        return Err(lost);
    };
    let out = output(st.engine.region(handle));
    if out.is_empty() {
        return Ok(String::new());
    }
    let from = index - bounds.start;
    let patched_len = (len + out.len())
        .checked_sub(bounds.end - bounds.start)
        .ok_or(lost.clone())?;
    let units = out.get(from..from + patched_len).ok_or(lost)?;
    decode_output(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Session;
    use crate::buffer::ForeignRange;
    use crate::engine::FancyEngine;
    use crate::engine::fancy::FancyHandle;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Bundled engine whose substitution results can be tampered with.
    #[derive(Default, Clone)]
    struct Tamper {
        inner: FancyEngine,
        /// Move the reported start of group 0 one unit to the right.
        shift: Arc<AtomicBool>,
        /// Report "no occurrence" from every substitution.
        miss: Arc<AtomicBool>,
    }

    struct Tampered {
        inner: FancyHandle,
        region: RawRegion,
    }

    impl Tamper {
        fn wrap(
            &self,
            handle: &mut Option<Tampered>,
            call: impl FnOnce(&mut Option<FancyHandle>) -> i32,
        ) -> i32 {
            let mut inner = handle.take().map(|h| h.inner);
            let status = call(&mut inner);
            *handle = inner.map(|inner| Tampered {
                region: self.inner.region(&inner).clone(),
                inner,
            });
            status
        }
    }

    impl Engine for Tamper {
        type Handle = Tampered;

        fn compile_and_match(
            &self,
            pattern: Option<&str>,
            options: Option<&str>,
            text: ForeignRange<'_>,
            one_shot: bool,
            handle: &mut Option<Tampered>,
            msg: &mut String,
        ) -> i32 {
            self.wrap(handle, |h| {
                self.inner
                    .compile_and_match(pattern, options, text, one_shot, h, msg)
            })
        }

        fn compile_and_substitute(
            &self,
            pattern: Option<&str>,
            template: Option<&str>,
            options: Option<&str>,
            text: ForeignRange<'_>,
            handle: &mut Option<Tampered>,
            msg: &mut String,
        ) -> i32 {
            let status = self.wrap(handle, |h| {
                self.inner
                    .compile_and_substitute(pattern, template, options, text, h, msg)
            });
            if status <= 0 {
                return status;
            }
            if self.shift.load(Ordering::SeqCst) {
                if let Some(start) = handle.as_mut().and_then(|h| h.region.starts.first_mut()) {
                    *start = start.wrapping_add(1);
                }
            }
            if self.miss.load(Ordering::SeqCst) {
                return 0;
            }
            status
        }

        fn region<'h>(&self, handle: &'h Tampered) -> &'h RawRegion {
            &handle.region
        }

        fn free(&self, handle: Tampered) {
            self.inner.free(handle.inner);
        }
    }

    #[test]
    fn shifted_occurrence_is_a_span_mismatch() {
        let engine = Tamper::default();
        let shift = Arc::clone(&engine.shift);
        let session = Session::with_engine(engine, r"\d+", "g").unwrap();
        let text: Text = "ab 123 cd".into();
        let m = session.find(&text).unwrap().unwrap();

        shift.store(true, Ordering::SeqCst);
        let err = m.result("x").unwrap_err();
        assert_eq!(
            err,
            Error::SpanMismatch {
                index: 3,
                len: 3,
                found_index: 4,
                found_len: 2,
            }
        );
        assert!(err.is_internal());

        shift.store(false, Ordering::SeqCst);
        assert_eq!(m.result("<$&>").unwrap(), "<123>");
        assert_eq!(session.replace(&text, "#").unwrap(), "ab # cd");
    }

    #[test]
    fn missing_occurrence_is_lost() {
        let engine = Tamper::default();
        let miss = Arc::clone(&engine.miss);
        let session = Session::with_engine(engine, r"\d+", "").unwrap();
        let text: Text = "ab 123 cd 45".into();
        let m = session.find(&text).unwrap().unwrap();

        miss.store(true, Ordering::SeqCst);
        let err = m.result("x").unwrap_err();
        assert_eq!(err, Error::OccurrenceLost { index: 3, len: 3 });
        assert!(err.is_internal());
        assert_eq!(session.replace(&text, "#").unwrap(), "ab 123 cd 45");

        miss.store(false, Ordering::SeqCst);
        assert_eq!(m.result("x").unwrap(), "x");
        let next = m.next_match().unwrap().unwrap();
        assert_eq!(next.as_str(), "45");
        assert_eq!(session.replace(&text, "#").unwrap(), "ab # cd 45");
    }

    #[test]
    fn same_options_same_template_reuses_everything() {
        let mut cache = SubstCache::new("g");
        cache.commit("g", "x");
        assert_eq!(
            cache.plan("g", "x"),
            Plan {
                recompile: false,
                options: None,
                template: None
            }
        );
    }

    #[test]
    fn same_options_new_template_recompiles_template_only() {
        let mut cache = SubstCache::new("g");
        assert_eq!(
            cache.plan("g", "x"),
            Plan {
                recompile: false,
                options: None,
                template: Some("x")
            }
        );
        cache.commit("g", "x");
        assert_eq!(cache.plan("g", "y").template, Some("y"));
    }

    #[test]
    fn different_options_recompile_both() {
        let mut cache = SubstCache::new("ig");
        cache.commit("ig", "x");
        let plan = cache.plan("i", "x");
        assert!(plan.recompile);
        assert_eq!(plan.options, Some("i"));
        assert_eq!(plan.template, Some("x"));
        cache.commit("i", "x");
        assert!(!cache.plan("i", "x").recompile);
    }

    #[test]
    fn invalidate_forces_recompile() {
        let mut cache = SubstCache::new("");
        cache.commit("", "x");
        cache.invalidate();
        let plan = cache.plan("", "x");
        assert!(plan.recompile);
        assert_eq!(plan.template, Some("x"));
    }

    #[test]
    fn empty_region_has_no_output() {
        assert!(output(&RawRegion::new()).is_empty());
    }
}
