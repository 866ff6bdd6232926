//! Engine binding backed by `fancy-regex`.
//!
//! The backtracking algorithm (back-references, look-around) belongs to
//! `fancy-regex`; this module only adapts it to the three-call surface:
//! handle state, native pointers in and out, the output buffer of a
//! substitution and the truncated error message.

use fancy_regex::{Captures, Regex, RegexBuilder};
use tracing::{debug, trace};

use super::template::Template;
use super::{Engine, RawRegion, Status, write_message};
use crate::buffer::{ForeignRange, Wide, decode};
use crate::config::EngineConfig;
use crate::options::Options;

/// Engine binding over `fancy_regex::Regex`.
#[derive(Debug, Clone, Default)]
pub struct FancyEngine {
    config: EngineConfig,
}

/// Compiled pattern, last compiled template and last call's results.
#[derive(Debug)]
pub struct FancyHandle {
    regex: Regex,
    options: Options,
    template: Option<Template>,
    region: RawRegion,
    /// Rebuilt text of the last substitution.
    out: Vec<Wide>,
    haystack: Option<Haystack>,
}

impl FancyHandle {
    fn new(regex: Regex, options: Options) -> Self {
        Self {
            regex,
            options,
            template: None,
            region: RawRegion::new(),
            out: Vec::new(),
            haystack: None,
        }
    }
}

/// UTF-8 rendition of the buffer the engine was last called with.
#[derive(Debug)]
struct Haystack {
    /// Buffer generation the rendition was decoded from; 0 is never reused.
    generation: u64,
    text: String,
    /// Byte offset of each char, plus one entry for the end of the text.
    offsets: Vec<usize>,
}

impl Haystack {
    fn build(range: &ForeignRange<'_>) -> Option<Haystack> {
        let text = decode(range.units())?;
        let mut offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        offsets.push(text.len());
        #[cfg(test)]
        builds::inc();
        Some(Haystack {
            generation: range.generation(),
            text,
            offsets,
        })
    }

    fn byte(&self, index: usize) -> usize {
        self.offsets[index]
    }

    fn index(&self, byte: usize) -> usize {
        self.offsets.binary_search(&byte).unwrap_or_else(|i| i)
    }

    /// The text up to the range end; the engine never sees past it.
    fn bounded(&self, range: &ForeignRange<'_>) -> &str {
        &self.text[..self.byte(range.end())]
    }
}

/// Decode the buffer unless the cached rendition came from the same
/// allocation.
fn prepare<'h>(cache: &'h mut Option<Haystack>, range: &ForeignRange<'_>) -> Result<&'h Haystack, String> {
    let fresh = cache
        .as_ref()
        .is_some_and(|h| h.generation != 0 && h.generation == range.generation());
    if !fresh {
        *cache = Some(Haystack::build(range).ok_or("text contains an invalid character")?);
    }
    let hay = cache.as_ref().ok_or_else(|| "text unavailable".to_string())?;
    debug_assert_eq!(hay.offsets.len() - 1, range.units().len());
    Ok(hay)
}

fn next_boundary(text: &str, byte: usize) -> Option<usize> {
    text[byte..].chars().next().map(|c| byte + c.len_utf8())
}

/// Outcome of one substitution pass, in byte offsets of the haystack.
struct Substitution {
    rebuilt: String,
    count: usize,
    first: Vec<Option<(usize, usize)>>,
}

fn spans(caps: &Captures) -> Vec<Option<(usize, usize)>> {
    (0..caps.len())
        .map(|i| caps.get(i).map(|m| (m.start(), m.end())))
        .collect()
}

/// Replace the first (or, when `global`, every) occurrence in the haystack
/// from byte `from` to its end. Empty matches advance by one character; an
/// empty match directly after the previous match is skipped.
fn substitute(
    regex: &Regex,
    template: &Template,
    text: &str,
    from: usize,
    global: bool,
) -> Result<Option<Substitution>, fancy_regex::Error> {
    let mut rebuilt = String::new();
    let mut first = None;
    let mut count = 0;
    let mut pos = from;
    let mut last_end = from;
    let mut prev_end: Option<usize> = None;

    while pos <= text.len() {
        let Some(caps) = regex.captures_from_pos(text, pos)? else {
            break;
        };
        let Some(m) = caps.get(0) else {
            break;
        };
        if m.start() == m.end() && prev_end == Some(m.end()) {
            match next_boundary(text, m.end()) {
                Some(next) => {
                    pos = next;
                    continue;
                }
                None => break,
            }
        }
        rebuilt.push_str(&text[last_end..m.start()]);
        template.expand(&caps, &mut rebuilt);
        count += 1;
        if first.is_none() {
            first = Some(spans(&caps));
        }
        last_end = m.end();
        prev_end = Some(m.end());
        if !global {
            break;
        }
        pos = if m.start() == m.end() {
            match next_boundary(text, m.end()) {
                Some(next) => next,
                None => break,
            }
        } else {
            m.end()
        };
    }

    let Some(first) = first else {
        return Ok(None);
    };
    rebuilt.push_str(&text[last_end..]);
    Ok(Some(Substitution {
        rebuilt,
        count,
        first,
    }))
}

fn fill_region(
    region: &mut RawRegion,
    spans: &[Option<(usize, usize)>],
    hay: &Haystack,
    text: &ForeignRange<'_>,
) {
    region.starts.clear();
    region.ends.clear();
    for span in spans {
        match span {
            Some((start, end)) => {
                region.starts.push(text.ptr_at(hay.index(*start)));
                region.ends.push(text.ptr_at(hay.index(*end)));
            }
            None => {
                region.starts.push(std::ptr::null());
                region.ends.push(std::ptr::null());
            }
        }
    }
}

impl FancyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn compile(&self, pattern: &str, options: &str) -> Result<FancyHandle, String> {
        let opts = Options::parse(options).map_err(|c| format!("unknown option '{c}'"))?;
        let mut flags = String::new();
        for (on, letter) in [
            (opts.ignore_case, 'i'),
            (opts.multiline, 'm'),
            (opts.singleline, 's'),
            (opts.extended, 'x'),
        ] {
            if on {
                flags.push(letter);
            }
        }
        let source = if flags.is_empty() {
            pattern.to_string()
        } else {
            format!("(?{flags}){pattern}")
        };

        let mut builder = RegexBuilder::new(&source);
        if let Some(limit) = self.config.backtrack_limit {
            builder.backtrack_limit(limit);
        }
        if let Some(limit) = self.config.delegate_size_limit {
            builder.delegate_size_limit(limit);
        }
        if let Some(limit) = self.config.delegate_dfa_size_limit {
            builder.delegate_dfa_size_limit(limit);
        }
        let regex = builder.build().map_err(|e| e.to_string())?;
        debug!(pattern, options, groups = regex.captures_len() - 1, "compiled pattern");
        Ok(FancyHandle::new(regex, opts))
    }
}

impl Engine for FancyEngine {
    type Handle = FancyHandle;

    fn compile_and_match(
        &self,
        pattern: Option<&str>,
        options: Option<&str>,
        text: ForeignRange<'_>,
        one_shot: bool,
        handle: &mut Option<FancyHandle>,
        msg: &mut String,
    ) -> Status {
        if let Some(pattern) = pattern {
            match self.compile(pattern, options.unwrap_or("")) {
                Ok(h) => *handle = Some(h),
                Err(e) => {
                    write_message(msg, &e);
                    return -1;
                }
            }
        }
        let Some(h) = handle.as_mut() else {
            write_message(msg, "no compiled pattern");
            return -1;
        };
        h.region.clear();
        if one_shot {
            return 0;
        }

        let hay = match prepare(&mut h.haystack, &text) {
            Ok(hay) => hay,
            Err(e) => {
                write_message(msg, &e);
                return -1;
            }
        };
        match h.regex.captures_from_pos(hay.bounded(&text), hay.byte(text.start())) {
            Ok(Some(caps)) => {
                fill_region(&mut h.region, &spans(&caps), hay, &text);
                1
            }
            Ok(None) => 0,
            Err(e) => {
                write_message(msg, &e.to_string());
                -1
            }
        }
    }

    fn compile_and_substitute(
        &self,
        pattern: Option<&str>,
        template: Option<&str>,
        options: Option<&str>,
        text: ForeignRange<'_>,
        handle: &mut Option<FancyHandle>,
        msg: &mut String,
    ) -> Status {
        if let Some(pattern) = pattern {
            match self.compile(pattern, options.unwrap_or("")) {
                Ok(h) => *handle = Some(h),
                Err(e) => {
                    write_message(msg, &e);
                    return -1;
                }
            }
        }
        let Some(h) = handle.as_mut() else {
            write_message(msg, "no compiled pattern");
            return -1;
        };
        h.region.clear();
        h.out.clear();

        if let Some(template) = template {
            match Template::compile(template, &h.regex) {
                Ok(t) => {
                    trace!(template, "compiled replacement");
                    h.template = Some(t);
                }
                Err(e) => {
                    h.template = None;
                    write_message(msg, &e);
                    return -1;
                }
            }
        }
        let Some(tmpl) = h.template.as_ref() else {
            write_message(msg, "no compiled replacement");
            return -1;
        };

        let hay = match prepare(&mut h.haystack, &text) {
            Ok(hay) => hay,
            Err(e) => {
                write_message(msg, &e);
                return -1;
            }
        };
        let from = hay.byte(text.start());
        match substitute(&h.regex, tmpl, hay.bounded(&text), from, h.options.global) {
            Ok(Some(sub)) => {
                fill_region(&mut h.region, &sub.first, hay, &text);
                h.out = sub.rebuilt.chars().map(|c| c as Wide).collect();
                if !h.out.is_empty() {
                    let out = h.out.as_ptr_range();
                    h.region.out_start = out.start;
                    h.region.out_end = out.end;
                }
                Status::try_from(sub.count).unwrap_or(Status::MAX)
            }
            Ok(None) => 0,
            Err(e) => {
                write_message(msg, &e.to_string());
                -1
            }
        }
    }

    fn region<'h>(&self, handle: &'h FancyHandle) -> &'h RawRegion {
        &handle.region
    }

    fn free(&self, handle: FancyHandle) {
        trace!(pattern = handle.regex.as_str(), "freed handle");
        drop(handle);
    }
}

#[cfg(test)]
pub(crate) mod builds {
    use std::cell::Cell;

    thread_local! {
        static BUILDS: Cell<usize> = const { Cell::new(0) };
    }

    pub fn inc() {
        BUILDS.with(|n| n.set(n.get() + 1));
    }

    /// Haystacks decoded on this thread so far.
    pub fn count() -> usize {
        BUILDS.with(|n| n.get())
    }
}
