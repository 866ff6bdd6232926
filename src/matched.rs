use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use serde::Serialize;

use crate::buffer::{Text, slice_chars};
use crate::engine::{Engine, FancyEngine};
use crate::error::Result;
use crate::session::Shared;
use crate::subst;

/// A character range of the searched text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

impl Span {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// One capture group of a match. `span` is `None` when the group did not
/// participate, which is distinct from participating with an empty span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capture {
    pub index: usize,
    pub span: Option<Span>,
}

impl Capture {
    pub fn participated(&self) -> bool {
        self.span.is_some()
    }

    pub fn start(&self) -> Option<usize> {
        self.span.map(|s| s.start)
    }

    pub fn len(&self) -> Option<usize> {
        self.span.map(|s| s.len)
    }
}

/// Immutable snapshot of one match.
///
/// Offsets are character indices into [`Match::text`]. A match remembers
/// the session and the bounds it was found with, so [`Match::next_match`]
/// and [`Match::result`] can re-enter the session later.
pub struct Match<E: Engine = FancyEngine> {
    captures: Vec<Capture>,
    session: Arc<Shared<E>>,
    text: Text,
    bounds: Range<usize>,
}

impl<E: Engine> Match<E> {
    /// `captures[0]` must be present.
    pub(crate) fn new(
        captures: Vec<Capture>,
        session: Arc<Shared<E>>,
        text: Text,
        bounds: Range<usize>,
    ) -> Self {
        debug_assert!(captures.first().is_some_and(Capture::participated));
        Self {
            captures,
            session,
            text,
            bounds,
        }
    }

    fn span(&self) -> Span {
        self.captures[0].span.unwrap_or(Span { start: 0, len: 0 })
    }

    /// Start of the match.
    pub fn index(&self) -> usize {
        self.span().start
    }

    /// Length of the match in characters.
    pub fn len(&self) -> usize {
        self.span().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn end(&self) -> usize {
        self.span().end()
    }

    /// The matched text.
    pub fn as_str(&self) -> &str {
        let span = self.span();
        slice_chars(&self.text, span.start, span.len)
    }

    /// Text of group `i`, or `None` if the group does not exist or did not
    /// participate.
    pub fn group(&self, i: usize) -> Option<&str> {
        let span = self.captures.get(i)?.span?;
        Some(slice_chars(&self.text, span.start, span.len))
    }

    pub fn capture(&self, i: usize) -> Option<&Capture> {
        self.captures.get(i)
    }

    /// All groups, group 0 first.
    pub fn captures(&self) -> &[Capture] {
        &self.captures
    }

    /// The text this match was found in.
    pub fn text(&self) -> &Text {
        &self.text
    }

    /// Search bounds in effect when the match was produced.
    pub fn bounds(&self) -> Range<usize> {
        self.bounds.clone()
    }

    /// Where the search continues after this match. Zero-length matches
    /// advance by one character so iteration always progresses.
    pub(crate) fn resume_at(&self) -> usize {
        self.index() + self.len().max(1)
    }

    /// The next match within the same bounds, searched from the end of
    /// this one.
    pub fn next_match(&self) -> Result<Option<Match<E>>> {
        let next = self.resume_at();
        if next > self.bounds.end {
            return Ok(None);
        }
        self.session
            .search(&self.text, next, Some(self.bounds.end - next))
    }

    /// Replacement text for this occurrence alone: `template` expanded
    /// against this match, without rebuilding the rest of the text.
    pub fn result(&self, template: &str) -> Result<String> {
        subst::patch(&self.session, self, template)
    }
}

impl<E: Engine> fmt::Display for Match<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<E: Engine> fmt::Debug for Match<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Match")
            .field("value", &self.as_str())
            .field("captures", &self.captures)
            .field("bounds", &self.bounds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Error, Session, Text};

    #[test]
    fn groups_and_unset_groups() {
        let session = Session::new(r"(AM|PM)?(\d{1,2}):(\d{2})", "i").unwrap();
        let text: Text = "AM0:00 AM10:00 pm3:00 pm2.5 24:00 1:1 0:00".into();
        let m = session.find_in(&text, 5, text.len() - 8).unwrap().unwrap();
        assert_eq!(m.as_str(), "AM10:00");
        assert_eq!(m.index(), 7);
        assert_eq!(m.group(1), Some("AM"));
        assert_eq!(m.group(2), Some("10"));

        let m = m.next_match().unwrap().unwrap();
        assert_eq!(m.as_str(), "pm3:00");
        let m = m.next_match().unwrap().unwrap();
        assert_eq!(m.as_str(), "24:00");
        assert_eq!(m.group(1), None);
        assert!(!m.capture(1).unwrap().participated());
        assert_eq!(m.capture(2).unwrap().start(), Some(28));
        // "1:1" fails \d{2}; "0:00" lies outside the bounds
        assert!(m.next_match().unwrap().is_none());
    }

    #[test]
    fn group_zero_spans_the_match() {
        let session = Session::new(r"b(c)", "").unwrap();
        let text: Text = "日本abcd".into();
        let m = session.find(&text).unwrap().unwrap();
        let g0 = m.capture(0).unwrap();
        assert_eq!(g0.start(), Some(m.index()));
        assert_eq!(g0.len(), Some(m.len()));
        assert_eq!(m.index(), 3);
        assert_eq!(m.group(1), Some("c"));
        assert_eq!(m.to_string(), "bc");
        assert_eq!(m.bounds(), 0..6);
    }

    #[test]
    fn empty_match_next_advances() {
        let session = Session::new("x*", "").unwrap();
        let text: Text = "ab".into();
        let m = session.find(&text).unwrap().unwrap();
        assert!(m.is_empty());
        let m = m.next_match().unwrap().unwrap();
        assert_eq!(m.index(), 1);
        let m = m.next_match().unwrap().unwrap();
        assert_eq!(m.index(), 2);
        assert!(m.next_match().unwrap().is_none());
    }

    #[test]
    fn next_match_after_dispose_fails() {
        let session = Session::new("a", "").unwrap();
        let text: Text = "aa".into();
        let m = session.find(&text).unwrap().unwrap();
        drop(session);
        assert_eq!(m.next_match().unwrap_err(), Error::Disposed);
        assert_eq!(m.result("b").unwrap_err(), Error::Disposed);
        assert_eq!(m.as_str(), "a");
    }

    #[test]
    fn captures_serialize_as_json() {
        let session = Session::new(r"(x)?(y)", "").unwrap();
        let text: Text = "zy".into();
        let m = session.find(&text).unwrap().unwrap();
        let json = serde_json::to_value(m.captures()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"index": 0, "span": {"start": 1, "len": 1}},
                {"index": 1, "span": null},
                {"index": 2, "span": {"start": 1, "len": 1}},
            ])
        );
    }
}
