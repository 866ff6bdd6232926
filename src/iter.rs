use std::sync::Arc;

use crate::buffer::Text;
use crate::engine::{Engine, FancyEngine};
use crate::error::Result;
use crate::matched::Match;
use crate::session::Shared;

/// Lazy sequence of matches over one text.
///
/// Each step is a fresh search on the session from the end of the previous
/// match (one character further for zero-length matches), so the sequence
/// always terminates and no iteration state lives in the engine. Items are
/// `Result`s: an engine failure is yielded once and ends the iteration.
pub struct Matches<E: Engine = FancyEngine> {
    session: Arc<Shared<E>>,
    text: Text,
    cursor: Cursor,
}

enum Cursor {
    Start(usize),
    At { pos: usize, end: usize },
    Done,
}

impl<E: Engine> Matches<E> {
    pub(crate) fn new(session: Arc<Shared<E>>, text: Text, start: usize) -> Self {
        Self {
            session,
            text,
            cursor: Cursor::Start(start),
        }
    }

    /// The text being searched.
    pub fn text(&self) -> &Text {
        &self.text
    }
}

impl<E: Engine> Iterator for Matches<E> {
    type Item = Result<Match<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        let found = match self.cursor {
            Cursor::Start(start) => self.session.search(&self.text, start, None),
            Cursor::At { pos, end } => self.session.search(&self.text, pos, Some(end - pos)),
            Cursor::Done => return None,
        };
        match found {
            Ok(Some(m)) => {
                let pos = m.resume_at();
                let end = m.bounds().end;
                self.cursor = if pos > end {
                    Cursor::Done
                } else {
                    Cursor::At { pos, end }
                };
                Some(Ok(m))
            }
            Ok(None) => {
                self.cursor = Cursor::Done;
                None
            }
            Err(e) => {
                self.cursor = Cursor::Done;
                Some(Err(e))
            }
        }
    }
}

impl<E: Engine> std::iter::FusedIterator for Matches<E> {}

#[cfg(test)]
mod tests {
    use crate::{Error, Session, Text};

    fn values(session: &Session, text: &Text) -> Vec<(usize, String)> {
        session
            .find_iter(text)
            .map(|m| {
                let m = m.unwrap();
                (m.index(), m.as_str().to_string())
            })
            .collect()
    }

    #[test]
    fn back_reference_matches() {
        let session = Session::new(r"abc(.)abc\1", "").unwrap();
        let text: Text = " abcdabce abcdabcd abcdabcf abcgabcg ".into();
        assert_eq!(
            values(&session, &text),
            vec![(10, "abcdabcd".to_string()), (28, "abcgabcg".to_string())]
        );
    }

    #[test]
    fn zero_length_matches_terminate() {
        let session = Session::new(r"\b", "").unwrap();
        let text: Text = "ab cd".into();
        let starts: Vec<usize> = values(&session, &text).into_iter().map(|(i, _)| i).collect();
        assert_eq!(starts, vec![0, 2, 3, 5]);
    }

    #[test]
    fn empty_pattern_visits_every_position() {
        let session = Session::new("", "").unwrap();
        let text: Text = "añb".into();
        assert_eq!(session.find_iter(&text).count(), 4);
    }

    #[test]
    fn start_offset_is_respected() {
        let session = Session::new(r"\d", "").unwrap();
        let text: Text = "1a2b3".into();
        let starts: Vec<usize> = session
            .find_iter_at(&text, 1)
            .map(|m| m.unwrap().index())
            .collect();
        assert_eq!(starts, vec![2, 4]);
    }

    #[test]
    fn bad_start_is_yielded_once() {
        let session = Session::new("a", "").unwrap();
        let text: Text = "a".into();
        let mut it = session.find_iter_at(&text, 5);
        assert!(matches!(it.next(), Some(Err(Error::Range { .. }))));
        assert!(it.next().is_none());
    }

    #[test]
    fn iteration_after_dispose_fails() {
        let session = Session::new("a", "").unwrap();
        let text: Text = "aaa".into();
        let mut it = session.find_iter(&text);
        assert!(it.next().unwrap().is_ok());
        session.dispose();
        assert_eq!(it.next().unwrap().unwrap_err(), Error::Disposed);
        assert!(it.next().is_none());
    }

    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn progress_is_strictly_increasing(
                text in "[ab ]{0,40}",
                pattern in prop::sample::select(vec!["a*", "b?", r"\b", "a|", "(a)|(b)", "x*", ""]),
            ) {
                let session = Session::new(pattern, "").unwrap();
                let text: Text = text.into();
                let mut prev_start = 0;
                let mut prev_resume = None;
                for m in session.find_iter(&text) {
                    let m = m.unwrap();
                    prop_assert!(m.index() >= prev_start);
                    let resume = m.index() + m.len().max(1);
                    if let Some(prev) = prev_resume {
                        prop_assert!(resume > prev);
                    }
                    prev_start = m.index();
                    prev_resume = Some(resume);
                }
            }

            #[test]
            fn capture_offsets_stay_in_bounds(text in "[a-c日 ]{0,30}") {
                let session = Session::new(r"(a)?(b*)(c|日)?", "").unwrap();
                let text: Text = text.into();
                let n = text.chars().count();
                for m in session.find_iter(&text) {
                    let m = m.unwrap();
                    let g0 = m.capture(0).unwrap().span.unwrap();
                    prop_assert_eq!((g0.start, g0.len), (m.index(), m.len()));
                    for c in m.captures() {
                        if let Some(span) = c.span {
                            prop_assert!(span.end() <= n);
                        }
                    }
                }
            }
        }
    }
}
