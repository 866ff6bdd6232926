//! Compiled-pattern sessions over a foreign regex engine.
//!
//! A [`Session`] compiles one pattern once and reuses it for searching and
//! substituting over many texts. The engine sits behind the [`Engine`]
//! trait, which mirrors a three-call foreign interface (compile+match,
//! compile+substitute, free); [`FancyEngine`] is the bundled binding.
//!
//! ```
//! use rxsession::{Session, Text};
//!
//! let session = Session::new(r"(\d+)-(\d+)", "g")?;
//! let text: Text = "tel 045-222 fax 06-5555".into();
//!
//! let first = session.find(&text)?.expect("a match");
//! assert_eq!(first.group(1), Some("045"));
//! assert_eq!(first.result("$2-$1")?, "222-045");
//!
//! assert_eq!(session.replace(&text, "$1")?, "tel 045 fax 06");
//! # Ok::<(), rxsession::Error>(())
//! ```

pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod iter;
pub mod matched;
pub mod options;
pub mod session;
mod subst;

pub use buffer::{ForeignRange, Text, Wide};
pub use config::{EngineConfig, load_config};
pub use engine::{Engine, FancyEngine, RawRegion, Status};
pub use error::{Error, Result};
pub use iter::Matches;
pub use matched::{Capture, Match, Span};
pub use options::Options;
pub use session::Session;

/// First match of `pattern` in `text`, with a session that lives for this
/// call only. The returned match keeps its data but can no longer search.
pub fn find(text: &str, pattern: &str, options: &str) -> Result<Option<Match>> {
    let session = Session::new(pattern, options)?;
    session.find(&Text::from(text))
}

/// Every match of `pattern` in `text`, collected before the temporary
/// session is disposed.
pub fn find_iter(text: &str, pattern: &str, options: &str) -> Result<Vec<Match>> {
    let session = Session::new(pattern, options)?;
    session.find_iter(&Text::from(text)).collect()
}

pub fn is_match(text: &str, pattern: &str, options: &str) -> Result<bool> {
    let session = Session::new(pattern, options)?;
    session.is_match(&Text::from(text))
}

/// Replace `pattern` in `text` with `template`; every occurrence when
/// `options` contains `g`.
pub fn replace(text: &str, pattern: &str, template: &str, options: &str) -> Result<String> {
    let session = Session::new(pattern, options)?;
    session.replace(&Text::from(text), template)
}
