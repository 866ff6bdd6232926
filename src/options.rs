use std::fmt;

/// Typed view of the engine's option letter code.
///
/// Sessions keep the option *string* they were built with, since identity
/// of a pattern is the pair (pattern text, option string). `Options` is a
/// convenience for building that string without remembering the letters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// `u`: unicode mode.
    pub unicode: bool,
    /// `i`: ignore case.
    pub ignore_case: bool,
    /// `m`: `^`/`$` match at line boundaries.
    pub multiline: bool,
    /// `s`: `.` also matches newline.
    pub singleline: bool,
    /// `x`: whitespace and `#` comments in the pattern are ignored.
    pub extended: bool,
    /// `g`: replace every occurrence instead of the first.
    pub global: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unicode(mut self, yes: bool) -> Self {
        self.unicode = yes;
        self
    }

    pub fn ignore_case(mut self, yes: bool) -> Self {
        self.ignore_case = yes;
        self
    }

    pub fn multiline(mut self, yes: bool) -> Self {
        self.multiline = yes;
        self
    }

    pub fn singleline(mut self, yes: bool) -> Self {
        self.singleline = yes;
        self
    }

    pub fn extended(mut self, yes: bool) -> Self {
        self.extended = yes;
        self
    }

    pub fn global(mut self, yes: bool) -> Self {
        self.global = yes;
        self
    }

    /// Parse a letter code. Returns the first unrecognized letter on failure.
    pub fn parse(code: &str) -> Result<Options, char> {
        let mut opts = Options::default();
        for c in code.chars() {
            match c {
                'u' => opts.unicode = true,
                'i' => opts.ignore_case = true,
                'm' => opts.multiline = true,
                's' => opts.singleline = true,
                'x' => opts.extended = true,
                'g' => opts.global = true,
                other => return Err(other),
            }
        }
        Ok(opts)
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (on, letter) in [
            (self.unicode, 'u'),
            (self.ignore_case, 'i'),
            (self.multiline, 'm'),
            (self.singleline, 's'),
            (self.extended, 'x'),
            (self.global, 'g'),
        ] {
            if on {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}

/// The option string with every `g` removed, so a substitution touches one
/// occurrence only.
pub(crate) fn without_global(code: &str) -> String {
    code.replace('g', "")
}
