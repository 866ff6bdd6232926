//! Replacement templates.
//!
//! Syntax: `$n` / `${n}` group references, `${name}` named groups, `$&`
//! the whole match, `$$` a literal dollar, and backslash escapes `\n`,
//! `\t`, `\r`, `\\`, `\$` plus `\1`..`\9` group references. A `$` not
//! followed by a reference is literal. Groups that did not participate
//! expand to nothing.

use fancy_regex::{Captures, Regex};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Group(usize),
}

/// A template compiled against one pattern's group table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pieces: Vec<Piece>,
}

impl Template {
    /// Compile `src` for `regex`, rejecting references to groups the
    /// pattern does not have.
    pub fn compile(src: &str, regex: &Regex) -> Result<Template, String> {
        let names: Vec<Option<&str>> = regex.capture_names().collect();
        compile_with(src, regex.captures_len(), &names)
    }

    /// Append the expansion for one match to `out`.
    pub fn expand(&self, caps: &Captures, out: &mut String) {
        for piece in &self.pieces {
            match piece {
                Piece::Literal(s) => out.push_str(s),
                Piece::Group(i) => {
                    if let Some(m) = caps.get(*i) {
                        out.push_str(m.as_str());
                    }
                }
            }
        }
    }
}

fn compile_with(src: &str, group_count: usize, names: &[Option<&str>]) -> Result<Template, String> {
    let mut pieces = Vec::new();
    let mut lit = String::new();
    let mut chars = src.chars().peekable();

    let push_group = |lit: &mut String, pieces: &mut Vec<Piece>, i: usize| -> Result<(), String> {
        if i >= group_count {
            return Err(format!("invalid group reference {i} in replacement"));
        }
        if !lit.is_empty() {
            pieces.push(Piece::Literal(std::mem::take(lit)));
        }
        pieces.push(Piece::Group(i));
        Ok(())
    };

    while let Some(c) = chars.next() {
        match c {
            '$' => match chars.peek().copied() {
                Some('$') => {
                    chars.next();
                    lit.push('$');
                }
                Some('&') => {
                    chars.next();
                    push_group(&mut lit, &mut pieces, 0)?;
                }
                Some(d) if d.is_ascii_digit() => {
                    let mut n = String::new();
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        n.push(d);
                        chars.next();
                    }
                    let i = n
                        .parse::<usize>()
                        .map_err(|_| format!("invalid group reference ${n} in replacement"))?;
                    push_group(&mut lit, &mut pieces, i)?;
                }
                Some('{') => {
                    chars.next();
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err("unterminated ${ in replacement".to_string());
                    }
                    if name.is_empty() {
                        return Err("empty group name in replacement".to_string());
                    }
                    let i = match name.parse::<usize>() {
                        Ok(i) => i,
                        Err(_) => names
                            .iter()
                            .position(|n| *n == Some(name.as_str()))
                            .ok_or_else(|| format!("undefined group name <{name}> in replacement"))?,
                    };
                    push_group(&mut lit, &mut pieces, i)?;
                }
                _ => lit.push('$'),
            },
            '\\' => match chars.next() {
                Some('n') => lit.push('\n'),
                Some('t') => lit.push('\t'),
                Some('r') => lit.push('\r'),
                Some(d @ '1'..='9') => {
                    let i = d as usize - '0' as usize;
                    push_group(&mut lit, &mut pieces, i)?;
                }
                Some(other) => lit.push(other),
                None => return Err("trailing backslash in replacement".to_string()),
            },
            c => lit.push(c),
        }
    }
    if !lit.is_empty() {
        pieces.push(Piece::Literal(lit));
    }
    Ok(Template { pieces })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(pattern: &str, template: &str, text: &str) -> String {
        let re = Regex::new(pattern).unwrap();
        let t = Template::compile(template, &re).unwrap();
        let caps = re.captures(text).unwrap().unwrap();
        let mut out = String::new();
        t.expand(&caps, &mut out);
        out
    }

    #[test]
    fn dollar_references() {
        assert_eq!(expand(r"(\d\d)-(\d+)", "$1-xxxx", "06-5555"), "06-xxxx");
        assert_eq!(expand(r"(\d\d)-(\d+)", "[$&]", "06-5555"), "[06-5555]");
        assert_eq!(expand(r"(\d\d)-(\d+)", "${2}${1}", "06-5555"), "555506");
        assert_eq!(expand(r"(\d)", "$$1", "7"), "$1");
    }

    #[test]
    fn named_group() {
        assert_eq!(expand(r"(?P<area>\d+)-", "<${area}>", "045-"), "<045>");
    }

    #[test]
    fn backslash_escapes() {
        assert_eq!(expand(r"(a)(b)", r"\2\1\n\$\\", "ab"), "ba\n$\\");
    }

    #[test]
    fn lone_dollar_is_literal() {
        assert_eq!(expand("a", "$ and $x", "a"), "$ and $x");
        assert_eq!(expand("a", "cost$", "a"), "cost$");
    }

    #[test]
    fn unset_group_expands_to_nothing() {
        assert_eq!(expand(r"(AM|PM)?(\d)", "[$1|$2]", "7"), "[|7]");
    }

    #[test]
    fn rejects_missing_group() {
        let re = Regex::new(r"(a)").unwrap();
        let err = Template::compile("$2", &re).unwrap_err();
        assert!(err.contains("invalid group reference 2"), "{err}");
        assert!(Template::compile(r"\5", &re).is_err());
    }

    #[test]
    fn rejects_malformed_braces() {
        let re = Regex::new(r"(a)").unwrap();
        assert!(Template::compile("${1", &re).is_err());
        assert!(Template::compile("${}", &re).is_err());
        assert!(Template::compile("${nope}", &re).is_err());
        assert!(Template::compile("tail\\", &re).is_err());
    }
}
