//! Search filters (RFC 4515 string form) and search scopes.

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// How far below the base object a search reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchScope {
    /// Only the base object.
    Base,
    /// Immediate children of the base, not the base itself.
    OneLevel,
    /// The base and everything below it.
    Subtree,
}

/// A search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality(String, String),
    Substrings {
        attr: String,
        initial: Option<String>,
        any: Vec<String>,
        final_value: Option<String>,
    },
    GreaterOrEqual(String, String),
    LessOrEqual(String, String),
    Present(String),
    Approx(String, String),
}

impl Filter {
    /// Parses a filter string. The outer parentheses may be omitted for a
    /// single item, so `uid=jdoe` and `(uid=jdoe)` are equivalent.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let text = if trimmed.starts_with('(') {
            trimmed.to_string()
        } else {
            format!("({trimmed})")
        };
        let mut parser = FilterParser {
            input,
            bytes: text.as_bytes(),
            pos: 0,
        };
        let filter = parser.filter()?;
        if parser.pos != parser.bytes.len() {
            return Err(parser.error("unexpected trailing characters"));
        }
        Ok(filter)
    }

    /// The `(objectClass=*)` filter that matches every entry.
    #[must_use]
    pub fn match_all() -> Self {
        Filter::Present("objectClass".into())
    }

    /// The attribute an item filter tests, `None` for `&`, `|` and `!`.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            Filter::And(_) | Filter::Or(_) | Filter::Not(_) => None,
            Filter::Equality(attr, _)
            | Filter::GreaterOrEqual(attr, _)
            | Filter::LessOrEqual(attr, _)
            | Filter::Approx(attr, _)
            | Filter::Present(attr) => Some(attr),
            Filter::Substrings { attr, .. } => Some(attr),
        }
    }
}

impl FromStr for Filter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(items) => {
                f.write_str("(&")?;
                for item in items {
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Filter::Or(items) => {
                f.write_str("(|")?;
                for item in items {
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Filter::Not(inner) => write!(f, "(!{inner})"),
            Filter::Equality(attr, value) => write!(f, "({attr}={})", escape(value)),
            Filter::GreaterOrEqual(attr, value) => write!(f, "({attr}>={})", escape(value)),
            Filter::LessOrEqual(attr, value) => write!(f, "({attr}<={})", escape(value)),
            Filter::Approx(attr, value) => write!(f, "({attr}~={})", escape(value)),
            Filter::Present(attr) => write!(f, "({attr}=*)"),
            Filter::Substrings {
                attr,
                initial,
                any,
                final_value,
            } => {
                write!(f, "({attr}=")?;
                if let Some(initial) = initial {
                    f.write_str(&escape(initial))?;
                }
                f.write_str("*")?;
                for part in any {
                    write!(f, "{}*", escape(part))?;
                }
                if let Some(final_value) = final_value {
                    f.write_str(&escape(final_value))?;
                }
                f.write_str(")")
            }
        }
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\\' => out.push_str("\\5c"),
            '\0' => out.push_str("\\00"),
            _ => out.push(c),
        }
    }
    out
}

struct FilterParser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl FilterParser<'_> {
    fn error(&self, reason: impl Into<String>) -> Error {
        Error::InvalidFilter {
            input: self.input.to_string(),
            reason: reason.into(),
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.bytes.get(self.pos) == Some(&byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{}' at offset {}", byte as char, self.pos)))
        }
    }

    fn filter(&mut self) -> Result<Filter> {
        self.expect(b'(')?;
        let filter = match self.bytes.get(self.pos) {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.filter_list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.filter_list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(self.error("unexpected end of filter")),
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn filter_list(&mut self) -> Result<Vec<Filter>> {
        let mut items = Vec::new();
        while self.bytes.get(self.pos) == Some(&b'(') {
            items.push(self.filter()?);
        }
        Ok(items)
    }

    fn item(&mut self) -> Result<Filter> {
        let start = self.pos;
        while let Some(&b) = self.bytes.get(self.pos) {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'.' || b == b';' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let attr = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| self.error("attribute description is not valid UTF-8"))?
            .to_string();
        if attr.is_empty() {
            return Err(self.error("missing attribute description"));
        }

        let op = match (self.bytes.get(self.pos), self.bytes.get(self.pos + 1)) {
            (Some(b'='), _) => {
                self.pos += 1;
                b'='
            }
            (Some(b'~'), Some(b'=')) => {
                self.pos += 2;
                b'~'
            }
            (Some(b'>'), Some(b'=')) => {
                self.pos += 2;
                b'>'
            }
            (Some(b'<'), Some(b'=')) => {
                self.pos += 2;
                b'<'
            }
            _ => return Err(self.error(format!("missing comparison operator after '{attr}'"))),
        };

        let pieces = self.value_pieces()?;
        match op {
            b'=' if pieces.len() == 2 && pieces[0].is_empty() && pieces[1].is_empty() => {
                Ok(Filter::Present(attr))
            }
            b'=' if pieces.len() > 1 => {
                let last = pieces.len() - 1;
                let mut initial = None;
                let mut any = Vec::new();
                let mut final_value = None;
                for (i, piece) in pieces.into_iter().enumerate() {
                    if piece.is_empty() {
                        continue;
                    }
                    if i == 0 {
                        initial = Some(piece);
                    } else if i == last {
                        final_value = Some(piece);
                    } else {
                        any.push(piece);
                    }
                }
                Ok(Filter::Substrings {
                    attr,
                    initial,
                    any,
                    final_value,
                })
            }
            _ if pieces.len() > 1 => Err(self.error("wildcards are only allowed with '='")),
            b'=' => Ok(Filter::Equality(attr, single(pieces))),
            b'~' => Ok(Filter::Approx(attr, single(pieces))),
            b'>' => Ok(Filter::GreaterOrEqual(attr, single(pieces))),
            _ => Ok(Filter::LessOrEqual(attr, single(pieces))),
        }
    }

    /// Reads an assertion value up to the closing parenthesis, splitting on
    /// unescaped `*` and decoding `\XX` escapes.
    fn value_pieces(&mut self) -> Result<Vec<String>> {
        let mut pieces = Vec::new();
        let mut current: Vec<u8> = Vec::new();
        loop {
            match self.bytes.get(self.pos) {
                None => return Err(self.error("unterminated assertion value")),
                Some(b')') => break,
                Some(b'(') => return Err(self.error("unescaped '(' in assertion value")),
                Some(b'*') => {
                    pieces.push(self.utf8(std::mem::take(&mut current))?);
                    self.pos += 1;
                }
                Some(b'\\') => {
                    let hi = self.bytes.get(self.pos + 1).and_then(|b| (*b as char).to_digit(16));
                    let lo = self.bytes.get(self.pos + 2).and_then(|b| (*b as char).to_digit(16));
                    match (hi, lo) {
                        (Some(hi), Some(lo)) => {
                            current.push((hi * 16 + lo) as u8);
                            self.pos += 3;
                        }
                        _ => match self.bytes.get(self.pos + 1) {
                            // RFC 2254 style `\*` is still seen in the wild.
                            Some(&next) => {
                                current.push(next);
                                self.pos += 2;
                            }
                            None => return Err(self.error("dangling escape")),
                        },
                    }
                }
                Some(&b) => {
                    current.push(b);
                    self.pos += 1;
                }
            }
        }
        pieces.push(self.utf8(current)?);
        Ok(pieces)
    }

    fn utf8(&self, bytes: Vec<u8>) -> Result<String> {
        String::from_utf8(bytes).map_err(|_| self.error("assertion value is not valid UTF-8"))
    }
}

fn single(mut pieces: Vec<String>) -> String {
    pieces.pop().unwrap_or_default()
}
