//! Distinguished names (RFC 4514 string form).
//!
//! A [`Dn`] is an ordered list of [`Rdn`]s, most specific first, so
//! `cn=TestUser,dc=liftweb,dc=net` has `cn=TestUser` at index 0. The empty
//! DN names the root DSE.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single `attribute=value` assertion inside an RDN.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ava {
    attr: String,
    value: String,
}

impl Ava {
    pub fn new(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attr: attr.into(),
            value: value.into(),
        }
    }

    /// The attribute type as written (name or OID).
    pub fn attr(&self) -> &str {
        &self.attr
    }

    /// The unescaped attribute value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Ava {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attr, escape_value(&self.value))
    }
}

/// A relative distinguished name: one or more AVAs joined by `+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rdn {
    avas: Vec<Ava>,
}

impl Rdn {
    /// Creates a single-valued RDN.
    pub fn new(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            avas: vec![Ava::new(attr, value)],
        }
    }

    /// Creates a multi-valued RDN. At least one AVA is required.
    pub fn from_avas(avas: Vec<Ava>) -> Result<Self> {
        if avas.is_empty() {
            return Err(Error::InvalidDn {
                input: String::new(),
                reason: "an RDN needs at least one attribute value assertion".into(),
            });
        }
        Ok(Self { avas })
    }

    pub fn avas(&self) -> &[Ava] {
        &self.avas
    }

    /// The first (and usually only) AVA.
    pub fn first(&self) -> &Ava {
        &self.avas[0]
    }

    /// Returns the value asserted for `attr`, compared ASCII case-insensitively.
    pub fn get(&self, attr: &str) -> Option<&str> {
        self.avas
            .iter()
            .find(|ava| ava.attr.eq_ignore_ascii_case(attr))
            .map(|ava| ava.value.as_str())
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ava) in self.avas.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{ava}")?;
        }
        Ok(())
    }
}

/// A distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// The empty DN (root DSE).
    #[must_use]
    pub const fn root() -> Self {
        Self { rdns: Vec::new() }
    }

    /// Builds a DN from RDNs ordered most specific first.
    #[must_use]
    pub fn from_rdns(rdns: Vec<Rdn>) -> Self {
        Self { rdns }
    }

    /// Parses the RFC 4514 string form.
    ///
    /// Accepts `,` and `;` as RDN separators, `+` between AVAs, backslash
    /// escapes of special characters and hex pairs. Unescaped whitespace
    /// around separators and `=` is ignored. Quoted values and `#`-prefixed
    /// BER values are not supported.
    pub fn parse(input: &str) -> Result<Self> {
        DnParser::new(input).parse()
    }

    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rdns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }

    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// The most specific RDN, `None` for the root DSE.
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// The DN with the leading RDN removed, `None` for the root DSE.
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            None
        } else {
            Some(Dn {
                rdns: self.rdns[1..].to_vec(),
            })
        }
    }

    /// Prepends `rdn`, producing the DN of a child entry.
    #[must_use]
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Dn { rdns }
    }

    /// True when `self` equals `ancestor` or sits below it.
    ///
    /// The comparison is exact; callers comparing user input should
    /// normalize both sides first.
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        self.rdns.len() >= ancestor.rdns.len() && self.rdns.ends_with(&ancestor.rdns)
    }

    /// True when `self` sits exactly one level below `parent`.
    pub fn is_child_of(&self, parent: &Dn) -> bool {
        self.rdns.len() == parent.rdns.len() + 1 && self.rdns.ends_with(&parent.rdns)
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{rdn}")?;
        }
        Ok(())
    }
}

impl FromStr for Dn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Dn {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Dn> for String {
    fn from(dn: Dn) -> Self {
        dn.to_string()
    }
}

/// Escapes an attribute value for the RFC 4514 string form.
pub(crate) fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        match c {
            '"' | '+' | ',' | ';' | '<' | '>' | '\\' | '=' => {
                out.push('\\');
                out.push(c);
            }
            '#' if i == 0 => out.push_str("\\#"),
            ' ' if i == 0 || i == last => out.push_str("\\ "),
            '\0' => out.push_str("\\00"),
            _ => out.push(c),
        }
    }
    out
}

struct DnParser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> DnParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        Error::InvalidDn {
            input: self.input.to_string(),
            reason: reason.into(),
        }
    }

    fn skip_spaces(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos] == b' ' {
            self.pos += 1;
        }
    }

    fn parse(mut self) -> Result<Dn> {
        self.skip_spaces();
        if self.pos == self.bytes.len() {
            return Ok(Dn::root());
        }

        let mut rdns = Vec::new();
        let mut avas = Vec::new();
        loop {
            self.skip_spaces();
            let attr = self.attribute_type()?;
            self.skip_spaces();
            if self.bytes.get(self.pos) != Some(&b'=') {
                return Err(self.error(format!("expected '=' after '{attr}'")));
            }
            self.pos += 1;
            self.skip_spaces();
            let value = self.attribute_value()?;
            avas.push(Ava::new(attr, value));

            match self.bytes.get(self.pos) {
                None => {
                    rdns.push(Rdn {
                        avas: std::mem::take(&mut avas),
                    });
                    break;
                }
                Some(b'+') => self.pos += 1,
                Some(b',') | Some(b';') => {
                    self.pos += 1;
                    rdns.push(Rdn {
                        avas: std::mem::take(&mut avas),
                    });
                }
                Some(other) => {
                    return Err(self.error(format!("unexpected character '{}'", *other as char)));
                }
            }
        }
        Ok(Dn { rdns })
    }

    fn attribute_type(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(&b) = self.bytes.get(self.pos) {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let attr = &self.input[start..self.pos];
        if attr.is_empty() {
            return Err(self.error("empty attribute type"));
        }
        let first = attr.as_bytes()[0];
        if !first.is_ascii_alphanumeric() {
            return Err(self.error(format!(
                "attribute type '{attr}' must start with a letter or digit"
            )));
        }
        Ok(attr.to_string())
    }

    fn attribute_value(&mut self) -> Result<String> {
        let mut value: Vec<u8> = Vec::new();
        // Bytes up to this length came from escapes and survive trailing-space trimming.
        let mut protected = 0;
        if self.bytes.get(self.pos) == Some(&b'"') {
            return Err(self.error("quoted attribute values are not supported"));
        }
        while let Some(&b) = self.bytes.get(self.pos) {
            match b {
                b',' | b';' | b'+' => break,
                b'\\' => {
                    let next = self
                        .bytes
                        .get(self.pos + 1)
                        .copied()
                        .ok_or_else(|| self.error("dangling escape at end of input"))?;
                    if let Some(byte) = self.hex_pair(self.pos + 1) {
                        value.push(byte);
                        self.pos += 3;
                    } else if matches!(
                        next,
                        b'"' | b'+' | b',' | b';' | b'<' | b'>' | b'\\' | b'=' | b'#' | b' '
                    ) {
                        value.push(next);
                        self.pos += 2;
                    } else {
                        return Err(self.error(format!("invalid escape '\\{}'", next as char)));
                    }
                    protected = value.len();
                }
                _ => {
                    value.push(b);
                    self.pos += 1;
                }
            }
        }
        while value.len() > protected && value.last() == Some(&b' ') {
            value.pop();
        }
        String::from_utf8(value).map_err(|_| self.error("value is not valid UTF-8"))
    }

    fn hex_pair(&self, at: usize) -> Option<u8> {
        let hi = (*self.bytes.get(at)? as char).to_digit(16)?;
        let lo = (*self.bytes.get(at + 1)? as char).to_digit(16)?;
        Some((hi * 16 + lo) as u8)
    }
}
