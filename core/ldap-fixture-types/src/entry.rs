//! Directory entries.

use crate::Dn;
use serde::{Deserialize, Serialize};

/// A named attribute with its values, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<String>,
}

impl Attribute {
    pub fn new<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// A directory entry: a DN plus its attributes.
///
/// Attribute names are matched ASCII case-insensitively. Aliases such as
/// `commonName` for `cn` are not resolved here; the service canonicalizes
/// names against the schema before storing an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    dn: Dn,
    attributes: Vec<Attribute>,
}

impl Entry {
    #[must_use]
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            attributes: Vec::new(),
        }
    }

    /// An entry holding `attributes` exactly as given: repeated names and
    /// values are kept so the caller can reject them.
    #[must_use]
    pub fn from_attributes(dn: Dn, attributes: Vec<Attribute>) -> Self {
        Self { dn, attributes }
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn set_dn(&mut self, dn: Dn) {
        self.dn = dn;
    }

    /// Adds values to `name`, creating the attribute if needed. Values
    /// already present are skipped.
    pub fn add<I, V>(&mut self, name: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let idx = match self.position(name) {
            Some(idx) => idx,
            None => {
                self.attributes.push(Attribute::new(name, Vec::<String>::new()));
                self.attributes.len() - 1
            }
        };
        let attr = &mut self.attributes[idx];
        for value in values {
            let value = value.into();
            if !attr.values.contains(&value) {
                attr.values.push(value);
            }
        }
        self
    }

    /// Builder form of [`Entry::add`].
    #[must_use]
    pub fn with<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.add(name, values);
        self
    }

    /// Replaces every value of `name`. An empty value list removes it.
    pub fn put<I, V>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.remove(name);
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if !values.is_empty() {
            self.add(name, values);
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        self.position(name).map(|idx| self.attributes.remove(idx))
    }

    /// Removes one value, dropping the attribute once it has none left.
    /// Returns whether the value was present.
    pub fn remove_value(&mut self, name: &str, value: &str) -> bool {
        let Some(idx) = self.position(name) else {
            return false;
        };
        let attr = &mut self.attributes[idx];
        let before = attr.values.len();
        attr.values.retain(|v| v != value);
        let removed = attr.values.len() != before;
        if attr.values.is_empty() {
            self.attributes.remove(idx);
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.position(name).map(|idx| &self.attributes[idx])
    }

    /// All values of `name`; empty when the attribute is absent.
    pub fn values(&self, name: &str) -> &[String] {
        self.get(name).map(|a| a.values.as_slice()).unwrap_or(&[])
    }

    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(String::as_str)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Exact (case-sensitive) value membership.
    pub fn contains_value(&self, name: &str, value: &str) -> bool {
        self.values(name).iter().any(|v| v == value)
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn into_attributes(self) -> Vec<Attribute> {
        self.attributes
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.attributes
            .iter()
            .position(|a| a.name.eq_ignore_ascii_case(name))
    }
}
