//! The resolved, queryable schema.
//!
//! Names and OIDs are resolved ASCII case-insensitively. Attribute
//! descriptions may carry options (`userCertificate;binary`); the options are
//! ignored for lookup.

use crate::definition::{AttributeUsage, MatchingRule, ObjectClassKind};
use crate::error::ResolveError;
use ldap_fixture_types::{Ava, Dn, Rdn};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// A resolved attribute type. `superior` and every reference are OIDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeType {
    pub oid: String,
    pub names: Vec<String>,
    pub superior: Option<String>,
    /// Equality rule after inheritance from the superior chain.
    pub equality: MatchingRule,
    pub single_value: bool,
    pub no_user_modification: bool,
    pub usage: AttributeUsage,
    /// Name of the schema that defined this type.
    pub schema: String,
}

impl AttributeType {
    pub fn primary_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.oid)
    }

    pub fn is_operational(&self) -> bool {
        self.usage.is_operational()
    }

    /// True if `name` is this type's OID or one of its names.
    pub fn has_name(&self, name: &str) -> bool {
        self.oid.eq_ignore_ascii_case(name)
            || self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }
}

/// A resolved object class. Superiors, MUST and MAY are OIDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectClass {
    pub oid: String,
    pub names: Vec<String>,
    pub superiors: Vec<String>,
    pub kind: ObjectClassKind,
    pub must: Vec<String>,
    pub may: Vec<String>,
    pub schema: String,
}

impl ObjectClass {
    pub fn primary_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.oid)
    }
}

/// Attribute types and object classes of every enabled schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    attribute_types: HashMap<String, AttributeType>,
    attribute_names: HashMap<String, String>,
    object_classes: HashMap<String, ObjectClass>,
    object_class_names: HashMap<String, String>,
    schemas: Vec<String>,
}

impl SchemaRegistry {
    pub(crate) fn empty() -> Self {
        Self::default()
    }

    /// Builds a registry from the bundled schema set without touching disk.
    pub fn bundled() -> Result<Self, crate::SchemaLoadError> {
        let mut files = Vec::new();
        let mut errors = Vec::new();
        for (name, json) in crate::assets::BUNDLED_SCHEMAS {
            match crate::SchemaFile::from_json(json) {
                Ok(file) => files.push(file),
                Err(e) => errors.push(crate::SchemaError::Malformed {
                    path: (*name).into(),
                    reason: e.to_string(),
                }),
            }
        }
        crate::loader::build_registry(files, errors)
    }

    /// Builds a registry from already-parsed schema documents.
    pub fn from_schemas(files: Vec<crate::SchemaFile>) -> Result<Self, crate::SchemaLoadError> {
        crate::loader::build_registry(files, Vec::new())
    }

    pub(crate) fn insert_attribute_type(&mut self, at: AttributeType) {
        for key in std::iter::once(&at.oid).chain(at.names.iter()) {
            self.attribute_names.insert(key.to_ascii_lowercase(), at.oid.clone());
        }
        self.attribute_types.insert(at.oid.clone(), at);
    }

    pub(crate) fn insert_object_class(&mut self, oc: ObjectClass) {
        for key in std::iter::once(&oc.oid).chain(oc.names.iter()) {
            self.object_class_names.insert(key.to_ascii_lowercase(), oc.oid.clone());
        }
        self.object_classes.insert(oc.oid.clone(), oc);
    }

    pub(crate) fn set_schema_names(&mut self, names: Vec<String>) {
        self.schemas = names;
    }

    /// Names of the loaded schemas in dependency order.
    pub fn schema_names(&self) -> &[String] {
        &self.schemas
    }

    pub fn attribute_type_count(&self) -> usize {
        self.attribute_types.len()
    }

    pub fn object_class_count(&self) -> usize {
        self.object_classes.len()
    }

    /// Looks up an attribute type by name, alias or OID.
    pub fn attribute_type(&self, name: &str) -> Option<&AttributeType> {
        let base = name.split(';').next().unwrap_or(name);
        self.attribute_names
            .get(&base.to_ascii_lowercase())
            .and_then(|oid| self.attribute_types.get(oid))
    }

    pub fn object_class(&self, name: &str) -> Option<&ObjectClass> {
        self.object_class_names
            .get(&name.to_ascii_lowercase())
            .and_then(|oid| self.object_classes.get(oid))
    }

    pub fn resolve_attribute(&self, name: &str) -> Result<&AttributeType, ResolveError> {
        self.attribute_type(name)
            .ok_or_else(|| ResolveError::UndefinedAttributeType(name.to_string()))
    }

    pub fn resolve_object_class(&self, name: &str) -> Result<&ObjectClass, ResolveError> {
        self.object_class(name)
            .ok_or_else(|| ResolveError::UndefinedObjectClass(name.to_string()))
    }

    pub fn attribute_types(&self) -> impl Iterator<Item = &AttributeType> {
        self.attribute_types.values()
    }

    pub fn object_classes(&self) -> impl Iterator<Item = &ObjectClass> {
        self.object_classes.values()
    }

    /// `oc` and every class above it, nearest first, without duplicates.
    pub fn superclasses(&self, oc: &str) -> Vec<&ObjectClass> {
        let mut out: Vec<&ObjectClass> = Vec::new();
        let mut queue: Vec<&str> = vec![oc];
        while let Some(name) = queue.pop() {
            let Some(class) = self.object_class(name) else {
                continue;
            };
            if out.iter().any(|c| c.oid == class.oid) {
                continue;
            }
            out.push(class);
            for sup in class.superiors.iter().rev() {
                queue.push(sup);
            }
        }
        out
    }

    /// OIDs of attributes required by the given classes, including inherited ones.
    pub fn must_attributes<'a>(
        &self,
        classes: impl IntoIterator<Item = &'a str>,
    ) -> BTreeSet<String> {
        classes
            .into_iter()
            .flat_map(|oc| self.superclasses(oc))
            .flat_map(|class| class.must.iter().cloned())
            .collect()
    }

    /// OIDs of attributes allowed by the given classes, MUST included.
    pub fn may_attributes<'a>(
        &self,
        classes: impl IntoIterator<Item = &'a str>,
    ) -> BTreeSet<String> {
        classes
            .into_iter()
            .flat_map(|oc| self.superclasses(oc))
            .flat_map(|class| class.must.iter().chain(class.may.iter()).cloned())
            .collect()
    }

    /// True when `at` equals `ancestor` or derives from it through `SUP`.
    pub fn is_subtype_of(&self, at: &str, ancestor: &str) -> bool {
        let Some(target) = self.attribute_type(ancestor) else {
            return false;
        };
        let mut current = self.attribute_type(at);
        let mut hops = 0;
        while let Some(t) = current {
            if t.oid == target.oid {
                return true;
            }
            hops += 1;
            if hops > self.attribute_types.len() {
                return false;
            }
            current = t.superior.as_deref().and_then(|s| self.attribute_type(s));
        }
        false
    }

    /// Normalizes a value using the attribute's equality rule.
    pub fn normalize_value(&self, at: &AttributeType, value: &str) -> String {
        match at.equality {
            MatchingRule::CaseIgnoreMatch => collapse_spaces(value).to_lowercase(),
            MatchingRule::CaseExactMatch => collapse_spaces(value),
            MatchingRule::OctetStringMatch => value.to_string(),
            MatchingRule::DistinguishedNameMatch => match Dn::parse(value) {
                Ok(dn) => match self.normalize_dn(&dn) {
                    Ok(ndn) => ndn.to_string(),
                    Err(_) => collapse_spaces(value).to_lowercase(),
                },
                Err(_) => collapse_spaces(value).to_lowercase(),
            },
            MatchingRule::IntegerMatch => {
                let trimmed = value.trim();
                trimmed
                    .parse::<i128>()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|_| trimmed.to_string())
            }
            MatchingRule::GeneralizedTimeMatch => value.trim().to_ascii_uppercase(),
            MatchingRule::BooleanMatch => value.trim().to_ascii_uppercase(),
            MatchingRule::ObjectIdentifierMatch => {
                let trimmed = value.trim();
                if let Some(oc) = self.object_class(trimmed) {
                    oc.oid.clone()
                } else if let Some(t) = self.attribute_type(trimmed) {
                    t.oid.clone()
                } else {
                    trimmed.to_ascii_lowercase()
                }
            }
        }
    }

    /// Normalizes a value by attribute name; unknown attributes fall back
    /// to case-insensitive comparison.
    pub fn normalize_value_for(&self, attr: &str, value: &str) -> String {
        match self.attribute_type(attr) {
            Some(at) => self.normalize_value(at, value),
            None => collapse_spaces(value).to_lowercase(),
        }
    }

    /// Equality under the attribute's matching rule.
    pub fn values_match(&self, at: &AttributeType, a: &str, b: &str) -> bool {
        self.normalize_value(at, a) == self.normalize_value(at, b)
    }

    /// Ordering under the attribute's matching rule, used by `>=` and `<=`.
    pub fn compare_values(&self, at: &AttributeType, a: &str, b: &str) -> Ordering {
        if at.equality == MatchingRule::IntegerMatch
            && let (Ok(x), Ok(y)) = (a.trim().parse::<i128>(), b.trim().parse::<i128>())
        {
            return x.cmp(&y);
        }
        self.normalize_value(at, a).cmp(&self.normalize_value(at, b))
    }

    /// Rewrites every AVA as `oid=normalized value`, with multi-valued RDNs
    /// sorted so equal names compare equal.
    pub fn normalize_dn(&self, dn: &Dn) -> Result<Dn, ResolveError> {
        let mut rdns = Vec::with_capacity(dn.len());
        for rdn in dn.rdns() {
            let mut avas = Vec::with_capacity(rdn.avas().len());
            for ava in rdn.avas() {
                let at = self.resolve_attribute(ava.attr())?;
                let value = self.normalize_value(at, ava.value());
                avas.push(Ava::new(at.oid.to_ascii_lowercase(), value));
            }
            avas.sort();
            rdns.push(Rdn::from_avas(avas)?);
        }
        Ok(Dn::from_rdns(rdns))
    }

    /// Parses and normalizes a DN string.
    pub fn normalize_dn_str(&self, dn: &str) -> Result<Dn, ResolveError> {
        self.normalize_dn(&Dn::parse(dn)?)
    }

    /// Rewrites attribute types in a DN to their primary names, keeping values as written.
    pub fn canonical_dn(&self, dn: &Dn) -> Dn {
        let rdns = dn
            .rdns()
            .iter()
            .map(|rdn| {
                let avas = rdn
                    .avas()
                    .iter()
                    .map(|ava| match self.attribute_type(ava.attr()) {
                        Some(at) => Ava::new(at.primary_name(), ava.value()),
                        None => ava.clone(),
                    })
                    .collect();
                Rdn::from_avas(avas).unwrap_or_else(|_| rdn.clone())
            })
            .collect();
        Dn::from_rdns(rdns)
    }
}

/// Trims and collapses internal whitespace runs to one space.
fn collapse_spaces(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
