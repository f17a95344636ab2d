//! Schema-aware filter evaluation.

use ldap_fixture_schema::{AttributeType, MatchingRule, SchemaRegistry};
use ldap_fixture_types::{Entry, Filter};
use std::cmp::Ordering;

/// Evaluates search filters against entries.
///
/// An assertion on `name` also matches its subtypes (`cn`, `sn`, ...). Values
/// are compared under the attribute's equality rule. Assertions on attribute
/// types the schema does not know fall back to case-insensitive names and
/// values.
#[derive(Clone, Copy)]
pub struct FilterMatcher<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> FilterMatcher<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    pub fn matches(&self, filter: &Filter, entry: &Entry) -> bool {
        match filter {
            Filter::And(items) => items.iter().all(|f| self.matches(f, entry)),
            Filter::Or(items) => items.iter().any(|f| self.matches(f, entry)),
            Filter::Not(inner) => !self.matches(inner, entry),
            Filter::Present(attr) => self.values(entry, attr).next().is_some(),
            Filter::Equality(attr, value) | Filter::Approx(attr, value) => {
                self.any_value(entry, attr, |at, v| match at {
                    Some(at) => self.registry.values_match(at, v, value),
                    None => v.eq_ignore_ascii_case(value),
                })
            }
            Filter::GreaterOrEqual(attr, value) => self.any_value(entry, attr, |at, v| {
                self.compare(at, v, value) != Ordering::Less
            }),
            Filter::LessOrEqual(attr, value) => self.any_value(entry, attr, |at, v| {
                self.compare(at, v, value) != Ordering::Greater
            }),
            Filter::Substrings {
                attr,
                initial,
                any,
                final_value,
            } => self.any_value(entry, attr, |at, v| {
                let v = fold(at, v);
                substring_match(
                    &v,
                    initial.as_deref().map(|s| fold(at, s)).as_deref(),
                    &any.iter().map(|s| fold(at, s)).collect::<Vec<_>>(),
                    final_value.as_deref().map(|s| fold(at, s)).as_deref(),
                )
            }),
        }
    }

    fn compare(&self, at: Option<&AttributeType>, a: &str, b: &str) -> Ordering {
        match at {
            Some(at) => self.registry.compare_values(at, a, b),
            None => a.to_lowercase().cmp(&b.to_lowercase()),
        }
    }

    fn any_value<F>(&self, entry: &Entry, attr: &str, mut pred: F) -> bool
    where
        F: FnMut(Option<&AttributeType>, &str) -> bool,
    {
        let at = self.registry.attribute_type(attr);
        self.values(entry, attr).any(|v| pred(at, v))
    }

    /// Values of `attr` and of every subtype of it.
    fn values<'e>(&self, entry: &'e Entry, attr: &str) -> impl Iterator<Item = &'e str> {
        let registry = self.registry;
        let wanted = registry.attribute_type(attr).map(|at| at.oid.clone());
        let attr = attr.to_string();
        entry
            .attributes()
            .iter()
            .filter(move |a| match &wanted {
                Some(oid) => registry.is_subtype_of(&a.name, oid),
                None => a.name.eq_ignore_ascii_case(&attr),
            })
            .flat_map(|a| a.values.iter().map(String::as_str))
    }
}

fn fold(at: Option<&AttributeType>, value: &str) -> String {
    match at.map(|a| a.equality) {
        Some(MatchingRule::CaseExactMatch | MatchingRule::OctetStringMatch) => value.to_string(),
        _ => value.to_lowercase(),
    }
}

fn substring_match(
    value: &str,
    initial: Option<&str>,
    any: &[String],
    final_value: Option<&str>,
) -> bool {
    let mut rest = value;
    if let Some(initial) = initial {
        match rest.strip_prefix(initial) {
            Some(r) => rest = r,
            None => return false,
        }
    }
    for piece in any {
        match rest.find(piece.as_str()) {
            Some(pos) => rest = &rest[pos + piece.len()..],
            None => return false,
        }
    }
    match final_value {
        Some(f) => rest.ends_with(f),
        None => true,
    }
}
