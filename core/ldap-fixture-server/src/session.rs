//! In-process directory operations.
//!
//! A [`CoreSession`] is how anything reaches the partitions: seeding uses
//! the administrator session, and the listener keeps one session per
//! connection. Every operation requires a running service.

use crate::changelog::ChangeKind;
use crate::error::{DirectoryError, DirectoryResult, OperationError};
use crate::service::DirectoryService;
use chrono::Utc;
use ldap_fixture_proto::{Modification, ModifyOperation, ResultCode, WHOAMI_OID};
use ldap_fixture_schema::{AttributeType, ObjectClassKind, SchemaRegistry};
use ldap_fixture_storage::{FilterMatcher, Partition, StorageError, SCHEMA_PARTITION_SUFFIX};
use ldap_fixture_types::{Dn, Entry, Filter, SearchScope};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// `vendorName` of the root DSE.
pub const VENDOR_NAME: &str = "ldap-fixture";

const EXTENSIBLE_OBJECT: &str = "extensibleObject";

/// Attributes holding the DN of the principal that wrote an entry.
const PRINCIPAL_ATTRIBUTES: [&str; 2] = ["creatorsName", "modifiersName"];

/// Who a session acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    /// An authenticated entry, DN as stored.
    User(Dn),
}

impl Principal {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }

    pub fn dn(&self) -> Option<&Dn> {
        match self {
            Principal::Anonymous => None,
            Principal::User(dn) => Some(dn),
        }
    }

    /// Authorization identity as returned by Who Am I: `dn:<dn>`, or empty
    /// for anonymous.
    pub fn authz_id(&self) -> String {
        match self {
            Principal::Anonymous => String::new(),
            Principal::User(dn) => format!("dn:{dn}"),
        }
    }

    fn name(&self) -> String {
        self.dn().map(ToString::to_string).unwrap_or_default()
    }
}

/// Parameters of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub base: String,
    pub scope: SearchScope,
    pub filter: Filter,
    /// Requested attributes; empty means all user attributes.
    pub attributes: Vec<String>,
    /// Maximum number of entries, 0 for no limit.
    pub size_limit: usize,
    pub types_only: bool,
}

impl SearchParams {
    pub fn new(base: impl Into<String>, scope: SearchScope, filter: Filter) -> Self {
        Self {
            base: base.into(),
            scope,
            filter,
            attributes: Vec::new(),
            size_limit: 0,
            types_only: false,
        }
    }

    #[must_use]
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_size_limit(mut self, size_limit: usize) -> Self {
        self.size_limit = size_limit;
        self
    }

    #[must_use]
    pub fn with_types_only(mut self, types_only: bool) -> Self {
        self.types_only = types_only;
        self
    }
}

/// Entries returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOutcome {
    pub entries: Vec<Entry>,
    /// More entries matched than the size limit allowed.
    pub size_limit_exceeded: bool,
}

fn op(code: ResultCode, message: impl Into<String>) -> DirectoryError {
    DirectoryError::Operation(OperationError::new(code, message))
}

fn map_storage(err: StorageError) -> DirectoryError {
    match err {
        StorageError::EntryAlreadyExists(dn) => {
            op(ResultCode::EntryAlreadyExists, format!("entry {dn} already exists"))
        }
        StorageError::NotFound(dn) => op(ResultCode::NoSuchObject, format!("no such entry: {dn}")),
        StorageError::ReadOnly(id) => {
            op(ResultCode::UnwillingToPerform, format!("partition '{id}' is read-only"))
        }
        err @ StorageError::OutsidePartition { .. } => {
            op(ResultCode::NoSuchObject, err.to_string())
        }
        other => DirectoryError::Storage(other),
    }
}

fn generalized_time() -> String {
    Utc::now().format("%Y%m%d%H%M%SZ").to_string()
}

fn parse_dn(registry: &SchemaRegistry, dn: &str) -> DirectoryResult<(Dn, Dn)> {
    let parsed = Dn::parse(dn).map_err(|e| op(ResultCode::InvalidDnSyntax, e.to_string()))?;
    let ndn = normalize_dn(registry, &parsed)?;
    Ok((parsed, ndn))
}

fn normalize_dn(registry: &SchemaRegistry, dn: &Dn) -> DirectoryResult<Dn> {
    registry
        .normalize_dn(dn)
        .map_err(|e| op(ResultCode::InvalidDnSyntax, format!("cannot normalize '{dn}': {e}")))
}

fn resolve_attribute<'r>(
    registry: &'r SchemaRegistry,
    name: &str,
) -> DirectoryResult<&'r AttributeType> {
    registry.attribute_type(name).ok_or_else(|| {
        op(ResultCode::UndefinedAttributeType, format!("undefined attribute type '{name}'"))
    })
}

fn has_value(
    registry: &SchemaRegistry,
    at: &AttributeType,
    values: &[String],
    value: &str,
) -> bool {
    values.iter().any(|v| registry.values_match(at, v, value))
}

/// An operation surface bound to one service and one principal.
pub struct CoreSession {
    service: Arc<DirectoryService>,
    principal: Principal,
}

impl CoreSession {
    pub(crate) fn new(service: Arc<DirectoryService>, principal: Principal) -> Self {
        Self { service, principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn service(&self) -> &Arc<DirectoryService> {
        &self.service
    }

    pub fn who_am_i(&self) -> String {
        self.principal.authz_id()
    }

    fn check_access(&self, operation: &str) -> DirectoryResult<()> {
        if self.principal.is_anonymous() && !self.service.policy().allow_anonymous_access {
            return Err(op(
                ResultCode::InsufficientAccessRights,
                format!("anonymous {operation} is not allowed"),
            ));
        }
        Ok(())
    }

    fn partition_for(&self, ndn: &Dn, dn: &Dn) -> DirectoryResult<Arc<dyn Partition>> {
        self.service
            .route(ndn)
            .ok_or_else(|| op(ResultCode::NoSuchObject, format!("no partition serves {dn}")))
    }

    fn writable_partition_for(&self, ndn: &Dn, dn: &Dn) -> DirectoryResult<Arc<dyn Partition>> {
        let partition = self.partition_for(ndn, dn)?;
        if partition.is_read_only() {
            return Err(op(
                ResultCode::UnwillingToPerform,
                format!("partition '{}' is read-only", partition.id()),
            ));
        }
        Ok(partition)
    }

    /// `noSuchObject` carrying the deepest existing ancestor as matched DN.
    fn no_such_object(&self, partition: &dyn Partition, ndn: &Dn, dn: &Dn) -> DirectoryError {
        let mut err = OperationError::new(ResultCode::NoSuchObject, format!("no such entry: {dn}"));
        let mut current = ndn.parent();
        while let Some(candidate) = current {
            if !candidate.is_descendant_of(partition.normalized_suffix()) {
                break;
            }
            if let Ok(Some(entry)) = partition.lookup(&candidate) {
                err = err.with_matched_dn(entry.dn().to_string());
                break;
            }
            current = candidate.parent();
        }
        DirectoryError::Operation(err)
    }

    fn existing(&self, partition: &dyn Partition, ndn: &Dn, dn: &Dn) -> DirectoryResult<Entry> {
        match partition.lookup(ndn).map_err(map_storage)? {
            Some(entry) => Ok(entry),
            None => Err(self.no_such_object(partition, ndn, dn)),
        }
    }

    /// Simple bind. An empty name with an empty password is an anonymous
    /// bind; a name with an empty password is refused. A failed bind leaves
    /// the session anonymous.
    pub fn bind(&mut self, name: &str, password: &str) -> DirectoryResult<()> {
        let registry = self.service.running_registry("bind")?;
        self.principal = Principal::Anonymous;

        if name.is_empty() {
            if !password.is_empty() {
                return Err(op(ResultCode::InvalidCredentials, "a password requires a bind DN"));
            }
            if !self.service.policy().allow_anonymous_access {
                return Err(op(
                    ResultCode::InappropriateAuthentication,
                    "anonymous access is disabled",
                ));
            }
            return Ok(());
        }
        if password.is_empty() {
            return Err(op(ResultCode::UnwillingToPerform, "unauthenticated bind is not allowed"));
        }

        let invalid = || op(ResultCode::InvalidCredentials, "invalid credentials");
        let dn = Dn::parse(name).map_err(|e| op(ResultCode::InvalidDnSyntax, e.to_string()))?;
        let ndn = registry.normalize_dn(&dn).map_err(|_| invalid())?;
        let partition = self.service.route(&ndn).ok_or_else(invalid)?;
        let entry = partition.lookup(&ndn).map_err(map_storage)?.ok_or_else(invalid)?;
        if !entry.values("userPassword").iter().any(|v| v == password) {
            debug!(dn = %dn, "bind rejected");
            return Err(invalid());
        }
        debug!(dn = %entry.dn(), "bind succeeded");
        self.principal = Principal::User(entry.dn().clone());
        Ok(())
    }

    pub fn add(&self, entry: Entry) -> DirectoryResult<()> {
        let registry = self.service.running_registry("add an entry")?;
        self.check_access("add")?;
        let dn = entry.dn().clone();
        let ndn = normalize_dn(&registry, &dn)?;
        if ndn.is_root() {
            return Err(op(ResultCode::UnwillingToPerform, "the root DSE cannot be added"));
        }
        let partition = self.writable_partition_for(&ndn, &dn)?;

        if &ndn != partition.normalized_suffix() {
            let parent = ndn.parent().unwrap_or_default();
            if partition.lookup(&parent).map_err(map_storage)?.is_none() {
                let requested_parent = dn.parent().unwrap_or_default();
                return Err(self.no_such_object(partition.as_ref(), &parent, &requested_parent));
            }
        }
        if partition.lookup(&ndn).map_err(map_storage)?.is_some() {
            return Err(op(ResultCode::EntryAlreadyExists, format!("entry {dn} already exists")));
        }

        let mut stored = canonicalize(&registry, &entry)?;
        add_rdn_values(&registry, &mut stored);
        check_schema(&registry, &mut stored)?;

        let now = generalized_time();
        let principal = self.principal.name();
        stored.put("creatorsName", [principal.as_str()]);
        stored.put("createTimestamp", [now.as_str()]);
        stored.put("entryUUID", [Uuid::new_v4().to_string()]);

        partition.add(&ndn, &stored).map_err(map_storage)?;
        self.service
            .changelog()
            .record(ChangeKind::Add, &dn.to_string(), &principal, &now);
        debug!(dn = %dn, partition = partition.id(), "entry added");
        Ok(())
    }

    /// Deletes a leaf entry.
    pub fn delete(&self, dn: &str) -> DirectoryResult<()> {
        let registry = self.service.running_registry("delete an entry")?;
        self.check_access("delete")?;
        let (dn, ndn) = parse_dn(&registry, dn)?;
        let partition = self.writable_partition_for(&ndn, &dn)?;
        self.existing(partition.as_ref(), &ndn, &dn)?;
        if partition.has_children(&ndn).map_err(map_storage)? {
            return Err(op(ResultCode::NotAllowedOnNonLeaf, format!("{dn} has children")));
        }
        partition.delete(&ndn).map_err(map_storage)?;
        self.service
            .changelog()
            .record(
                ChangeKind::Delete,
                &dn.to_string(),
                &self.principal.name(),
                &generalized_time(),
            );
        debug!(dn = %dn, "entry deleted");
        Ok(())
    }

    /// Applies the changes in order, then re-validates the whole entry.
    /// Nothing is written unless every change applies.
    pub fn modify(&self, dn: &str, changes: &[Modification]) -> DirectoryResult<()> {
        let registry = self.service.running_registry("modify an entry")?;
        self.check_access("modify")?;
        let (dn, ndn) = parse_dn(&registry, dn)?;
        let partition = self.writable_partition_for(&ndn, &dn)?;
        let mut entry = self.existing(partition.as_ref(), &ndn, &dn)?;

        for change in changes {
            apply_change(&registry, &mut entry, change)?;
        }
        if let Some(rdn) = entry.dn().rdn() {
            for ava in rdn.avas() {
                let Some(at) = registry.attribute_type(ava.attr()) else {
                    continue;
                };
                if !has_value(&registry, at, entry.values(at.primary_name()), ava.value()) {
                    return Err(op(
                        ResultCode::NotAllowedOnRdn,
                        format!("cannot remove naming value {ava} from {dn}"),
                    ));
                }
            }
        }
        check_schema(&registry, &mut entry)?;

        let now = generalized_time();
        let principal = self.principal.name();
        entry.put("modifiersName", [principal.as_str()]);
        entry.put("modifyTimestamp", [now.as_str()]);
        partition.update(&ndn, &entry).map_err(map_storage)?;
        self.service
            .changelog()
            .record(ChangeKind::Modify, &dn.to_string(), &principal, &now);
        debug!(dn = %dn, changes = changes.len(), "entry modified");
        Ok(())
    }

    /// The entry with every attribute, operational ones included. The empty
    /// DN returns the root DSE.
    pub fn lookup(&self, dn: &str) -> DirectoryResult<Option<Entry>> {
        let registry = self.service.running_registry("look up an entry")?;
        let (_, ndn) = parse_dn(&registry, dn)?;
        if ndn.is_root() {
            return Ok(Some(self.root_dse()));
        }
        self.check_access("read")?;
        let Some(partition) = self.service.route(&ndn) else {
            return Ok(None);
        };
        let entry = partition.lookup(&ndn).map_err(map_storage)?;
        Ok(entry.map(|e| self.present(&registry, e)))
    }

    /// True when `attribute` holds `value` under its equality rule.
    pub fn compare(&self, dn: &str, attribute: &str, value: &str) -> DirectoryResult<bool> {
        let registry = self.service.running_registry("compare")?;
        self.check_access("compare")?;
        let at = resolve_attribute(&registry, attribute)?;
        let (dn, ndn) = parse_dn(&registry, dn)?;
        let partition = self.partition_for(&ndn, &dn)?;
        let entry = self.present(&registry, self.existing(partition.as_ref(), &ndn, &dn)?);
        let values = entry.values(at.primary_name());
        if values.is_empty() {
            return Err(op(
                ResultCode::NoSuchAttribute,
                format!("{dn} has no attribute '{}'", at.primary_name()),
            ));
        }
        Ok(has_value(&registry, at, values, value))
    }

    pub fn search(&self, params: &SearchParams) -> DirectoryResult<SearchOutcome> {
        let registry = self.service.running_registry("search")?;
        let (base, ndn) = parse_dn(&registry, &params.base)?;
        let matcher = FilterMatcher::new(&registry);

        let candidates = if ndn.is_root() {
            if params.scope == SearchScope::Base {
                let dse = self.root_dse();
                let entries = if matcher.matches(&params.filter, &dse) {
                    vec![select_attributes(&registry, &dse, &params.attributes, params.types_only)]
                } else {
                    Vec::new()
                };
                return Ok(SearchOutcome {
                    entries,
                    size_limit_exceeded: false,
                });
            }
            self.check_access("search")?;
            // Naming contexts are the children of the root DSE.
            let scope = match params.scope {
                SearchScope::OneLevel => SearchScope::Base,
                other => other,
            };
            let mut all = Vec::new();
            for partition in self.service.partitions() {
                all.extend(
                    partition
                        .search(partition.normalized_suffix(), scope, &params.filter)
                        .map_err(map_storage)?,
                );
            }
            all
        } else {
            self.check_access("search")?;
            let partition = self.partition_for(&ndn, &base)?;
            self.existing(partition.as_ref(), &ndn, &base)?;
            partition
                .search(&ndn, params.scope, &params.filter)
                .map_err(map_storage)?
        };

        let mut outcome = SearchOutcome::default();
        for entry in candidates {
            if params.size_limit > 0 && outcome.entries.len() >= params.size_limit {
                outcome.size_limit_exceeded = true;
                break;
            }
            let entry = self.present(&registry, entry);
            outcome
                .entries
                .push(select_attributes(&registry, &entry, &params.attributes, params.types_only));
        }
        debug!(
            base = %base,
            filter = %params.filter,
            entries = outcome.entries.len(),
            "search complete"
        );
        Ok(outcome)
    }

    fn root_dse(&self) -> Entry {
        Entry::new(Dn::root())
            .with("objectClass", ["top", EXTENSIBLE_OBJECT])
            .with(
                "namingContexts",
                self.service.naming_contexts().iter().map(ToString::to_string),
            )
            .with("subschemaSubentry", [SCHEMA_PARTITION_SUFFIX])
            .with("supportedLDAPVersion", ["3"])
            .with("supportedExtension", [WHOAMI_OID])
            .with("vendorName", [VENDOR_NAME])
            .with("vendorVersion", [env!("CARGO_PKG_VERSION")])
    }

    /// Rewrites principal DNs into OID form unless denormalization is on.
    fn present(&self, registry: &SchemaRegistry, mut entry: Entry) -> Entry {
        if self.service.policy().denormalize_op_attrs {
            return entry;
        }
        for name in PRINCIPAL_ATTRIBUTES {
            let normalized: Vec<String> = entry
                .values(name)
                .iter()
                .map(|v| registry.normalize_value_for(name, v))
                .collect();
            if !normalized.is_empty() {
                entry.put(name, normalized);
            }
        }
        entry
    }
}

/// Copies `entry` with attribute names rewritten to their primary names and
/// aliases merged.
fn canonicalize(registry: &SchemaRegistry, entry: &Entry) -> DirectoryResult<Entry> {
    let mut out = Entry::new(entry.dn().clone());
    for attr in entry.attributes() {
        let at = resolve_attribute(registry, &attr.name)?;
        let name = at.primary_name();
        if at.no_user_modification {
            return Err(op(
                ResultCode::ConstraintViolation,
                format!("attribute '{name}' cannot be set by users"),
            ));
        }
        if attr.values.is_empty() {
            return Err(op(
                ResultCode::ConstraintViolation,
                format!("attribute '{name}' has no values"),
            ));
        }
        for value in &attr.values {
            if has_value(registry, at, out.values(name), value) {
                return Err(op(
                    ResultCode::AttributeOrValueExists,
                    format!("duplicate value '{value}' for '{name}'"),
                ));
            }
            out.add(name, [value.as_str()]);
        }
    }
    Ok(out)
}

fn add_rdn_values(registry: &SchemaRegistry, entry: &mut Entry) {
    let Some(rdn) = entry.dn().rdn().cloned() else {
        return;
    };
    for ava in rdn.avas() {
        let Some(at) = registry.attribute_type(ava.attr()) else {
            continue;
        };
        if !has_value(registry, at, entry.values(at.primary_name()), ava.value()) {
            entry.add(at.primary_name(), [ava.value()]);
        }
    }
}

fn apply_change(
    registry: &SchemaRegistry,
    entry: &mut Entry,
    change: &Modification,
) -> DirectoryResult<()> {
    let at = resolve_attribute(registry, &change.attribute.name)?;
    let name = at.primary_name();
    if at.no_user_modification {
        return Err(op(
            ResultCode::ConstraintViolation,
            format!("attribute '{name}' cannot be modified by users"),
        ));
    }
    let values = &change.attribute.values;
    match change.operation {
        ModifyOperation::Add => {
            for value in values {
                if has_value(registry, at, entry.values(name), value) {
                    return Err(op(
                        ResultCode::AttributeOrValueExists,
                        format!("'{name}' already holds '{value}'"),
                    ));
                }
                entry.add(name, [value.as_str()]);
            }
        }
        ModifyOperation::Delete => {
            if !entry.has_attribute(name) {
                return Err(op(ResultCode::NoSuchAttribute, format!("no attribute '{name}'")));
            }
            if values.is_empty() {
                entry.remove(name);
            }
            for value in values {
                let stored = entry
                    .values(name)
                    .iter()
                    .find(|v| registry.values_match(at, v, value))
                    .cloned();
                let Some(stored) = stored else {
                    return Err(op(
                        ResultCode::NoSuchAttribute,
                        format!("'{name}' has no value '{value}'"),
                    ));
                };
                entry.remove_value(name, &stored);
            }
        }
        ModifyOperation::Replace => {
            let mut unique: Vec<String> = Vec::new();
            for value in values {
                if !has_value(registry, at, &unique, value) {
                    unique.push(value.clone());
                }
            }
            entry.put(name, unique);
        }
    }
    Ok(())
}

/// Checks object classes, MUST/MAY and single-valued attributes, adding any
/// missing superclasses to `objectClass`.
fn check_schema(registry: &SchemaRegistry, entry: &mut Entry) -> DirectoryResult<()> {
    let violation = |message: String| op(ResultCode::ObjectClassViolation, message);
    let declared = entry.values("objectClass").to_vec();
    if declared.is_empty() {
        return Err(violation(format!("{} has no objectClass", entry.dn())));
    }

    let mut classes = BTreeSet::new();
    let mut missing = Vec::new();
    let mut structural = false;
    let mut extensible = false;
    for name in &declared {
        let oc = registry
            .object_class(name)
            .ok_or_else(|| violation(format!("undefined object class '{name}'")))?;
        classes.insert(oc.oid.clone());
        extensible |= oc.names.iter().any(|n| n.eq_ignore_ascii_case(EXTENSIBLE_OBJECT));
        structural |= oc.kind == ObjectClassKind::Structural;
    }
    for name in &declared {
        for sup in registry.superclasses(name) {
            if classes.insert(sup.oid.clone()) {
                missing.push(sup.primary_name().to_string());
            }
        }
    }
    if !structural && !extensible {
        return Err(violation(format!("{} has no structural object class", entry.dn())));
    }
    entry.add("objectClass", missing);

    let class_refs = classes.iter().map(String::as_str);
    let must = registry.must_attributes(class_refs.clone());
    let may = registry.may_attributes(class_refs);
    let present: BTreeSet<&str> = entry
        .attributes()
        .iter()
        .filter_map(|a| registry.attribute_type(&a.name))
        .map(|at| at.oid.as_str())
        .collect();
    if let Some(oid) = must.iter().find(|oid| !present.contains(oid.as_str())) {
        let name = registry.attribute_type(oid).map_or(oid.as_str(), |at| at.primary_name());
        return Err(violation(format!("{} is missing required attribute '{name}'", entry.dn())));
    }

    for attr in entry.attributes() {
        let Some(at) = registry.attribute_type(&attr.name) else {
            continue;
        };
        if !extensible && !at.is_operational() && !may.contains(&at.oid) {
            return Err(violation(format!(
                "attribute '{}' is not allowed by the object classes of {}",
                at.primary_name(),
                entry.dn()
            )));
        }
        if at.single_value && attr.values.len() > 1 {
            return Err(op(
                ResultCode::ConstraintViolation,
                format!("attribute '{}' is single-valued", at.primary_name()),
            ));
        }
    }
    Ok(())
}

/// Projects an entry onto the requested attributes: `*` for user
/// attributes, `+` for operational ones, `1.1` for none, or explicit names
/// (subtypes included).
fn select_attributes(
    registry: &SchemaRegistry,
    entry: &Entry,
    requested: &[String],
    types_only: bool,
) -> Entry {
    let all_user = requested.is_empty() || requested.iter().any(|a| a == "*");
    let all_operational = requested.iter().any(|a| a == "+");
    let explicit: Vec<&AttributeType> = requested
        .iter()
        .filter(|a| !matches!(a.as_str(), "*" | "+" | "1.1"))
        .filter_map(|a| registry.attribute_type(a))
        .collect();

    let mut out = Entry::new(entry.dn().clone());
    for attr in entry.attributes() {
        let at = registry.attribute_type(&attr.name);
        let operational = at.is_some_and(AttributeType::is_operational);
        let wanted = (if operational { all_operational } else { all_user })
            || at.is_some_and(|at| {
                explicit.iter().any(|want| registry.is_subtype_of(&at.oid, &want.oid))
            })
            || requested.iter().any(|r| r.eq_ignore_ascii_case(&attr.name));
        if !wanted {
            continue;
        }
        if types_only {
            out.add(&attr.name, std::iter::empty::<String>());
        } else {
            out.add(&attr.name, attr.values.iter().map(String::as_str));
        }
    }
    out
}
