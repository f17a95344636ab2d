//! Read-only `ou=schema` partition over the extracted schema files.

use crate::error::{StorageError, StorageResult};
use crate::matcher::FilterMatcher;
use crate::partition::{in_scope, Partition};
use ldap_fixture_schema::{ResolveError, SchemaFile, SchemaLoadError, SchemaRegistry};
use ldap_fixture_types::{Dn, Entry, Filter, Rdn, SearchScope};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Fixed id of the schema partition.
pub const SCHEMA_PARTITION_ID: &str = "schema";

/// Fixed suffix of the schema partition.
pub const SCHEMA_PARTITION_SUFFIX: &str = "ou=schema";

/// Exposes every schema document, enabled or not, as a small entry tree:
///
/// ```text
/// ou=schema
///   cn=<schema>
///     ou=attributeTypes   one cn=<oid> entry per attribute type
///     ou=objectClasses    one cn=<oid> entry per object class
/// ```
pub struct SchemaPartition {
    suffix: Dn,
    normalized_suffix: Dn,
    dir: PathBuf,
    registry: Arc<SchemaRegistry>,
    entries: RwLock<Option<BTreeMap<String, (Dn, Entry)>>>,
}

impl SchemaPartition {
    pub fn new(dir: impl Into<PathBuf>, registry: Arc<SchemaRegistry>) -> StorageResult<Self> {
        let suffix = Dn::parse(SCHEMA_PARTITION_SUFFIX).map_err(ResolveError::from)?;
        let normalized_suffix = registry.normalize_dn(&suffix)?;
        Ok(Self {
            suffix,
            normalized_suffix,
            dir: dir.into(),
            registry,
            entries: RwLock::new(None),
        })
    }

    fn build(&self) -> StorageResult<BTreeMap<String, (Dn, Entry)>> {
        let (files, errors) = SchemaFile::read_dir(&self.dir);
        if !errors.is_empty() {
            return Err(StorageError::Schema(SchemaLoadError::new(errors)));
        }

        let mut tree = Vec::new();
        tree.push(
            Entry::new(self.suffix.clone())
                .with("objectClass", ["top", "organizationalUnit"])
                .with("ou", ["schema"]),
        );
        for (_, file) in files {
            let schema_dn = self.suffix.child(Rdn::new("cn", file.name.as_str()));
            let mut schema_entry = Entry::new(schema_dn.clone())
                .with("objectClass", ["top", "subschema", "extensibleObject"])
                .with("cn", [file.name.as_str()]);
            if !file.enabled {
                schema_entry.add("description", ["disabled"]);
            }
            if !file.dependencies.is_empty() {
                let see_also = file.dependencies.iter().map(|d| format!("cn={d},ou=schema"));
                schema_entry.add("seeAlso", see_also);
            }
            tree.push(schema_entry);

            let at_dn = schema_dn.child(Rdn::new("ou", "attributeTypes"));
            tree.push(
                Entry::new(at_dn.clone())
                    .with("objectClass", ["top", "organizationalUnit"])
                    .with("ou", ["attributeTypes"]),
            );
            for def in &file.attribute_types {
                tree.push(
                    Entry::new(at_dn.child(Rdn::new("cn", def.oid.as_str())))
                        .with("objectClass", ["top", "subschema", "extensibleObject"])
                        .with("cn", [def.oid.as_str()])
                        .with("name", def.names.iter().map(String::as_str))
                        .with("attributeTypes", [def.to_description()]),
                );
            }

            let oc_dn = schema_dn.child(Rdn::new("ou", "objectClasses"));
            tree.push(
                Entry::new(oc_dn.clone())
                    .with("objectClass", ["top", "organizationalUnit"])
                    .with("ou", ["objectClasses"]),
            );
            for def in &file.object_classes {
                tree.push(
                    Entry::new(oc_dn.child(Rdn::new("cn", def.oid.as_str())))
                        .with("objectClass", ["top", "subschema", "extensibleObject"])
                        .with("cn", [def.oid.as_str()])
                        .with("name", def.names.iter().map(String::as_str))
                        .with("objectClasses", [def.to_description()]),
                );
            }
        }

        let mut map = BTreeMap::new();
        for entry in tree {
            let ndn = self.registry.normalize_dn(entry.dn())?;
            map.insert(ndn.to_string(), (ndn, entry));
        }
        Ok(map)
    }

    fn read<T>(&self, f: impl FnOnce(&BTreeMap<String, (Dn, Entry)>) -> T) -> StorageResult<T> {
        let guard = self.entries.read().unwrap();
        match guard.as_ref() {
            Some(entries) => Ok(f(entries)),
            None => Err(StorageError::NotOpen(SCHEMA_PARTITION_ID.into())),
        }
    }

    fn read_only(&self) -> StorageError {
        StorageError::ReadOnly(SCHEMA_PARTITION_ID.into())
    }
}

impl Partition for SchemaPartition {
    fn id(&self) -> &str {
        SCHEMA_PARTITION_ID
    }

    fn suffix(&self) -> &Dn {
        &self.suffix
    }

    fn normalized_suffix(&self) -> &Dn {
        &self.normalized_suffix
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.dir)
    }

    fn open(&self) -> StorageResult<()> {
        let entries = self.build()?;
        debug!(entries = entries.len(), dir = %self.dir.display(), "schema partition opened");
        *self.entries.write().unwrap() = Some(entries);
        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        self.entries.write().unwrap().take();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.entries.read().unwrap().is_some()
    }

    fn add_indexes(&self, _attributes: &[&str]) -> StorageResult<()> {
        Err(self.read_only())
    }

    fn indexed_attributes(&self) -> Vec<String> {
        Vec::new()
    }

    fn add(&self, _ndn: &Dn, _entry: &Entry) -> StorageResult<()> {
        Err(self.read_only())
    }

    fn update(&self, _ndn: &Dn, _entry: &Entry) -> StorageResult<()> {
        Err(self.read_only())
    }

    fn delete(&self, _ndn: &Dn) -> StorageResult<()> {
        Err(self.read_only())
    }

    fn lookup(&self, ndn: &Dn) -> StorageResult<Option<Entry>> {
        self.read(|entries| entries.get(&ndn.to_string()).map(|(_, e)| e.clone()))
    }

    fn has_children(&self, ndn: &Dn) -> StorageResult<bool> {
        self.read(|entries| entries.values().any(|(child, _)| child.is_child_of(ndn)))
    }

    fn search(&self, base: &Dn, scope: SearchScope, filter: &Filter) -> StorageResult<Vec<Entry>> {
        let matcher = FilterMatcher::new(&self.registry);
        self.read(|entries| {
            entries
                .values()
                .filter(|(ndn, entry)| in_scope(ndn, base, scope) && matcher.matches(filter, entry))
                .map(|(_, entry)| entry.clone())
                .collect()
        })
    }

    fn is_read_only(&self) -> bool {
        true
    }
}
