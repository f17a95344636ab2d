//! SQLite-backed partition.

use crate::error::{StorageError, StorageResult};
use crate::matcher::FilterMatcher;
use crate::partition::{in_scope, Partition};
use ldap_fixture_schema::SchemaRegistry;
use ldap_fixture_types::{Dn, Entry, Filter, SearchScope};
use rusqlite::{params, Connection, OptionalExtension, Params};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A partition stored in `<dir>/<id>.db`.
///
/// Entries are kept as JSON keyed by normalized DN. Indexed attributes get
/// one row per normalized value in the `idx` table; the table is rebuilt
/// from the entries on every open so index configuration changes apply
/// without migration.
pub struct StorePartition {
    id: String,
    suffix: Dn,
    normalized_suffix: Dn,
    dir: PathBuf,
    registry: Arc<SchemaRegistry>,
    indexes: Mutex<BTreeSet<String>>,
    conn: Mutex<Option<Connection>>,
}

impl StorePartition {
    /// Creates a closed partition. The suffix must normalize under `registry`.
    pub fn new(
        id: impl Into<String>,
        suffix: Dn,
        dir: impl Into<PathBuf>,
        registry: Arc<SchemaRegistry>,
    ) -> StorageResult<Self> {
        let normalized_suffix = registry.normalize_dn(&suffix)?;
        Ok(Self {
            id: id.into(),
            suffix,
            normalized_suffix,
            dir: dir.into(),
            registry,
            indexes: Mutex::new(BTreeSet::new()),
            conn: Mutex::new(None),
        })
    }

    /// Path of the database file.
    pub fn db_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.id, crate::layout::DB_EXTENSION))
    }

    /// Number of rows in the index table.
    pub fn index_row_count(&self) -> StorageResult<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM idx", [], |row| row.get(0))?;
            Ok(n as usize)
        })
    }

    /// Number of stored entries.
    pub fn entry_count(&self) -> StorageResult<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
            Ok(n as usize)
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StorageResult<T>) -> StorageResult<T> {
        let guard = self.conn.lock().unwrap();
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(StorageError::NotOpen(self.id.clone())),
        }
    }

    fn check_inside(&self, ndn: &Dn) -> StorageResult<()> {
        if ndn.is_descendant_of(&self.normalized_suffix) {
            Ok(())
        } else {
            Err(StorageError::OutsidePartition {
                partition: self.id.clone(),
                dn: ndn.to_string(),
            })
        }
    }

    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS entries (
                ndn TEXT PRIMARY KEY,
                dn TEXT NOT NULL,
                parent TEXT NOT NULL,
                entry TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS entries_parent ON entries(parent);

            CREATE TABLE IF NOT EXISTS idx (
                attr TEXT NOT NULL,
                value TEXT NOT NULL,
                ndn TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_lookup ON idx(attr, value);
            CREATE INDEX IF NOT EXISTS idx_ndn ON idx(ndn);
            ",
        )?;
        Ok(())
    }

    /// `(attribute oid, normalized value)` pairs for the configured indexes.
    fn index_keys(&self, entry: &Entry, indexes: &BTreeSet<String>) -> Vec<(String, String)> {
        let mut keys = Vec::new();
        for attr in entry.attributes() {
            let Some(at) = self.registry.attribute_type(&attr.name) else {
                continue;
            };
            if !indexes.contains(&at.oid) {
                continue;
            }
            for value in &attr.values {
                keys.push((at.oid.clone(), self.registry.normalize_value(at, value)));
            }
        }
        keys
    }

    fn write_index(&self, conn: &Connection, ndn: &str, entry: &Entry) -> StorageResult<()> {
        let indexes = self.indexes.lock().unwrap().clone();
        if indexes.is_empty() {
            return Ok(());
        }
        let mut stmt =
            conn.prepare_cached("INSERT INTO idx (attr, value, ndn) VALUES (?1, ?2, ?3)")?;
        for (attr, value) in self.index_keys(entry, &indexes) {
            stmt.execute(params![attr, value, ndn])?;
        }
        Ok(())
    }

    fn rebuild_index(&self, conn: &Connection) -> StorageResult<()> {
        conn.execute("DELETE FROM idx", [])?;
        let rows = query_rows(conn, "SELECT ndn, entry FROM entries", [])?;
        for (ndn, json) in rows {
            let entry: Entry = serde_json::from_str(&json)?;
            self.write_index(conn, &ndn, &entry)?;
        }
        Ok(())
    }

    /// An equality assertion on an indexed attribute, directly or as an AND conjunct.
    fn indexed_key(&self, filter: &Filter) -> Option<(String, String)> {
        let indexes = self.indexes.lock().unwrap();
        let key_of = |f: &Filter| -> Option<(String, String)> {
            if let Filter::Equality(attr, value) = f {
                let at = self.registry.attribute_type(attr)?;
                if indexes.contains(&at.oid) {
                    return Some((at.oid.clone(), self.registry.normalize_value(at, value)));
                }
            }
            None
        };
        match filter {
            Filter::And(items) => items.iter().find_map(key_of),
            other => key_of(other),
        }
    }

    fn decode_rows(rows: Vec<(String, String)>) -> StorageResult<Vec<(Dn, Entry)>> {
        rows.into_iter()
            .map(|(ndn, json)| {
                let ndn = Dn::parse(&ndn).map_err(ldap_fixture_schema::ResolveError::from)?;
                let entry: Entry = serde_json::from_str(&json)?;
                Ok((ndn, entry))
            })
            .collect()
    }
}

impl Partition for StorePartition {
    fn id(&self) -> &str {
        &self.id
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
        let mut guard = self.conn.lock().unwrap();
        if guard.is_some() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir).map_err(|source| StorageError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let conn = Connection::open(self.db_path())?;
        Self::init_schema(&conn)?;
        self.rebuild_index(&conn)?;
        debug!(
            partition = %self.id,
            suffix = %self.suffix,
            indexes = ?self.indexed_attributes(),
            "partition opened"
        );
        *guard = Some(conn);
        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap().take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| StorageError::Database(e))?;
            debug!(partition = %self.id, "partition closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.conn.lock().unwrap().is_some()
    }

    fn add_indexes(&self, attributes: &[&str]) -> StorageResult<()> {
        let oids = attributes
            .iter()
            .map(|name| self.registry.resolve_attribute(name).map(|at| at.oid.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        self.indexes.lock().unwrap().extend(oids);
        Ok(())
    }

    fn indexed_attributes(&self) -> Vec<String> {
        self.indexes.lock().unwrap().iter().cloned().collect()
    }

    fn add(&self, ndn: &Dn, entry: &Entry) -> StorageResult<()> {
        self.check_inside(ndn)?;
        self.with_conn(|conn| {
            let key = ndn.to_string();
            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM entries WHERE ndn = ?1", params![key], |row| row.get(0))
                .optional()?;
            if exists.is_some() {
                return Err(StorageError::EntryAlreadyExists(entry.dn().to_string()));
            }
            let parent = ndn.parent().unwrap_or_default().to_string();
            conn.execute(
                "INSERT INTO entries (ndn, dn, parent, entry) VALUES (?1, ?2, ?3, ?4)",
                params![key, entry.dn().to_string(), parent, serde_json::to_string(entry)?],
            )?;
            self.write_index(conn, &key, entry)
        })
    }

    fn update(&self, ndn: &Dn, entry: &Entry) -> StorageResult<()> {
        self.with_conn(|conn| {
            let key = ndn.to_string();
            let changed = conn.execute(
                "UPDATE entries SET dn = ?2, entry = ?3 WHERE ndn = ?1",
                params![key, entry.dn().to_string(), serde_json::to_string(entry)?],
            )?;
            if changed == 0 {
                return Err(StorageError::NotFound(entry.dn().to_string()));
            }
            conn.execute("DELETE FROM idx WHERE ndn = ?1", params![key])?;
            self.write_index(conn, &key, entry)
        })
    }

    fn delete(&self, ndn: &Dn) -> StorageResult<()> {
        self.with_conn(|conn| {
            let key = ndn.to_string();
            let removed = conn.execute("DELETE FROM entries WHERE ndn = ?1", params![key])?;
            if removed == 0 {
                return Err(StorageError::NotFound(key));
            }
            conn.execute("DELETE FROM idx WHERE ndn = ?1", params![key])?;
            Ok(())
        })
    }

    fn lookup(&self, ndn: &Dn) -> StorageResult<Option<Entry>> {
        self.with_conn(|conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT entry FROM entries WHERE ndn = ?1",
                    params![ndn.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            json.map(|j| serde_json::from_str(&j).map_err(StorageError::from))
                .transpose()
        })
    }

    fn has_children(&self, ndn: &Dn) -> StorageResult<bool> {
        self.with_conn(|conn| {
            let child: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM entries WHERE parent = ?1 LIMIT 1",
                    params![ndn.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(child.is_some())
        })
    }

    fn search(&self, base: &Dn, scope: SearchScope, filter: &Filter) -> StorageResult<Vec<Entry>> {
        let indexed = self.indexed_key(filter);
        let candidates = self.with_conn(|conn| {
            let base_key = base.to_string();
            let rows = if let Some((attr, value)) = &indexed {
                debug!(partition = %self.id, attr = %attr, "search using index");
                query_rows(
                    conn,
                    "SELECT DISTINCT e.ndn, e.entry FROM idx i JOIN entries e ON e.ndn = i.ndn
                     WHERE i.attr = ?1 AND i.value = ?2",
                    params![attr, value],
                )?
            } else {
                let sql = match scope {
                    SearchScope::Base => "SELECT ndn, entry FROM entries WHERE ndn = ?1",
                    SearchScope::OneLevel => "SELECT ndn, entry FROM entries WHERE parent = ?1",
                    SearchScope::Subtree => {
                        "SELECT ndn, entry FROM entries
                         WHERE ndn = ?1 OR substr(ndn, -length(?1) - 1) = ',' || ?1
                         ORDER BY length(ndn), ndn"
                    }
                };
                query_rows(conn, sql, params![base_key])?
            };
            Self::decode_rows(rows)
        })?;

        let matcher = FilterMatcher::new(&self.registry);
        Ok(candidates
            .into_iter()
            .filter(|(ndn, entry)| in_scope(ndn, base, scope) && matcher.matches(filter, entry))
            .map(|(_, entry)| entry)
            .collect())
    }
}

/// Runs a query returning `(ndn, entry json)` rows.
fn query_rows(
    conn: &Connection,
    sql: &str,
    params: impl Params,
) -> StorageResult<Vec<(String, String)>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt
        .query_map(params, |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl std::fmt::Debug for StorePartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorePartition")
            .field("id", &self.id)
            .field("suffix", &self.suffix.to_string())
            .field("dir", &self.dir)
            .field("open", &self.is_open())
            .finish()
    }
}
