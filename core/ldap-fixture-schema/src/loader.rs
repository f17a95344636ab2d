//! Builds a [`SchemaRegistry`] from schema documents.
//!
//! Loading never stops at the first problem: every error is collected so a
//! broken schema directory can be fixed in one pass.

use crate::definition::{AttributeTypeDef, MatchingRule, SchemaFile};
use crate::error::{SchemaError, SchemaLoadError};
use crate::registry::{AttributeType, ObjectClass, SchemaRegistry};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads the enabled schemas found in a directory.
#[derive(Debug, Clone)]
pub struct SchemaLoader {
    dir: PathBuf,
}

impl SchemaLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads every enabled schema in the directory.
    pub fn load_all_enabled(&self) -> Result<SchemaRegistry, SchemaLoadError> {
        let (files, errors) = SchemaFile::read_dir(&self.dir);
        let files = files.into_iter().map(|(_, file)| file).collect();
        build_registry(files, errors)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Resolves schema documents into a registry, or returns every error found.
pub(crate) fn build_registry(
    files: Vec<SchemaFile>,
    mut errors: Vec<SchemaError>,
) -> Result<SchemaRegistry, SchemaLoadError> {
    let mut by_name: BTreeMap<String, SchemaFile> = BTreeMap::new();
    for file in files {
        let key = file.name.to_ascii_lowercase();
        if by_name.contains_key(&key) {
            errors.push(SchemaError::DuplicateSchema(file.name.clone()));
            continue;
        }
        by_name.insert(key, file);
    }

    // Dependency validation on enabled schemas only.
    let mut edges: HashMap<String, Vec<String>> = HashMap::new();
    for (key, file) in by_name.iter().filter(|(_, f)| f.enabled) {
        let mut deps = Vec::new();
        for dep in &file.dependencies {
            let dep_key = dep.to_ascii_lowercase();
            match by_name.get(&dep_key) {
                None => errors.push(SchemaError::MissingDependency {
                    schema: file.name.clone(),
                    dependency: dep.clone(),
                }),
                Some(d) if !d.enabled => errors.push(SchemaError::DisabledDependency {
                    schema: file.name.clone(),
                    dependency: dep.clone(),
                }),
                Some(_) => deps.push(dep_key),
            }
        }
        edges.insert(key.clone(), deps);
    }

    let mut order = Vec::new();
    let mut marks: HashMap<String, Mark> = HashMap::new();
    let roots: BTreeSet<String> = edges.keys().cloned().collect();
    for key in roots {
        visit(&key, &edges, &mut marks, &mut order, &mut errors, &by_name);
    }

    let mut registry = SchemaRegistry::empty();
    let schemas: Vec<&SchemaFile> = order.iter().filter_map(|k| by_name.get(k)).collect();

    register_attribute_types(&mut registry, &schemas, &mut errors);
    register_object_classes(&mut registry, &schemas, &mut errors);
    registry.set_schema_names(schemas.iter().map(|s| s.name.clone()).collect());

    if errors.is_empty() {
        debug!(
            schemas = registry.schema_names().len(),
            attribute_types = registry.attribute_type_count(),
            object_classes = registry.object_class_count(),
            "schema registry built"
        );
        Ok(registry)
    } else {
        Err(SchemaLoadError::new(errors))
    }
}

fn visit(
    key: &str,
    edges: &HashMap<String, Vec<String>>,
    marks: &mut HashMap<String, Mark>,
    order: &mut Vec<String>,
    errors: &mut Vec<SchemaError>,
    by_name: &BTreeMap<String, SchemaFile>,
) {
    match marks.get(key) {
        Some(Mark::Done) => return,
        Some(Mark::Visiting) => {
            let name = by_name.get(key).map(|f| f.name.clone()).unwrap_or_else(|| key.to_string());
            errors.push(SchemaError::DependencyCycle(name));
            return;
        }
        None => {}
    }
    marks.insert(key.to_string(), Mark::Visiting);
    if let Some(deps) = edges.get(key) {
        for dep in deps {
            visit(dep, edges, marks, order, errors, by_name);
        }
    }
    marks.insert(key.to_string(), Mark::Done);
    order.push(key.to_string());
}

fn register_attribute_types(
    registry: &mut SchemaRegistry,
    schemas: &[&SchemaFile],
    errors: &mut Vec<SchemaError>,
) {
    // First pass: claim OIDs and names.
    let mut pending = Vec::new();
    for schema in schemas {
        for def in &schema.attribute_types {
            let mut taken = false;
            for name in std::iter::once(&def.oid).chain(def.names.iter()) {
                if registry.attribute_type(name).is_some() || pending_has(&pending, name) {
                    errors.push(SchemaError::DuplicateName {
                        schema: schema.name.clone(),
                        name: name.clone(),
                    });
                    taken = true;
                }
            }
            if !taken {
                pending.push((schema.name.clone(), def.clone()));
            }
        }
    }

    let name_to_oid: HashMap<String, String> = pending
        .iter()
        .flat_map(|(_, def)| {
            std::iter::once(def.oid.to_ascii_lowercase())
                .chain(def.names.iter().map(|n| n.to_ascii_lowercase()))
                .map(move |k| (k, def.oid.clone()))
        })
        .collect();
    let raw: HashMap<String, (Option<String>, Option<MatchingRule>)> = pending
        .iter()
        .map(|(_, def)| (def.oid.clone(), (def.superior.clone(), def.equality)))
        .collect();

    // Second pass: resolve superiors and effective equality rules.
    for (schema, def) in pending {
        let element = format!("attribute type '{}'", def.primary_name());
        let superior = match &def.superior {
            Some(sup) => match name_to_oid.get(&sup.to_ascii_lowercase()) {
                Some(oid) => Some(oid.clone()),
                None => {
                    errors.push(SchemaError::UnknownAttributeType {
                        schema: schema.clone(),
                        element,
                        name: sup.clone(),
                    });
                    continue;
                }
            },
            None => None,
        };

        let equality = match effective_equality(&def.oid, &raw, &name_to_oid) {
            Ok(rule) => rule,
            Err(reason) => {
                errors.push(SchemaError::InvalidDefinition {
                    schema: schema.clone(),
                    element,
                    reason,
                });
                continue;
            }
        };

        registry.insert_attribute_type(AttributeType {
            oid: def.oid.clone(),
            names: def.names.clone(),
            superior,
            equality,
            single_value: def.single_value,
            no_user_modification: def.no_user_modification,
            usage: def.usage,
            schema,
        });
    }
}

fn pending_has(pending: &[(String, AttributeTypeDef)], name: &str) -> bool {
    pending.iter().any(|(_, def)| {
        def.oid.eq_ignore_ascii_case(name) || def.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    })
}

/// Walks the superior chain until an explicit equality rule is found.
fn effective_equality(
    oid: &str,
    raw: &HashMap<String, (Option<String>, Option<MatchingRule>)>,
    name_to_oid: &HashMap<String, String>,
) -> Result<MatchingRule, String> {
    let mut seen = HashSet::new();
    let mut current = oid.to_string();
    loop {
        if !seen.insert(current.clone()) {
            return Err("superior chain forms a cycle".into());
        }
        let Some((superior, equality)) = raw.get(&current) else {
            return Ok(MatchingRule::OctetStringMatch);
        };
        if let Some(rule) = equality {
            return Ok(*rule);
        }
        match superior.as_ref().and_then(|s| name_to_oid.get(&s.to_ascii_lowercase())) {
            Some(next) => current = next.clone(),
            None => return Ok(MatchingRule::OctetStringMatch),
        }
    }
}

fn register_object_classes(
    registry: &mut SchemaRegistry,
    schemas: &[&SchemaFile],
    errors: &mut Vec<SchemaError>,
) {
    let mut pending = Vec::new();
    let mut claimed: HashSet<String> = HashSet::new();
    for schema in schemas {
        for def in &schema.object_classes {
            let mut taken = false;
            for name in std::iter::once(&def.oid).chain(def.names.iter()) {
                if !claimed.insert(name.to_ascii_lowercase()) {
                    errors.push(SchemaError::DuplicateName {
                        schema: schema.name.clone(),
                        name: name.clone(),
                    });
                    taken = true;
                }
            }
            if !taken {
                pending.push((schema.name.clone(), def.clone()));
            }
        }
    }

    let name_to_oid: HashMap<String, String> = pending
        .iter()
        .flat_map(|(_, def)| {
            std::iter::once(def.oid.to_ascii_lowercase())
                .chain(def.names.iter().map(|n| n.to_ascii_lowercase()))
                .map(move |k| (k, def.oid.clone()))
        })
        .collect();

    for (schema, def) in pending {
        let element = format!("object class '{}'", def.primary_name());
        let mut valid = true;

        let mut superiors = Vec::new();
        for sup in &def.superiors {
            match name_to_oid.get(&sup.to_ascii_lowercase()) {
                Some(oid) => superiors.push(oid.clone()),
                None => {
                    errors.push(SchemaError::UnknownObjectClass {
                        schema: schema.clone(),
                        element: element.clone(),
                        name: sup.clone(),
                    });
                    valid = false;
                }
            }
        }

        let mut resolve = |names: &[String]| -> Vec<String> {
            let mut oids = Vec::new();
            for name in names {
                match registry.attribute_type(name) {
                    Some(at) => oids.push(at.oid.clone()),
                    None => {
                        errors.push(SchemaError::UnknownAttributeType {
                            schema: schema.clone(),
                            element: element.clone(),
                            name: name.clone(),
                        });
                        valid = false;
                    }
                }
            }
            oids
        };
        let must = resolve(&def.must);
        let may = resolve(&def.may);

        if valid {
            registry.insert_object_class(ObjectClass {
                oid: def.oid.clone(),
                names: def.names.clone(),
                superiors,
                kind: def.kind,
                must,
                may,
                schema,
            });
        }
    }
}
