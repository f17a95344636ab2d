//! On-disk schema document format.
//!
//! Each schema is one JSON document. The format is private to this crate;
//! consumers only see the resolved [`crate::SchemaRegistry`] and the schema
//! partition built from these files.

use crate::error::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// File extension of schema documents.
pub const SCHEMA_FILE_EXTENSION: &str = "json";

/// One schema document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaFile {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub attribute_types: Vec<AttributeTypeDef>,
    #[serde(default)]
    pub object_classes: Vec<ObjectClassDef>,
}

fn default_enabled() -> bool {
    true
}

impl SchemaFile {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Reads every schema document in `dir`, sorted by file name.
    ///
    /// Unreadable or malformed files are reported alongside the documents
    /// that did parse, so callers can aggregate every problem at once.
    pub fn read_dir(dir: &Path) -> (Vec<(PathBuf, SchemaFile)>, Vec<SchemaError>) {
        let mut files = Vec::new();
        let mut errors = Vec::new();

        let mut paths: Vec<PathBuf> = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.is_file()
                        && p.extension().and_then(|e| e.to_str()) == Some(SCHEMA_FILE_EXTENSION)
                })
                .collect(),
            Err(e) => {
                errors.push(SchemaError::Unreadable {
                    path: dir.to_path_buf(),
                    reason: e.to_string(),
                });
                return (files, errors);
            }
        };
        paths.sort();

        for path in paths {
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    errors.push(SchemaError::Unreadable {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            match SchemaFile::from_json(&text) {
                Ok(file) => files.push((path, file)),
                Err(e) => errors.push(SchemaError::Malformed {
                    path,
                    reason: e.to_string(),
                }),
            }
        }
        (files, errors)
    }
}

/// Equality matching rules understood by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchingRule {
    CaseIgnoreMatch,
    CaseExactMatch,
    OctetStringMatch,
    DistinguishedNameMatch,
    IntegerMatch,
    GeneralizedTimeMatch,
    ObjectIdentifierMatch,
    BooleanMatch,
}

impl MatchingRule {
    pub fn name(self) -> &'static str {
        match self {
            MatchingRule::CaseIgnoreMatch => "caseIgnoreMatch",
            MatchingRule::CaseExactMatch => "caseExactMatch",
            MatchingRule::OctetStringMatch => "octetStringMatch",
            MatchingRule::DistinguishedNameMatch => "distinguishedNameMatch",
            MatchingRule::IntegerMatch => "integerMatch",
            MatchingRule::GeneralizedTimeMatch => "generalizedTimeMatch",
            MatchingRule::ObjectIdentifierMatch => "objectIdentifierMatch",
            MatchingRule::BooleanMatch => "booleanMatch",
        }
    }
}

/// RFC 4512 attribute usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeUsage {
    #[default]
    UserApplications,
    DirectoryOperation,
    DistributedOperation,
    DsaOperation,
}

impl AttributeUsage {
    pub fn is_operational(self) -> bool {
        self != AttributeUsage::UserApplications
    }

    fn keyword(self) -> &'static str {
        match self {
            AttributeUsage::UserApplications => "userApplications",
            AttributeUsage::DirectoryOperation => "directoryOperation",
            AttributeUsage::DistributedOperation => "distributedOperation",
            AttributeUsage::DsaOperation => "dSAOperation",
        }
    }
}

/// Object class kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClassKind {
    Abstract,
    #[default]
    Structural,
    Auxiliary,
}

impl ObjectClassKind {
    fn keyword(self) -> &'static str {
        match self {
            ObjectClassKind::Abstract => "ABSTRACT",
            ObjectClassKind::Structural => "STRUCTURAL",
            ObjectClassKind::Auxiliary => "AUXILIARY",
        }
    }
}

/// An attribute type definition as written in a schema document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeTypeDef {
    pub oid: String,
    pub names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superior: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equality: Option<MatchingRule>,
    #[serde(default)]
    pub single_value: bool,
    #[serde(default)]
    pub no_user_modification: bool,
    #[serde(default)]
    pub usage: AttributeUsage,
}

impl AttributeTypeDef {
    /// The primary (first) name, falling back to the OID.
    pub fn primary_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.oid)
    }

    /// RFC 4512 `AttributeTypeDescription` string.
    pub fn to_description(&self) -> String {
        let mut out = format!("( {}", self.oid);
        write_names(&mut out, &self.names);
        if let Some(desc) = &self.description {
            let _ = write!(out, " DESC '{desc}'");
        }
        if let Some(sup) = &self.superior {
            let _ = write!(out, " SUP {sup}");
        }
        if let Some(equality) = self.equality {
            let _ = write!(out, " EQUALITY {}", equality.name());
        }
        if self.single_value {
            out.push_str(" SINGLE-VALUE");
        }
        if self.no_user_modification {
            out.push_str(" NO-USER-MODIFICATION");
        }
        if self.usage != AttributeUsage::UserApplications {
            let _ = write!(out, " USAGE {}", self.usage.keyword());
        }
        out.push_str(" )");
        out
    }
}

/// An object class definition as written in a schema document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectClassDef {
    pub oid: String,
    pub names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub superiors: Vec<String>,
    #[serde(default)]
    pub kind: ObjectClassKind,
    #[serde(default)]
    pub must: Vec<String>,
    #[serde(default)]
    pub may: Vec<String>,
}

impl ObjectClassDef {
    pub fn primary_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.oid)
    }

    /// RFC 4512 `ObjectClassDescription` string.
    pub fn to_description(&self) -> String {
        let mut out = format!("( {}", self.oid);
        write_names(&mut out, &self.names);
        if let Some(desc) = &self.description {
            let _ = write!(out, " DESC '{desc}'");
        }
        write_oids(&mut out, "SUP", &self.superiors);
        let _ = write!(out, " {}", self.kind.keyword());
        write_oids(&mut out, "MUST", &self.must);
        write_oids(&mut out, "MAY", &self.may);
        out.push_str(" )");
        out
    }
}

fn write_names(out: &mut String, names: &[String]) {
    match names {
        [] => {}
        [one] => {
            let _ = write!(out, " NAME '{one}'");
        }
        many => {
            out.push_str(" NAME (");
            for name in many {
                let _ = write!(out, " '{name}'");
            }
            out.push_str(" )");
        }
    }
}

fn write_oids(out: &mut String, keyword: &str, oids: &[String]) {
    match oids {
        [] => {}
        [one] => {
            let _ = write!(out, " {keyword} {one}");
        }
        many => {
            let _ = write!(out, " {keyword} ( {} )", many.join(" $ "));
        }
    }
}
