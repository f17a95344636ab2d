//! The packaged schema asset set.
//!
//! Schema documents are compiled into the binary and written out on first
//! use, mirroring how a server distribution ships its schema files.

use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Bundled schema documents as `(file name, contents)`.
pub const BUNDLED_SCHEMAS: &[(&str, &str)] = &[
    ("system.json", include_str!("../schema/system.json")),
    ("core.json", include_str!("../schema/core.json")),
    ("cosine.json", include_str!("../schema/cosine.json")),
    ("inetorgperson.json", include_str!("../schema/inetorgperson.json")),
    ("nis.json", include_str!("../schema/nis.json")),
];

/// Writes every bundled schema document into `dir`, creating it first.
/// Returns the number of files written.
pub fn extract_bundled(dir: &Path) -> io::Result<usize> {
    fs::create_dir_all(dir)?;
    for (name, contents) in BUNDLED_SCHEMAS {
        fs::write(dir.join(name), contents)?;
        debug!(file = name, "extracted schema file");
    }
    Ok(BUNDLED_SCHEMAS.len())
}
