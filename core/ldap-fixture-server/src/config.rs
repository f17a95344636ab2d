//! Fixture configuration, optionally read from a TOML file.
//!
//! ```toml
//! root_dn = "dc=example,dc=com"
//! port = 10389
//! allow_anonymous_access = true
//!
//! [[partitions]]
//! id = "people"
//! suffix = "o=people"
//! indexes = ["uid", "mail"]
//!
//! [seed_user]
//! cn = "TestUser"
//! sn = "User"
//! password = "letmein"
//! ```

use crate::error::{DirectoryError, DirectoryResult};
use crate::service::ServicePolicy;
use ldap_fixture_types::Dn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Port the runner listens on when none is given.
pub const DEFAULT_PORT: u16 = 10389;

/// An extra application partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub id: String,
    pub suffix: String,
    #[serde(default)]
    pub indexes: Vec<String>,
}

/// The test user created under the root DN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedUserConfig {
    #[serde(default = "default_seed_cn")]
    pub cn: String,
    #[serde(default = "default_seed_sn")]
    pub sn: String,
    #[serde(default = "default_seed_password")]
    pub password: String,
}

fn default_seed_cn() -> String {
    "TestUser".to_string()
}

fn default_seed_sn() -> String {
    "User".to_string()
}

fn default_seed_password() -> String {
    "letmein".to_string()
}

impl Default for SeedUserConfig {
    fn default() -> Self {
        Self {
            cn: default_seed_cn(),
            sn: default_seed_sn(),
            password: default_seed_password(),
        }
    }
}

/// Everything needed to build and serve one fixture instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureConfig {
    #[serde(default = "default_root_dn")]
    pub root_dn: String,
    /// Id of the partition serving `root_dn`.
    #[serde(default = "default_root_partition_id")]
    pub root_partition_id: String,
    #[serde(default = "default_root_indexes")]
    pub root_indexes: Vec<String>,
    /// Instance root. When unset, every fixture gets its own fresh
    /// directory under the system temp dir.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub allow_anonymous_access: bool,
    #[serde(default)]
    pub changelog_enabled: bool,
    #[serde(default = "default_true")]
    pub denormalize_op_attrs: bool,
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
    #[serde(default)]
    pub partitions: Vec<PartitionConfig>,
    #[serde(default)]
    pub seed_user: SeedUserConfig,
}

fn default_root_dn() -> String {
    "dc=liftweb,dc=net".to_string()
}

fn default_root_partition_id() -> String {
    "lift-ldap".to_string()
}

fn default_root_indexes() -> Vec<String> {
    ["objectClass", "ou", "uid", "sn"].map(String::from).to_vec()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true() -> bool {
    true
}

fn default_admin_password() -> String {
    "secret".to_string()
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            root_dn: default_root_dn(),
            root_partition_id: default_root_partition_id(),
            root_indexes: default_root_indexes(),
            work_dir: None,
            port: default_port(),
            allow_anonymous_access: true,
            changelog_enabled: false,
            denormalize_op_attrs: true,
            admin_password: default_admin_password(),
            partitions: Vec::new(),
            seed_user: SeedUserConfig::default(),
        }
    }
}

impl FixtureConfig {
    /// Defaults with the given root DN.
    pub fn with_root_dn(root_dn: impl Into<String>) -> Self {
        Self {
            root_dn: root_dn.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(contents: &str) -> DirectoryResult<Self> {
        let config: FixtureConfig =
            toml::from_str(contents).map_err(|e| DirectoryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> DirectoryResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| DirectoryError::Filesystem {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        info!(path = %path.display(), "loaded fixture configuration");
        Ok(config)
    }

    /// The configured working directory, or a new unique path under the
    /// system temp dir.
    pub fn resolve_work_dir(&self) -> PathBuf {
        match &self.work_dir {
            Some(path) => path.clone(),
            None => std::env::temp_dir().join(format!("ldap-fixture-{}", Uuid::new_v4().simple())),
        }
    }

    /// Checks what can be checked without a schema: DN syntax and ids.
    pub fn validate(&self) -> DirectoryResult<()> {
        let root = Dn::parse(&self.root_dn).map_err(|e| DirectoryError::Config(e.to_string()))?;
        if root.is_root() {
            return Err(DirectoryError::Config("root DN must not be empty".into()));
        }
        if self.root_partition_id.trim().is_empty() {
            return Err(DirectoryError::Config("root partition id must not be empty".into()));
        }
        for partition in &self.partitions {
            if partition.id.trim().is_empty() {
                return Err(DirectoryError::Config(format!(
                    "partition with suffix '{}' has an empty id",
                    partition.suffix
                )));
            }
            Dn::parse(&partition.suffix).map_err(|e| DirectoryError::Config(e.to_string()))?;
        }
        Ok(())
    }

    /// Service policy flags derived from this configuration.
    pub fn policy(&self) -> ServicePolicy {
        ServicePolicy {
            changelog_enabled: self.changelog_enabled,
            denormalize_op_attrs: self.denormalize_op_attrs,
            allow_anonymous_access: self.allow_anonymous_access,
            admin_password: self.admin_password.clone(),
        }
    }
}
