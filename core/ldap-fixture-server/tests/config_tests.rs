use ldap_fixture_server::seed::{baseline_entries, DEFAULT_ROOT_DC};
use ldap_fixture_server::{
    DirectoryError, FixtureConfig, PartitionConfig, SeedUserConfig, DEFAULT_PORT,
};
use ldap_fixture_types::Dn;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

// ── Defaults ────────────────────────────────────────────────────

#[test]
fn defaults_match_the_stock_fixture() {
    let config = FixtureConfig::default();
    assert_eq!(config.root_dn, "dc=liftweb,dc=net");
    assert_eq!(config.root_partition_id, "lift-ldap");
    assert_eq!(config.root_indexes, vec!["objectClass", "ou", "uid", "sn"]);
    assert_eq!(config.port, DEFAULT_PORT);
    assert!(config.allow_anonymous_access);
    assert!(!config.changelog_enabled);
    assert!(config.denormalize_op_attrs);
    assert_eq!(config.seed_user, SeedUserConfig::default());
    assert_eq!(config.work_dir, None);
}

#[test]
fn unset_work_dir_resolves_to_a_fresh_temp_path() {
    let config = FixtureConfig::default();
    let first = config.resolve_work_dir();
    let second = config.resolve_work_dir();
    assert_ne!(first, second);
    assert!(first.starts_with(std::env::temp_dir()));
}

#[test]
fn explicit_work_dir_is_used_as_is() {
    let config = FixtureConfig {
        work_dir: Some("/var/tmp/fixture".into()),
        ..FixtureConfig::default()
    };
    assert_eq!(config.resolve_work_dir(), std::path::PathBuf::from("/var/tmp/fixture"));
}

#[test]
fn policy_mirrors_flags() {
    let config = FixtureConfig {
        changelog_enabled: true,
        allow_anonymous_access: false,
        admin_password: "pw".into(),
        ..FixtureConfig::default()
    };
    let policy = config.policy();
    assert!(policy.changelog_enabled);
    assert!(!policy.allow_anonymous_access);
    assert!(policy.denormalize_op_attrs);
    assert_eq!(policy.admin_password, "pw");
}

// ── TOML ────────────────────────────────────────────────────────

#[test]
fn parses_partial_toml() {
    let config = FixtureConfig::from_toml_str(
        r#"
        root_dn = "dc=example,dc=com"
        changelog_enabled = true

        [[partitions]]
        id = "people"
        suffix = "o=people"
        indexes = ["uid"]

        [seed_user]
        cn = "Jane"
        "#,
    )
    .unwrap();
    assert_eq!(config.root_dn, "dc=example,dc=com");
    assert!(config.changelog_enabled);
    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(
        config.partitions,
        vec![PartitionConfig {
            id: "people".into(),
            suffix: "o=people".into(),
            indexes: vec!["uid".into()],
        }]
    );
    assert_eq!(config.seed_user.cn, "Jane");
    assert_eq!(config.seed_user.password, "letmein");
}

#[test]
fn malformed_toml_is_a_config_error() {
    let err = FixtureConfig::from_toml_str("port = \"not a number\"").unwrap_err();
    assert!(matches!(err, DirectoryError::Config(_)));
}

#[test]
fn invalid_dns_are_config_errors() {
    let err = FixtureConfig::from_toml_str("root_dn = \"\"").unwrap_err();
    assert!(matches!(err, DirectoryError::Config(_)));
    let err = FixtureConfig::from_toml_str("root_dn = \"no equals sign\"").unwrap_err();
    assert!(matches!(err, DirectoryError::Config(_)));
    let err = FixtureConfig::from_toml_str(
        r#"
        [[partitions]]
        id = ""
        suffix = "o=x"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, DirectoryError::Config(_)));
}

#[test]
fn reads_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fixture.toml");
    std::fs::write(&path, "port = 20389\nallow_anonymous_access = false\n").unwrap();

    let config = FixtureConfig::from_file(&path).unwrap();
    assert_eq!(config.port, 20389);
    assert!(!config.allow_anonymous_access);

    let err = FixtureConfig::from_file(dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, DirectoryError::Filesystem { .. }));
}

// ── Baseline entries ────────────────────────────────────────────

#[test]
fn baseline_root_takes_dc_from_root_rdn() {
    let root = Dn::parse("dc=example,dc=com").unwrap();
    let entries = baseline_entries(&root, &SeedUserConfig::default());
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].dn(), &root);
    assert_eq!(entries[0].values("dc"), ["example"]);
    assert_eq!(entries[1].dn().to_string(), "cn=TestUser,dc=example,dc=com");
    assert_eq!(entries[1].values("userPassword"), ["letmein"]);
}

#[test]
fn baseline_root_falls_back_to_default_dc() {
    let root = Dn::parse("o=acme").unwrap();
    let entries = baseline_entries(&root, &SeedUserConfig::default());
    assert_eq!(entries[0].values("dc"), [DEFAULT_ROOT_DC]);
}
