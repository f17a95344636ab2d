//! End-to-end tests driving the fixture with a real LDAP client.

use ldap3::exop::{WhoAmI, WhoAmIResp};
use ldap3::{Ldap, LdapConnAsync, Mod, Scope, SearchEntry, SearchOptions};
use futures::SinkExt;
use ldap_fixture_proto::{
    AddRequest, BindAuth, BindRequest, LdapCodec, LdapMessage, ProtocolOp, ResultCode,
};
use ldap_fixture_server::{
    DirectoryError, EmbeddedDirectory, FixtureConfig, PartitionConfig, ServiceState, ADMIN_DN,
};
use ldap_fixture_types::{Attribute, Dn, Entry};
use pretty_assertions::assert_eq;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio_util::codec::FramedWrite;

const ROOT: &str = "dc=liftweb,dc=net";
const TEST_USER: &str = "cn=TestUser,dc=liftweb,dc=net";

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config(dir: &TempDir) -> FixtureConfig {
    FixtureConfig {
        work_dir: Some(dir.path().join("work")),
        ..FixtureConfig::default()
    }
}

async fn started(config: FixtureConfig) -> (EmbeddedDirectory, SocketAddr) {
    init_logging();
    let fixture = EmbeddedDirectory::with_config(config);
    let addr = fixture.init_server(0).await.unwrap();
    (fixture, addr)
}

async fn connect(addr: SocketAddr) -> Ldap {
    let url = format!("ldap://127.0.0.1:{}", addr.port());
    let (conn, ldap) = LdapConnAsync::new(&url).await.unwrap();
    tokio::spawn(async move {
        if let Err(e) = conn.drive().await {
            tracing::warn!(error = %e, "LDAP connection driver error");
        }
    });
    ldap
}

async fn read(ldap: &mut Ldap, dn: &str, attrs: Vec<&str>) -> HashMap<String, Vec<String>> {
    let (mut entries, _) = ldap
        .search(dn, Scope::Base, "(objectClass=*)", attrs)
        .await
        .unwrap()
        .success()
        .unwrap();
    assert_eq!(entries.len(), 1);
    SearchEntry::construct(entries.remove(0)).attrs
}

/// Result code as the client reports it.
fn rc(code: ResultCode) -> u32 {
    u32::try_from(code.code()).unwrap()
}

fn sorted(mut values: Vec<String>) -> Vec<String> {
    values.sort();
    values
}

// ── Baseline ────────────────────────────────────────────────────

#[tokio::test]
async fn anonymous_client_sees_root_entry() {
    let dir = TempDir::new().unwrap();
    let (fixture, addr) = started(config(&dir)).await;
    let mut ldap = connect(addr).await;

    let bind = ldap.simple_bind("", "").await.unwrap();
    assert_eq!(bind.rc, 0);

    let root = read(&mut ldap, ROOT, vec!["*"]).await;
    assert_eq!(
        sorted(root["objectClass"].clone()),
        vec!["domain", "extensibleObject", "top"]
    );
    assert_eq!(root["dc"], vec!["liftweb"]);

    ldap.unbind().await.unwrap();
    fixture.stop_server().await.unwrap();
}

#[tokio::test]
async fn test_user_is_seeded() {
    let dir = TempDir::new().unwrap();
    let (fixture, addr) = started(config(&dir)).await;
    let mut ldap = connect(addr).await;

    let user = read(&mut ldap, TEST_USER, vec!["*"]).await;
    assert_eq!(user["cn"], vec!["TestUser"]);
    assert_eq!(user["sn"], vec!["User"]);
    assert_eq!(user["userPassword"], vec!["letmein"]);
    assert!(user["objectClass"].contains(&"organizationalPerson".to_string()));

    assert_eq!(ldap.simple_bind(TEST_USER, "letmein").await.unwrap().rc, 0);
    assert_eq!(ldap.simple_bind(TEST_USER, "wrong").await.unwrap().rc, 49);

    fixture.stop_server().await.unwrap();
}

#[tokio::test]
async fn root_dse_advertises_naming_contexts() {
    let dir = TempDir::new().unwrap();
    let (fixture, addr) = started(config(&dir)).await;
    let mut ldap = connect(addr).await;

    let dse = read(&mut ldap, "", vec!["namingContexts", "supportedLDAPVersion"]).await;
    assert!(dse["namingContexts"].contains(&ROOT.to_string()));
    assert!(dse["namingContexts"].contains(&"ou=system".to_string()));
    assert_eq!(dse["supportedLDAPVersion"], vec!["3"]);

    fixture.stop_server().await.unwrap();
}

#[tokio::test]
async fn custom_root_and_extra_partitions() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.root_dn = "dc=example,dc=com".into();
    config.partitions = vec![PartitionConfig {
        id: "people".into(),
        suffix: "o=people".into(),
        indexes: vec!["uid".into()],
    }];
    let (fixture, addr) = started(config).await;
    let mut ldap = connect(addr).await;

    let root = read(&mut ldap, "dc=example,dc=com", vec!["dc"]).await;
    assert_eq!(root["dc"], vec!["example"]);
    read(&mut ldap, "cn=TestUser,dc=example,dc=com", vec!["cn"]).await;

    assert_eq!(ldap.simple_bind(ADMIN_DN, "secret").await.unwrap().rc, 0);
    let added = ldap
        .add(
            "o=people",
            vec![
                ("objectClass", HashSet::from(["organization"])),
                ("o", HashSet::from(["people"])),
            ],
        )
        .await
        .unwrap();
    assert_eq!(added.rc, 0);

    let dse = read(&mut ldap, "", vec!["namingContexts"]).await;
    assert!(dse["namingContexts"].contains(&"o=people".to_string()));

    fixture.stop_server().await.unwrap();
}

// ── Operations over the wire ────────────────────────────────────

#[tokio::test]
async fn admin_writes_entries() {
    let dir = TempDir::new().unwrap();
    let (fixture, addr) = started(config(&dir)).await;
    let mut ldap = connect(addr).await;
    assert_eq!(ldap.simple_bind(ADMIN_DN, "secret").await.unwrap().rc, 0);

    let dn = format!("cn=Jane,{ROOT}");
    let added = ldap
        .add(
            &dn,
            vec![
                ("objectClass", HashSet::from(["inetOrgPerson"])),
                ("sn", HashSet::from(["Doe"])),
                ("uid", HashSet::from(["jane"])),
            ],
        )
        .await
        .unwrap();
    assert_eq!(added.rc, 0);

    let duplicate = ldap
        .add(&dn, vec![("objectClass", HashSet::from(["person"])), ("sn", HashSet::from(["Doe"]))])
        .await
        .unwrap();
    assert_eq!(duplicate.rc, rc(ResultCode::EntryAlreadyExists));

    let modified = ldap
        .modify(&dn, vec![Mod::Replace("sn", HashSet::from(["Roe"]))])
        .await
        .unwrap();
    assert_eq!(modified.rc, 0);
    assert!(ldap.compare(&dn, "sn", "roe").await.unwrap().equal().unwrap());
    assert!(!ldap.compare(&dn, "sn", "Doe").await.unwrap().equal().unwrap());

    let (mut entries, _) = ldap
        .search(ROOT, Scope::Subtree, "(uid=jane)", vec!["cn"])
        .await
        .unwrap()
        .success()
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(SearchEntry::construct(entries.remove(0)).dn, dn);

    assert_eq!(ldap.delete(&dn).await.unwrap().rc, 0);
    let missing = ldap.delete(&dn).await.unwrap();
    assert_eq!(missing.rc, rc(ResultCode::NoSuchObject));
    assert_eq!(missing.matched, ROOT);

    fixture.stop_server().await.unwrap();
}

#[tokio::test]
async fn schema_violation_is_reported() {
    let dir = TempDir::new().unwrap();
    let (fixture, addr) = started(config(&dir)).await;
    let mut ldap = connect(addr).await;

    let result = ldap
        .add(&format!("cn=NoSn,{ROOT}"), vec![("objectClass", HashSet::from(["person"]))])
        .await
        .unwrap();
    assert_eq!(result.rc, rc(ResultCode::ObjectClassViolation));

    fixture.stop_server().await.unwrap();
}

#[tokio::test]
async fn size_limit_is_reported() {
    let dir = TempDir::new().unwrap();
    let (fixture, addr) = started(config(&dir)).await;
    let mut ldap = connect(addr).await;

    let result = ldap
        .with_search_options(SearchOptions::new().sizelimit(1))
        .search(ROOT, Scope::Subtree, "(objectClass=*)", vec!["1.1"])
        .await
        .unwrap();
    assert_eq!(result.0.len(), 1);
    assert_eq!(result.1.rc, rc(ResultCode::SizeLimitExceeded));

    fixture.stop_server().await.unwrap();
}

#[tokio::test]
async fn who_am_i_tracks_binds() {
    let dir = TempDir::new().unwrap();
    let (fixture, addr) = started(config(&dir)).await;
    let mut ldap = connect(addr).await;

    let (exop, _) = ldap.extended(WhoAmI).await.unwrap().success().unwrap();
    assert_eq!(exop.parse::<WhoAmIResp>().authzid, "");

    ldap.simple_bind(TEST_USER, "letmein").await.unwrap();
    let (exop, _) = ldap.extended(WhoAmI).await.unwrap().success().unwrap();
    assert_eq!(exop.parse::<WhoAmIResp>().authzid, format!("dn:{TEST_USER}"));

    fixture.stop_server().await.unwrap();
}

#[tokio::test]
async fn anonymous_access_can_be_disabled() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.allow_anonymous_access = false;
    let (fixture, addr) = started(config).await;
    let mut ldap = connect(addr).await;

    let bind = ldap.simple_bind("", "").await.unwrap();
    assert_eq!(bind.rc, rc(ResultCode::InappropriateAuthentication));
    let denied = ldap
        .search(ROOT, Scope::Base, "(objectClass=*)", vec!["*"])
        .await
        .unwrap();
    assert_eq!(denied.1.rc, rc(ResultCode::InsufficientAccessRights));

    assert_eq!(ldap.simple_bind(TEST_USER, "letmein").await.unwrap().rc, 0);
    read(&mut ldap, ROOT, vec!["dc"]).await;

    fixture.stop_server().await.unwrap();
}

#[tokio::test]
async fn repeated_add_values_on_the_wire_are_rejected() {
    let dir = TempDir::new().unwrap();
    let (fixture, addr) = started(config(&dir)).await;
    // ldap3 collapses repeated values client-side, so write the request directly.
    let (mut reader, writer) = tokio::net::TcpStream::connect(("127.0.0.1", addr.port()))
        .await
        .unwrap()
        .into_split();
    let mut writer = FramedWrite::new(writer, LdapCodec);

    let bind = BindRequest {
        version: 3,
        name: ADMIN_DN.into(),
        auth: BindAuth::Simple("secret".into()),
    };
    writer.send(LdapMessage::new(1, ProtocolOp::BindRequest(bind))).await.unwrap();
    let mut bound = [0u8; 14];
    reader.read_exact(&mut bound).await.unwrap();
    assert_eq!(bound[5], 0x61);
    assert_eq!(bound[7..10], [0x0a, 0x01, 0x00]);

    let add = AddRequest {
        dn: format!("ou=dup,{ROOT}"),
        attributes: vec![
            Attribute::new("objectClass", ["organizationalUnit"]),
            Attribute::new("ou", ["dup"]),
            Attribute::new("description", ["same", "same"]),
        ],
    };
    writer.send(LdapMessage::new(2, ProtocolOp::AddRequest(add))).await.unwrap();
    let mut added = [0u8; 10];
    reader.read_exact(&mut added).await.unwrap();
    assert_eq!(added[5], 0x69);
    let code = u8::try_from(ResultCode::AttributeOrValueExists.code()).unwrap();
    assert_eq!(added[7..10], [0x0a, 0x01, code]);

    let mut ldap = connect(addr).await;
    let missing = ldap
        .search(&format!("ou=dup,{ROOT}"), Scope::Base, "(objectClass=*)", vec!["ou"])
        .await
        .unwrap();
    assert_eq!(missing.1.rc, rc(ResultCode::NoSuchObject));
    fixture.stop_server().await.unwrap();
}

// ── Lifecycle ───────────────────────────────────────────────────

#[tokio::test]
async fn restarts_on_the_same_port() {
    let dir = TempDir::new().unwrap();
    init_logging();
    let fixture = EmbeddedDirectory::with_config(config(&dir));

    let addr = fixture.init_server(0).await.unwrap();
    let mut ldap = connect(addr).await;
    assert_eq!(ldap.simple_bind(TEST_USER, "letmein").await.unwrap().rc, 0);
    // A write that must not survive the restart.
    ldap.simple_bind(ADMIN_DN, "secret").await.unwrap();
    ldap.delete(TEST_USER).await.unwrap();
    fixture.stop_server().await.unwrap();

    let again = fixture.init_server(addr.port()).await.unwrap();
    assert_eq!(again.port(), addr.port());
    let mut ldap = connect(again).await;
    let user = read(&mut ldap, TEST_USER, vec!["cn"]).await;
    assert_eq!(user["cn"], vec!["TestUser"]);
    fixture.stop_server().await.unwrap();
}

#[tokio::test]
async fn stop_removes_work_dir_and_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let (fixture, _) = started(config(&dir)).await;
    assert!(fixture.work_dir().exists());
    assert_eq!(fixture.state().await, ServiceState::Running);

    fixture.stop_server().await.unwrap();
    assert!(!fixture.work_dir().exists());
    assert_eq!(fixture.state().await, ServiceState::Stopped);
    assert!(fixture.local_addr().await.is_none());

    fixture.stop_server().await.unwrap();
    assert!(!fixture.work_dir().exists());
}

#[tokio::test]
async fn stop_without_init_is_fine() {
    let dir = TempDir::new().unwrap();
    let fixture = EmbeddedDirectory::with_config(config(&dir));
    assert_eq!(fixture.state().await, ServiceState::Unconfigured);
    fixture.stop_server().await.unwrap();
}

#[tokio::test]
async fn init_twice_fails() {
    let dir = TempDir::new().unwrap();
    let (fixture, _) = started(config(&dir)).await;
    let err = fixture.init_server(0).await.unwrap_err();
    assert!(matches!(
        err,
        DirectoryError::InvalidState {
            state: ServiceState::Running,
            ..
        }
    ));
    fixture.stop_server().await.unwrap();
}

#[tokio::test]
async fn busy_port_fails_and_can_be_retried() {
    let dir = TempDir::new().unwrap();
    init_logging();
    let busy = tokio::net::TcpListener::bind("0.0.0.0:0").await.unwrap();
    let port = busy.local_addr().unwrap().port();
    let fixture = EmbeddedDirectory::with_config(config(&dir));

    let err = fixture.init_server(port).await.unwrap_err();
    assert!(matches!(err, DirectoryError::Bind { port: p, .. } if p == port));
    assert!(fixture.service().await.is_none());

    let addr = fixture.init_server(0).await.unwrap();
    assert_ne!(addr.port(), port);
    fixture.stop_server().await.unwrap();
}

#[tokio::test]
async fn baseline_seed_failure_is_fatal() {
    let dir = TempDir::new().unwrap();
    init_logging();
    let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = free.local_addr().unwrap().port();
    drop(free);
    // Both RDN values land in the single-valued `dc` of the root entry.
    let fixture = EmbeddedDirectory::with_config(FixtureConfig {
        root_dn: "dc=one+dc=two,dc=net".into(),
        ..config(&dir)
    });

    let err = fixture.init_server(port).await.unwrap_err();
    match err {
        DirectoryError::EntrySeed { source, .. } => {
            assert_eq!(source.code, ResultCode::ConstraintViolation);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(fixture.service().await.is_none());
    assert!(fixture.local_addr().await.is_none());
    assert_eq!(fixture.state().await, ServiceState::Unconfigured);
    std::net::TcpListener::bind(("0.0.0.0", port)).unwrap();

    assert!(fixture.work_dir().exists());
    fixture.stop_server().await.unwrap();
    assert!(!fixture.work_dir().exists());
}

#[tokio::test]
async fn stale_work_dir_is_replaced() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let partition = dir.path().join("work").join("partitions").join("lift-ldap");
    std::fs::create_dir_all(&partition).unwrap();
    std::fs::write(partition.join("lift-ldap.db"), "junk").unwrap();

    let (fixture, addr) = started(config).await;
    let mut ldap = connect(addr).await;
    read(&mut ldap, TEST_USER, vec!["cn"]).await;
    fixture.stop_server().await.unwrap();
}

#[tokio::test]
async fn default_instances_do_not_share_a_work_dir() {
    init_logging();
    let first = EmbeddedDirectory::new(ROOT);
    let second = EmbeddedDirectory::new(ROOT);
    assert_ne!(first.work_dir(), second.work_dir());

    let first_addr = first.init_server(0).await.unwrap();
    second.init_server(0).await.unwrap();
    second.stop_server().await.unwrap();
    assert!(!second.work_dir().exists());

    assert!(first.work_dir().exists());
    assert_eq!(first.state().await, ServiceState::Running);
    let mut ldap = connect(first_addr).await;
    let user = read(&mut ldap, TEST_USER, vec!["cn"]).await;
    assert_eq!(user["cn"], vec!["TestUser"]);
    first.stop_server().await.unwrap();
    assert!(!first.work_dir().exists());
}

#[tokio::test]
async fn shared_work_dir_is_refused_and_left_intact() {
    let dir = TempDir::new().unwrap();
    let (owner, addr) = started(config(&dir)).await;
    let intruder = EmbeddedDirectory::with_config(config(&dir));

    let err = intruder.init_server(0).await.unwrap_err();
    assert!(matches!(err, DirectoryError::Filesystem { .. }));
    assert!(intruder.service().await.is_none());

    // The refused instance never owned the directory, so stopping it is a no-op.
    intruder.stop_server().await.unwrap();
    assert!(owner.work_dir().exists());
    let mut ldap = connect(addr).await;
    read(&mut ldap, TEST_USER, vec!["cn"]).await;

    owner.stop_server().await.unwrap();
    let successor = EmbeddedDirectory::with_config(config(&dir));
    successor.init_server(0).await.unwrap();
    successor.stop_server().await.unwrap();
}

// ── Seeding ─────────────────────────────────────────────────────

#[tokio::test]
async fn seed_adds_entries() {
    let dir = TempDir::new().unwrap();
    let (fixture, addr) = started(config(&dir)).await;

    let people = Dn::parse(&format!("ou=people,{ROOT}")).unwrap();
    let added = fixture
        .seed([Entry::new(people.clone()).with("objectClass", ["organizationalUnit"])])
        .await
        .unwrap();
    assert_eq!(added, 1);

    let mut ldap = connect(addr).await;
    let entry = read(&mut ldap, &people.to_string(), vec!["ou"]).await;
    assert_eq!(entry["ou"], vec!["people"]);
    fixture.stop_server().await.unwrap();
}

#[tokio::test]
async fn duplicate_seed_fails_but_server_keeps_running() {
    let dir = TempDir::new().unwrap();
    let (fixture, addr) = started(config(&dir)).await;

    let duplicate = Entry::new(Dn::parse(TEST_USER).unwrap())
        .with("objectClass", ["person"])
        .with("sn", ["User"]);
    let err = fixture.seed([duplicate]).await.unwrap_err();
    match err {
        DirectoryError::EntrySeed { dn, source } => {
            assert_eq!(dn, TEST_USER);
            assert_eq!(source.code, ResultCode::EntryAlreadyExists);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(fixture.state().await, ServiceState::Running);
    let mut ldap = connect(addr).await;
    assert_eq!(ldap.simple_bind("", "").await.unwrap().rc, 0);
    read(&mut ldap, ROOT, vec!["dc"]).await;
    fixture.stop_server().await.unwrap();
}

#[tokio::test]
async fn seed_requires_running_server() {
    let dir = TempDir::new().unwrap();
    let fixture = EmbeddedDirectory::with_config(config(&dir));
    let err = fixture.seed(Vec::new()).await.unwrap_err();
    assert!(matches!(err, DirectoryError::InvalidState { .. }));
}
