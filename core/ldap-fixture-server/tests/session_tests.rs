use ldap_fixture_proto::{Modification, ModifyOperation, ResultCode};
use ldap_fixture_server::{
    CoreSession, DirectoryError, DirectoryService, PartitionManager, Principal, SearchParams,
    ServicePolicy, ADMIN_DN, VENDOR_NAME,
};
use ldap_fixture_types::{Attribute, Dn, Entry, Filter, SearchScope};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

const SUFFIX: &str = "dc=example,dc=com";

fn running(dir: &TempDir, policy: ServicePolicy) -> Arc<DirectoryService> {
    let service = Arc::new(DirectoryService::new(dir.path(), policy));
    service.load_schema().unwrap();
    service.attach_system_partitions().unwrap();
    PartitionManager::new(service.clone())
        .create_partition("example", SUFFIX)
        .unwrap();
    service.startup().unwrap();
    service
}

fn entry(dn: &str) -> Entry {
    Entry::new(Dn::parse(dn).unwrap())
}

fn person(cn: &str) -> Entry {
    entry(&format!("cn={cn},ou=people,{SUFFIX}"))
        .with("objectClass", ["person"])
        .with("sn", ["Smith"])
}

/// An admin session over `dc=example,dc=com` with `ou=people` and two people.
fn populated(dir: &TempDir, policy: ServicePolicy) -> CoreSession {
    let service = running(dir, policy);
    let session = service.admin_session().unwrap();
    session
        .add(entry(SUFFIX).with("objectClass", ["top", "domain"]))
        .unwrap();
    session
        .add(entry(&format!("ou=people,{SUFFIX}")).with("objectClass", ["organizationalUnit"]))
        .unwrap();
    session.add(person("Alice").with("userPassword", ["wonderland"])).unwrap();
    session.add(person("Bob")).unwrap();
    session
}

fn code(err: DirectoryError) -> ResultCode {
    err.result_code()
}

fn change(operation: ModifyOperation, name: &str, values: &[&str]) -> Modification {
    Modification {
        operation,
        attribute: Attribute::new(name, values.iter().copied()),
    }
}

fn subtree(base: &str, filter: &str) -> SearchParams {
    SearchParams::new(base, SearchScope::Subtree, Filter::parse(filter).unwrap())
}

// ── Add ─────────────────────────────────────────────────────────

#[test]
fn add_fills_in_rdn_values_and_superclasses() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());

    let alice = session.lookup(&format!("cn=Alice,ou=people,{SUFFIX}")).unwrap().unwrap();
    assert_eq!(alice.values("cn"), ["Alice"]);
    assert!(alice.contains_value("objectClass", "top"));
    assert!(alice.contains_value("objectClass", "person"));
    let people = session.lookup(&format!("ou=people,{SUFFIX}")).unwrap().unwrap();
    assert_eq!(people.values("ou"), ["people"]);
}

#[test]
fn add_stamps_operational_attributes() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());

    let bob = session.lookup(&format!("cn=Bob,ou=people,{SUFFIX}")).unwrap().unwrap();
    assert_eq!(bob.values("creatorsName"), [ADMIN_DN]);
    let created = bob.first_value("createTimestamp").unwrap();
    assert_eq!(created.len(), 15);
    assert!(created.ends_with('Z'));
    assert_eq!(bob.first_value("entryUUID").unwrap().len(), 36);
}

#[test]
fn add_merges_attribute_aliases() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());
    session
        .add(
            entry(&format!("cn=Carol,ou=people,{SUFFIX}"))
                .with("objectClass", ["person"])
                .with("surname", ["Jones"])
                .with("commonName", ["Carol", "Caz"]),
        )
        .unwrap();
    let carol = session.lookup(&format!("cn=Carol,ou=people,{SUFFIX}")).unwrap().unwrap();
    assert_eq!(carol.values("sn"), ["Jones"]);
    assert_eq!(carol.values("cn"), ["Carol", "Caz"]);
    assert!(!carol.has_attribute("surname"));
}

#[test]
fn add_without_parent_reports_matched_dn() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());

    let err = session
        .add(
            entry(&format!("cn=Eve,ou=nowhere,{SUFFIX}"))
                .with("objectClass", ["person"])
                .with("sn", ["X"]),
        )
        .unwrap_err();
    match err {
        DirectoryError::Operation(op) => {
            assert_eq!(op.code, ResultCode::NoSuchObject);
            assert_eq!(op.matched_dn.as_deref(), Some(SUFFIX));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn add_existing_entry_fails() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());
    let err = session.add(person("alice")).unwrap_err();
    assert_eq!(code(err), ResultCode::EntryAlreadyExists);
}

#[test]
fn add_outside_every_partition_fails() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());
    let err = session
        .add(entry("o=nowhere").with("objectClass", ["organization"]))
        .unwrap_err();
    assert_eq!(code(err), ResultCode::NoSuchObject);
}

#[test]
fn add_to_schema_partition_is_refused() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());
    let err = session
        .add(entry("ou=extra,ou=schema").with("objectClass", ["organizationalUnit"]))
        .unwrap_err();
    assert_eq!(code(err), ResultCode::UnwillingToPerform);
}

#[test]
fn add_rejects_schema_violations() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());
    let people = format!("ou=people,{SUFFIX}");

    let missing_must = entry(&format!("cn=NoSurname,{people}")).with("objectClass", ["person"]);
    assert_eq!(code(session.add(missing_must).unwrap_err()), ResultCode::ObjectClassViolation);

    let no_class = entry(&format!("cn=Classless,{people}")).with("sn", ["X"]);
    assert_eq!(code(session.add(no_class).unwrap_err()), ResultCode::ObjectClassViolation);

    let unknown_class = entry(&format!("cn=Odd,{people}")).with("objectClass", ["martian"]);
    assert_eq!(code(session.add(unknown_class).unwrap_err()), ResultCode::ObjectClassViolation);

    let not_allowed = entry(&format!("ou=uids,{people}"))
        .with("objectClass", ["organizationalUnit"])
        .with("uid", ["nope"]);
    assert_eq!(code(session.add(not_allowed).unwrap_err()), ResultCode::ObjectClassViolation);

    let unknown_attr = person("Zed").with("favouriteColour", ["blue"]);
    assert_eq!(code(session.add(unknown_attr).unwrap_err()), ResultCode::UndefinedAttributeType);
}

#[test]
fn add_rejects_user_supplied_operational_attributes() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());
    let err = session.add(person("Mallory").with("creatorsName", ["cn=someone"])).unwrap_err();
    assert_eq!(code(err), ResultCode::ConstraintViolation);
}

#[test]
fn add_rejects_duplicate_and_multiple_single_values() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());

    let duplicate = person("Dup").with("description", ["same", "SAME"]);
    assert_eq!(code(session.add(duplicate).unwrap_err()), ResultCode::AttributeOrValueExists);

    let two_dcs = entry("dc=sub,dc=example,dc=com")
        .with("objectClass", ["domain"])
        .with("dc", ["sub", "other"]);
    assert_eq!(code(session.add(two_dcs).unwrap_err()), ResultCode::ConstraintViolation);
}

#[test]
fn extensible_object_allows_any_attribute() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());
    session
        .add(
            entry(&format!("ou=open,{SUFFIX}"))
                .with("objectClass", ["organizationalUnit", "extensibleObject"])
                .with("uid", ["anything"]),
        )
        .unwrap();
}

// ── Modify ──────────────────────────────────────────────────────

#[test]
fn modify_applies_changes_in_order() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());
    let dn = format!("cn=Alice,ou=people,{SUFFIX}");

    session
        .modify(
            &dn,
            &[
                change(ModifyOperation::Add, "description", &["first", "second"]),
                change(ModifyOperation::Delete, "description", &["FIRST"]),
                change(ModifyOperation::Replace, "telephoneNumber", &["555-0100"]),
                change(ModifyOperation::Replace, "sn", &["Liddell"]),
            ],
        )
        .unwrap();

    let alice = session.lookup(&dn).unwrap().unwrap();
    assert_eq!(alice.values("description"), ["second"]);
    assert_eq!(alice.values("telephoneNumber"), ["555-0100"]);
    assert_eq!(alice.values("sn"), ["Liddell"]);
    assert_eq!(alice.values("modifiersName"), [ADMIN_DN]);
    assert!(alice.has_attribute("modifyTimestamp"));
}

#[test]
fn modify_failure_leaves_entry_untouched() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());
    let dn = format!("cn=Bob,ou=people,{SUFFIX}");

    let err = session
        .modify(
            &dn,
            &[
                change(ModifyOperation::Add, "description", &["kept?"]),
                change(ModifyOperation::Delete, "sn", &[]),
            ],
        )
        .unwrap_err();
    assert_eq!(code(err), ResultCode::ObjectClassViolation);

    let bob = session.lookup(&dn).unwrap().unwrap();
    assert_eq!(bob.values("sn"), ["Smith"]);
    assert!(!bob.has_attribute("description"));
}

#[test]
fn modify_cannot_remove_naming_value() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());
    let err = session
        .modify(
            &format!("cn=Bob,ou=people,{SUFFIX}"),
            &[change(ModifyOperation::Replace, "cn", &["Robert"])],
        )
        .unwrap_err();
    assert_eq!(code(err), ResultCode::NotAllowedOnRdn);
}

#[test]
fn modify_error_codes() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());
    let dn = format!("cn=Bob,ou=people,{SUFFIX}");

    let err = session
        .modify(&dn, &[change(ModifyOperation::Delete, "description", &[])])
        .unwrap_err();
    assert_eq!(code(err), ResultCode::NoSuchAttribute);

    let err = session
        .modify(&dn, &[change(ModifyOperation::Add, "sn", &["smith"])])
        .unwrap_err();
    assert_eq!(code(err), ResultCode::AttributeOrValueExists);

    let err = session
        .modify(&dn, &[change(ModifyOperation::Replace, "entryUUID", &["x"])])
        .unwrap_err();
    assert_eq!(code(err), ResultCode::ConstraintViolation);

    let err = session
        .modify(
            &format!("cn=Nobody,ou=people,{SUFFIX}"),
            &[change(ModifyOperation::Add, "description", &["x"])],
        )
        .unwrap_err();
    assert_eq!(code(err), ResultCode::NoSuchObject);
}

// ── Delete ──────────────────────────────────────────────────────

#[test]
fn delete_removes_leaf_entries_only() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());
    let people = format!("ou=people,{SUFFIX}");

    let err = session.delete(&people).unwrap_err();
    assert_eq!(code(err), ResultCode::NotAllowedOnNonLeaf);

    session.delete(&format!("cn=Alice,{people}")).unwrap();
    session.delete(&format!("CN=bob,{people}")).unwrap();
    assert!(session.lookup(&format!("cn=Alice,{people}")).unwrap().is_none());
    session.delete(&people).unwrap();

    let err = session.delete(&people).unwrap_err();
    assert_eq!(code(err), ResultCode::NoSuchObject);
}

// ── Compare ─────────────────────────────────────────────────────

#[test]
fn compare_uses_equality_rules() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());
    let dn = format!("cn=Alice,ou=people,{SUFFIX}");

    assert!(session.compare(&dn, "sn", "SMITH").unwrap());
    assert!(session.compare(&dn, "surname", "smith").unwrap());
    assert!(!session.compare(&dn, "sn", "Jones").unwrap());

    let err = session.compare(&dn, "description", "x").unwrap_err();
    assert_eq!(code(err), ResultCode::NoSuchAttribute);
    let err = session.compare(&dn, "favouriteColour", "x").unwrap_err();
    assert_eq!(code(err), ResultCode::UndefinedAttributeType);
    let err = session
        .compare(&format!("cn=Nobody,ou=people,{SUFFIX}"), "sn", "x")
        .unwrap_err();
    assert_eq!(code(err), ResultCode::NoSuchObject);
}

// ── Search ──────────────────────────────────────────────────────

#[test]
fn search_scopes() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());

    let people = session.search(&subtree(SUFFIX, "(objectClass=person)")).unwrap();
    assert_eq!(people.entries.len(), 2);
    assert!(!people.size_limit_exceeded);

    let one_level = SearchParams::new(SUFFIX, SearchScope::OneLevel, Filter::match_all());
    let children = session.search(&one_level).unwrap();
    let dns: Vec<String> = children.entries.iter().map(|e| e.dn().to_string()).collect();
    assert_eq!(dns, vec![format!("ou=people,{SUFFIX}")]);

    let bob = format!("cn=Bob,ou=people,{SUFFIX}");
    let base = SearchParams::new(bob, SearchScope::Base, Filter::match_all());
    assert_eq!(session.search(&base).unwrap().entries.len(), 1);
}

#[test]
fn search_filters_match_case_insensitively() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());
    let found = session.search(&subtree(SUFFIX, "(&(sn=SMITH)(cn=ali*))")).unwrap();
    assert_eq!(found.entries.len(), 1);
    assert_eq!(found.entries[0].values("cn"), ["Alice"]);
}

#[test]
fn search_missing_base_fails() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());
    let err = session
        .search(&subtree(&format!("ou=nowhere,{SUFFIX}"), "(objectClass=*)"))
        .unwrap_err();
    assert_eq!(code(err), ResultCode::NoSuchObject);
}

#[test]
fn search_honours_size_limit() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());
    let outcome = session
        .search(&subtree(SUFFIX, "(objectClass=*)").with_size_limit(1))
        .unwrap();
    assert_eq!(outcome.entries.len(), 1);
    assert!(outcome.size_limit_exceeded);

    let outcome = session
        .search(&subtree(SUFFIX, "(objectClass=person)").with_size_limit(2))
        .unwrap();
    assert_eq!(outcome.entries.len(), 2);
    assert!(!outcome.size_limit_exceeded);
}

#[test]
fn search_selects_attributes() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());
    let base = format!("cn=Alice,ou=people,{SUFFIX}");
    let search = |attrs: &[&str]| {
        let params = SearchParams::new(base.as_str(), SearchScope::Base, Filter::match_all())
            .with_attributes(attrs.iter().copied());
        session.search(&params).unwrap().entries.remove(0)
    };

    let all_user = search(&[]);
    assert!(all_user.has_attribute("sn"));
    assert!(!all_user.has_attribute("creatorsName"));

    let operational = search(&["+"]);
    assert!(operational.has_attribute("creatorsName"));
    assert!(operational.has_attribute("entryUUID"));
    assert!(!operational.has_attribute("sn"));

    let both = search(&["*", "+"]);
    assert!(both.has_attribute("sn") && both.has_attribute("createTimestamp"));

    let named = search(&["SN", "entryUUID"]);
    let names: Vec<&str> = named.attributes().iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["sn", "entryUUID"]);

    // `name` is the supertype of cn and sn.
    let supertype = search(&["name"]);
    assert!(supertype.has_attribute("cn") && supertype.has_attribute("sn"));

    assert!(search(&["1.1"]).is_empty());
}

#[test]
fn search_types_only_drops_values() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());
    let params = SearchParams::new(
        format!("cn=Bob,ou=people,{SUFFIX}"),
        SearchScope::Base,
        Filter::match_all(),
    )
    .with_attributes(["sn"])
    .with_types_only(true);
    let bob = session.search(&params).unwrap().entries.remove(0);
    assert!(bob.has_attribute("sn"));
    assert!(bob.values("sn").is_empty());
}

#[test]
fn root_dse_lists_naming_contexts() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());

    let dse = session.lookup("").unwrap().unwrap();
    assert!(dse.dn().is_root());
    assert!(dse.contains_value("namingContexts", SUFFIX));
    assert!(dse.contains_value("namingContexts", "ou=system"));
    assert_eq!(dse.values("vendorName"), [VENDOR_NAME]);
    assert_eq!(dse.values("supportedLDAPVersion"), ["3"]);

    let params = SearchParams::new("", SearchScope::Base, Filter::parse("(objectClass=*)").unwrap())
        .with_attributes(["namingContexts"]);
    let found = session.search(&params).unwrap();
    assert_eq!(found.entries.len(), 1);
    let names: Vec<&str> = found.entries[0].attributes().iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["namingContexts"]);
}

#[test]
fn search_from_root_spans_partitions() {
    let dir = TempDir::new().unwrap();
    let session = populated(&dir, ServicePolicy::default());

    let people = session.search(&subtree("", "(objectClass=person)")).unwrap();
    let mut dns: Vec<String> = people.entries.iter().map(|e| e.dn().to_string()).collect();
    dns.sort();
    assert_eq!(
        dns,
        vec![
            format!("cn=Alice,ou=people,{SUFFIX}"),
            format!("cn=Bob,ou=people,{SUFFIX}"),
            ADMIN_DN.to_string(),
        ]
    );

    let one_level = SearchParams::new("", SearchScope::OneLevel, Filter::match_all());
    let contexts = session.search(&one_level).unwrap();
    let dns: Vec<String> = contexts.entries.iter().map(|e| e.dn().to_string()).collect();
    assert!(dns.contains(&SUFFIX.to_string()));
    assert!(dns.contains(&"ou=system".to_string()));
}

// ── Bind ────────────────────────────────────────────────────────

#[test]
fn bind_as_admin_and_user() {
    let dir = TempDir::new().unwrap();
    let admin = populated(&dir, ServicePolicy::default());
    let mut session = admin.service().anonymous_session().unwrap();
    assert_eq!(session.who_am_i(), "");

    session.bind(ADMIN_DN, "secret").unwrap();
    assert_eq!(session.who_am_i(), format!("dn:{ADMIN_DN}"));

    session
        .bind(&format!("cn=alice,ou=people,{SUFFIX}"), "wonderland")
        .unwrap();
    assert_eq!(
        session.principal(),
        &Principal::User(Dn::parse(&format!("cn=Alice,ou=people,{SUFFIX}")).unwrap())
    );
}

#[test]
fn failed_bind_leaves_session_anonymous() {
    let dir = TempDir::new().unwrap();
    let admin = populated(&dir, ServicePolicy::default());
    let mut session = admin.service().anonymous_session().unwrap();
    session.bind(ADMIN_DN, "secret").unwrap();

    let err = session.bind(ADMIN_DN, "wrong").unwrap_err();
    assert_eq!(code(err), ResultCode::InvalidCredentials);
    assert!(session.principal().is_anonymous());
}

#[test]
fn bind_error_codes() {
    let dir = TempDir::new().unwrap();
    let admin = populated(&dir, ServicePolicy::default());
    let mut session = admin.service().anonymous_session().unwrap();

    session.bind("", "").unwrap();
    assert_eq!(code(session.bind(ADMIN_DN, "").unwrap_err()), ResultCode::UnwillingToPerform);
    assert_eq!(code(session.bind("", "secret").unwrap_err()), ResultCode::InvalidCredentials);
    assert_eq!(
        code(session.bind("cn=ghost,ou=people,dc=example,dc=com", "x").unwrap_err()),
        ResultCode::InvalidCredentials
    );
    // Bob has no password.
    assert_eq!(
        code(session.bind("cn=Bob,ou=people,dc=example,dc=com", "x").unwrap_err()),
        ResultCode::InvalidCredentials
    );
    assert_eq!(code(session.bind("not a dn", "x").unwrap_err()), ResultCode::InvalidDnSyntax);
}

// ── Anonymous access ────────────────────────────────────────────

fn locked_down() -> ServicePolicy {
    ServicePolicy {
        allow_anonymous_access: false,
        ..ServicePolicy::default()
    }
}

#[test]
fn anonymous_access_disabled_restricts_operations() {
    let dir = TempDir::new().unwrap();
    let admin = populated(&dir, locked_down());
    let mut anonymous = admin.service().anonymous_session().unwrap();

    let err = anonymous.search(&subtree(SUFFIX, "(objectClass=*)")).unwrap_err();
    assert_eq!(code(err), ResultCode::InsufficientAccessRights);
    let err = anonymous.add(person("Anon")).unwrap_err();
    assert_eq!(code(err), ResultCode::InsufficientAccessRights);
    let err = anonymous.bind("", "").unwrap_err();
    assert_eq!(code(err), ResultCode::InappropriateAuthentication);

    // The root DSE stays readable.
    let dse = SearchParams::new("", SearchScope::Base, Filter::match_all());
    assert_eq!(anonymous.search(&dse).unwrap().entries.len(), 1);

    anonymous.bind(ADMIN_DN, "secret").unwrap();
    assert_eq!(anonymous.search(&subtree(SUFFIX, "(objectClass=*)")).unwrap().entries.len(), 4);
}

#[test]
fn anonymous_access_enabled_allows_reads() {
    let dir = TempDir::new().unwrap();
    let admin = populated(&dir, ServicePolicy::default());
    let anonymous = admin.service().anonymous_session().unwrap();
    let people = anonymous.search(&subtree(SUFFIX, "(objectClass=person)")).unwrap();
    assert_eq!(people.entries.len(), 2);
}

// ── Operational attribute presentation ──────────────────────────

#[test]
fn principal_attributes_are_normalized_without_denormalization() {
    let dir = TempDir::new().unwrap();
    let session = populated(
        &dir,
        ServicePolicy {
            denormalize_op_attrs: false,
            ..ServicePolicy::default()
        },
    );
    let bob = session.lookup(&format!("cn=Bob,ou=people,{SUFFIX}")).unwrap().unwrap();
    assert_eq!(bob.values("creatorsName"), ["0.9.2342.19200300.100.1.1=admin,2.5.4.11=system"]);
}
