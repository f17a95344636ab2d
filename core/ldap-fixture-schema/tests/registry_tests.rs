use ldap_fixture_schema::{MatchingRule, ObjectClassKind, ResolveError, SchemaRegistry};
use ldap_fixture_types::Dn;
use pretty_assertions::assert_eq;

fn registry() -> SchemaRegistry {
    SchemaRegistry::bundled().expect("bundled schema loads")
}

// ── Lookup ───────────────────────────────────────────────────────

#[test]
fn bundled_loads_enabled_schemas_in_dependency_order() {
    let reg = registry();
    let names = reg.schema_names();
    assert!(!names.iter().any(|n| n == "nis"));
    let pos = |name: &str| names.iter().position(|n| n == name).unwrap();
    assert!(pos("core") < pos("cosine"));
    assert!(pos("cosine") < pos("inetorgperson"));
}

#[test]
fn attribute_lookup_by_name_alias_and_oid() {
    let reg = registry();
    let cn = reg.attribute_type("cn").unwrap();
    assert_eq!(cn.oid, "2.5.4.3");
    assert_eq!(reg.attribute_type("commonName").unwrap().oid, "2.5.4.3");
    assert_eq!(reg.attribute_type("CN").unwrap().oid, "2.5.4.3");
    assert_eq!(reg.attribute_type("2.5.4.3").unwrap().primary_name(), "cn");
}

#[test]
fn attribute_lookup_ignores_options() {
    let reg = registry();
    assert_eq!(reg.attribute_type("cn;lang-en").unwrap().oid, "2.5.4.3");
}

#[test]
fn unknown_attribute_resolves_to_error() {
    let reg = registry();
    assert_eq!(
        reg.resolve_attribute("noSuchThing").unwrap_err(),
        ResolveError::UndefinedAttributeType("noSuchThing".into())
    );
}

#[test]
fn disabled_schema_elements_are_absent() {
    let reg = registry();
    assert!(reg.object_class("posixAccount").is_none());
    assert!(reg.attribute_type("uidNumber").is_none());
}

#[test]
fn equality_is_inherited_from_superior() {
    let reg = registry();
    let sn = reg.attribute_type("sn").unwrap();
    assert_eq!(sn.equality, MatchingRule::CaseIgnoreMatch);
    assert!(reg.is_subtype_of("sn", "name"));
    assert!(!reg.is_subtype_of("name", "sn"));
}

#[test]
fn operational_attributes_are_flagged() {
    let reg = registry();
    assert!(reg.attribute_type("createTimestamp").unwrap().is_operational());
    assert!(reg.attribute_type("entryUUID").unwrap().is_operational());
    assert!(!reg.attribute_type("cn").unwrap().is_operational());
}

// ── Object classes ───────────────────────────────────────────────

#[test]
fn superclasses_walk_to_top() {
    let reg = registry();
    let names: Vec<&str> = reg
        .superclasses("inetOrgPerson")
        .iter()
        .map(|c| c.primary_name())
        .collect();
    assert_eq!(names, vec!["inetOrgPerson", "organizationalPerson", "person", "top"]);
}

#[test]
fn must_attributes_include_inherited() {
    let reg = registry();
    let must = reg.must_attributes(["inetOrgPerson"]);
    let cn = reg.attribute_type("cn").unwrap().oid.clone();
    let sn = reg.attribute_type("sn").unwrap().oid.clone();
    let oc = reg.attribute_type("objectClass").unwrap().oid.clone();
    assert!(must.contains(&cn));
    assert!(must.contains(&sn));
    assert!(must.contains(&oc));
}

#[test]
fn may_attributes_include_must() {
    let reg = registry();
    let may = reg.may_attributes(["person"]);
    assert!(may.contains(&reg.attribute_type("sn").unwrap().oid));
    assert!(may.contains(&reg.attribute_type("userPassword").unwrap().oid));
    assert!(!may.contains(&reg.attribute_type("mail").unwrap().oid));
}

#[test]
fn top_is_abstract() {
    let reg = registry();
    assert_eq!(reg.object_class("top").unwrap().kind, ObjectClassKind::Abstract);
    assert_eq!(reg.object_class("person").unwrap().kind, ObjectClassKind::Structural);
}

// ── Normalization ────────────────────────────────────────────────

#[test]
fn case_ignore_values_collapse_and_lowercase() {
    let reg = registry();
    let cn = reg.attribute_type("cn").unwrap();
    assert_eq!(reg.normalize_value(cn, "  Test    User "), "test user");
    assert!(reg.values_match(cn, "TESTUSER", "testuser"));
}

#[test]
fn octet_string_values_are_exact() {
    let reg = registry();
    let pw = reg.attribute_type("userPassword").unwrap();
    assert!(!reg.values_match(pw, "Secret", "secret"));
}

#[test]
fn object_class_values_normalize_to_oid() {
    let reg = registry();
    let oc = reg.attribute_type("objectClass").unwrap();
    assert_eq!(reg.normalize_value(oc, "Person"), "2.5.6.6");
    assert!(reg.values_match(oc, "person", "2.5.6.6"));
}

#[test]
fn normalize_dn_uses_oids_and_normalized_values() {
    let reg = registry();
    let ndn = reg.normalize_dn_str("CN=Test  User, DC=LiftWeb,dc=net").unwrap();
    assert_eq!(
        ndn.to_string(),
        "2.5.4.3=test user,0.9.2342.19200300.100.1.25=liftweb,0.9.2342.19200300.100.1.25=net"
    );
}

#[test]
fn normalized_dns_compare_equal_across_spellings() {
    let reg = registry();
    let a = reg.normalize_dn_str("commonName=Admin,ou=System").unwrap();
    let b = reg.normalize_dn_str("cn=admin, ou=system").unwrap();
    assert_eq!(a, b);
}

#[test]
fn multi_valued_rdn_order_is_irrelevant() {
    let reg = registry();
    let a = reg.normalize_dn_str("cn=a+sn=b,dc=x").unwrap();
    let b = reg.normalize_dn_str("sn=B+cn=A,dc=x").unwrap();
    assert_eq!(a, b);
}

#[test]
fn normalize_dn_rejects_unknown_attribute() {
    let reg = registry();
    let err = reg.normalize_dn_str("bogus=1,dc=x").unwrap_err();
    assert!(matches!(err, ResolveError::UndefinedAttributeType(ref a) if a == "bogus"));
}

#[test]
fn normalize_dn_rejects_bad_syntax() {
    let reg = registry();
    assert!(matches!(reg.normalize_dn_str("no-equals-sign"), Err(ResolveError::InvalidDn(_))));
}

#[test]
fn canonical_dn_keeps_values() {
    let reg = registry();
    let dn = Dn::parse("commonName=Test User,DC=liftweb").unwrap();
    assert_eq!(reg.canonical_dn(&dn).to_string(), "cn=Test User,dc=liftweb");
}

#[test]
fn integer_ordering_is_numeric() {
    let reg = registry();
    let version = reg.attribute_type("supportedLDAPVersion").unwrap();
    assert_eq!(reg.compare_values(version, "10", "9"), std::cmp::Ordering::Greater);
    let cn = reg.attribute_type("cn").unwrap();
    assert_eq!(reg.compare_values(cn, "b", "A"), std::cmp::Ordering::Greater);
}
