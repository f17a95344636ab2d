use ldap_fixture_types::{Attribute, Dn, Entry};
use pretty_assertions::assert_eq;

fn entry() -> Entry {
    Entry::new(Dn::parse("cn=TestUser,dc=liftweb,dc=net").unwrap())
}

#[test]
fn add_merges_case_insensitively() {
    let mut e = entry();
    e.add("objectClass", ["top", "person"]);
    e.add("OBJECTCLASS", ["person", "organizationalPerson"]);
    assert_eq!(e.attributes().len(), 1);
    assert_eq!(e.values("objectclass"), &["top", "person", "organizationalPerson"]);
}

#[test]
fn builder_and_lookup() {
    let e = entry().with("cn", ["TestUser"]).with("sn", ["User"]);
    assert_eq!(e.first_value("SN"), Some("User"));
    assert!(e.has_attribute("cn"));
    assert!(e.contains_value("cn", "TestUser"));
    assert!(!e.contains_value("cn", "testuser"));
    assert!(e.values("mail").is_empty());
}

#[test]
fn put_replaces_values() {
    let mut e = entry().with("description", ["a", "b"]);
    e.put("description", ["c"]);
    assert_eq!(e.values("description"), &["c"]);
    e.put("description", Vec::<String>::new());
    assert!(!e.has_attribute("description"));
}

#[test]
fn remove_value_drops_empty_attribute() {
    let mut e = entry().with("mail", ["a@x", "b@x"]);
    assert!(e.remove_value("mail", "a@x"));
    assert!(!e.remove_value("mail", "missing@x"));
    assert!(e.remove_value("mail", "b@x"));
    assert!(!e.has_attribute("mail"));
    assert!(e.is_empty());
}

#[test]
fn serde_roundtrip_keeps_dn_and_order() {
    let e = entry().with("sn", ["User"]).with("cn", ["TestUser"]);
    let json = serde_json::to_string(&e).unwrap();
    let back: Entry = serde_json::from_str(&json).unwrap();
    assert_eq!(back, e);
    assert_eq!(back.attributes()[0].name, "sn");
}

#[test]
fn from_attributes_keeps_repeated_values() {
    let dn = Dn::parse("cn=TestUser,dc=liftweb,dc=net").unwrap();
    let e = Entry::from_attributes(dn, vec![Attribute::new("description", ["a", "a"])]);
    assert_eq!(e.values("description"), &["a", "a"]);
}
