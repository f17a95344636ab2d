//! Baseline entries and seeding.

use crate::config::SeedUserConfig;
use crate::error::{DirectoryError, DirectoryResult, OperationError};
use crate::session::CoreSession;
use ldap_fixture_proto::ResultCode;
use ldap_fixture_types::{Dn, Entry, Rdn};
use tracing::{debug, warn};

/// `dc` of the root entry when the root RDN is not a `dc` component.
pub const DEFAULT_ROOT_DC: &str = "liftweb";

/// The root entry and the test user.
///
/// ```text
/// <root>                 objectClass: top, domain, extensibleObject
///                        dc: liftweb
/// cn=TestUser,<root>     objectClass: person, organizationalPerson
///                        cn: TestUser, sn: User, userPassword: letmein
/// ```
pub fn baseline_entries(root_dn: &Dn, user: &SeedUserConfig) -> Vec<Entry> {
    let dc = root_dn
        .rdn()
        .and_then(|rdn| rdn.get("dc"))
        .unwrap_or(DEFAULT_ROOT_DC)
        .to_string();
    let root = Entry::new(root_dn.clone())
        .with("objectClass", ["top", "domain", "extensibleObject"])
        .with("dc", [dc]);
    let test_user = Entry::new(root_dn.child(Rdn::new("cn", user.cn.as_str())))
        .with("objectClass", ["person", "organizationalPerson"])
        .with("cn", [user.cn.as_str()])
        .with("sn", [user.sn.as_str()])
        .with("userPassword", [user.password.as_str()]);
    vec![root, test_user]
}

/// Adds each entry through `session`, stopping at the first rejection.
/// Returns how many entries were added.
pub fn seed_entries(
    session: &CoreSession,
    entries: impl IntoIterator<Item = Entry>,
) -> DirectoryResult<usize> {
    let mut added = 0;
    for entry in entries {
        let dn = entry.dn().to_string();
        match session.add(entry) {
            Ok(()) => {
                debug!(dn = %dn, "seeded entry");
                added += 1;
            }
            Err(err) => {
                warn!(dn = %dn, error = %err, "failed to seed entry");
                return Err(match err {
                    DirectoryError::Operation(source) => DirectoryError::EntrySeed { dn, source },
                    DirectoryError::InvalidState { .. } => err,
                    other => DirectoryError::EntrySeed {
                        dn,
                        source: OperationError::new(ResultCode::OperationsError, other.to_string()),
                    },
                });
            }
        }
    }
    Ok(added)
}

/// Parses `dn` for seeding; a malformed name is reported as a seed error.
pub fn seed_dn(dn: &str) -> DirectoryResult<Dn> {
    Dn::parse(dn).map_err(|e| DirectoryError::EntrySeed {
        dn: dn.to_string(),
        source: OperationError::new(ResultCode::InvalidDnSyntax, e.to_string()),
    })
}
