//! Hierarchical account verification
//!
//! Each role verifies exactly the role one level below it, inside its own
//! institution. Admin sits above every institution and may verify any lower
//! level. Verification issues a one-time credential whose plaintext leaves the
//! engine exactly once.
use crate::account::Account;
use crate::error::VerifyError;
use crate::role::Role;
use crate::types::{AccountId, StaffId};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};

const SALT_BYTES: usize = 16;

/// Secret generation and hashing. Delivery of the plaintext is the caller's job.
pub trait CredentialIssuer: Send + Sync {
    fn generate_secret(&self) -> String;
    fn hash(&self, secret: &str) -> String;
}

/// Alphanumeric secrets, stored as `salt$sha256(salt + secret)`.
#[derive(Debug, Clone)]
pub struct RandomCredentialIssuer {
    length: usize,
}

/// Returned by a successful verify. The secret is never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCredential {
    pub account_id: AccountId,
    pub staff_id: StaffId,
    pub secret: String,
}

impl RandomCredentialIssuer {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(8),
        }
    }
}

impl Default for RandomCredentialIssuer {
    fn default() -> Self {
        Self::new(12)
    }
}

impl CredentialIssuer for RandomCredentialIssuer {
    fn generate_secret(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect()
    }

    fn hash(&self, secret: &str) -> String {
        let mut salt = [0u8; SALT_BYTES];
        rand::thread_rng().fill_bytes(&mut salt);
        salted_digest(&hex::encode(salt), secret)
    }
}

fn salted_digest(salt: &str, secret: &str) -> String {
    format!("{salt}${}", sha256::digest(format!("{salt}{secret}")))
}

/// Checks a secret against a hash produced by [`RandomCredentialIssuer`].
pub fn verify_credential(stored: &str, secret: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, _)) => salted_digest(salt, secret) == stored,
        None => false,
    }
}

impl std::fmt::Debug for IssuedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("account_id", &self.account_id)
            .field("staff_id", &self.staff_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Whether `verifier` may verify or reject `target` right now.
///
/// Checked in order: verifier authority, target still pending, institution,
/// then hierarchy level.
pub fn check(verifier: &Account, target: &Account) -> Result<(), VerifyError> {
    if !verifier.is_verified() || verifier.role.subordinate().is_none() {
        return Err(VerifyError::Unauthorized);
    }
    if !target.is_pending() {
        return Err(VerifyError::NotPending);
    }
    if verifier.role != Role::Admin {
        match (&verifier.institution, &target.institution) {
            (Some(mine), Some(theirs)) if mine == theirs => {}
            _ => return Err(VerifyError::WrongInstitution),
        }
    }
    if !level_permits(verifier.role, target.role) {
        return Err(VerifyError::WrongHierarchyLevel);
    }
    Ok(())
}

fn level_permits(verifier: Role, target: Role) -> bool {
    match (verifier.authority_level(), target.authority_level()) {
        (Some(0), Some(t)) => t > 0,
        (Some(v), Some(t)) => t == v + 1,
        _ => false,
    }
}

/// The pending accounts `verifier` may act on, oldest registration first.
pub fn verifiable_accounts<'a>(verifier: &Account, accounts: &'a [Account]) -> Vec<&'a Account> {
    let mut queue: Vec<&Account> = accounts
        .iter()
        .filter(|target| target.id != verifier.id && check(verifier, target).is_ok())
        .collect();
    queue.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
    queue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountStatus;
    use crate::types::{InstitutionId, TimeStamp};

    fn account(id: &str, role: &str, institution: Option<&str>, status: AccountStatus) -> Account {
        Account {
            id: AccountId::from(id),
            name: id.to_uppercase(),
            email: format!("{id}@college.edu"),
            phone: None,
            credential_hash: None,
            raw_role: role.into(),
            role: Role::resolve(role),
            institution: institution.map(InstitutionId::from),
            department: None,
            status,
            verified_by: None,
            staff_id: None,
            profile_complete: false,
            registered_at: TimeStamp::new(),
        }
    }

    use AccountStatus::{Pending, Rejected, Verified};

    #[test]
    fn one_level_down_same_institution() {
        let principal = account("p", "principal", Some("a"), Verified);
        let vp = account("vp", "vp", Some("a"), Pending);
        let hod = account("h", "hod", Some("a"), Pending);

        assert!(check(&principal, &vp).is_ok());
        assert!(matches!(
            check(&principal, &hod),
            Err(VerifyError::WrongHierarchyLevel)
        ));
    }

    #[test]
    fn other_institution_is_rejected() {
        let hod = account("h", "hod", Some("a"), Verified);
        let teacher = account("t", "teacher", Some("b"), Pending);

        assert!(matches!(check(&hod, &teacher), Err(VerifyError::WrongInstitution)));
    }

    #[test]
    fn admin_is_exempt_from_institution_and_spans_levels() {
        let admin = account("root", "admin", None, Verified);

        for role in ["principal", "vp", "hod", "teacher"] {
            let target = account("x", role, Some("z"), Pending);
            assert!(check(&admin, &target).is_ok(), "admin should verify {role}");
        }
        let other_admin = account("root2", "admin", None, Pending);
        assert!(matches!(
            check(&admin, &other_admin),
            Err(VerifyError::WrongHierarchyLevel)
        ));
    }

    #[test]
    fn non_pending_targets_fail_first() {
        let principal = account("p", "principal", Some("a"), Verified);
        let done = account("vp", "vp", Some("b"), Rejected);

        assert!(matches!(check(&principal, &done), Err(VerifyError::NotPending)));
    }

    #[test]
    fn unverified_or_leaf_verifiers_are_unauthorized() {
        let pending_principal = account("p", "principal", Some("a"), Pending);
        let teacher = account("t", "teacher", Some("a"), Verified);
        let stranger = account("s", "janitor", Some("a"), Verified);
        let vp = account("vp", "vp", Some("a"), Pending);

        for verifier in [&pending_principal, &teacher, &stranger] {
            assert!(matches!(check(verifier, &vp), Err(VerifyError::Unauthorized)));
        }
    }

    #[test]
    fn unknown_target_role_is_never_verifiable() {
        let admin = account("root", "admin", None, Verified);
        let odd = account("o", "student", Some("a"), Pending);

        assert!(matches!(check(&admin, &odd), Err(VerifyError::WrongHierarchyLevel)));
    }

    #[test]
    fn queue_lists_only_actionable_accounts() {
        let hod = account("h", "hod", Some("a"), Verified);
        let accounts = vec![
            account("t1", "teacher", Some("a"), Pending),
            account("t2", "teacher", Some("b"), Pending),
            account("t3", "faculty", Some("a"), Verified),
            account("v1", "vp", Some("a"), Pending),
            account("t4", "Teacher", Some("a"), Pending),
            hod.clone(),
        ];

        let ids: Vec<&str> = verifiable_accounts(&hod, &accounts)
            .iter()
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(ids, vec!["t1", "t4"]);
    }

    #[test]
    fn queue_is_oldest_registration_first() {
        let principal = account("p", "principal", Some("a"), Verified);
        let mut late = account("late", "vp", Some("a"), Pending);
        late.registered_at = TimeStamp::new_with(2026, 10, 2, 9, 0, 0).unwrap();
        let mut early = account("early", "vp", Some("a"), Pending);
        early.registered_at = TimeStamp::new_with(2026, 9, 30, 17, 45, 0).unwrap();

        let accounts = vec![late, early];
        let ids: Vec<&str> = verifiable_accounts(&principal, &accounts)
            .iter()
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn issued_hash_verifies_only_its_secret() {
        let issuer = RandomCredentialIssuer::default();
        let secret = issuer.generate_secret();
        let stored = issuer.hash(&secret);

        assert_eq!(secret.len(), 12);
        assert!(verify_credential(&stored, &secret));
        assert!(!verify_credential(&stored, "not-the-secret"));
        assert!(!stored.contains(&secret));
    }

    #[test]
    fn debug_output_hides_secret() {
        let credential = IssuedCredential {
            account_id: AccountId::from("acct_1"),
            staff_id: StaffId::from("staff_1"),
            secret: "hunter2hunter2".into(),
        };
        assert!(!format!("{credential:?}").contains("hunter2"));
    }
}
