//! Staff accounts and the actor descriptor passed into every decision
use crate::role::{AuthorityLevel, Role};
use crate::types::{AccountId, DepartmentId, InstitutionId, StaffId, TimeStamp};
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Verified,
    #[n(2)]
    Rejected,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Account {
    #[n(0)]
    pub id: AccountId,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub email: String,
    #[n(3)]
    pub phone: Option<String>,
    #[n(4)]
    pub credential_hash: Option<String>, // salted, see verification::verify_credential
    #[n(5)]
    pub raw_role: String, // as typed at registration
    #[n(6)]
    pub role: Role,
    #[n(7)]
    pub institution: Option<InstitutionId>,
    #[n(8)]
    pub department: Option<DepartmentId>,
    #[n(9)]
    pub status: AccountStatus,
    #[n(10)]
    pub verified_by: Option<AccountId>,
    #[n(11)]
    pub staff_id: Option<StaffId>,
    #[n(12)]
    pub profile_complete: bool,
    #[n(13)]
    pub registered_at: TimeStamp<Utc>,
}

/// Registration input. The canonical role is derived, never supplied.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub raw_role: String,
    pub institution: Option<InstitutionId>,
    pub department: Option<DepartmentId>,
}

/// Who is asking. Built once per request by the caller's session layer and passed
/// explicitly; the engine never looks anything up implicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: AccountId,
    pub role: Role,
    pub institution: Option<InstitutionId>,
    pub department: Option<DepartmentId>,
}

impl Account {
    pub fn authority_level(&self) -> Option<AuthorityLevel> {
        self.role.authority_level()
    }
    pub fn is_verified(&self) -> bool {
        self.status == AccountStatus::Verified
    }
    pub fn is_pending(&self) -> bool {
        self.status == AccountStatus::Pending
    }
    pub fn actor(&self) -> Actor {
        Actor::from(self)
    }
}

impl NewAccount {
    pub fn new(name: &str, email: &str, raw_role: &str, institution: Option<&str>) -> Self {
        Self {
            name: name.to_owned(),
            email: email.to_owned(),
            phone: None,
            raw_role: raw_role.to_owned(),
            institution: institution.map(InstitutionId::from),
            department: None,
        }
    }
    pub fn with_department(mut self, department: &str) -> Self {
        self.department = Some(department.to_owned());
        self
    }
    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_owned());
        self
    }
}

impl Actor {
    /// Session entry point: resolves the raw role exactly once.
    pub fn resolve(
        id: AccountId,
        raw_role: &str,
        institution: Option<InstitutionId>,
        department: Option<DepartmentId>,
    ) -> Self {
        Self {
            id,
            role: Role::resolve(raw_role),
            institution,
            department,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Same institution, with a missing institution never matching anything.
    pub fn belongs_to(&self, institution: &InstitutionId) -> bool {
        self.institution.as_ref() == Some(institution)
    }
}

impl From<&Account> for Actor {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            role: account.role,
            institution: account.institution.clone(),
            department: account.department.clone(),
        }
    }
}
