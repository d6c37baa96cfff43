//! Role hierarchy resolution
//!
//! Raw role strings arrive from registration forms and session data in many
//! spellings. Everything past this module works with [`Role`] only.
use crate::utils::normalise_token;

/// Numeric rank of a role. Lower is more senior; `0` is admin.
pub type AuthorityLevel = u8;

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub enum Role {
    #[n(0)]
    Admin,
    #[n(1)]
    Principal,
    #[n(2)]
    VicePrincipal,
    #[n(3)]
    Hod,
    #[n(4)]
    Teacher,
    #[n(5)]
    Unknown,
}

/// Canonical role plus its authority level, `None` for [`Role::Unknown`].
pub fn resolve(raw: &str) -> (Role, Option<AuthorityLevel>) {
    let role = Role::resolve(raw);
    (role, role.authority_level())
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::Principal,
        Role::VicePrincipal,
        Role::Hod,
        Role::Teacher,
    ];

    pub fn resolve(raw: &str) -> Self {
        match normalise_token(raw).as_str() {
            "admin" | "administrator" | "super_admin" | "superadmin" => Role::Admin,
            "principal" => Role::Principal,
            "vice_principal" | "viceprincipal" | "vp" => Role::VicePrincipal,
            "hod" | "head_of_department" | "department_head" => Role::Hod,
            "teacher" | "faculty" | "lecturer" => Role::Teacher,
            _ => Role::Unknown,
        }
    }

    pub fn authority_level(&self) -> Option<AuthorityLevel> {
        match self {
            Role::Admin => Some(0),
            Role::Principal => Some(1),
            Role::VicePrincipal => Some(2),
            Role::Hod => Some(3),
            Role::Teacher => Some(4),
            Role::Unknown => None,
        }
    }

    pub fn from_level(level: AuthorityLevel) -> Option<Self> {
        Role::ALL
            .into_iter()
            .find(|r| r.authority_level() == Some(level))
    }

    /// The role exactly one level below, if any.
    pub fn subordinate(&self) -> Option<Self> {
        self.authority_level()
            .and_then(|level| Role::from_level(level + 1))
    }

    pub fn is_known(&self) -> bool {
        *self != Role::Unknown
    }

    /// Roles that oversee every exam of their own institution.
    pub fn is_institution_authority(&self) -> bool {
        matches!(self, Role::Principal | Role::VicePrincipal | Role::Hod)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Principal => "principal",
            Role::VicePrincipal => "vice_principal",
            Role::Hod => "hod",
            Role::Teacher => "teacher",
            Role::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
