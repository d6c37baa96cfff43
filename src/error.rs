use crate::exam::ExamStatus;

/// Infrastructure failures. Never a domain decision.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(#[from] sled::Error),
    #[error("transaction failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: sled::Error,
    },
    #[error("record encoding failed: {0}")]
    Codec(String),
    #[error("identifier generation failed: {0}")]
    Identifier(String),
}

#[derive(thiserror::Error, Debug)]
pub enum GuardError {
    #[error("actor is not permitted to take examiner assignments")]
    Unauthorized,
    #[error("exam is not open for selection")]
    ExamNotEligible,
    #[error("exam does not exist")]
    ExamNotFound,
    #[error("nominee cannot serve as an external examiner")]
    FacultyNotEligible,
    #[error("teacher already holds an assignment to another exam")]
    AlreadyAssignedElsewhere,
    #[error("teacher is already assigned to this exam")]
    AlreadyAssignedHere,
    #[error("an examiner from this institution is already assigned to this exam")]
    InstitutionConflict,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(thiserror::Error, Debug)]
pub enum TransitionError {
    #[error("exam cannot move from {from:?} to {to:?}")]
    InvalidTransition { from: ExamStatus, to: ExamStatus },
    #[error("actor may not change this exam's status")]
    Unauthorized,
    #[error("exam status changed since it was read: expected {expected:?}, found {actual:?}")]
    StaleStatus {
        expected: ExamStatus,
        actual: ExamStatus,
    },
    #[error("exam does not exist")]
    ExamNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(thiserror::Error, Debug)]
pub enum VerifyError {
    #[error("account is not awaiting verification")]
    NotPending,
    #[error("account belongs to a different institution")]
    WrongInstitution,
    #[error("account is not exactly one level below the verifier")]
    WrongHierarchyLevel,
    #[error("actor may not verify accounts")]
    Unauthorized,
    #[error("account does not exist")]
    AccountNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(thiserror::Error, Debug)]
pub enum RegistrationError {
    #[error("role {0:?} is not recognised")]
    UnknownRole(String),
    #[error("admin accounts cannot self-register")]
    AdminNotRegistrable,
    #[error("an institution is required for this role")]
    MissingInstitution,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(thiserror::Error, Debug)]
pub enum ExamCreateError {
    #[error("actor may not create exams for this institution")]
    Unauthorized,
    #[error("examiner quota must be at least one")]
    InvalidQuota,
    #[error("an exam must belong to an institution")]
    MissingInstitution,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl From<minicbor::decode::Error> for StoreError {
    fn from(value: minicbor::decode::Error) -> Self {
        StoreError::Codec(value.to_string())
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for StoreError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        StoreError::Codec(value.to_string())
    }
}

// lets callers tell a rule decision apart from an infrastructure failure without
// matching on every variant
macro_rules! domain_split {
    ($($ty:ty),+) => {
        $(impl $ty {
            pub fn is_domain(&self) -> bool {
                !matches!(self, Self::Store(_))
            }
        })+
    };
}

domain_split!(
    GuardError,
    TransitionError,
    VerifyError,
    RegistrationError,
    ExamCreateError
);
