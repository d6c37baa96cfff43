pub mod account;
pub mod clock;
pub mod config;
pub mod error;
pub mod exam;
pub mod guard;
pub mod lifecycle;
pub mod logging;
pub mod role;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;
pub mod verification;
pub mod visibility;

pub use account::{Account, AccountStatus, Actor, NewAccount};
pub use error::{
    ConfigError, ExamCreateError, GuardError, RegistrationError, StoreError, TransitionError,
    VerifyError,
};
pub use exam::{Assignment, Exam, ExamStatus, NewExam};
pub use role::Role;
pub use service::ExamService;
