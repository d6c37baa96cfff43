//! Assignment exclusivity rules
//!
//! Pure decision functions. The service evaluates them inside the same store
//! transaction that commits the assignment, against claims read in that
//! transaction, so no two conflicting requests can both pass.
use crate::account::{Account, Actor};
use crate::error::GuardError;
use crate::exam::{Exam, ExamStatus};
use crate::role::Role;
use crate::types::{AccountId, ExamId, InstitutionId};
use chrono::NaiveDate;

/// What the store already holds that could conflict with a new assignment.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Exam the candidate is currently assigned to, if any.
    pub candidate_exam: Option<ExamId>,
    /// Someone from the candidate's institution already examines this exam.
    pub institution_taken: bool,
}

/// Only verified teachers with an institution may self-select.
pub fn authorize_selection(actor: &Actor, account: Option<&Account>) -> Result<(), GuardError> {
    if actor.role != Role::Teacher {
        return Err(GuardError::Unauthorized);
    }
    match account {
        Some(account)
            if account.is_verified()
                && account.role == Role::Teacher
                && account.institution.is_some() =>
        {
            Ok(())
        }
        _ => Err(GuardError::Unauthorized),
    }
}

/// Nominations: admin anywhere, institution authorities at home.
pub fn authorize_nomination(actor: &Actor, exam: &Exam) -> Result<(), GuardError> {
    match actor.role {
        Role::Admin => Ok(()),
        role if role.is_institution_authority() && actor.belongs_to(&exam.institution) => Ok(()),
        _ => Err(GuardError::Unauthorized),
    }
}

/// The nominee must be a verified teacher from somewhere else.
pub fn check_nominee(nominee: Option<&Account>, exam: &Exam) -> Result<(), GuardError> {
    match nominee {
        Some(nominee)
            if nominee.is_verified()
                && nominee.role == Role::Teacher
                && nominee
                    .institution
                    .as_ref()
                    .is_some_and(|inst| *inst != exam.institution) =>
        {
            Ok(())
        }
        _ => Err(GuardError::FacultyNotEligible),
    }
}

/// The exam must be approved, external to the examiner and not yet past.
pub fn check_eligibility(
    exam: &Exam,
    examiner_institution: &InstitutionId,
    today: NaiveDate,
) -> Result<(), GuardError> {
    if exam.effective_status(today) != ExamStatus::Approved
        || exam.institution == *examiner_institution
        || exam.scheduled.has_elapsed(today)
    {
        return Err(GuardError::ExamNotEligible);
    }
    Ok(())
}

/// Conflicts with existing claims: the candidate's own claim first, then the institution's.
pub fn check_claims(exam_id: &ExamId, claims: &Claims) -> Result<(), GuardError> {
    match &claims.candidate_exam {
        Some(held) if held != exam_id => return Err(GuardError::AlreadyAssignedElsewhere),
        Some(_) => return Err(GuardError::AlreadyAssignedHere),
        None => {}
    }
    if claims.institution_taken {
        return Err(GuardError::InstitutionConflict);
    }
    Ok(())
}

/// Claim key enforcing one active assignment per faculty member.
pub fn faculty_claim_key(faculty: &AccountId) -> String {
    format!("faculty:{faculty}")
}

/// Claim key enforcing one active assignment per institution per exam.
pub fn institution_claim_key(exam: &ExamId, institution: &InstitutionId) -> String {
    format!("exam:{exam}:{institution}")
}
