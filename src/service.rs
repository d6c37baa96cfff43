//! Service layer API for exam coordination
//!
//! Every mutating call re-reads the records it depends on inside one store
//! transaction, applies the pure rules from `guard`, `lifecycle` and
//! `verification`, and only then writes.
use crate::account::{Account, AccountStatus, Actor, NewAccount};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{
    ExamCreateError, GuardError, RegistrationError, StoreError, TransitionError, VerifyError,
};
use crate::exam::{Assignment, AssignmentStatus, Exam, ExamStatus, NewExam};
use crate::guard::{self, Claims};
use crate::lifecycle::{self, Initiator};
use crate::role::Role;
use crate::store::{Store, Txn};
use crate::types::{AccountId, AssignmentId, ExamId, InstitutionId, StaffId, TimeStamp};
use crate::verification::{self, CredentialIssuer, IssuedCredential, RandomCredentialIssuer};
use crate::visibility::{self, ExamView};
use chrono::{NaiveDate, Utc};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, abort};
use std::sync::Arc;

pub struct ExamService {
    store: Store,
    clock: Arc<dyn Clock>,
    issuer: Arc<dyn CredentialIssuer>,
    config: EngineConfig,
}

/// Everything needed to write one assignment, apart from the exam itself.
struct Placement<'a> {
    assignment_id: &'a AssignmentId,
    faculty_id: &'a AccountId,
    institution: InstitutionId,
    assigned_by: Option<AccountId>,
    role_label: &'a str,
    at: &'a TimeStamp<Utc>,
}

fn identifier(err: anyhow::Error) -> StoreError {
    StoreError::Identifier(err.to_string())
}

fn deny<A, E>(result: Result<A, E>) -> ConflictableTransactionResult<A, E> {
    result.map_err(ConflictableTransactionError::Abort)
}

impl ExamService {
    pub fn new(store: Store, config: EngineConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            issuer: Arc::new(RandomCredentialIssuer::new(config.credential_length)),
            config,
        }
    }

    pub fn open(config: EngineConfig) -> Result<Self, StoreError> {
        let store = Store::open(&config)?;
        Ok(Self::new(store, config))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_issuer(mut self, issuer: Arc<dyn CredentialIssuer>) -> Self {
        self.issuer = issuer;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }


    /// Creates a `pending` account awaiting verification.
    pub fn register(&self, new: NewAccount) -> Result<Account, RegistrationError> {
        let role = Role::resolve(&new.raw_role);
        match role {
            Role::Unknown => return Err(RegistrationError::UnknownRole(new.raw_role)),
            Role::Admin => return Err(RegistrationError::AdminNotRegistrable),
            _ => {}
        }
        let institution = new
            .institution
            .filter(|inst| !inst.as_str().is_empty())
            .ok_or(RegistrationError::MissingInstitution)?;

        let account = Account {
            id: AccountId::generate().map_err(identifier)?,
            name: new.name,
            email: new.email,
            phone: new.phone,
            credential_hash: None,
            raw_role: new.raw_role,
            role,
            institution: Some(institution),
            department: new.department,
            status: AccountStatus::Pending,
            verified_by: None,
            staff_id: None,
            profile_complete: false,
            registered_at: self.clock.now(),
        };
        self.store.insert_account(&account)?;

        tracing::info!(account = %account.id, role = %role, "account registered");
        Ok(account)
    }

    /// Seeds a verified admin, the root of every verification chain.
    pub fn bootstrap_admin(
        &self,
        name: &str,
        email: &str,
    ) -> Result<IssuedCredential, RegistrationError> {
        let id = AccountId::generate().map_err(identifier)?;
        let staff_id = StaffId::generate().map_err(identifier)?;
        let secret = self.issuer.generate_secret();

        let account = Account {
            id: id.clone(),
            name: name.to_owned(),
            email: email.to_owned(),
            phone: None,
            credential_hash: Some(self.issuer.hash(&secret)),
            raw_role: Role::Admin.as_str().to_owned(),
            role: Role::Admin,
            institution: None,
            department: None,
            status: AccountStatus::Verified,
            verified_by: Some(id.clone()),
            staff_id: Some(staff_id.clone()),
            profile_complete: true,
            registered_at: self.clock.now(),
        };
        self.store.insert_account(&account)?;

        tracing::info!(account = %id, "admin bootstrapped");
        Ok(IssuedCredential {
            account_id: id,
            staff_id,
            secret,
        })
    }

    pub fn account(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        self.store.account(id)
    }


    /// Creates a `pending` exam owned by `new.institution`.
    pub fn create_exam(&self, actor: &Actor, new: NewExam) -> Result<Exam, ExamCreateError> {
        let author = self
            .store
            .account(&actor.id)?
            .filter(Account::is_verified)
            .map(|account| Actor::from(&account))
            .ok_or(ExamCreateError::Unauthorized)?;

        let permitted = author.is_admin()
            || (author.role.is_institution_authority() && author.belongs_to(&new.institution));
        if !permitted {
            tracing::debug!(actor = %actor.id, "exam creation denied");
            return Err(ExamCreateError::Unauthorized);
        }
        if new.institution.as_str().is_empty() {
            return Err(ExamCreateError::MissingInstitution);
        }
        if new.examiner_quota == 0 {
            return Err(ExamCreateError::InvalidQuota);
        }

        let exam = Exam {
            id: ExamId::generate().map_err(identifier)?,
            title: new.title,
            subject: new.subject,
            scheduled: new.scheduled,
            status: ExamStatus::Pending,
            institution: new.institution,
            department: new.department,
            created_by: author.id,
            examiner_quota: new.examiner_quota,
            examiners_assigned: 0,
            created_at: self.clock.now(),
        };
        self.store.insert_exam(&exam)?;

        tracing::info!(exam = %exam.id, institution = %exam.institution, "exam created");
        Ok(exam)
    }

    /// The exam with its effective status.
    pub fn exam(&self, id: &ExamId) -> Result<Option<Exam>, StoreError> {
        let today = self.today();
        Ok(self.store.exam(id)?.map(|mut exam| {
            exam.status = exam.effective_status(today);
            exam
        }))
    }

    pub fn visible_exams(&self, actor: &Actor) -> Result<Vec<ExamView>, StoreError> {
        let exams = self.store.exams()?;
        let assignments = self.store.assignments()?;
        Ok(visibility::visible_exams(
            actor,
            &exams,
            &assignments,
            self.today(),
        ))
    }

    /// State machine entry point for actor driven changes (approve, reject).
    ///
    /// `observed` is the status the caller read just before asking; if the
    /// exam has moved on since, nothing is written.
    pub fn transition(
        &self,
        actor: &Actor,
        exam_id: &ExamId,
        observed: ExamStatus,
        to: ExamStatus,
    ) -> Result<Exam, TransitionError> {
        if !actor.role.is_known() {
            return Err(TransitionError::Unauthorized);
        }
        let today = self.today();

        let result: Result<Exam, TransitionError> = self.store.transaction(|tx| {
            let Some(author) = stored_actor(tx, actor)? else {
                return abort(TransitionError::Unauthorized);
            };
            if !matches!(author.role, Role::Principal | Role::Admin) {
                return abort(TransitionError::Unauthorized);
            }
            let Some(mut exam) = tx.exam(exam_id)? else {
                return abort(TransitionError::ExamNotFound);
            };
            // nothing about another institution's exam leaks past this point
            if !author.is_admin() && !author.belongs_to(&exam.institution) {
                return abort(TransitionError::Unauthorized);
            }

            let actual = exam.effective_status(today);
            if actual != observed {
                return abort(TransitionError::StaleStatus {
                    expected: observed,
                    actual,
                });
            }
            deny(lifecycle::check(actual, to, Initiator::Actor(author.role)))?;

            exam.status = to;
            tx.put_exam(&exam)?;
            Ok(exam)
        });

        match &result {
            Ok(exam) => {
                tracing::info!(exam = %exam_id, from = ?observed, to = ?exam.status, by = %actor.id, "exam status changed")
            }
            Err(e) if e.is_domain() => {
                tracing::debug!(exam = %exam_id, error = %e, "exam transition denied")
            }
            Err(e) => tracing::error!(exam = %exam_id, error = %e, "exam transition failed"),
        }
        result
    }

    /// Persists the lazy `DateElapsed` completion for every elapsed exam.
    /// Returns how many exams were settled.
    pub fn settle_completed(&self) -> Result<usize, TransitionError> {
        let today = self.today();
        let mut settled = 0;

        for candidate in self.store.exams()? {
            if candidate.status == ExamStatus::Completed
                || candidate.effective_status(today) != ExamStatus::Completed
            {
                continue;
            }
            let changed: Result<bool, TransitionError> = self.store.transaction(|tx| {
                let Some(mut exam) = tx.exam(&candidate.id)? else {
                    return Ok(false);
                };
                if exam.effective_status(today) != ExamStatus::Completed
                    || exam.status == ExamStatus::Completed
                {
                    return Ok(false);
                }
                deny(lifecycle::check(
                    exam.status,
                    ExamStatus::Completed,
                    Initiator::System,
                ))?;
                exam.status = ExamStatus::Completed;
                tx.put_exam(&exam)?;
                Ok(true)
            });
            if changed? {
                tracing::info!(exam = %candidate.id, "exam completed");
                settled += 1;
            }
        }
        Ok(settled)
    }


    /// A teacher claims an external exam slot for themselves.
    pub fn try_select(&self, actor: &Actor, exam_id: &ExamId) -> Result<AssignmentId, GuardError> {
        if actor.role != Role::Teacher {
            tracing::debug!(actor = %actor.id, role = %actor.role, "self-selection denied");
            return Err(GuardError::Unauthorized);
        }
        let assignment_id = AssignmentId::generate().map_err(identifier)?;
        let today = self.today();
        let now = self.clock.now();

        let result: Result<Assignment, GuardError> = self.store.transaction(|tx| {
            let account = tx.account(&actor.id)?;
            deny(guard::authorize_selection(actor, account.as_ref()))?;
            let Some(institution) = account.and_then(|a| a.institution) else {
                return abort(GuardError::Unauthorized);
            };
            let Some(exam) = tx.exam(exam_id)? else {
                return abort(GuardError::ExamNotFound);
            };
            deny(guard::check_eligibility(&exam, &institution, today))?;

            place(
                tx,
                exam,
                Placement {
                    assignment_id: &assignment_id,
                    faculty_id: &actor.id,
                    institution,
                    assigned_by: None,
                    role_label: &self.config.external_examiner_label,
                    at: &now,
                },
            )
        });

        log_placement(exam_id, &actor.id, &result);
        result.map(|assignment| assignment.id)
    }

    /// An authority assigns an external teacher to one of its exams.
    pub fn nominate(
        &self,
        actor: &Actor,
        exam_id: &ExamId,
        faculty_id: &AccountId,
    ) -> Result<AssignmentId, GuardError> {
        if !actor.role.is_known() {
            return Err(GuardError::Unauthorized);
        }
        let assignment_id = AssignmentId::generate().map_err(identifier)?;
        let today = self.today();
        let now = self.clock.now();

        let result: Result<Assignment, GuardError> = self.store.transaction(|tx| {
            let Some(author) = stored_actor(tx, actor)? else {
                return abort(GuardError::Unauthorized);
            };
            let Some(exam) = tx.exam(exam_id)? else {
                return abort(GuardError::ExamNotFound);
            };
            deny(guard::authorize_nomination(&author, &exam))?;

            let nominee = tx.account(faculty_id)?;
            deny(guard::check_nominee(nominee.as_ref(), &exam))?;
            let Some(institution) = nominee.and_then(|n| n.institution) else {
                return abort(GuardError::FacultyNotEligible);
            };
            deny(guard::check_eligibility(&exam, &institution, today))?;

            place(
                tx,
                exam,
                Placement {
                    assignment_id: &assignment_id,
                    faculty_id,
                    institution,
                    assigned_by: Some(author.id),
                    role_label: &self.config.external_examiner_label,
                    at: &now,
                },
            )
        });

        log_placement(exam_id, faculty_id, &result);
        result.map(|assignment| assignment.id)
    }

    pub fn assignments_for_exam(&self, exam_id: &ExamId) -> Result<Vec<Assignment>, StoreError> {
        Ok(self
            .store
            .assignments()?
            .into_iter()
            .filter(|a| a.exam_id == *exam_id)
            .collect())
    }

    /// The faculty member's active assignment, if any.
    pub fn assignment_for_faculty(
        &self,
        faculty_id: &AccountId,
    ) -> Result<Option<Assignment>, StoreError> {
        match self.store.claim(&guard::faculty_claim_key(faculty_id))? {
            Some(id) => Ok(self.store.assignment(&id)?.filter(Assignment::is_active)),
            None => Ok(None),
        }
    }


    /// Pending accounts the verifier may act on.
    pub fn verifiable_accounts(&self, verifier: &Actor) -> Result<Vec<Account>, VerifyError> {
        if !verifier.role.is_known() {
            return Err(VerifyError::Unauthorized);
        }
        let stored = self
            .store
            .account(&verifier.id)?
            .filter(|v| v.is_verified() && v.role.subordinate().is_some())
            .ok_or(VerifyError::Unauthorized)?;

        let accounts = self.store.accounts()?;
        Ok(verification::verifiable_accounts(&stored, &accounts)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Verifies a pending subordinate and returns its one-time credential.
    pub fn verify(
        &self,
        verifier: &Actor,
        target_id: &AccountId,
    ) -> Result<IssuedCredential, VerifyError> {
        if !verifier.role.is_known() {
            return Err(VerifyError::Unauthorized);
        }
        let staff_id = StaffId::generate().map_err(identifier)?;
        let secret = self.issuer.generate_secret();
        let credential_hash = self.issuer.hash(&secret);

        let result: Result<(), VerifyError> = self.store.transaction(|tx| {
            let mut target = checked_target(tx, verifier, target_id)?;
            target.status = AccountStatus::Verified;
            target.verified_by = Some(verifier.id.clone());
            target.staff_id = Some(staff_id.clone());
            target.credential_hash = Some(credential_hash.clone());
            tx.put_account(&target)
        });

        log_verification(verifier, target_id, "verified", &result);
        result.map(|()| IssuedCredential {
            account_id: target_id.clone(),
            staff_id,
            secret,
        })
    }

    /// Rejects a pending subordinate. No credential is issued.
    pub fn reject(&self, verifier: &Actor, target_id: &AccountId) -> Result<(), VerifyError> {
        if !verifier.role.is_known() {
            return Err(VerifyError::Unauthorized);
        }

        let result: Result<(), VerifyError> = self.store.transaction(|tx| {
            let mut target = checked_target(tx, verifier, target_id)?;
            target.status = AccountStatus::Rejected;
            target.verified_by = Some(verifier.id.clone());
            tx.put_account(&target)
        });

        log_verification(verifier, target_id, "rejected", &result);
        result
    }
}

/// The actor as the store knows it; `None` unless the account exists and is verified.
fn stored_actor<E: From<StoreError>>(
    tx: &Txn<'_, E>,
    actor: &Actor,
) -> ConflictableTransactionResult<Option<Actor>, E> {
    Ok(tx
        .account(&actor.id)?
        .filter(Account::is_verified)
        .map(|account| Actor::from(&account)))
}

fn active_claim(
    tx: &Txn<'_, GuardError>,
    key: &str,
) -> ConflictableTransactionResult<Option<Assignment>, GuardError> {
    match tx.claim(key)? {
        Some(holder) => Ok(tx.assignment(&holder)?.filter(Assignment::is_active)),
        None => Ok(None),
    }
}

/// Claim checks and the write itself. Runs inside the caller's transaction.
fn place(
    tx: &Txn<'_, GuardError>,
    mut exam: Exam,
    placement: Placement<'_>,
) -> ConflictableTransactionResult<Assignment, GuardError> {
    let faculty_key = guard::faculty_claim_key(placement.faculty_id);
    let institution_key = guard::institution_claim_key(&exam.id, &placement.institution);

    let claims = Claims {
        candidate_exam: active_claim(tx, &faculty_key)?.map(|a| a.exam_id),
        institution_taken: active_claim(tx, &institution_key)?.is_some(),
    };
    deny(guard::check_claims(&exam.id, &claims))?;

    let assignment = Assignment {
        id: placement.assignment_id.clone(),
        exam_id: exam.id.clone(),
        faculty_id: placement.faculty_id.clone(),
        institution: placement.institution,
        role_label: placement.role_label.to_owned(),
        assigned_by: placement.assigned_by,
        assigned_at: placement.at.clone(),
        status: AssignmentStatus::Active,
    };
    tx.put_assignment(&assignment)?;
    tx.put_claim(&faculty_key, &assignment.id)?;
    tx.put_claim(&institution_key, &assignment.id)?;

    exam.examiners_assigned += 1;
    if exam.quota_met() {
        deny(
            lifecycle::check(exam.status, ExamStatus::Assigned, Initiator::System)
                .map_err(|_| GuardError::ExamNotEligible),
        )?;
        exam.status = ExamStatus::Assigned;
    }
    tx.put_exam(&exam)?;

    Ok(assignment)
}

fn log_placement(
    exam_id: &ExamId,
    faculty_id: &AccountId,
    result: &Result<Assignment, GuardError>,
) {
    match result {
        Ok(assignment) => tracing::info!(
            exam = %exam_id,
            faculty = %faculty_id,
            assignment = %assignment.id,
            self_selected = assignment.is_self_selected(),
            "examiner assigned"
        ),
        Err(e) if e.is_domain() => {
            tracing::debug!(exam = %exam_id, faculty = %faculty_id, error = %e, "assignment denied")
        }
        Err(e) => {
            tracing::error!(exam = %exam_id, faculty = %faculty_id, error = %e, "assignment failed")
        }
    }
}

/// Loads both parties and applies the eligibility rule.
fn checked_target(
    tx: &Txn<'_, VerifyError>,
    verifier: &Actor,
    target_id: &AccountId,
) -> ConflictableTransactionResult<Account, VerifyError> {
    let Some(verifier) = tx.account(&verifier.id)? else {
        return abort(VerifyError::Unauthorized);
    };
    let Some(target) = tx.account(target_id)? else {
        return abort(VerifyError::AccountNotFound);
    };
    deny(verification::check(&verifier, &target))?;
    Ok(target)
}

fn log_verification(
    verifier: &Actor,
    target_id: &AccountId,
    outcome: &str,
    result: &Result<(), VerifyError>,
) {
    match result {
        Ok(()) => tracing::info!(verifier = %verifier.id, target = %target_id, outcome, "account decision recorded"),
        Err(e) if e.is_domain() => {
            tracing::debug!(verifier = %verifier.id, target = %target_id, error = %e, "verification denied")
        }
        Err(e) => {
            tracing::error!(verifier = %verifier.id, target = %target_id, error = %e, "verification failed")
        }
    }
}
