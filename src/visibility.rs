//! Exam visibility
//!
//! Decides which exams an actor may see on their dashboard and why. Read-time
//! mirror of the exclusivity rules: a slot already claimed by someone from the
//! actor's institution is never advertised to that institution again.
use crate::account::Actor;
use crate::exam::{Assignment, Exam, ExamStatus};
use crate::role::Role;
use crate::types::ExamId;
use chrono::NaiveDate;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisibilitySource {
    /// Oversight of an exam owned by the actor's institution.
    OwnInstitution,
    /// Approved exam of another institution, open for selection.
    AvailableExternal,
    /// Awaiting approval by this actor.
    PendingApproval,
    /// The actor is an examiner on it.
    AssignedToActor,
    /// Admin view of another institution's exam.
    Oversight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamView {
    pub exam: Exam,
    pub status: ExamStatus, // effective
    pub source: VisibilitySource,
}

pub fn visible_exams(
    actor: &Actor,
    exams: &[Exam],
    assignments: &[Assignment],
    today: NaiveDate,
) -> Vec<ExamView> {
    if !actor.role.is_known() {
        return Vec::new();
    }
    if !actor.is_admin() && actor.institution.is_none() {
        return Vec::new();
    }

    let active = || assignments.iter().filter(|a| a.is_active());

    let mine: HashSet<&ExamId> = active()
        .filter(|a| a.faculty_id == actor.id)
        .map(|a| &a.exam_id)
        .collect();
    let claimed_by_my_institution: HashSet<&ExamId> = active()
        .filter(|a| actor.belongs_to(&a.institution))
        .map(|a| &a.exam_id)
        .collect();
    // one exam per teacher: holding any assignment hides the whole market
    let market_closed = actor.role == Role::Teacher && !mine.is_empty();

    let mut views: Vec<ExamView> = exams
        .iter()
        .filter_map(|exam| {
            let status = exam.effective_status(today);
            let source = classify(
                actor,
                exam,
                status,
                today,
                mine.contains(&exam.id),
                market_closed || claimed_by_my_institution.contains(&exam.id),
            )?;
            Some(ExamView {
                exam: exam.clone(),
                status,
                source,
            })
        })
        .collect();

    views.sort_by(|a, b| {
        a.exam
            .scheduled
            .cmp(&b.exam.scheduled)
            .then_with(|| a.exam.id.cmp(&b.exam.id))
    });
    views
}

fn classify(
    actor: &Actor,
    exam: &Exam,
    status: ExamStatus,
    today: NaiveDate,
    assigned_to_actor: bool,
    hidden_from_market: bool,
) -> Option<VisibilitySource> {
    let own = actor.belongs_to(&exam.institution);
    let pending_for_actor = status == ExamStatus::Pending
        && (actor.is_admin() || (own && actor.role == Role::Principal));

    if actor.is_admin() {
        return Some(if pending_for_actor {
            VisibilitySource::PendingApproval
        } else if own {
            VisibilitySource::OwnInstitution
        } else {
            VisibilitySource::Oversight
        });
    }

    if own {
        if actor.role.is_institution_authority() || exam.created_by == actor.id {
            return Some(if pending_for_actor {
                VisibilitySource::PendingApproval
            } else {
                VisibilitySource::OwnInstitution
            });
        }
        return None;
    }

    if assigned_to_actor {
        return Some(VisibilitySource::AssignedToActor);
    }

    let open = status == ExamStatus::Approved && !exam.scheduled.has_elapsed(today);
    (open && !hidden_from_market).then_some(VisibilitySource::AvailableExternal)
}

/// Convenience split for dashboards that render the market separately.
pub fn available_only(views: &[ExamView]) -> impl Iterator<Item = &ExamView> {
    views
        .iter()
        .filter(|v| v.source == VisibilitySource::AvailableExternal)
}
