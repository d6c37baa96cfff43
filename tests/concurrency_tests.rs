//! Concurrent selection races
//!
//! Many threads hit the same slots at once through one shared service. The claim
//! keys written in the selection transaction must leave exactly one winner per
//! contested slot, whatever the interleaving.

use anyhow::Context;
use chrono::{Days, NaiveDate};
use exam_coordination::{
    Actor, ExamService, ExamStatus, GuardError, NewAccount, NewExam, clock::FixedClock,
    config::EngineConfig, exam::Exam, store::Store, types::ExamDate,
};
use sled::open;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use tempfile::{TempDir, tempdir};

const RACERS: usize = 8;

fn service(db_name: &str) -> anyhow::Result<(TempDir, ExamService, Actor)> {
    let dir = tempdir()?;
    let db = Arc::new(open(dir.path().join(db_name))?);
    let config = EngineConfig::default();
    let clock = Arc::new(FixedClock::new(
        NaiveDate::from_ymd_opt(2026, 10, 19).context("start date")?,
    ));
    let service = ExamService::new(Store::with_db(db, config.max_transaction_attempts)?, config)
        .with_clock(clock);

    let issued = service.bootstrap_admin("Registrar", "registrar@board.edu")?;
    let admin = service.account(&issued.account_id)?.context("admin")?.actor();
    Ok((dir, service, admin))
}

fn teacher(service: &ExamService, admin: &Actor, name: &str, institution: &str) -> anyhow::Result<Actor> {
    let account = service.register(NewAccount::new(
        name,
        &format!("{name}@{institution}.edu"),
        "teacher",
        Some(institution),
    ))?;
    service.verify(admin, &account.id)?;
    Ok(account.actor())
}

fn open_exam(service: &ExamService, admin: &Actor, title: &str, quota: u32) -> anyhow::Result<Exam> {
    let date = service
        .today()
        .checked_add_days(Days::new(30))
        .context("date")?;
    let exam = service.create_exam(
        admin,
        NewExam::new(title, "Physics", ExamDate::new(date), "host").with_quota(quota),
    )?;
    Ok(service.transition(admin, &exam.id, ExamStatus::Pending, ExamStatus::Approved)?)
}

#[test]
fn one_teacher_racing_for_many_exams_wins_once() -> anyhow::Result<()> {
    let (_dir, service, admin) = service("race_teacher.db")?;
    let racer = teacher(&service, &admin, "Iyer", "north")?;
    let exams = (0..RACERS)
        .map(|i| open_exam(&service, &admin, &format!("Paper {i}"), 2))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let (service, racer) = (&service, &racer);
    let outcomes: Vec<Result<_, GuardError>> = thread::scope(|s| {
        let handles: Vec<_> = exams
            .iter()
            .map(|exam| s.spawn(move || service.try_select(racer, &exam.id)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("selection thread panicked"))
            .collect()
    });

    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "outcomes: {outcomes:?}");
    assert!(
        outcomes
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, GuardError::AlreadyAssignedElsewhere)),
        "losers must see the winning claim: {outcomes:?}"
    );

    let active = service
        .store()
        .assignments()?
        .into_iter()
        .filter(|a| a.faculty_id == racer.id && a.is_active())
        .count();
    assert_eq!(active, 1);

    Ok(())
}

#[test]
fn colleagues_racing_for_one_exam_leave_one_examiner() -> anyhow::Result<()> {
    let (_dir, service, admin) = service("race_institution.db")?;
    let exam = open_exam(&service, &admin, "Board Paper", RACERS as u32)?;
    let racers = (0..RACERS)
        .map(|i| teacher(&service, &admin, &format!("south{i}"), "south"))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let (service, exam) = (&service, &exam);
    let outcomes: Vec<Result<_, GuardError>> = thread::scope(|s| {
        let handles: Vec<_> = racers
            .iter()
            .map(|racer| s.spawn(move || service.try_select(racer, &exam.id)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("selection thread panicked"))
            .collect()
    });

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, GuardError::InstitutionConflict))
    );

    let stored = service.exam(&exam.id)?.context("exam")?;
    assert_eq!(stored.examiners_assigned, 1);
    assert_eq!(stored.status, ExamStatus::Approved);

    Ok(())
}

#[test]
fn mixed_race_respects_both_invariants() -> anyhow::Result<()> {
    let (_dir, service, admin) = service("race_mixed.db")?;
    let exams = (0..3)
        .map(|i| open_exam(&service, &admin, &format!("Paper {i}"), 4))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let mut racers = Vec::new();
    for institution in ["east", "west"] {
        for i in 0..3 {
            racers.push(teacher(&service, &admin, &format!("{institution}{i}"), institution)?);
        }
    }

    thread::scope(|s| {
        for racer in &racers {
            for exam in &exams {
                let service = &service;
                s.spawn(move || {
                    let _ = service.try_select(racer, &exam.id);
                });
            }
        }
    });

    let active: Vec<_> = service
        .store()
        .assignments()?
        .into_iter()
        .filter(|a| a.is_active())
        .collect();

    let mut per_teacher: HashMap<_, usize> = HashMap::new();
    let mut per_slot: HashMap<_, usize> = HashMap::new();
    for assignment in &active {
        *per_teacher.entry(assignment.faculty_id.clone()).or_default() += 1;
        *per_slot
            .entry((assignment.exam_id.clone(), assignment.institution.clone()))
            .or_default() += 1;
    }
    assert!(per_teacher.values().all(|&n| n == 1), "{per_teacher:?}");
    assert!(per_slot.values().all(|&n| n == 1), "{per_slot:?}");

    for exam in &exams {
        let stored = service.exam(&exam.id)?.context("exam")?;
        let held = active.iter().filter(|a| a.exam_id == exam.id).count();
        assert_eq!(stored.examiners_assigned as usize, held);
    }

    Ok(())
}
