//! Exam and examiner assignment records
use crate::types::{
    AccountId, AssignmentId, DepartmentId, ExamDate, ExamId, InstitutionId, TimeStamp,
};
use chrono::{NaiveDate, Utc};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExamStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Assigned,
    #[n(3)]
    Cancelled,
    #[n(4)]
    Completed,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Exam {
    #[n(0)]
    pub id: ExamId,
    #[n(1)]
    pub title: String,
    #[n(2)]
    pub subject: String,
    #[n(3)]
    pub scheduled: ExamDate,
    #[n(4)]
    pub status: ExamStatus, // as stored, see `effective_status`
    #[n(5)]
    pub institution: InstitutionId,
    #[n(6)]
    pub department: Option<DepartmentId>,
    #[n(7)]
    pub created_by: AccountId,
    #[n(8)]
    pub examiner_quota: u32,
    #[n(9)]
    pub examiners_assigned: u32, // active assignments only
    #[n(10)]
    pub created_at: TimeStamp<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewExam {
    pub title: String,
    pub subject: String,
    pub scheduled: ExamDate,
    pub institution: InstitutionId,
    pub department: Option<DepartmentId>,
    pub examiner_quota: u32,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentStatus {
    #[n(0)]
    Active,
    // no withdraw operation exists yet; the status is reserved so invariants can
    // already count only non-withdrawn rows
    #[n(1)]
    Withdrawn,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    #[n(0)]
    pub id: AssignmentId,
    #[n(1)]
    pub exam_id: ExamId,
    #[n(2)]
    pub faculty_id: AccountId,
    #[n(3)]
    pub institution: InstitutionId, // assignee's institution when assigned
    #[n(4)]
    pub role_label: String,
    #[n(5)]
    pub assigned_by: Option<AccountId>, // None means self-selected
    #[n(6)]
    pub assigned_at: TimeStamp<Utc>,
    #[n(7)]
    pub status: AssignmentStatus,
}

impl ExamStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExamStatus::Cancelled | ExamStatus::Completed)
    }
}

impl Exam {
    /// Stored status with lazy completion applied: an approved or assigned exam
    /// whose day has passed reads as completed.
    pub fn effective_status(&self, today: NaiveDate) -> ExamStatus {
        match self.status {
            ExamStatus::Approved | ExamStatus::Assigned if self.scheduled.has_elapsed(today) => {
                ExamStatus::Completed
            }
            status => status,
        }
    }

    pub fn quota_met(&self) -> bool {
        self.examiners_assigned >= self.examiner_quota
    }
}

impl NewExam {
    pub fn new(title: &str, subject: &str, scheduled: ExamDate, institution: &str) -> Self {
        Self {
            title: title.to_owned(),
            subject: subject.to_owned(),
            scheduled,
            institution: InstitutionId::from(institution),
            department: None,
            examiner_quota: 1,
        }
    }
    pub fn with_quota(mut self, quota: u32) -> Self {
        self.examiner_quota = quota;
        self
    }
    pub fn with_department(mut self, department: &str) -> Self {
        self.department = Some(department.to_owned());
        self
    }
}

impl Assignment {
    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }
    pub fn is_self_selected(&self) -> bool {
        self.assigned_by.is_none()
    }
}
