//! Status workflow shared by proposals, seminars, defenses and internships.
//!
//! The engine never mutates its input: every transition returns an updated copy,
//! so a rejected action leaves the caller's entity exactly as it was.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{
    ApplicationStatus, FileRef, InternshipRegistration, SeminarRegistration, ThesisDefense,
    ThesisRegistration, MINIMUM_DEFENSE_SKS,
};

use ApplicationStatus::{Approved, Completed, Draft, Rejected, Scheduled, Submitted};

/// Submission kinds and the transitions each one allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Proposal,
    Seminar,
    Defense,
    Internship,
}

const APPROVAL_LIFECYCLE: &[(ApplicationStatus, ApplicationStatus)] = &[
    (Draft, Submitted),
    (Submitted, Approved),
    (Submitted, Rejected),
];

const SCHEDULED_LIFECYCLE: &[(ApplicationStatus, ApplicationStatus)] = &[
    (Draft, Submitted),
    (Submitted, Scheduled),
    (Scheduled, Completed),
];

impl SubmissionKind {
    pub const fn label(self) -> &'static str {
        match self {
            SubmissionKind::Proposal => "proposal",
            SubmissionKind::Seminar => "seminar",
            SubmissionKind::Defense => "defense",
            SubmissionKind::Internship => "internship",
        }
    }

    pub const fn transitions(self) -> &'static [(ApplicationStatus, ApplicationStatus)] {
        match self {
            SubmissionKind::Proposal | SubmissionKind::Internship => APPROVAL_LIFECYCLE,
            SubmissionKind::Seminar | SubmissionKind::Defense => SCHEDULED_LIFECYCLE,
        }
    }

    pub fn allows(self, from: ApplicationStatus, to: ApplicationStatus) -> bool {
        self.transitions()
            .iter()
            .any(|(allowed_from, allowed_to)| *allowed_from == from && *allowed_to == to)
    }
}

/// A required field and whether the entity currently provides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredField {
    pub name: &'static str,
    pub present: bool,
}

impl RequiredField {
    fn text(name: &'static str, value: &str) -> Self {
        Self {
            name,
            present: !value.trim().is_empty(),
        }
    }

    fn reference(name: &'static str, value: Option<&str>) -> Self {
        Self {
            name,
            present: value.is_some_and(|v| !v.trim().is_empty()),
        }
    }

    fn file(name: &'static str, value: Option<&FileRef>) -> Self {
        let present = match value {
            Some(FileRef::Pending(file)) => !file.content.is_empty(),
            Some(FileRef::Uploaded(url)) => !url.trim().is_empty(),
            None => false,
        };
        Self { name, present }
    }
}

/// Raised when a submission is missing required data. Nothing is persisted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub missing: Vec<&'static str>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, missing: Vec<&'static str>) -> Self {
        Self {
            message: message.into(),
            missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Lengkapi data jadwal: {}", .missing.join(", "))]
    IncompleteSchedule { missing: Vec<&'static str> },
    #[error("{} in status {from} cannot move to {to}", .kind.label())]
    IllegalTransition {
        kind: SubmissionKind,
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
}

/// Entities that move through the status workflow.
pub trait Submission: Clone {
    const KIND: SubmissionKind;
    /// Message shown when required fields are missing.
    const INCOMPLETE_MESSAGE: &'static str;

    fn status(&self) -> ApplicationStatus;
    fn set_status(&mut self, status: ApplicationStatus);
    fn required_fields(&self) -> Vec<RequiredField>;

    /// Hard policy gates checked before field completeness.
    fn policy_gate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Fields a lecturer may have to supply when scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleField {
    Date,
    Time,
    Room,
    PrimaryExaminer,
    LetterNumber,
}

impl ScheduleField {
    pub const fn label(self) -> &'static str {
        match self {
            ScheduleField::Date => "date",
            ScheduleField::Time => "time",
            ScheduleField::Room => "room",
            ScheduleField::PrimaryExaminer => "examiner1",
            ScheduleField::LetterNumber => "letterNumber",
        }
    }
}

/// Structured scheduling input collected from the lecturer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub examiner1_id: Option<String>,
    #[serde(default)]
    pub examiner2_id: Option<String>,
    #[serde(default)]
    pub letter_number: Option<String>,
}

fn filled(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ScheduleRequest {
    /// Check the request against the fields a kind requires and normalise blanks to `None`.
    pub fn validate(&self, required: &[ScheduleField]) -> Result<ScheduleRequest, WorkflowError> {
        let normalised = ScheduleRequest {
            date: self.date,
            time: filled(&self.time),
            room: filled(&self.room),
            examiner1_id: filled(&self.examiner1_id),
            examiner2_id: filled(&self.examiner2_id),
            letter_number: filled(&self.letter_number),
        };

        let missing: Vec<&'static str> = required
            .iter()
            .filter(|field| match field {
                ScheduleField::Date => normalised.date.is_none(),
                ScheduleField::Time => normalised.time.is_none(),
                ScheduleField::Room => normalised.room.is_none(),
                ScheduleField::PrimaryExaminer => normalised.examiner1_id.is_none(),
                ScheduleField::LetterNumber => normalised.letter_number.is_none(),
            })
            .map(|field| field.label())
            .collect();

        if missing.is_empty() {
            Ok(normalised)
        } else {
            Err(WorkflowError::IncompleteSchedule { missing })
        }
    }
}

/// Submissions that a lecturer schedules.
pub trait Schedulable: Submission {
    const REQUIRED_SCHEDULE: &'static [ScheduleField];

    fn apply_schedule(&mut self, schedule: &ScheduleRequest);
}

fn transition<T: Submission>(entity: &T, to: ApplicationStatus) -> Result<T, WorkflowError> {
    let from = entity.status();
    if !T::KIND.allows(from, to) {
        return Err(WorkflowError::IllegalTransition {
            kind: T::KIND,
            from,
            to,
        });
    }
    let mut next = entity.clone();
    next.set_status(to);
    Ok(next)
}

/// Names of required fields the entity does not provide yet.
pub fn missing_fields<T: Submission>(entity: &T) -> Vec<&'static str> {
    entity
        .required_fields()
        .into_iter()
        .filter(|field| !field.present)
        .map(|field| field.name)
        .collect()
}

/// Draft → Submitted once every required field is present.
pub fn submit<T: Submission>(entity: &T) -> Result<T, WorkflowError> {
    if !T::KIND.allows(entity.status(), Submitted) {
        return Err(WorkflowError::IllegalTransition {
            kind: T::KIND,
            from: entity.status(),
            to: Submitted,
        });
    }

    entity.policy_gate()?;

    let missing = missing_fields(entity);
    if !missing.is_empty() {
        return Err(ValidationError::new(T::INCOMPLETE_MESSAGE, missing).into());
    }

    transition(entity, Submitted)
}

/// Submitted → Approved or Rejected.
pub fn validate<T: Submission>(entity: &T, approve: bool) -> Result<T, WorkflowError> {
    let to = if approve { Approved } else { Rejected };
    transition(entity, to)
}

/// Submitted → Scheduled, attaching the schedule in the same step.
pub fn schedule<T: Schedulable>(entity: &T, request: &ScheduleRequest) -> Result<T, WorkflowError> {
    if !T::KIND.allows(entity.status(), Scheduled) {
        return Err(WorkflowError::IllegalTransition {
            kind: T::KIND,
            from: entity.status(),
            to: Scheduled,
        });
    }

    let schedule = request.validate(T::REQUIRED_SCHEDULE)?;
    let mut next = transition(entity, Scheduled)?;
    next.apply_schedule(&schedule);
    Ok(next)
}

/// Scheduled → Completed once the event has taken place.
pub fn complete<T: Schedulable>(entity: &T) -> Result<T, WorkflowError> {
    transition(entity, Completed)
}

impl Submission for ThesisRegistration {
    const KIND: SubmissionKind = SubmissionKind::Proposal;
    const INCOMPLETE_MESSAGE: &'static str = "Harap lengkapi judul dan pembimbing.";

    fn status(&self) -> ApplicationStatus {
        self.status
    }

    fn set_status(&mut self, status: ApplicationStatus) {
        self.status = status;
    }

    fn required_fields(&self) -> Vec<RequiredField> {
        vec![
            RequiredField::text("title", &self.title),
            RequiredField::reference("advisor1Id", self.advisor1_id.as_deref()),
            RequiredField::reference("advisor2Id", self.advisor2_id.as_deref()),
        ]
    }
}

impl Submission for SeminarRegistration {
    const KIND: SubmissionKind = SubmissionKind::Seminar;
    const INCOMPLETE_MESSAGE: &'static str = "Harap upload file laporan/proposal.";

    fn status(&self) -> ApplicationStatus {
        self.status
    }

    fn set_status(&mut self, status: ApplicationStatus) {
        self.status = status;
    }

    fn required_fields(&self) -> Vec<RequiredField> {
        vec![RequiredField::file("report", self.report.as_ref())]
    }
}

impl Schedulable for SeminarRegistration {
    const REQUIRED_SCHEDULE: &'static [ScheduleField] =
        &[ScheduleField::Date, ScheduleField::Time, ScheduleField::Room];

    fn apply_schedule(&mut self, schedule: &ScheduleRequest) {
        self.scheduled_date = schedule.date;
        self.scheduled_time = schedule.time.clone();
        self.scheduled_room = schedule.room.clone();
        if schedule.examiner1_id.is_some() {
            self.examiner1_id = schedule.examiner1_id.clone();
        }
        if schedule.examiner2_id.is_some() {
            self.examiner2_id = schedule.examiner2_id.clone();
        }
    }
}

impl Submission for ThesisDefense {
    const KIND: SubmissionKind = SubmissionKind::Defense;
    const INCOMPLETE_MESSAGE: &'static str = "Harap upload semua file.";

    fn status(&self) -> ApplicationStatus {
        self.status
    }

    fn set_status(&mut self, status: ApplicationStatus) {
        self.status = status;
    }

    fn required_fields(&self) -> Vec<RequiredField> {
        vec![
            RequiredField::file("fixedManuscript", self.fixed_manuscript.as_ref()),
            RequiredField::file("plagiarismCheck", self.plagiarism_check.as_ref()),
            RequiredField::file("transcript", self.transcript.as_ref()),
        ]
    }

    fn policy_gate(&self) -> Result<(), ValidationError> {
        if self.sks_count < MINIMUM_DEFENSE_SKS {
            return Err(ValidationError::new(
                format!("SKS belum mencukupi (Min {MINIMUM_DEFENSE_SKS})."),
                vec!["sksCount"],
            ));
        }
        Ok(())
    }
}

impl Schedulable for ThesisDefense {
    const REQUIRED_SCHEDULE: &'static [ScheduleField] = &[
        ScheduleField::Date,
        ScheduleField::PrimaryExaminer,
        ScheduleField::LetterNumber,
    ];

    fn apply_schedule(&mut self, schedule: &ScheduleRequest) {
        self.defense_date = schedule.date;
        self.defense_time = schedule.time.clone();
        self.defense_room = schedule.room.clone();
        self.examiner1_id = schedule.examiner1_id.clone();
        self.examiner2_id = schedule.examiner2_id.clone();
        self.letter_number = schedule.letter_number.clone();
    }
}

impl Submission for InternshipRegistration {
    const KIND: SubmissionKind = SubmissionKind::Internship;
    const INCOMPLETE_MESSAGE: &'static str = "Lengkapi data magang.";

    fn status(&self) -> ApplicationStatus {
        self.status
    }

    fn set_status(&mut self, status: ApplicationStatus) {
        self.status = status;
    }

    fn required_fields(&self) -> Vec<RequiredField> {
        vec![
            RequiredField::text("companyName", &self.company_name),
            RequiredField::reference("advisorId", self.advisor_id.as_deref()),
        ]
    }
}
