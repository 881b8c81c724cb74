use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use super::domain::{
    ApplicationStatus, Attachment, DefenseForm, DocumentTemplate, FileRef, InternshipForm,
    InternshipRegistration, Lecturer, LecturerForm, Notification, ProposalForm,
    RequirementKind, SeminarForm, SeminarKind, SeminarRegistration, ThesisDefense,
    ThesisRegistration, User, UserRole,
};
use super::export::{self, ExportError};
use super::status::{self, ScheduleRequest, Submission, ValidationError, WorkflowError};
use crate::documents::{self, DefenseLetter, DocumentError, TemplateError, DOCX_MIME};
use crate::identity::{AuthBackend, AuthError, IdentityProvider};
use crate::notifications::{NotificationDispatcher, NotificationError};
use crate::records::{
    FileStorage, Filter, PortalRecords, RecordsError, RemoteStore, StoredEntity, UploadFailure,
};

/// Outcome of a student submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submitted<T> {
    pub record: T,
    /// Uploads that failed; the record kept its previous file for those slots.
    pub upload_failures: Vec<UploadFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeminarScheduled {
    pub seminar: SeminarRegistration,
    pub notification: Notification,
}

#[derive(Debug, Clone)]
pub struct DefenseScheduled {
    pub defense: ThesisDefense,
    /// The generated letter, when rendering succeeded.
    pub letter: Option<Attachment>,
    pub document_error: Option<String>,
    /// The invitation, unless storing it failed after the schedule was saved.
    pub notification: Option<Notification>,
    pub notification_error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Records(#[from] RecordsError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Identity(#[from] AuthError),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("{0}")]
    InvalidTemplate(String),
    /// A required file did not reach storage; nothing was saved.
    #[error("Upload file gagal, silakan coba lagi.")]
    UploadFailed { failures: Vec<UploadFailure> },
    #[error("Silakan login terlebih dahulu.")]
    SignInRequired,
    #[error("{action} hanya dapat dilakukan oleh {}", .required.label())]
    Forbidden {
        action: &'static str,
        required: UserRole,
    },
}

impl From<ValidationError> for PortalError {
    fn from(error: ValidationError) -> Self {
        PortalError::Workflow(error.into())
    }
}

/// One method per portal action: read fresh state, transition, persist.
pub struct ThesisPortalService<S, F, B> {
    records: Arc<PortalRecords<S, F>>,
    notifications: Arc<NotificationDispatcher<S, F>>,
    identity: Arc<IdentityProvider<B>>,
}

impl<S, F, B> ThesisPortalService<S, F, B>
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    pub fn new(records: Arc<PortalRecords<S, F>>, identity: Arc<IdentityProvider<B>>) -> Self {
        let notifications = Arc::new(NotificationDispatcher::new(records.clone()));
        Self {
            records,
            notifications,
            identity,
        }
    }

    pub fn records(&self) -> &PortalRecords<S, F> {
        &self.records
    }

    pub fn notifications(&self) -> &NotificationDispatcher<S, F> {
        &self.notifications
    }

    pub fn identity(&self) -> &IdentityProvider<B> {
        &self.identity
    }

    fn first_for<T: StoredEntity>(&self, filters: &[Filter]) -> Result<Option<T>, PortalError> {
        Ok(self.records.list::<T>(filters)?.into_iter().next())
    }

    fn require<T: StoredEntity>(&self, kind: &'static str, id: &str) -> Result<T, PortalError> {
        self.records
            .find::<T>(id)?
            .ok_or_else(|| PortalError::NotFound {
                kind,
                id: id.to_string(),
            })
    }

    /// Upload pending files, then submit only if every required file made it to storage.
    fn submit_with_uploads<T>(&self, entity: &T) -> Result<Submitted<T>, PortalError>
    where
        T: Submission + StoredEntity,
    {
        let mut submitted = status::submit(entity)?;
        let upload_failures = self.records.upload_pending(&mut submitted)?;
        if !status::missing_fields(&submitted).is_empty() {
            warn!(
                id = %submitted.record_id(),
                failed_uploads = upload_failures.len(),
                "required upload failed, submission not saved"
            );
            return Err(PortalError::UploadFailed {
                failures: upload_failures,
            });
        }

        let record = self.records.save(submitted)?;
        Ok(Submitted {
            record,
            upload_failures,
        })
    }

    fn pending<T: StoredEntity>(&self, status: ApplicationStatus) -> Result<Vec<T>, PortalError> {
        Ok(self
            .records
            .list::<T>(&[Filter::eq("status", status.label())])?)
    }

    // Student drafts. An unsaved draft is returned when nothing is stored yet.

    pub fn proposal_for(&self, student: &User) -> Result<ThesisRegistration, PortalError> {
        Ok(self
            .first_for(&[Filter::eq("studentId", student.id.as_str())])?
            .unwrap_or_else(|| ThesisRegistration::draft_for(student)))
    }

    pub fn seminar_for(
        &self,
        student: &User,
        kind: SeminarKind,
    ) -> Result<SeminarRegistration, PortalError> {
        let stored = self.first_for(&[
            Filter::eq("studentId", student.id.as_str()),
            Filter::eq("type", kind.code()),
        ])?;
        match stored {
            Some(seminar) => Ok(seminar),
            None => {
                let proposal = self.proposal_for(student)?;
                Ok(SeminarRegistration::draft_for(student, kind, Some(&proposal)))
            }
        }
    }

    pub fn defense_for(&self, student: &User) -> Result<ThesisDefense, PortalError> {
        match self.first_for(&[Filter::eq("studentId", student.id.as_str())])? {
            Some(defense) => Ok(defense),
            None => {
                let proposal = self.proposal_for(student)?;
                Ok(ThesisDefense::draft_for(student, Some(&proposal)))
            }
        }
    }

    pub fn internship_for(&self, student: &User) -> Result<InternshipRegistration, PortalError> {
        Ok(self
            .first_for(&[Filter::eq("studentId", student.id.as_str())])?
            .unwrap_or_else(|| InternshipRegistration::draft_for(student)))
    }

    // Student submissions.

    pub fn submit_proposal(
        &self,
        student: &User,
        form: ProposalForm,
    ) -> Result<Submitted<ThesisRegistration>, PortalError> {
        require_role(student, UserRole::Student, "Pengajuan proposal")?;
        let mut proposal = self.proposal_for(student)?;
        proposal.title = form.title.trim().to_string();
        proposal.advisor1_id = form.advisor1_id;
        proposal.advisor2_id = form.advisor2_id;

        let outcome = self.submit_with_uploads(&proposal)?;
        info!(student = %student.id, id = %outcome.record.id, "proposal submitted");
        Ok(outcome)
    }

    /// Seminar registrations copy the title and advisors from the proposal at submission time.
    pub fn submit_seminar(
        &self,
        student: &User,
        form: SeminarForm,
    ) -> Result<Submitted<SeminarRegistration>, PortalError> {
        require_role(student, UserRole::Student, "Pendaftaran seminar")?;
        let proposal = self.proposal_for(student)?;
        let mut seminar = self.seminar_for(student, form.kind)?;
        seminar.title = proposal.title.clone();
        seminar.advisor1_id = proposal.advisor1_id.clone();
        seminar.advisor2_id = proposal.advisor2_id.clone();
        if let Some(report) = form.report {
            seminar.report = Some(FileRef::Pending(report));
        }

        let outcome = self.submit_with_uploads(&seminar)?;
        info!(
            student = %student.id,
            id = %outcome.record.id,
            kind = outcome.record.kind.label(),
            "seminar submitted"
        );
        Ok(outcome)
    }

    pub fn submit_defense(
        &self,
        student: &User,
        form: DefenseForm,
    ) -> Result<Submitted<ThesisDefense>, PortalError> {
        require_role(student, UserRole::Student, "Pendaftaran sidang")?;
        let mut defense = self.defense_for(student)?;
        if defense.thesis_id.is_none() {
            let proposal = self.proposal_for(student)?;
            if proposal.id.is_stored() {
                defense.thesis_id = Some(proposal.id.as_str().to_string());
            }
        }
        defense.sks_count = form.sks_count;
        defense.admin_requirements_met = form.admin_requirements_met;
        let files = [
            (&mut defense.fixed_manuscript, form.fixed_manuscript),
            (&mut defense.plagiarism_check, form.plagiarism_check),
            (&mut defense.transcript, form.transcript),
        ];
        for (slot, file) in files {
            if let Some(file) = file {
                *slot = Some(FileRef::Pending(file));
            }
        }

        let outcome = self.submit_with_uploads(&defense)?;
        info!(
            student = %student.id,
            id = %outcome.record.id,
            sks = outcome.record.sks_count,
            "defense submitted"
        );
        Ok(outcome)
    }

    pub fn submit_internship(
        &self,
        student: &User,
        form: InternshipForm,
    ) -> Result<Submitted<InternshipRegistration>, PortalError> {
        require_role(student, UserRole::Student, "Pendaftaran magang")?;
        let mut internship = self.internship_for(student)?;
        internship.company_name = form.company_name.trim().to_string();
        internship.advisor_id = form.advisor_id;

        let outcome = self.submit_with_uploads(&internship)?;
        info!(student = %student.id, id = %outcome.record.id, "internship submitted");
        Ok(outcome)
    }

    // Lecturer actions. Each takes the acting user and refuses anyone but a lecturer.

    pub fn validate_proposal(
        &self,
        actor: &User,
        id: &str,
        approve: bool,
    ) -> Result<ThesisRegistration, PortalError> {
        require_role(actor, UserRole::Lecturer, "Validasi proposal")?;
        let proposal: ThesisRegistration = self.require("proposal", id)?;
        let decided = status::validate(&proposal, approve)?;
        let saved = self.records.save(decided)?;
        info!(%id, lecturer = %actor.id, status = %saved.status, "proposal validated");
        Ok(saved)
    }

    pub fn validate_internship(
        &self,
        actor: &User,
        id: &str,
        approve: bool,
    ) -> Result<InternshipRegistration, PortalError> {
        require_role(actor, UserRole::Lecturer, "Validasi magang")?;
        let internship: InternshipRegistration = self.require("internship", id)?;
        let decided = status::validate(&internship, approve)?;
        let saved = self.records.save(decided)?;
        info!(%id, lecturer = %actor.id, status = %saved.status, "internship validated");
        Ok(saved)
    }

    pub fn schedule_seminar(
        &self,
        actor: &User,
        id: &str,
        request: &ScheduleRequest,
    ) -> Result<SeminarScheduled, PortalError> {
        require_role(actor, UserRole::Lecturer, "Penjadwalan seminar")?;
        let seminar: SeminarRegistration = self.require("seminar", id)?;
        let scheduled = status::schedule(&seminar, request)?;
        let seminar = self.records.save(scheduled)?;
        info!(%id, kind = seminar.kind.label(), "seminar scheduled");

        let notification = self.notifications.seminar_scheduled(&seminar)?;
        Ok(SeminarScheduled {
            seminar,
            notification,
        })
    }

    /// Schedule the defense, render the invitation letter and notify the student.
    ///
    /// Nothing after the schedule is saved undoes it. A letter that cannot be rendered
    /// leaves the notification without an attachment, and a notification that cannot be
    /// stored is reported in the outcome.
    pub fn schedule_defense(
        &self,
        actor: &User,
        id: &str,
        request: &ScheduleRequest,
    ) -> Result<DefenseScheduled, PortalError> {
        require_role(actor, UserRole::Lecturer, "Penjadwalan sidang")?;
        let defense: ThesisDefense = self.require("defense", id)?;
        let scheduled = status::schedule(&defense, request)?;
        let defense = self.records.save(scheduled)?;
        info!(%id, letter = ?defense.letter_number, "defense scheduled");

        let (letter, document_error) = match self.render_defense_letter(&defense) {
            Ok(letter) => (Some(letter), None),
            Err(err) => {
                error!(%id, error = %err, "defense letter could not be generated");
                (None, Some(err.to_string()))
            }
        };

        let (notification, notification_error) =
            match self.notifications.defense_invitation(&defense, letter.clone()) {
                Ok(notification) => (Some(notification), None),
                Err(err) => {
                    error!(%id, error = %err, "defense invitation could not be stored");
                    (None, Some(err.to_string()))
                }
            };
        Ok(DefenseScheduled {
            defense,
            letter,
            document_error,
            notification,
            notification_error,
        })
    }

    pub fn complete_seminar(
        &self,
        actor: &User,
        id: &str,
    ) -> Result<SeminarRegistration, PortalError> {
        require_role(actor, UserRole::Lecturer, "Penyelesaian seminar")?;
        let seminar: SeminarRegistration = self.require("seminar", id)?;
        let completed = status::complete(&seminar)?;
        Ok(self.records.save(completed)?)
    }

    pub fn complete_defense(&self, actor: &User, id: &str) -> Result<ThesisDefense, PortalError> {
        require_role(actor, UserRole::Lecturer, "Penyelesaian sidang")?;
        let defense: ThesisDefense = self.require("defense", id)?;
        let completed = status::complete(&defense)?;
        Ok(self.records.save(completed)?)
    }

    /// Render the invitation letter for a scheduled defense from the master template.
    pub fn render_defense_letter(&self, defense: &ThesisDefense) -> Result<Attachment, PortalError> {
        let template = self
            .records
            .template()
            .content
            .ok_or(DocumentError::Template(TemplateError::Missing))?;

        let proposal = match defense.thesis_id.as_deref() {
            Some(thesis_id) => self.records.find::<ThesisRegistration>(thesis_id)?,
            None => None,
        };
        let lecturers = self.records.list::<Lecturer>(&[])?;
        let lecturer = |id: Option<&String>| {
            id.and_then(|id| lecturers.iter().find(|l| l.id.as_str() == id))
        };
        let nim = match self.identity.lookup(&defense.student_id) {
            Ok(Some(student)) => student.identifier,
            Ok(None) => "-".to_string(),
            Err(err) => {
                warn!(student = %defense.student_id, error = %err, "student lookup failed");
                "-".to_string()
            }
        };

        let fields = DefenseLetter {
            defense,
            student_identifier: &nim,
            title: proposal.as_ref().map(|p| p.title.as_str()),
            advisor1: lecturer(proposal.as_ref().and_then(|p| p.advisor1_id.as_ref())),
            advisor2: lecturer(proposal.as_ref().and_then(|p| p.advisor2_id.as_ref())),
            examiner1: lecturer(defense.examiner1_id.as_ref()),
            examiner2: lecturer(defense.examiner2_id.as_ref()),
        }
        .field_map();

        let content = documents::render(&template, &fields)?;
        Ok(Attachment {
            name: format!("{}_Undangan_Sidang.docx", defense.student_name),
            mime_type: DOCX_MIME.to_string(),
            content,
        })
    }

    // Lecturer queues.

    pub fn pending_proposals(&self) -> Result<Vec<ThesisRegistration>, PortalError> {
        self.pending(ApplicationStatus::Submitted)
    }

    pub fn pending_seminars(&self) -> Result<Vec<SeminarRegistration>, PortalError> {
        self.pending(ApplicationStatus::Submitted)
    }

    pub fn pending_defenses(&self) -> Result<Vec<ThesisDefense>, PortalError> {
        self.pending(ApplicationStatus::Submitted)
    }

    pub fn pending_internships(&self) -> Result<Vec<InternshipRegistration>, PortalError> {
        self.pending(ApplicationStatus::Submitted)
    }

    pub fn scheduled_defenses(&self) -> Result<Vec<ThesisDefense>, PortalError> {
        self.pending(ApplicationStatus::Scheduled)
    }

    pub fn export_defense_schedule(&self) -> Result<String, PortalError> {
        let defenses = self.scheduled_defenses()?;
        let proposals = self.records.list::<ThesisRegistration>(&[])?;
        let lecturers = self.records.list::<Lecturer>(&[])?;
        Ok(export::defense_schedule_csv(
            &defenses, &proposals, &lecturers,
        )?)
    }

    // Lecturer roster.

    pub fn lecturers(&self) -> Result<Vec<Lecturer>, PortalError> {
        let mut lecturers = self.records.list::<Lecturer>(&[])?;
        lecturers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(lecturers)
    }

    pub fn add_lecturer(&self, actor: &User, form: LecturerForm) -> Result<Lecturer, PortalError> {
        require_role(actor, UserRole::Lecturer, "Pengelolaan data dosen")?;
        let (name, nip) = lecturer_identity(&form)?;
        let lecturer = Lecturer::new(name, nip, form.specialization.trim());
        let saved = self.records.save(lecturer)?;
        info!(id = %saved.id, "lecturer added");
        Ok(saved)
    }

    pub fn update_lecturer(
        &self,
        actor: &User,
        id: &str,
        form: LecturerForm,
    ) -> Result<Lecturer, PortalError> {
        require_role(actor, UserRole::Lecturer, "Pengelolaan data dosen")?;
        let (name, nip) = lecturer_identity(&form)?;
        let mut lecturer: Lecturer = self.require("lecturer", id)?;
        lecturer.name = name.to_string();
        lecturer.nip = nip.to_string();
        lecturer.specialization = form.specialization.trim().to_string();
        Ok(self.records.save(lecturer)?)
    }

    pub fn delete_lecturer(&self, actor: &User, id: &str) -> Result<(), PortalError> {
        require_role(actor, UserRole::Lecturer, "Pengelolaan data dosen")?;
        let lecturer: Lecturer = self.require("lecturer", id)?;
        self.records.delete::<Lecturer>(&lecturer.id)?;
        info!(%id, "lecturer removed");
        Ok(())
    }

    // Requirement texts and the master template.

    pub fn requirement(&self, kind: RequirementKind) -> String {
        self.records.requirement(kind)
    }

    pub fn save_requirement(
        &self,
        actor: &User,
        kind: RequirementKind,
        text: &str,
    ) -> Result<(), PortalError> {
        require_role(actor, UserRole::Lecturer, "Pengaturan persyaratan")?;
        self.records.save_requirement(kind, text);
        info!(kind = ?kind, lecturer = %actor.id, "requirement text updated");
        Ok(())
    }

    pub fn template(&self) -> DocumentTemplate {
        self.records.template()
    }

    pub fn replace_template(
        &self,
        actor: &User,
        name: &str,
        content: Vec<u8>,
    ) -> Result<DocumentTemplate, PortalError> {
        require_role(actor, UserRole::Lecturer, "Penggantian template surat")?;
        self.seed_template(name, content)
    }

    /// Install the master template from deployment configuration, without an acting user.
    pub fn seed_template(
        &self,
        name: &str,
        content: Vec<u8>,
    ) -> Result<DocumentTemplate, PortalError> {
        let name = name.trim();
        if !name.to_ascii_lowercase().ends_with(".docx") {
            return Err(PortalError::InvalidTemplate(
                "Template harus berupa file .docx".to_string(),
            ));
        }
        if content.is_empty() {
            return Err(PortalError::InvalidTemplate(
                TemplateError::Missing.to_string(),
            ));
        }

        let template = self.records.replace_template(name, content);
        info!(name, "master template replaced");
        Ok(template)
    }

    // Notifications.

    pub fn inbox(&self, user_id: &str) -> Result<Vec<Notification>, PortalError> {
        Ok(self.notifications.inbox(user_id)?)
    }

    pub fn mark_notification_read(&self, id: &str) -> Result<Notification, PortalError> {
        Ok(self.notifications.mark_read(id)?)
    }
}

fn require_role(actor: &User, required: UserRole, action: &'static str) -> Result<(), PortalError> {
    if actor.role == required {
        return Ok(());
    }
    warn!(user = %actor.id, role = ?actor.role, action, "action refused for role");
    Err(PortalError::Forbidden { action, required })
}

fn lecturer_identity(form: &LecturerForm) -> Result<(&str, &str), ValidationError> {
    let name = form.name.trim();
    let nip = form.nip.trim();
    let missing: Vec<&'static str> = [("name", name), ("nip", nip)]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(field, _)| field)
        .collect();
    if missing.is_empty() {
        Ok((name, nip))
    } else {
        Err(ValidationError::new("Nama dan NIP wajib diisi.", missing))
    }
}
