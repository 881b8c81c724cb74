use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Credits a student must have passed before registering for the final defense.
pub const MINIMUM_DEFENSE_SKS: u32 = 138;

static LOCAL_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Identifier of a portal record.
///
/// `Local` ids are placeholders minted before the first save and are never
/// written to the store; `Stored` ids were assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordId {
    Local(String),
    Stored(String),
}

impl RecordId {
    pub fn local(prefix: &str) -> Self {
        let id = LOCAL_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        RecordId::Local(format!("{prefix}-{id:06}"))
    }

    pub fn stored(id: impl Into<String>) -> Self {
        RecordId::Stored(id.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            RecordId::Local(id) | RecordId::Stored(id) => id,
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, RecordId::Stored(_))
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status shared by every submission kind.
///
/// Serialized with the labels the store and the exported reports use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationStatus {
    #[serde(rename = "Draft")]
    Draft,
    #[serde(rename = "Diajukan")]
    Submitted,
    #[serde(rename = "Disetujui")]
    Approved,
    #[serde(rename = "Ditolak")]
    Rejected,
    #[serde(rename = "Dijadwalkan")]
    Scheduled,
    #[serde(rename = "Selesai")]
    Completed,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "Draft",
            ApplicationStatus::Submitted => "Diajukan",
            ApplicationStatus::Approved => "Disetujui",
            ApplicationStatus::Rejected => "Ditolak",
            ApplicationStatus::Scheduled => "Dijadwalkan",
            ApplicationStatus::Completed => "Selesai",
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    Student,
    Lecturer,
}

impl UserRole {
    pub const fn label(self) -> &'static str {
        match self {
            UserRole::Student => "mahasiswa",
            UserRole::Lecturer => "dosen",
        }
    }
}

/// Signed-in portal user. `identifier` is the NIM for students and the NIP for lecturers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: UserRole,
    pub identifier: String,
}

/// A file chosen by the user that has not reached file storage yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingFile {
    pub name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl PendingFile {
    pub fn extension(&self) -> Option<&str> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
    }
}

/// Either a freshly selected file or the durable URL of an uploaded one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRef {
    Pending(PendingFile),
    Uploaded(String),
}

impl FileRef {
    pub fn url(&self) -> Option<&str> {
        match self {
            FileRef::Uploaded(url) => Some(url),
            FileRef::Pending(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lecturer {
    pub id: RecordId,
    pub name: String,
    pub nip: String,
    pub specialization: String,
}

impl Lecturer {
    pub fn new(
        name: impl Into<String>,
        nip: impl Into<String>,
        specialization: impl Into<String>,
    ) -> Self {
        Self {
            id: RecordId::local("lec"),
            name: name.into(),
            nip: nip.into(),
            specialization: specialization.into(),
        }
    }

    /// Label stamped on generated letters.
    pub fn letter_label(&self) -> String {
        format!("{} (NIP: {})", self.name, self.nip)
    }
}

/// Thesis title and advisor registration (the "proposal").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThesisRegistration {
    pub id: RecordId,
    pub student_id: String,
    pub student_name: String,
    pub title: String,
    pub advisor1_id: Option<String>,
    pub advisor2_id: Option<String>,
    pub status: ApplicationStatus,
}

impl ThesisRegistration {
    pub fn draft_for(student: &User) -> Self {
        Self {
            id: RecordId::local("th"),
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            title: String::new(),
            advisor1_id: None,
            advisor2_id: None,
            status: ApplicationStatus::Draft,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeminarKind {
    #[serde(rename = "PROPOSAL")]
    Proposal,
    #[serde(rename = "HASIL")]
    Result,
}

impl SeminarKind {
    pub const fn label(self) -> &'static str {
        match self {
            SeminarKind::Proposal => "Seminar Proposal",
            SeminarKind::Result => "Seminar Hasil",
        }
    }

    /// Stored `type` column value.
    pub const fn code(self) -> &'static str {
        match self {
            SeminarKind::Proposal => "PROPOSAL",
            SeminarKind::Result => "HASIL",
        }
    }

    pub(crate) const fn id_prefix(self) -> &'static str {
        match self {
            SeminarKind::Proposal => "spr",
            SeminarKind::Result => "shs",
        }
    }

    pub const fn requirement(self) -> RequirementKind {
        match self {
            SeminarKind::Proposal => RequirementKind::Sempro,
            SeminarKind::Result => RequirementKind::Semhas,
        }
    }
}

/// Registration for the proposal-stage or results-stage seminar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeminarRegistration {
    pub id: RecordId,
    #[serde(rename = "type")]
    pub kind: SeminarKind,
    pub student_id: String,
    pub student_name: String,
    pub title: String,
    pub report: Option<FileRef>,
    pub advisor1_id: Option<String>,
    pub advisor2_id: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<String>,
    pub scheduled_room: Option<String>,
    pub examiner1_id: Option<String>,
    pub examiner2_id: Option<String>,
    pub status: ApplicationStatus,
}

impl SeminarRegistration {
    pub fn draft_for(
        student: &User,
        kind: SeminarKind,
        proposal: Option<&ThesisRegistration>,
    ) -> Self {
        Self {
            id: RecordId::local(kind.id_prefix()),
            kind,
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            title: proposal.map(|p| p.title.clone()).unwrap_or_default(),
            report: None,
            advisor1_id: proposal.and_then(|p| p.advisor1_id.clone()),
            advisor2_id: proposal.and_then(|p| p.advisor2_id.clone()),
            scheduled_date: None,
            scheduled_time: None,
            scheduled_room: None,
            examiner1_id: None,
            examiner2_id: None,
            status: ApplicationStatus::Draft,
        }
    }
}

/// Final defense ("sidang") registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThesisDefense {
    pub id: RecordId,
    pub thesis_id: Option<String>,
    pub student_id: String,
    pub student_name: String,
    pub fixed_manuscript: Option<FileRef>,
    pub plagiarism_check: Option<FileRef>,
    pub transcript: Option<FileRef>,
    pub sks_count: u32,
    pub admin_requirements_met: bool,
    pub examiner1_id: Option<String>,
    pub examiner2_id: Option<String>,
    pub defense_date: Option<NaiveDate>,
    pub defense_time: Option<String>,
    pub defense_room: Option<String>,
    pub letter_number: Option<String>,
    pub status: ApplicationStatus,
}

impl ThesisDefense {
    pub fn draft_for(student: &User, proposal: Option<&ThesisRegistration>) -> Self {
        Self {
            id: RecordId::local("def"),
            thesis_id: proposal
                .filter(|p| p.id.is_stored())
                .map(|p| p.id.as_str().to_string()),
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            fixed_manuscript: None,
            plagiarism_check: None,
            transcript: None,
            sks_count: 0,
            admin_requirements_met: false,
            examiner1_id: None,
            examiner2_id: None,
            defense_date: None,
            defense_time: None,
            defense_room: None,
            letter_number: None,
            status: ApplicationStatus::Draft,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternshipRegistration {
    pub id: RecordId,
    pub student_id: String,
    pub student_name: String,
    pub company_name: String,
    pub advisor_id: Option<String>,
    pub status: ApplicationStatus,
}

impl InternshipRegistration {
    pub fn draft_for(student: &User) -> Self {
        Self {
            id: RecordId::local("kp"),
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            company_name: String::new(),
            advisor_id: None,
            status: ApplicationStatus::Draft,
        }
    }
}

/// Binary attachment delivered with a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: RecordId,
    pub user_id: String,
    pub subject: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// The single master letter template lecturers upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTemplate {
    pub name: String,
    #[serde(skip)]
    pub content: Option<Vec<u8>>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl Default for DocumentTemplate {
    fn default() -> Self {
        Self {
            name: "Template_Sidang_Master.docx".to_string(),
            content: None,
            last_modified: None,
        }
    }
}

/// Requirement notes shown to students before each registration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequirementKind {
    #[serde(alias = "sempro")]
    Sempro,
    #[serde(alias = "semhas")]
    Semhas,
    #[serde(alias = "sidang")]
    Sidang,
}

impl RequirementKind {
    pub const fn ordered() -> [Self; 3] {
        [Self::Sempro, Self::Semhas, Self::Sidang]
    }

    pub const fn default_text(self) -> &'static str {
        match self {
            RequirementKind::Sempro => "1. File Proposal Lengkap (PDF)\n2. Kartu Bimbingan minimal 4x asistensi.\n3. KRS Aktif Semester ini.",
            RequirementKind::Semhas => "1. Draft Laporan Tugas Akhir Lengkap.\n2. Logbook Bimbingan minimal 8x.\n3. Bukti persetujuan pembimbing.",
            RequirementKind::Sidang => "1. Naskah TA Fixed.\n2. Hasil cek plagiasi (Turnitin) < 20%.\n3. Transkrip Nilai Terbaru (Lulus > 138 SKS).\n4. Bebas administrasi Keuangan & Perpustakaan.",
        }
    }
}

/// Proposal form: title and the two requested advisors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub advisor1_id: Option<String>,
    #[serde(default)]
    pub advisor2_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeminarForm {
    #[serde(rename = "type")]
    pub kind: SeminarKind,
    #[serde(default)]
    pub report: Option<PendingFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefenseForm {
    #[serde(default)]
    pub sks_count: u32,
    #[serde(default)]
    pub admin_requirements_met: bool,
    #[serde(default)]
    pub fixed_manuscript: Option<PendingFile>,
    #[serde(default)]
    pub plagiarism_check: Option<PendingFile>,
    #[serde(default)]
    pub transcript: Option<PendingFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternshipForm {
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub advisor_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LecturerForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nip: String,
    #[serde(default)]
    pub specialization: String,
}
