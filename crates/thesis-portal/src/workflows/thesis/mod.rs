pub mod domain;
pub mod export;
pub mod router;
pub mod service;
pub mod status;

#[cfg(test)]
mod tests;

pub use domain::*;
pub use export::{defense_schedule_csv, ExportError, DEFENSE_SCHEDULE_HEADER};
pub use router::{portal_router, SignInRequest, FILE_NAME_HEADER};
pub use service::{
    DefenseScheduled, PortalError, SeminarScheduled, Submitted, ThesisPortalService,
};
pub use status::{ScheduleRequest, SubmissionKind, ValidationError, WorkflowError};
