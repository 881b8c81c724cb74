use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{
    DefenseForm, InternshipForm, LecturerForm, ProposalForm, RequirementKind, SeminarForm, User,
};
use super::service::{PortalError, ThesisPortalService};
use super::status::{ScheduleRequest, WorkflowError};
use crate::identity::{AuthBackend, AuthError};
use crate::notifications::NotificationError;
use crate::records::{FileStorage, RemoteStore};

type PortalState<S, F, B> = State<Arc<ThesisPortalService<S, F, B>>>;

/// Header carrying the original file name of an uploaded template.
pub const FILE_NAME_HEADER: &str = "x-file-name";

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidationRequest {
    pub approve: bool,
}

#[derive(Debug, Deserialize)]
pub struct RequirementUpdate {
    pub text: String,
}

/// Router exposing the portal actions over HTTP.
pub fn portal_router<S, F, B>(service: Arc<ThesisPortalService<S, F, B>>) -> Router
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    Router::new()
        .route(
            "/api/v1/session",
            get(current_session_handler::<S, F, B>)
                .post(sign_in_handler::<S, F, B>)
                .delete(sign_out_handler::<S, F, B>),
        )
        .route(
            "/api/v1/proposals",
            get(pending_proposals_handler::<S, F, B>).post(submit_proposal_handler::<S, F, B>),
        )
        .route(
            "/api/v1/proposals/:id/validation",
            post(validate_proposal_handler::<S, F, B>),
        )
        .route(
            "/api/v1/seminars",
            get(pending_seminars_handler::<S, F, B>).post(submit_seminar_handler::<S, F, B>),
        )
        .route(
            "/api/v1/seminars/:id/schedule",
            post(schedule_seminar_handler::<S, F, B>),
        )
        .route(
            "/api/v1/defenses",
            get(pending_defenses_handler::<S, F, B>).post(submit_defense_handler::<S, F, B>),
        )
        .route(
            "/api/v1/defenses/:id/schedule",
            post(schedule_defense_handler::<S, F, B>),
        )
        .route(
            "/api/v1/defenses/schedule.csv",
            get(export_schedule_handler::<S, F, B>),
        )
        .route(
            "/api/v1/internships",
            get(pending_internships_handler::<S, F, B>)
                .post(submit_internship_handler::<S, F, B>),
        )
        .route(
            "/api/v1/internships/:id/validation",
            post(validate_internship_handler::<S, F, B>),
        )
        .route(
            "/api/v1/lecturers",
            get(list_lecturers_handler::<S, F, B>).post(add_lecturer_handler::<S, F, B>),
        )
        .route(
            "/api/v1/lecturers/:id",
            put(update_lecturer_handler::<S, F, B>).delete(delete_lecturer_handler::<S, F, B>),
        )
        .route(
            "/api/v1/requirements/:kind",
            get(requirement_handler::<S, F, B>).put(save_requirement_handler::<S, F, B>),
        )
        .route(
            "/api/v1/users/:user_id/notifications",
            get(inbox_handler::<S, F, B>),
        )
        .route(
            "/api/v1/notifications/:id/read",
            post(mark_read_handler::<S, F, B>),
        )
        .route(
            "/api/v1/template",
            get(template_handler::<S, F, B>).put(replace_template_handler::<S, F, B>),
        )
        .with_state(service)
}

pub(crate) fn error_response(error: PortalError) -> Response {
    match &error {
        PortalError::Workflow(WorkflowError::Validation(validation)) => {
            let payload = json!({
                "error": validation.message,
                "missing": validation.missing,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        PortalError::Workflow(WorkflowError::IncompleteSchedule { missing }) => {
            let payload = json!({
                "error": error.to_string(),
                "missing": missing,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        PortalError::Workflow(WorkflowError::IllegalTransition { .. }) => {
            let payload = json!({
                "error": error.to_string(),
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        PortalError::NotFound { .. }
        | PortalError::Notification(NotificationError::NotFound(_)) => {
            let payload = json!({
                "error": error.to_string(),
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        PortalError::InvalidTemplate(message) => {
            let payload = json!({
                "error": message,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        PortalError::UploadFailed { failures } => {
            let payload = json!({
                "error": error.to_string(),
                "uploadFailures": failures,
            });
            (StatusCode::SERVICE_UNAVAILABLE, axum::Json(payload)).into_response()
        }
        PortalError::SignInRequired => {
            let payload = json!({
                "error": error.to_string(),
            });
            (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
        }
        PortalError::Identity(auth) if !matches!(auth, AuthError::Unavailable(_)) => {
            let payload = json!({
                "error": error.to_string(),
            });
            (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
        }
        PortalError::Forbidden { .. } => {
            let payload = json!({
                "error": error.to_string(),
            });
            (StatusCode::FORBIDDEN, axum::Json(payload)).into_response()
        }
        other => {
            error!(error = %other, "portal request failed");
            let payload = json!({
                "error": "internal error",
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

fn json_ok<T: serde::Serialize>(status: StatusCode, body: T) -> Response {
    (status, axum::Json(body)).into_response()
}

/// The user signed in on this host; every action runs as that user.
fn signed_in<S, F, B>(service: &ThesisPortalService<S, F, B>) -> Result<User, PortalError>
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    service
        .identity()
        .current_user()
        .ok_or(PortalError::SignInRequired)
}

pub(crate) async fn sign_in_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
    axum::Json(request): axum::Json<SignInRequest>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match service
        .identity()
        .login_with_password(&request.email, &request.password)
    {
        Ok(user) => json_ok(StatusCode::OK, user),
        Err(error) => error_response(error.into()),
    }
}

pub(crate) async fn current_session_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match signed_in(&service) {
        Ok(user) => json_ok(StatusCode::OK, user),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn sign_out_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match service.identity().logout() {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error.into()),
    }
}

pub(crate) async fn submit_proposal_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
    axum::Json(form): axum::Json<ProposalForm>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match signed_in(&service).and_then(|student| service.submit_proposal(&student, form)) {
        Ok(outcome) => json_ok(StatusCode::ACCEPTED, outcome),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn pending_proposals_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match service.pending_proposals() {
        Ok(proposals) => json_ok(StatusCode::OK, proposals),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn validate_proposal_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<ValidationRequest>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match signed_in(&service)
        .and_then(|lecturer| service.validate_proposal(&lecturer, &id, request.approve)) {
        Ok(proposal) => json_ok(StatusCode::OK, proposal),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_seminar_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
    axum::Json(form): axum::Json<SeminarForm>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match signed_in(&service).and_then(|student| service.submit_seminar(&student, form)) {
        Ok(outcome) => json_ok(StatusCode::ACCEPTED, outcome),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn pending_seminars_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match service.pending_seminars() {
        Ok(seminars) => json_ok(StatusCode::OK, seminars),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn schedule_seminar_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<ScheduleRequest>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match signed_in(&service)
        .and_then(|lecturer| service.schedule_seminar(&lecturer, &id, &request)) {
        Ok(outcome) => json_ok(StatusCode::OK, outcome),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_defense_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
    axum::Json(form): axum::Json<DefenseForm>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match signed_in(&service).and_then(|student| service.submit_defense(&student, form)) {
        Ok(outcome) => json_ok(StatusCode::ACCEPTED, outcome),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn pending_defenses_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match service.pending_defenses() {
        Ok(defenses) => json_ok(StatusCode::OK, defenses),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn schedule_defense_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<ScheduleRequest>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match signed_in(&service)
        .and_then(|lecturer| service.schedule_defense(&lecturer, &id, &request)) {
        Ok(outcome) => {
            let payload = json!({
                "defense": outcome.defense,
                "notificationId": outcome.notification.as_ref().map(|n| &n.id),
                "notificationError": outcome.notification_error,
                "letter": outcome.letter.as_ref().map(|letter| json!({
                    "name": letter.name,
                    "mimeType": letter.mime_type,
                    "size": letter.content.len(),
                })),
                "documentError": outcome.document_error,
            });
            json_ok(StatusCode::OK, payload)
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn export_schedule_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match service.export_defense_schedule() {
        Ok(csv) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, mime::TEXT_CSV_UTF_8.as_ref()),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"Jadwal_Sidang.csv\"",
                ),
            ],
            csv,
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_internship_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
    axum::Json(form): axum::Json<InternshipForm>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match signed_in(&service).and_then(|student| service.submit_internship(&student, form)) {
        Ok(outcome) => json_ok(StatusCode::ACCEPTED, outcome),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn pending_internships_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match service.pending_internships() {
        Ok(internships) => json_ok(StatusCode::OK, internships),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn validate_internship_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<ValidationRequest>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match signed_in(&service)
        .and_then(|lecturer| service.validate_internship(&lecturer, &id, request.approve)) {
        Ok(internship) => json_ok(StatusCode::OK, internship),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_lecturers_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match service.lecturers() {
        Ok(lecturers) => json_ok(StatusCode::OK, lecturers),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn add_lecturer_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
    axum::Json(form): axum::Json<LecturerForm>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match signed_in(&service).and_then(|lecturer| service.add_lecturer(&lecturer, form)) {
        Ok(lecturer) => json_ok(StatusCode::CREATED, lecturer),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_lecturer_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
    Path(id): Path<String>,
    axum::Json(form): axum::Json<LecturerForm>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match signed_in(&service)
        .and_then(|lecturer| service.update_lecturer(&lecturer, &id, form)) {
        Ok(lecturer) => json_ok(StatusCode::OK, lecturer),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn delete_lecturer_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
    Path(id): Path<String>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match signed_in(&service).and_then(|lecturer| service.delete_lecturer(&lecturer, &id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn requirement_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
    Path(kind): Path<RequirementKind>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    let payload = json!({
        "kind": kind,
        "text": service.requirement(kind),
    });
    json_ok(StatusCode::OK, payload)
}

pub(crate) async fn save_requirement_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
    Path(kind): Path<RequirementKind>,
    axum::Json(update): axum::Json<RequirementUpdate>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match signed_in(&service)
        .and_then(|lecturer| service.save_requirement(&lecturer, kind, &update.text))
    {
        Ok(()) => {
            let payload = json!({
                "kind": kind,
                "text": update.text,
            });
            json_ok(StatusCode::OK, payload)
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn inbox_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
    Path(user_id): Path<String>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match service.inbox(&user_id) {
        Ok(notifications) => {
            let unread = notifications.iter().filter(|n| !n.is_read).count();
            let payload = json!({
                "unread": unread,
                "notifications": notifications,
            });
            json_ok(StatusCode::OK, payload)
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn mark_read_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
    Path(id): Path<String>,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    match service.mark_notification_read(&id) {
        Ok(notification) => json_ok(StatusCode::OK, notification),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn template_handler<S, F, B>(State(service): PortalState<S, F, B>) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    json_ok(StatusCode::OK, service.template())
}

pub(crate) async fn replace_template_handler<S, F, B>(
    State(service): PortalState<S, F, B>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
    B: AuthBackend + 'static,
{
    let Some(name) = headers
        .get(FILE_NAME_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        let payload = json!({
            "error": format!("missing {FILE_NAME_HEADER} header"),
        });
        return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
    };

    match signed_in(&service)
        .and_then(|lecturer| service.replace_template(&lecturer, name, body.to_vec())) {
        Ok(template) => json_ok(StatusCode::OK, template),
        Err(error) => error_response(error),
    }
}
