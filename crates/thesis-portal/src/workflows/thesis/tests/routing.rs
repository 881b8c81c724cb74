use super::common::*;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use tower::ServiceExt;

use crate::workflows::thesis::domain::{ProposalForm, RequirementKind};
use crate::workflows::thesis::export::DEFENSE_SCHEDULE_HEADER;
use crate::workflows::thesis::router::{ValidationRequest, FILE_NAME_HEADER};

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn sign_in_over_http(router: &Router, email: &str) -> Value {
    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/session",
            json!({"email": email, "password": "rahasia"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    read_json_body(response).await
}

#[tokio::test]
async fn submit_handler_returns_unprocessable_for_incomplete_proposal() {
    let harness = build_service();
    sign_in(&harness.service, STUDENT_EMAIL);

    let response = crate::workflows::thesis::router::submit_proposal_handler::<
        MemoryStore,
        MemoryFiles,
        MemoryAuth,
    >(
        State(harness.service.clone()),
        axum::Json(ProposalForm {
            title: "  ".to_string(),
            advisor1_id: None,
            advisor2_id: None,
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["error"], "Harap lengkapi judul dan pembimbing.");
    assert_eq!(body["missing"], json!(["title", "advisor1Id", "advisor2Id"]));
}

#[tokio::test]
async fn queue_handler_returns_internal_error_on_store_failure() {
    let service = std::sync::Arc::new(unavailable_service());

    let response = crate::workflows::thesis::router::pending_proposals_handler::<
        UnavailableStore,
        MemoryFiles,
        MemoryAuth,
    >(State(service))
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json_body(response).await;
    assert_eq!(body["error"], "internal error");
}

#[tokio::test]
async fn validate_handler_returns_not_found_for_unknown_proposal() {
    let harness = build_service();
    sign_in(&harness.service, LECTURER_EMAIL);

    let response = crate::workflows::thesis::router::validate_proposal_handler::<
        MemoryStore,
        MemoryFiles,
        MemoryAuth,
    >(
        State(harness.service.clone()),
        Path("thesis_registrations-404".to_string()),
        axum::Json(ValidationRequest { approve: true }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn proposal_routes_accept_then_conflict_on_second_decision() {
    let harness = build_service();
    let router = portal_router_with_service(harness.service.clone());
    sign_in_over_http(&router, LECTURER_EMAIL).await;

    let lecturer = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/lecturers",
            json!({"name": "Dr. Budi", "nip": "1987", "specialization": "RPL"}),
        ))
        .await
        .unwrap();
    assert_eq!(lecturer.status(), StatusCode::CREATED);
    let lecturer_id = read_json_body(lecturer).await["id"]["stored"]
        .as_str()
        .unwrap()
        .to_string();

    let signed_in = sign_in_over_http(&router, STUDENT_EMAIL).await;
    assert_eq!(signed_in["id"], "stu-ani");
    let submitted = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/proposals",
            json!({
                "title": "Sistem Rekomendasi Judul",
                "advisor1Id": lecturer_id,
                "advisor2Id": lecturer_id,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(submitted.status(), StatusCode::ACCEPTED);
    let body = read_json_body(submitted).await;
    assert_eq!(body["record"]["status"], "Diajukan");
    let proposal_id = body["record"]["id"]["stored"].as_str().unwrap().to_string();

    let queue = router
        .clone()
        .oneshot(
            Request::get("/api/v1/proposals")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(queue.status(), StatusCode::OK);
    assert_eq!(read_json_body(queue).await.as_array().unwrap().len(), 1);

    let uri = format!("/api/v1/proposals/{proposal_id}/validation");
    let refused = router
        .clone()
        .oneshot(json_request("POST", &uri, json!({"approve": true})))
        .await
        .unwrap();
    assert_eq!(refused.status(), StatusCode::FORBIDDEN);

    sign_in_over_http(&router, LECTURER_EMAIL).await;
    let approved = router
        .clone()
        .oneshot(json_request("POST", &uri, json!({"approve": true})))
        .await
        .unwrap();
    assert_eq!(approved.status(), StatusCode::OK);
    assert_eq!(read_json_body(approved).await["status"], "Disetujui");

    let again = router
        .oneshot(json_request("POST", &uri, json!({"approve": false})))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn defense_schedule_route_reports_missing_fields() {
    let harness = build_service();
    let router = portal_router_with_service(harness.service.clone());
    sign_in_over_http(&router, STUDENT_EMAIL).await;

    let submitted = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/defenses",
            json!({
                "sksCount": 150,
                "adminRequirementsMet": true,
                "fixedManuscript": {"name": "naskah.pdf", "mimeType": "application/pdf", "content": [37, 80, 68, 70]},
                "plagiarismCheck": {"name": "cek.pdf", "mimeType": "application/pdf", "content": [37, 80, 68, 70]},
                "transcript": {"name": "transkrip.pdf", "mimeType": "application/pdf", "content": [37, 80, 68, 70]},
            }),
        ))
        .await
        .unwrap();
    assert_eq!(submitted.status(), StatusCode::ACCEPTED);
    let defense_id = read_json_body(submitted).await["record"]["id"]["stored"]
        .as_str()
        .unwrap()
        .to_string();

    sign_in_over_http(&router, LECTURER_EMAIL).await;
    let response = router
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/defenses/{defense_id}/schedule"),
            json!({"date": "2024-06-20", "time": "09:00"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["missing"], json!(["examiner1", "letterNumber"]));
}

#[tokio::test]
async fn schedule_export_is_served_as_csv() {
    let harness = build_service();
    let router = portal_router_with_service(harness.service.clone());

    let response = router
        .oneshot(
            Request::get("/api/v1/defenses/schedule.csv")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        mime::TEXT_CSV_UTF_8.as_ref()
    );
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("Jadwal_Sidang.csv"));
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    assert_eq!(
        String::from_utf8(body.to_vec()).unwrap(),
        format!("{}\n", DEFENSE_SCHEDULE_HEADER.join(","))
    );
}

#[tokio::test]
async fn template_upload_requires_file_name_header() {
    let harness = build_service();
    sign_in(&harness.service, LECTURER_EMAIL);
    let router = portal_router_with_service(harness.service.clone());

    let missing_header = router
        .clone()
        .oneshot(
            Request::put("/api/v1/template")
                .body(Body::from(letter_template()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing_header.status(), StatusCode::BAD_REQUEST);

    let wrong_type = router
        .clone()
        .oneshot(
            Request::put("/api/v1/template")
                .header(FILE_NAME_HEADER, "surat.pdf")
                .body(Body::from(vec![1, 2, 3]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong_type.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        read_json_body(wrong_type).await["error"],
        "Template harus berupa file .docx"
    );

    let stored = router
        .clone()
        .oneshot(
            Request::put("/api/v1/template")
                .header(FILE_NAME_HEADER, "Undangan.docx")
                .body(Body::from(letter_template()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(stored.status(), StatusCode::OK);

    let current = router
        .oneshot(Request::get("/api/v1/template").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = read_json_body(current).await;
    assert_eq!(body["name"], "Undangan.docx");
    assert!(body["lastModified"].is_string());
    assert!(body.get("content").is_none());
}

#[tokio::test]
async fn requirement_and_notification_routes() {
    let harness = build_service();
    harness
        .service
        .notifications()
        .notify(&student().id, "Info", "Jadwal berubah", Vec::new())
        .unwrap();
    sign_in(&harness.service, LECTURER_EMAIL);
    let router = portal_router_with_service(harness.service.clone());

    let updated = router
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/v1/requirements/semhas",
            json!({"text": "Bawa logbook."}),
        ))
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);

    let fetched = router
        .clone()
        .oneshot(
            Request::get("/api/v1/requirements/SEMHAS")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = read_json_body(fetched).await;
    assert_eq!(body["kind"], json!(RequirementKind::Semhas));
    assert_eq!(body["text"], "Bawa logbook.");

    let inbox = router
        .clone()
        .oneshot(
            Request::get(format!("/api/v1/users/{}/notifications", student().id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = read_json_body(inbox).await;
    assert_eq!(body["unread"], 1);
    let notification_id = body["notifications"][0]["id"]["stored"]
        .as_str()
        .unwrap()
        .to_string();

    let read = router
        .clone()
        .oneshot(
            Request::post(format!("/api/v1/notifications/{notification_id}/read"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(read.status(), StatusCode::OK);
    assert_eq!(read_json_body(read).await["isRead"], true);

    let unknown = router
        .oneshot(
            Request::post("/api/v1/notifications/notifications-999/read")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn lecturer_routes_cover_update_and_delete() {
    let harness = build_service();
    sign_in(&harness.service, LECTURER_EMAIL);
    let router = portal_router_with_service(harness.service.clone());

    let invalid = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/lecturers",
            json!({"name": "Tanpa NIP"}),
        ))
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(read_json_body(invalid).await["missing"], json!(["nip"]));

    let created = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/lecturers",
            json!({"name": "Dr. Budi", "nip": "1987"}),
        ))
        .await
        .unwrap();
    let id = read_json_body(created).await["id"]["stored"]
        .as_str()
        .unwrap()
        .to_string();
    let uri = format!("/api/v1/lecturers/{id}");

    let updated = router
        .clone()
        .oneshot(json_request(
            "PUT",
            &uri,
            json!({"name": "Dr. Budi Santoso", "nip": "1987", "specialization": "AI"}),
        ))
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);
    assert_eq!(read_json_body(updated).await["name"], "Dr. Budi Santoso");

    let deleted = router
        .clone()
        .oneshot(Request::delete(uri.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let gone = router
        .oneshot(Request::delete(uri.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn actions_without_a_session_are_unauthorized() {
    let harness = build_service();
    let router = portal_router_with_service(harness.service.clone());

    let session = router
        .clone()
        .oneshot(Request::get("/api/v1/session").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(session.status(), StatusCode::UNAUTHORIZED);

    let submitted = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/internships",
            json!({"companyName": "PT Nusantara Data", "advisorId": "lecturers-1"}),
        ))
        .await
        .unwrap();
    assert_eq!(submitted.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        read_json_body(submitted).await["error"],
        "Silakan login terlebih dahulu."
    );

    let wrong_password = router
        .oneshot(json_request(
            "POST",
            "/api/v1/session",
            json!({"email": "tamu@kampus.ac.id", "password": "salah"}),
        ))
        .await
        .unwrap();
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert!(harness.store.rows("internships").is_empty());
}

#[tokio::test]
async fn students_are_forbidden_from_lecturer_routes() {
    let harness = build_service();
    let router = portal_router_with_service(harness.service.clone());
    sign_in_over_http(&router, STUDENT_EMAIL).await;

    let requests = [
        json_request(
            "POST",
            "/api/v1/lecturers",
            json!({"name": "Dr. Budi", "nip": "1987"}),
        ),
        json_request(
            "PUT",
            "/api/v1/requirements/SIDANG",
            json!({"text": "Tanpa syarat."}),
        ),
        json_request(
            "POST",
            "/api/v1/internships/internships-1/validation",
            json!({"approve": true}),
        ),
        Request::put("/api/v1/template")
            .header(FILE_NAME_HEADER, "Undangan.docx")
            .body(Body::from(letter_template()))
            .unwrap(),
    ];
    for request in requests {
        let uri = request.uri().to_string();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri}");
        let body = read_json_body(response).await;
        assert!(body["error"].as_str().unwrap().ends_with("dosen"), "{uri}");
    }

    assert!(harness.store.rows("lecturers").is_empty());
    assert!(harness.service.template().content.is_none());
}

#[tokio::test]
async fn sign_out_ends_the_session() {
    let harness = build_service();
    let router = portal_router_with_service(harness.service.clone());
    let user = sign_in_over_http(&router, LECTURER_EMAIL).await;
    assert_eq!(user["role"], "LECTURER");

    let current = router
        .clone()
        .oneshot(Request::get("/api/v1/session").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(read_json_body(current).await["name"], "Dr. Budi");

    let signed_out = router
        .clone()
        .oneshot(Request::delete("/api/v1/session").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(signed_out.status(), StatusCode::NO_CONTENT);
    assert!(harness.service.identity().current_user().is_none());

    let created = router
        .oneshot(json_request(
            "POST",
            "/api/v1/lecturers",
            json!({"name": "Citra", "nip": "1990"}),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn failed_upload_is_reported_as_retryable() {
    let harness = build_service();
    let router = portal_router_with_service(harness.service.clone());
    sign_in_over_http(&router, STUDENT_EMAIL).await;
    harness.files.failing.store(true, Ordering::Relaxed);

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/seminars",
            json!({
                "type": "PROPOSAL",
                "report": {"name": "proposal.pdf", "mimeType": "application/pdf", "content": [37, 80, 68, 70]},
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json_body(response).await;
    assert_eq!(body["error"], "Upload file gagal, silakan coba lagi.");
    assert_eq!(
        body["uploadFailures"],
        json!([{"field": "report", "fileName": "proposal.pdf"}])
    );
    assert!(harness.store.rows("seminars").is_empty());
}
