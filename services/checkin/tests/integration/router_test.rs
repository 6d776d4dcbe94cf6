use axum::http::StatusCode;
use axum_test::{TestRequest, TestServer};
use sea_orm::DatabaseConnection;
use serde_json::json;
use uuid::Uuid;

use campus_checkin::handlers::code::MAX_BULK_STUDENTS;
use campus_checkin::infra::grpc::{GrpcAttendanceRecorder, GrpcScheduleDirectory, GrpcTimeouts};
use campus_checkin::router::build_router;
use campus_checkin::state::{AppState, CheckinPolicy};
use campus_core::middleware::X_REQUEST_ID;
use campus_testing::auth::MockAuth;

/// Router over a disconnected database and unreachable gRPC peers. Every
/// request here is settled before any storage or RPC call is made.
fn server() -> TestServer {
    let peer = "http://127.0.0.1:9";
    let state = AppState {
        db: DatabaseConnection::Disconnected,
        recorder: GrpcAttendanceRecorder::lazy(peer, GrpcTimeouts::default()).unwrap(),
        schedules: GrpcScheduleDirectory::lazy(peer, GrpcTimeouts::default()).unwrap(),
        policy: CheckinPolicy::default(),
    };
    TestServer::new(build_router(state)).unwrap()
}

fn as_user(mut request: TestRequest, auth: &MockAuth) -> TestRequest {
    for (name, value) in auth.headers().iter() {
        request = request.add_header(name.clone(), value.clone());
    }
    request
}

#[tokio::test]
async fn should_answer_liveness_with_request_id() {
    let server = server();

    let resp = server.get("/healthz").await;

    assert_eq!(resp.status_code(), StatusCode::OK);
    let request_id = resp.header(X_REQUEST_ID);
    assert!(request_id.to_str().unwrap().parse::<Uuid>().is_ok());
}

#[tokio::test]
async fn should_report_not_ready_without_database() {
    let resp = server().get("/readyz").await;
    assert_eq!(resp.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn should_reject_requests_without_identity() {
    let server = server();

    let resp = server
        .post("/attendance/codes")
        .json(&json!({ "schedule_id": Uuid::new_v4() }))
        .await;
    assert_eq!(resp.status_code(), StatusCode::UNAUTHORIZED);

    let resp = server
        .post("/attendance/scans")
        .json(&json!({ "code": "abc" }))
        .await;
    assert_eq!(resp.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn should_only_issue_codes_to_students() {
    let server = server();

    let resp = as_user(
        server
            .post("/attendance/codes")
            .json(&json!({ "schedule_id": Uuid::new_v4() })),
        &MockAuth::instructor(),
    )
    .await;

    assert_eq!(resp.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(resp.json::<serde_json::Value>()["kind"], "FORBIDDEN");
}

#[tokio::test]
async fn should_only_show_code_status_to_students() {
    let server = server();
    let path = format!("/attendance/codes/{}", Uuid::new_v4());

    let resp = as_user(server.get(&path), &MockAuth::admin()).await;

    assert_eq!(resp.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn should_forbid_students_from_scanning() {
    let server = server();

    let resp = as_user(
        server
            .post("/attendance/scans")
            .json(&json!({ "code": "abc", "location": "B-204" })),
        &MockAuth::student(),
    )
    .await;

    assert_eq!(resp.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn should_forbid_students_from_bulk_issue() {
    let server = server();

    let resp = as_user(
        server.post("/attendance/codes/bulk").json(&json!({
            "schedule_id": Uuid::new_v4(),
            "student_ids": [Uuid::new_v4()],
        })),
        &MockAuth::student(),
    )
    .await;

    assert_eq!(resp.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn should_restrict_sweep_to_admins() {
    let server = server();

    let resp = as_user(server.post("/attendance/codes/sweep"), &MockAuth::instructor()).await;

    assert_eq!(resp.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn should_reject_roster_above_bulk_limit() {
    let server = server();
    let student_ids: Vec<Uuid> = (0..=MAX_BULK_STUDENTS).map(|_| Uuid::new_v4()).collect();

    let resp = as_user(
        server.post("/attendance/codes/bulk").json(&json!({
            "schedule_id": Uuid::new_v4(),
            "student_ids": student_ids,
        })),
        &MockAuth::instructor(),
    )
    .await;

    assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST);
    let body = resp.json::<serde_json::Value>();
    assert_eq!(body["kind"], "BULK_LIMIT_EXCEEDED");
}
