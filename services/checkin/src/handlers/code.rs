use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use campus_core::identity::IdentityHeaders;
use campus_domain::id::{AttendanceCodeId, ScheduleId, StudentId};
use campus_domain::user::UserRole;

use crate::error::CheckinServiceError;
use crate::state::AppState;
use crate::usecase::issue::{IssueCodeUseCase, IssuedCode};
use crate::usecase::status::GetCodeStatusUseCase;

/// Bulk issuance covers one class roster at a time.
pub const MAX_BULK_STUDENTS: usize = 500;

// ── POST /attendance/codes ───────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct IssueCodeRequest {
    pub schedule_id: Uuid,
}

#[derive(Serialize)]
pub struct IssuedCodeResponse {
    pub code_id: AttendanceCodeId,
    pub code: String,
    #[serde(serialize_with = "campus_core::serde::to_rfc3339_ms")]
    pub expires_at: DateTime<Utc>,
    pub seconds_remaining: i64,
    pub reused: bool,
}

impl From<IssuedCode> for IssuedCodeResponse {
    fn from(issued: IssuedCode) -> Self {
        Self {
            code_id: issued.code.id,
            code: issued.code.code,
            expires_at: issued.code.expires_at,
            seconds_remaining: issued.seconds_remaining,
            reused: issued.reused,
        }
    }
}

pub async fn issue_code(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Json(body): Json<IssueCodeRequest>,
) -> Result<(StatusCode, Json<IssuedCodeResponse>), CheckinServiceError> {
    // Codes are issued to the caller only.
    if identity.user_role != UserRole::Student {
        return Err(CheckinServiceError::Forbidden);
    }
    let usecase = IssueCodeUseCase {
        codes: state.code_repo(),
        clock: state.clock(),
        ttl: state.policy.code_ttl,
    };
    let issued = usecase
        .execute(StudentId(identity.user_id), ScheduleId(body.schedule_id))
        .await?;
    let status = if issued.reused {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(issued.into())))
}

// ── POST /attendance/codes/bulk ──────────────────────────────────────────────

#[derive(Deserialize)]
pub struct BulkIssueRequest {
    pub schedule_id: Uuid,
    pub student_ids: Vec<Uuid>,
}

#[derive(Serialize)]
pub struct BulkIssueItemResponse {
    pub student_id: StudentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<IssuedCodeResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

#[derive(Serialize)]
pub struct BulkIssueResponse {
    pub issued: usize,
    pub failed: usize,
    pub items: Vec<BulkIssueItemResponse>,
}

pub async fn issue_codes_bulk(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Json(body): Json<BulkIssueRequest>,
) -> Result<Json<BulkIssueResponse>, CheckinServiceError> {
    if !identity.has_role(UserRole::Instructor) {
        return Err(CheckinServiceError::Forbidden);
    }
    let mut student_ids: Vec<StudentId> = body.student_ids.into_iter().map(StudentId).collect();
    student_ids.sort_by_key(|id| id.0);
    student_ids.dedup();
    if student_ids.len() > MAX_BULK_STUDENTS {
        return Err(CheckinServiceError::BulkLimitExceeded {
            max: MAX_BULK_STUDENTS,
        });
    }

    let usecase = IssueCodeUseCase {
        codes: state.code_repo(),
        clock: state.clock(),
        ttl: state.policy.code_ttl,
    };
    let results = usecase
        .execute_bulk(ScheduleId(body.schedule_id), student_ids)
        .await;

    let items: Vec<BulkIssueItemResponse> = results
        .into_iter()
        .map(|item| match item.result {
            Ok(issued) => BulkIssueItemResponse {
                student_id: item.student_id,
                code: Some(issued.into()),
                error: None,
            },
            Err(e) => BulkIssueItemResponse {
                student_id: item.student_id,
                code: None,
                error: Some(e.kind()),
            },
        })
        .collect();
    let failed = items.iter().filter(|i| i.error.is_some()).count();
    Ok(Json(BulkIssueResponse {
        issued: items.len() - failed,
        failed,
        items,
    }))
}

// ── GET /attendance/codes/{schedule_id} ──────────────────────────────────────

#[derive(Serialize)]
pub struct CodeStatusResponse {
    pub has_active_code: bool,
    #[serde(
        serialize_with = "campus_core::serde::to_rfc3339_ms_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_remaining: Option<i64>,
    pub can_issue_new: bool,
}

pub async fn get_code_status(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<CodeStatusResponse>, CheckinServiceError> {
    if identity.user_role != UserRole::Student {
        return Err(CheckinServiceError::Forbidden);
    }
    let usecase = GetCodeStatusUseCase {
        codes: state.code_repo(),
        clock: state.clock(),
    };
    let view = usecase
        .execute(StudentId(identity.user_id), ScheduleId(schedule_id))
        .await?;
    Ok(Json(CodeStatusResponse {
        has_active_code: view.has_active_code,
        expires_at: view.expires_at,
        seconds_remaining: view.seconds_remaining,
        can_issue_new: view.can_issue_new,
    }))
}
