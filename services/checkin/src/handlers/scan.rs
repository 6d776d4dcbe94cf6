use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campus_core::identity::IdentityHeaders;
use campus_domain::id::{AttendanceCodeId, InstructorId, ScheduleId, StudentId};
use campus_domain::user::UserRole;

use crate::domain::types::{AttendanceStatus, ScanRejection};
use crate::error::CheckinServiceError;
use crate::state::AppState;
use crate::usecase::scan::{ScanCodeUseCase, ScanInput, ScanMetadata, ScanOutcome};

/// Free-text scan location is stored as-is up to this many characters.
const MAX_LOCATION_LEN: usize = 128;

// ── POST /attendance/scans ───────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ScanCodeRequest {
    pub code: String,
    /// Device time of the scan, epoch milliseconds.
    pub scanned_at_ms: Option<i64>,
    pub location: Option<String>,
}

#[derive(Serialize)]
pub struct ScanMetadataResponse {
    pub code_id: Option<AttendanceCodeId>,
    pub student_id: Option<StudentId>,
    pub schedule_id: Option<ScheduleId>,
    pub instructor_id: InstructorId,
    #[serde(serialize_with = "campus_core::serde::to_rfc3339_ms")]
    pub scanned_at: DateTime<Utc>,
    pub location: Option<String>,
    pub code_expired: bool,
}

impl From<ScanMetadata> for ScanMetadataResponse {
    fn from(m: ScanMetadata) -> Self {
        Self {
            code_id: m.code_id,
            student_id: m.student_id,
            schedule_id: m.schedule_id,
            instructor_id: m.instructor_id,
            scanned_at: m.scanned_at,
            location: m.location,
            code_expired: m.code_expired,
        }
    }
}

#[derive(Serialize)]
pub struct ScanCodeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ScanRejection>,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance_status: Option<AttendanceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    pub metadata: ScanMetadataResponse,
}

impl From<ScanOutcome> for ScanCodeResponse {
    fn from(outcome: ScanOutcome) -> Self {
        Self {
            success: outcome.success(),
            reason: outcome.rejection,
            message: outcome.message(),
            attendance_status: outcome.attendance_status,
            record_id: outcome.record_id,
            metadata: outcome.metadata.into(),
        }
    }
}

pub async fn scan_code(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Json(body): Json<ScanCodeRequest>,
) -> Result<Json<ScanCodeResponse>, CheckinServiceError> {
    if !identity.has_role(UserRole::Instructor) {
        return Err(CheckinServiceError::Forbidden);
    }
    let usecase = ScanCodeUseCase {
        codes: state.code_repo(),
        outbox: state.outbox_repo(),
        recorder: state.recorder(),
        schedules: state.schedules(),
        clock: state.clock(),
        late_grace: state.policy.late_grace,
        retry: state.policy.retry,
    };
    let outcome = usecase
        .execute(ScanInput {
            code: body.code,
            instructor_id: InstructorId(identity.user_id),
            scanned_at: body.scanned_at_ms.and_then(DateTime::from_timestamp_millis),
            location: body
                .location
                .map(|l| l.trim().chars().take(MAX_LOCATION_LEN).collect::<String>())
                .filter(|l| !l.is_empty()),
        })
        .await?;
    Ok(Json(outcome.into()))
}
