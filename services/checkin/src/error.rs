use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use campus_domain::id::{AttendanceCodeId, ScheduleId};

/// Check-in service error variants.
///
/// Scan rejections (unknown / used / expired code) are not errors; they are
/// returned as `ScanRejection` inside a successful response.
#[derive(Debug, thiserror::Error)]
pub enum CheckinServiceError {
    #[error("forbidden")]
    Forbidden,
    #[error("too many students in one bulk request (max {max})")]
    BulkLimitExceeded { max: usize },
    #[error("schedule not found")]
    ScheduleNotFound(ScheduleId),
    /// Another active code exists for the same student and schedule. Resolved
    /// by the issuer; never expected to reach a client.
    #[error("conflicting active code")]
    ConflictingActiveCode,
    /// The code is already `used`; the attendance entry will be delivered by
    /// the outbox relay.
    #[error("attendance recording failed; it will be retried")]
    DownstreamRecordingFailed { code_id: AttendanceCodeId },
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl CheckinServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Forbidden => "FORBIDDEN",
            Self::BulkLimitExceeded { .. } => "BULK_LIMIT_EXCEEDED",
            Self::ScheduleNotFound(_) => "SCHEDULE_NOT_FOUND",
            Self::ConflictingActiveCode => "CONFLICTING_ACTIVE_CODE",
            Self::DownstreamRecordingFailed { .. } => "DOWNSTREAM_RECORDING_FAILED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Full description for logs and stored failure reasons, including the
    /// anyhow chain that `Display` deliberately hides from clients.
    pub fn detail(&self) -> String {
        match self {
            Self::Internal(e) => format!("{e:#}"),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for CheckinServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BulkLimitExceeded { .. } => StatusCode::BAD_REQUEST,
            Self::ScheduleNotFound(_) => StatusCode::NOT_FOUND,
            Self::ConflictingActiveCode => StatusCode::CONFLICT,
            Self::DownstreamRecordingFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // TraceLayer already records method/uri/status for every request; only the
        // anyhow chain of a 500 needs logging here.
        if let Self::Internal(ref e) = self {
            tracing::error!(error = %e, kind = "INTERNAL", "internal error");
        }
        let mut body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let Self::DownstreamRecordingFailed { code_id } = &self {
            body["code_id"] = serde_json::json!(code_id);
        }
        (status, axum::Json(body)).into_response()
    }
}
