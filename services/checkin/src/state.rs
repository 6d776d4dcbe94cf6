use chrono::Duration;
use sea_orm::DatabaseConnection;

use crate::domain::clock::SystemClock;
use crate::domain::types::{DEFAULT_CODE_TTL_SECS, DEFAULT_LATE_GRACE_SECS, RetryPolicy};
use crate::infra::db::{DbAttendanceCodeRepository, DbOutboxRepository};
use crate::infra::grpc::{GrpcAttendanceRecorder, GrpcScheduleDirectory};

/// Tunables shared by handlers and background workers.
#[derive(Debug, Clone, Copy)]
pub struct CheckinPolicy {
    pub code_ttl: Duration,
    pub late_grace: Duration,
    pub retry: RetryPolicy,
    pub relay_batch_size: u64,
}

impl Default for CheckinPolicy {
    fn default() -> Self {
        Self {
            code_ttl: Duration::seconds(DEFAULT_CODE_TTL_SECS),
            late_grace: Duration::seconds(DEFAULT_LATE_GRACE_SECS),
            retry: RetryPolicy::default(),
            relay_batch_size: 50,
        }
    }
}

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub recorder: GrpcAttendanceRecorder,
    pub schedules: GrpcScheduleDirectory,
    pub policy: CheckinPolicy,
}

impl AppState {
    pub fn code_repo(&self) -> DbAttendanceCodeRepository {
        DbAttendanceCodeRepository {
            db: self.db.clone(),
        }
    }

    pub fn outbox_repo(&self) -> DbOutboxRepository {
        DbOutboxRepository {
            db: self.db.clone(),
        }
    }

    pub fn recorder(&self) -> GrpcAttendanceRecorder {
        self.recorder.clone()
    }

    pub fn schedules(&self) -> GrpcScheduleDirectory {
        self.schedules.clone()
    }

    pub fn clock(&self) -> SystemClock {
        SystemClock
    }
}
