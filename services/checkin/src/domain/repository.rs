#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};
use uuid::Uuid;

use campus_domain::id::{AttendanceCodeId, ScheduleId, StudentId};

use crate::domain::types::{
    AttendanceCode, AttendanceEntry, CodeStatus, OutboxEvent, RecordedAttendance, ScanAudit,
    ScheduleWindow,
};
use crate::error::CheckinServiceError;

/// Repository for attendance check-in codes.
///
/// Every status change is a conditional update on the expected status, so two
/// writers racing on the same row never both succeed.
pub trait AttendanceCodeRepository: Send + Sync {
    /// Find the `active` code for a (student, schedule) pair, expired or not.
    async fn find_active(
        &self,
        student_id: StudentId,
        schedule_id: ScheduleId,
    ) -> Result<Option<AttendanceCode>, CheckinServiceError>;

    async fn find_by_code(&self, code: &str)
    -> Result<Option<AttendanceCode>, CheckinServiceError>;

    /// Insert a freshly minted code. Fails with `ConflictingActiveCode` when
    /// another `active` code already exists for the pair.
    async fn create(&self, code: &AttendanceCode) -> Result<(), CheckinServiceError>;

    /// Set `status = new` where `status = expected`. Returns `true` only if this
    /// call changed the row.
    async fn compare_and_set_status(
        &self,
        id: AttendanceCodeId,
        expected: CodeStatus,
        new: CodeStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, CheckinServiceError>;

    /// Flip `active → used` if the code is still active and unexpired at
    /// `audit.at`, and insert the outbox event in the same transaction.
    /// Returns `false` (and writes nothing) when the flip lost.
    async fn mark_used_with_outbox(
        &self,
        id: AttendanceCodeId,
        audit: &ScanAudit,
        event: &OutboxEvent,
    ) -> Result<bool, CheckinServiceError>;

    /// Expire every `active` code whose `expires_at < before`. Returns the count.
    async fn expire_before(&self, before: DateTime<Utc>) -> Result<u64, CheckinServiceError>;
}

/// Repository for pending outbox deliveries.
pub trait OutboxRepository: Send + Sync {
    /// Unprocessed, unfailed events of `kind` due at `now`, oldest first.
    async fn fetch_due(
        &self,
        kind: &str,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<OutboxEvent>, CheckinServiceError>;

    async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>)
    -> Result<(), CheckinServiceError>;

    /// Count one failed attempt. `failed_at` set means the relay gives up on the event.
    async fn record_failure(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
        failed_at: Option<DateTime<Utc>>,
    ) -> Result<(), CheckinServiceError>;
}

/// Port to the attendance records service.
pub trait AttendanceRecorder: Send + Sync {
    async fn create(
        &self,
        entry: &AttendanceEntry,
    ) -> Result<RecordedAttendance, CheckinServiceError>;
}

/// Port to the scheduling service.
pub trait ScheduleDirectory: Send + Sync {
    async fn find_window(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<Option<ScheduleWindow>, CheckinServiceError>;
}
