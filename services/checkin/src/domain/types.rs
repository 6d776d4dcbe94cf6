use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use campus_domain::id::{AttendanceCodeId, InstructorId, ScheduleId, StudentId};

/// Attendance code length in characters.
pub const CODE_LEN: usize = 32;

/// Default code time-to-live in seconds. A code glimpsed by someone else is
/// worthless within this window.
pub const DEFAULT_CODE_TTL_SECS: i64 = 15;

/// Default grace after schedule start before a scan counts as late.
pub const DEFAULT_LATE_GRACE_SECS: i64 = 600;

/// Outbox kind for attendance entries awaiting delivery to the recorder.
pub const ATTENDANCE_SCANNED: &str = "attendance_scanned";

// ── Code lifecycle ────────────────────────────────────────────────────────────

/// Lifecycle state of an attendance code. `Used` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeStatus {
    Active,
    Used,
    Expired,
}

/// Something that happens to a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeEvent {
    /// An instructor scanned the code within its window.
    Scan,
    /// The code outlived its window, noticed lazily or by the sweeper.
    Expire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal code transition: {event:?} while {from:?}")]
pub struct IllegalTransition {
    pub from: CodeStatus,
    pub event: CodeEvent,
}

impl CodeStatus {
    /// The only place code transitions are decided. Storage applies the result
    /// with a conditional update on the expected status.
    pub fn apply(self, event: CodeEvent) -> Result<CodeStatus, IllegalTransition> {
        match (self, event) {
            (Self::Active, CodeEvent::Scan) => Ok(Self::Used),
            (Self::Active, CodeEvent::Expire) => Ok(Self::Expired),
            (from @ (Self::Used | Self::Expired), event) => Err(IllegalTransition { from, event }),
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Short-lived check-in code issued to a student for one schedule.
#[derive(Debug, Clone)]
pub struct AttendanceCode {
    pub id: AttendanceCodeId,
    pub student_id: StudentId,
    pub schedule_id: ScheduleId,
    pub code: String,
    pub status: CodeStatus,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub used_by: Option<InstructorId>,
    pub scan_location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttendanceCode {
    pub fn mint(
        student_id: StudentId,
        schedule_id: ScheduleId,
        code: String,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: AttendanceCodeId::new(),
            student_id,
            schedule_id,
            code,
            status: CodeStatus::Active,
            expires_at: now + ttl,
            used_at: None,
            used_by: None,
            scan_location: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Past its window. A code is still valid at exactly `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == CodeStatus::Active && !self.is_expired_at(now)
    }

    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    /// Decide whether a scan at `now` may proceed.
    pub fn check_scannable(&self, now: DateTime<Utc>) -> Result<(), ScanRejection> {
        match self.status {
            CodeStatus::Used => Err(ScanRejection::AlreadyUsed),
            CodeStatus::Expired => Err(ScanRejection::Expired),
            CodeStatus::Active if self.is_expired_at(now) => Err(ScanRejection::Expired),
            CodeStatus::Active => Ok(()),
        }
    }
}

// ── Scanning ──────────────────────────────────────────────────────────────────

/// Expected, non-exceptional reasons a scan is refused. Each one implies a
/// different corrective action for the person holding the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanRejection {
    UnknownCode,
    AlreadyUsed,
    Expired,
}

impl ScanRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnknownCode => "UNKNOWN_CODE",
            Self::AlreadyUsed => "ALREADY_USED",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::UnknownCode => "code not recognised; check that the full code was scanned",
            Self::AlreadyUsed => "code was already used; attendance is already recorded",
            Self::Expired => "code has expired; ask the student to generate a new one",
        }
    }
}

/// Serialized as its `reason()` so logs and responses carry the same string.
impl Serialize for ScanRejection {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.reason())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Late => "late",
        }
    }
}

/// Time window of a scheduled class session, owned by the scheduling service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl ScheduleWindow {
    pub fn classify(&self, scanned_at: DateTime<Utc>, late_grace: Duration) -> AttendanceStatus {
        if scanned_at <= self.starts_at + late_grace {
            AttendanceStatus::Present
        } else {
            AttendanceStatus::Late
        }
    }
}

/// Audit fields written together with the `Active → Used` flip.
#[derive(Debug, Clone)]
pub struct ScanAudit {
    pub instructor_id: InstructorId,
    /// Server time of the transition; also the expiry cut-off for the conditional update.
    pub at: DateTime<Utc>,
    pub location: Option<String>,
}

/// Durable attendance entry handed to the attendance recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    pub student_id: StudentId,
    pub schedule_id: ScheduleId,
    pub instructor_id: InstructorId,
    pub scanned_at: DateTime<Utc>,
    pub status: AttendanceStatus,
    /// Idempotency key on the recorder side.
    pub source_code_id: AttendanceCodeId,
    pub location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RecordedAttendance {
    pub record_id: String,
}

// ── Outbox ────────────────────────────────────────────────────────────────────

/// Outbox event for async delivery, written in the same transaction as the state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
    pub idempotency_key: String,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
}

impl OutboxEvent {
    pub fn attendance_scanned(
        entry: &AttendanceEntry,
        now: DateTime<Utc>,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            kind: ATTENDANCE_SCANNED.to_owned(),
            payload: serde_json::to_value(entry)?,
            idempotency_key: format!("{ATTENDANCE_SCANNED}:{}", entry.source_code_id),
            attempts: 0,
            created_at: now,
            next_attempt_at,
        })
    }
}

/// Backoff for outbox deliveries: `base_delay * 2^(attempts - 1)`, capped.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: i32,
}

impl RetryPolicy {
    pub fn delay_after(&self, attempts: i32) -> Duration {
        let exponent = (attempts - 1).clamp(0, 16) as u32;
        (self.base_delay * 2i32.pow(exponent)).min(self.max_delay)
    }

    pub fn exhausted(&self, attempts: i32) -> bool {
        attempts >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::seconds(5),
            max_delay: Duration::minutes(5),
            max_attempts: 8,
        }
    }
}
