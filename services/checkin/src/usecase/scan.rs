use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use campus_domain::id::{AttendanceCodeId, InstructorId, ScheduleId, StudentId};

use crate::domain::clock::Clock;
use crate::domain::repository::{
    AttendanceCodeRepository, AttendanceRecorder, OutboxRepository, ScheduleDirectory,
};
use crate::domain::types::{
    AttendanceCode, AttendanceEntry, AttendanceStatus, CodeEvent, CodeStatus, OutboxEvent,
    RetryPolicy, ScanAudit, ScanRejection,
};
use crate::error::CheckinServiceError;
use crate::usecase::sweep::expire_lazily;

pub struct ScanInput {
    pub code: String,
    pub instructor_id: InstructorId,
    /// Device-reported scan time. Clamped to server time; defaults to it.
    pub scanned_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
}

/// Audit/UI metadata returned with every scan outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanMetadata {
    pub code_id: Option<AttendanceCodeId>,
    pub student_id: Option<StudentId>,
    pub schedule_id: Option<ScheduleId>,
    pub instructor_id: InstructorId,
    pub scanned_at: DateTime<Utc>,
    pub location: Option<String>,
    pub code_expired: bool,
}

impl ScanMetadata {
    fn attach(&mut self, code: &AttendanceCode, now: DateTime<Utc>) {
        self.code_id = Some(code.id);
        self.student_id = Some(code.student_id);
        self.schedule_id = Some(code.schedule_id);
        self.code_expired = code.status == CodeStatus::Expired
            || (code.status == CodeStatus::Active && code.is_expired_at(now));
    }
}

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub rejection: Option<ScanRejection>,
    pub attendance_status: Option<AttendanceStatus>,
    pub record_id: Option<String>,
    pub metadata: ScanMetadata,
}

impl ScanOutcome {
    fn accepted(status: AttendanceStatus, record_id: String, metadata: ScanMetadata) -> Self {
        Self {
            rejection: None,
            attendance_status: Some(status),
            record_id: Some(record_id),
            metadata,
        }
    }

    fn rejected(rejection: ScanRejection, metadata: ScanMetadata) -> Self {
        Self {
            rejection: Some(rejection),
            attendance_status: None,
            record_id: None,
            metadata,
        }
    }

    pub fn success(&self) -> bool {
        self.rejection.is_none()
    }

    pub fn message(&self) -> &'static str {
        match self.rejection {
            Some(rejection) => rejection.message(),
            None => "attendance recorded",
        }
    }
}

pub struct ScanCodeUseCase<R, O, A, S, C>
where
    R: AttendanceCodeRepository,
    O: OutboxRepository,
    A: AttendanceRecorder,
    S: ScheduleDirectory,
    C: Clock,
{
    pub codes: R,
    pub outbox: O,
    pub recorder: A,
    pub schedules: S,
    pub clock: C,
    pub late_grace: Duration,
    pub retry: RetryPolicy,
}

impl<R, O, A, S, C> ScanCodeUseCase<R, O, A, S, C>
where
    R: AttendanceCodeRepository,
    O: OutboxRepository,
    A: AttendanceRecorder,
    S: ScheduleDirectory,
    C: Clock,
{
    pub async fn execute(&self, input: ScanInput) -> Result<ScanOutcome, CheckinServiceError> {
        let now = self.clock.now();
        let scanned_at = input.scanned_at.map_or(now, |t| t.min(now));
        let mut metadata = ScanMetadata {
            code_id: None,
            student_id: None,
            schedule_id: None,
            instructor_id: input.instructor_id,
            scanned_at,
            location: input.location.clone(),
            code_expired: false,
        };

        // 1. Lookup
        let Some(code) = self.codes.find_by_code(input.code.trim()).await? else {
            info!(instructor_id = %input.instructor_id, "scan rejected: unknown code");
            return Ok(ScanOutcome::rejected(ScanRejection::UnknownCode, metadata));
        };
        metadata.attach(&code, now);

        // 2. Terminal or past its window
        if let Err(rejection) = code.check_scannable(now) {
            if code.status == CodeStatus::Active {
                expire_lazily(&self.codes, &code, now).await?;
            }
            info!(code_id = %code.id, reason = rejection.reason(), "scan rejected");
            return Ok(ScanOutcome::rejected(rejection, metadata));
        }

        // 3. Resolve the schedule before touching the code so a missing schedule
        //    never burns it
        let window = self
            .schedules
            .find_window(code.schedule_id)
            .await?
            .ok_or(CheckinServiceError::ScheduleNotFound(code.schedule_id))?;
        let status = window.classify(scanned_at, self.late_grace);
        // Expiry is judged at the flip, after the schedule lookup has returned.
        let flip_at = self.clock.now();

        let entry = AttendanceEntry {
            student_id: code.student_id,
            schedule_id: code.schedule_id,
            instructor_id: input.instructor_id,
            scanned_at,
            status,
            source_code_id: code.id,
            location: input.location.clone(),
        };
        let event =
            OutboxEvent::attendance_scanned(&entry, flip_at, flip_at + self.retry.base_delay)
                .map_err(anyhow::Error::from)?;

        // 4. Conditional flip active → used, outbox row in the same transaction
        code.status
            .apply(CodeEvent::Scan)
            .map_err(anyhow::Error::from)?;
        let audit = ScanAudit {
            instructor_id: input.instructor_id,
            at: flip_at,
            location: input.location,
        };
        if !self.codes.mark_used_with_outbox(code.id, &audit, &event).await? {
            let rejection = self.resolve_lost_race(&code, flip_at).await?;
            metadata.code_expired = rejection == ScanRejection::Expired;
            info!(code_id = %code.id, reason = rejection.reason(), "scan lost race");
            return Ok(ScanOutcome::rejected(rejection, metadata));
        }

        // 5. First delivery attempt; the relay owns every retry after this one
        match self.recorder.create(&entry).await {
            Ok(recorded) => {
                if let Err(e) = self.outbox.mark_processed(event.id, self.clock.now()).await {
                    // The relay will redeliver; the recorder deduplicates by code id.
                    warn!(event_id = %event.id, error = %e, "failed to mark outbox event processed");
                }
                info!(
                    code_id = %code.id,
                    student_id = %code.student_id,
                    instructor_id = %audit.instructor_id,
                    status = status.as_str(),
                    record_id = %recorded.record_id,
                    "attendance recorded"
                );
                Ok(ScanOutcome::accepted(status, recorded.record_id, metadata))
            }
            Err(e) => {
                warn!(code_id = %code.id, event_id = %event.id, error = %e.detail(), "attendance recording failed; queued for retry");
                let next_attempt_at = flip_at + self.retry.delay_after(1);
                if let Err(record_err) = self
                    .outbox
                    .record_failure(event.id, &e.detail(), next_attempt_at, None)
                    .await
                {
                    warn!(event_id = %event.id, error = %record_err, "failed to record outbox attempt");
                }
                Err(CheckinServiceError::DownstreamRecordingFailed { code_id: code.id })
            }
        }
    }

    /// The conditional update matched nothing: someone else moved the code out
    /// of `active` first, or it crossed its expiry meanwhile.
    async fn resolve_lost_race(
        &self,
        code: &AttendanceCode,
        now: DateTime<Utc>,
    ) -> Result<ScanRejection, CheckinServiceError> {
        let current = self.codes.find_by_code(&code.code).await?;
        Ok(match current {
            Some(c) if c.status == CodeStatus::Used => ScanRejection::AlreadyUsed,
            Some(c) if c.status == CodeStatus::Active => {
                expire_lazily(&self.codes, &c, now).await?;
                ScanRejection::Expired
            }
            _ => ScanRejection::Expired,
        })
    }
}
