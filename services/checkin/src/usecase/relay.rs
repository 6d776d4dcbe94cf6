use tracing::{debug, error, info, warn};

use crate::domain::clock::Clock;
use crate::domain::repository::{AttendanceRecorder, OutboxRepository};
use crate::domain::types::{ATTENDANCE_SCANNED, AttendanceEntry, OutboxEvent, RetryPolicy};
use crate::error::CheckinServiceError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    pub delivered: usize,
    pub retried: usize,
    pub abandoned: usize,
}

/// Delivers pending attendance entries from the outbox to the recorder.
///
/// Delivery is at-least-once; the recorder deduplicates on `source_code_id`.
pub struct RelayAttendanceUseCase<O, A, C>
where
    O: OutboxRepository,
    A: AttendanceRecorder,
    C: Clock,
{
    pub outbox: O,
    pub recorder: A,
    pub clock: C,
    pub retry: RetryPolicy,
    pub batch_size: u64,
}

enum Delivery {
    Delivered,
    Retry,
    Abandoned,
}

impl<O, A, C> RelayAttendanceUseCase<O, A, C>
where
    O: OutboxRepository,
    A: AttendanceRecorder,
    C: Clock,
{
    pub async fn execute(&self) -> Result<RelayReport, CheckinServiceError> {
        let now = self.clock.now();
        let events = self
            .outbox
            .fetch_due(ATTENDANCE_SCANNED, now, self.batch_size)
            .await?;
        if events.is_empty() {
            return Ok(RelayReport::default());
        }
        debug!(count = events.len(), "relaying pending attendance entries");

        let mut report = RelayReport::default();
        for event in &events {
            match self.deliver(event).await? {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Retry => report.retried += 1,
                Delivery::Abandoned => report.abandoned += 1,
            }
        }

        info!(
            delivered = report.delivered,
            retried = report.retried,
            abandoned = report.abandoned,
            "outbox relay pass finished"
        );
        Ok(report)
    }

    async fn deliver(&self, event: &OutboxEvent) -> Result<Delivery, CheckinServiceError> {
        let entry: AttendanceEntry = match serde_json::from_value(event.payload.clone()) {
            Ok(entry) => entry,
            Err(e) => {
                // Undecodable payload: retrying can never succeed.
                let now = self.clock.now();
                error!(event_id = %event.id, error = %e, "malformed attendance outbox payload");
                self.outbox
                    .record_failure(event.id, &format!("malformed payload: {e}"), now, Some(now))
                    .await?;
                return Ok(Delivery::Abandoned);
            }
        };

        match self.recorder.create(&entry).await {
            Ok(recorded) => {
                self.outbox.mark_processed(event.id, self.clock.now()).await?;
                info!(
                    event_id = %event.id,
                    code_id = %entry.source_code_id,
                    record_id = %recorded.record_id,
                    attempts = event.attempts + 1,
                    "attendance entry delivered"
                );
                Ok(Delivery::Delivered)
            }
            Err(e) => {
                let now = self.clock.now();
                let attempts = event.attempts + 1;
                let reason = e.detail();
                if self.retry.exhausted(attempts) {
                    // Used code without an attendance entry: needs a human.
                    error!(
                        event_id = %event.id,
                        code_id = %entry.source_code_id,
                        student_id = %entry.student_id,
                        schedule_id = %entry.schedule_id,
                        attempts,
                        error = %reason,
                        "giving up on attendance entry delivery"
                    );
                    self.outbox
                        .record_failure(event.id, &reason, now, Some(now))
                        .await?;
                    Ok(Delivery::Abandoned)
                } else {
                    let next_attempt_at = now + self.retry.delay_after(attempts);
                    warn!(
                        event_id = %event.id,
                        code_id = %entry.source_code_id,
                        attempts,
                        next_attempt_at = %next_attempt_at,
                        error = %reason,
                        "attendance entry delivery failed"
                    );
                    self.outbox
                        .record_failure(event.id, &reason, next_attempt_at, None)
                        .await?;
                    Ok(Delivery::Retry)
                }
            }
        }
    }
}
