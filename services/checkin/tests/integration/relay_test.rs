use chrono::Duration;
use uuid::Uuid;

use campus_checkin::domain::clock::Clock;
use campus_checkin::domain::types::{ATTENDANCE_SCANNED, OutboxEvent};
use campus_checkin::error::CheckinServiceError;
use campus_checkin::usecase::issue::IssueCodeUseCase;
use campus_checkin::usecase::relay::{RelayAttendanceUseCase, RelayReport};
use campus_checkin::usecase::scan::{ScanCodeUseCase, ScanInput};

use crate::helpers::{
    FixedClock, MockCodeRepo, MockOutboxRepo, MockRecorder, MockSchedules, fast_retry,
    instructor, late_grace, schedule, student, t0, ttl,
};

/// Scan one code while the recorder is down, leaving one pending outbox event.
async fn scan_with_recorder_down(
    clock: &FixedClock,
    outbox: &MockOutboxRepo,
    recorder: &MockRecorder,
) {
    let codes = MockCodeRepo::new(outbox);
    let schedule_id = schedule();
    let issued = IssueCodeUseCase {
        codes: codes.clone(),
        clock: clock.clone(),
        ttl: ttl(),
    }
    .execute(student(), schedule_id)
    .await
    .unwrap();

    recorder.set_failing(true);
    let result = ScanCodeUseCase {
        codes,
        outbox: outbox.clone(),
        recorder: recorder.clone(),
        schedules: MockSchedules::with(schedule_id, t0()),
        clock: clock.clone(),
        late_grace: late_grace(),
        retry: fast_retry(8),
    }
    .execute(ScanInput {
        code: issued.code.code,
        instructor_id: instructor(),
        scanned_at: None,
        location: None,
    })
    .await;
    assert!(matches!(
        result,
        Err(CheckinServiceError::DownstreamRecordingFailed { .. })
    ));
}

fn relay(
    clock: &FixedClock,
    outbox: &MockOutboxRepo,
    recorder: &MockRecorder,
    max_attempts: i32,
) -> RelayAttendanceUseCase<MockOutboxRepo, MockRecorder, FixedClock> {
    RelayAttendanceUseCase {
        outbox: outbox.clone(),
        recorder: recorder.clone(),
        clock: clock.clone(),
        retry: fast_retry(max_attempts),
        batch_size: 50,
    }
}

#[tokio::test]
async fn should_deliver_pending_entry_once_recorder_recovers() {
    let clock = FixedClock::at(t0());
    let (outbox, recorder) = (MockOutboxRepo::default(), MockRecorder::default());
    scan_with_recorder_down(&clock, &outbox, &recorder).await;
    let relay = relay(&clock, &outbox, &recorder, 8);

    // Not due yet
    clock.advance(Duration::seconds(2));
    assert_eq!(relay.execute().await.unwrap(), RelayReport::default());

    recorder.set_failing(false);
    clock.advance(Duration::seconds(3));
    let report = relay.execute().await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(recorder.entries().len(), 1);
    let stored = outbox.only();
    assert_eq!(stored.processed_at, Some(t0() + Duration::seconds(5)));

    // Nothing left to relay
    clock.advance(Duration::minutes(10));
    assert_eq!(relay.execute().await.unwrap(), RelayReport::default());
}

#[tokio::test]
async fn should_back_off_between_failed_deliveries() {
    let clock = FixedClock::at(t0());
    let (outbox, recorder) = (MockOutboxRepo::default(), MockRecorder::default());
    scan_with_recorder_down(&clock, &outbox, &recorder).await;
    let relay = relay(&clock, &outbox, &recorder, 8);

    clock.advance(Duration::seconds(5));
    let report = relay.execute().await.unwrap();

    assert_eq!(report.retried, 1);
    let stored = outbox.only();
    assert_eq!(stored.event.attempts, 2);
    // Second failure: base * 2
    assert_eq!(stored.event.next_attempt_at, clock.now() + Duration::seconds(10));
    assert!(stored.failed_at.is_none());
}

#[tokio::test]
async fn should_give_up_after_max_attempts() {
    let clock = FixedClock::at(t0());
    let (outbox, recorder) = (MockOutboxRepo::default(), MockRecorder::default());
    scan_with_recorder_down(&clock, &outbox, &recorder).await;
    let relay = relay(&clock, &outbox, &recorder, 3);

    clock.advance(Duration::seconds(5));
    assert_eq!(relay.execute().await.unwrap().retried, 1);

    clock.advance(Duration::seconds(10));
    let report = relay.execute().await.unwrap();
    assert_eq!(report.abandoned, 1);

    let stored = outbox.only();
    assert_eq!(stored.event.attempts, 3);
    assert!(stored.failed_at.is_some());
    assert!(stored.processed_at.is_none());

    // Failed events are never picked up again
    recorder.set_failing(false);
    clock.advance(Duration::hours(1));
    assert_eq!(relay.execute().await.unwrap(), RelayReport::default());
    assert!(recorder.entries().is_empty());
}

#[tokio::test]
async fn should_abandon_undecodable_payload() {
    let clock = FixedClock::at(t0());
    let (outbox, recorder) = (MockOutboxRepo::default(), MockRecorder::default());
    outbox.push(OutboxEvent {
        id: Uuid::new_v4(),
        kind: ATTENDANCE_SCANNED.to_owned(),
        payload: serde_json::json!({ "unexpected": true }),
        idempotency_key: "attendance_scanned:broken".to_owned(),
        attempts: 0,
        created_at: t0(),
        next_attempt_at: t0(),
    });

    let report = relay(&clock, &outbox, &recorder, 8).execute().await.unwrap();

    assert_eq!(report.abandoned, 1);
    assert_eq!(recorder.calls(), 0);
    assert!(outbox.only().failed_at.is_some());
}

#[tokio::test]
async fn should_ignore_other_event_kinds() {
    let clock = FixedClock::at(t0());
    let (outbox, recorder) = (MockOutboxRepo::default(), MockRecorder::default());
    outbox.push(OutboxEvent {
        id: Uuid::new_v4(),
        kind: "something_else".to_owned(),
        payload: serde_json::json!({}),
        idempotency_key: "something_else:1".to_owned(),
        attempts: 0,
        created_at: t0(),
        next_attempt_at: t0(),
    });

    let report = relay(&clock, &outbox, &recorder, 8).execute().await.unwrap();

    assert_eq!(report, RelayReport::default());
    assert!(outbox.only().failed_at.is_none());
}
