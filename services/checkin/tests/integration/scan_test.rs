use chrono::Duration;

use campus_checkin::domain::types::{AttendanceStatus, CodeStatus, ScanRejection};
use campus_checkin::error::CheckinServiceError;
use campus_checkin::usecase::issue::IssueCodeUseCase;
use campus_checkin::usecase::scan::{ScanCodeUseCase, ScanInput};
use campus_domain::id::{InstructorId, ScheduleId, StudentId};

use crate::helpers::{
    FixedClock, MockCodeRepo, MockOutboxRepo, MockRecorder, MockSchedules, fast_retry,
    instructor, late_grace, schedule, student, t0, ttl,
};

struct Fixture {
    clock: FixedClock,
    codes: MockCodeRepo,
    outbox: MockOutboxRepo,
    recorder: MockRecorder,
    student_id: StudentId,
    schedule_id: ScheduleId,
    scanner: ScanCodeUseCase<MockCodeRepo, MockOutboxRepo, MockRecorder, MockSchedules, FixedClock>,
}

impl Fixture {
    /// Session starting at t0, recorder healthy.
    fn new() -> Self {
        Self::with(MockRecorder::default(), Duration::zero())
    }

    fn with(recorder: MockRecorder, session_started_ago: Duration) -> Self {
        let clock = FixedClock::at(t0());
        let outbox = MockOutboxRepo::default();
        let codes = MockCodeRepo::new(&outbox);
        let schedule_id = schedule();
        let scanner = ScanCodeUseCase {
            codes: codes.clone(),
            outbox: outbox.clone(),
            recorder: recorder.clone(),
            schedules: MockSchedules::with(schedule_id, t0() - session_started_ago),
            clock: clock.clone(),
            late_grace: late_grace(),
            retry: fast_retry(8),
        };
        Self {
            clock,
            codes,
            outbox,
            recorder,
            student_id: student(),
            schedule_id,
            scanner,
        }
    }

    async fn issue(&self) -> String {
        let issuer = IssueCodeUseCase {
            codes: self.codes.clone(),
            clock: self.clock.clone(),
            ttl: ttl(),
        };
        issuer
            .execute(self.student_id, self.schedule_id)
            .await
            .unwrap()
            .code
            .code
    }
}

fn scan_of(code: &str, instructor_id: InstructorId) -> ScanInput {
    ScanInput {
        code: code.to_owned(),
        instructor_id,
        scanned_at: None,
        location: Some("B-204".to_owned()),
    }
}

#[tokio::test]
async fn should_record_attendance_then_reject_second_scan() {
    let fx = Fixture::new();
    let code = fx.issue().await;
    let teacher = instructor();

    fx.clock.advance(Duration::seconds(10));
    let first = fx.scanner.execute(scan_of(&code, teacher)).await.unwrap();

    assert!(first.success());
    assert_eq!(first.attendance_status, Some(AttendanceStatus::Present));
    assert_eq!(first.metadata.student_id, Some(fx.student_id));
    assert_eq!(first.metadata.schedule_id, Some(fx.schedule_id));
    assert_eq!(first.metadata.scanned_at, t0() + Duration::seconds(10));
    assert!(!first.metadata.code_expired);

    let stored = fx.codes.get(first.metadata.code_id.unwrap());
    assert_eq!(stored.status, CodeStatus::Used);
    assert_eq!(stored.used_by, Some(teacher));
    assert_eq!(stored.used_at, Some(t0() + Duration::seconds(10)));
    assert_eq!(stored.scan_location.as_deref(), Some("B-204"));

    let entries = fx.recorder.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source_code_id, stored.id);
    assert_eq!(entries[0].instructor_id, teacher);
    assert!(fx.outbox.only().processed_at.is_some());

    fx.clock.advance(Duration::seconds(2));
    let second = fx.scanner.execute(scan_of(&code, teacher)).await.unwrap();

    assert!(!second.success());
    assert_eq!(second.rejection, Some(ScanRejection::AlreadyUsed));
    assert_eq!(fx.recorder.calls(), 1);
    assert_eq!(fx.outbox.all().len(), 1);
}

#[tokio::test]
async fn should_reject_expired_code_even_if_never_swept() {
    let fx = Fixture::new();
    let code = fx.issue().await;

    fx.clock.advance(Duration::seconds(20));
    let outcome = fx.scanner.execute(scan_of(&code, instructor())).await.unwrap();

    assert_eq!(outcome.rejection, Some(ScanRejection::Expired));
    assert!(outcome.metadata.code_expired);
    assert_eq!(fx.codes.count_with(CodeStatus::Expired), 1);
    assert_eq!(fx.recorder.calls(), 0);
    assert!(fx.outbox.all().is_empty());
}

#[tokio::test]
async fn should_reject_code_that_expires_during_schedule_lookup() {
    let mut fx = Fixture::new();
    let code = fx.issue().await;
    fx.scanner.schedules.lag = Some((fx.clock.clone(), Duration::seconds(2)));

    fx.clock.advance(Duration::seconds(14));
    let outcome = fx.scanner.execute(scan_of(&code, instructor())).await.unwrap();

    assert_eq!(outcome.rejection, Some(ScanRejection::Expired));
    assert!(outcome.metadata.code_expired);
    assert_eq!(fx.codes.count_with(CodeStatus::Expired), 1);
    assert_eq!(fx.codes.count_with(CodeStatus::Used), 0);
    assert_eq!(fx.recorder.calls(), 0);
    assert!(fx.outbox.all().is_empty());
}

#[tokio::test]
async fn should_accept_scan_at_exact_expiry_instant() {
    let fx = Fixture::new();
    let code = fx.issue().await;

    fx.clock.advance(ttl());
    let outcome = fx.scanner.execute(scan_of(&code, instructor())).await.unwrap();

    assert!(outcome.success());
}

#[tokio::test]
async fn should_reject_unknown_code() {
    let fx = Fixture::new();
    fx.issue().await;

    let outcome = fx
        .scanner
        .execute(scan_of("definitely-not-a-code", instructor()))
        .await
        .unwrap();

    assert_eq!(outcome.rejection, Some(ScanRejection::UnknownCode));
    assert_eq!(outcome.metadata.code_id, None);
    assert_ne!(outcome.message(), ScanRejection::Expired.message());
}

#[tokio::test]
async fn should_trim_whitespace_around_scanned_code() {
    let fx = Fixture::new();
    let code = fx.issue().await;

    let outcome = fx
        .scanner
        .execute(scan_of(&format!("  {code}\n"), instructor()))
        .await
        .unwrap();

    assert!(outcome.success());
}

#[tokio::test]
async fn should_let_exactly_one_of_two_concurrent_scans_win() {
    let fx = Fixture::new();
    let code = fx.issue().await;
    fx.clock.advance(Duration::seconds(5));

    let (a, b) = tokio::join!(
        fx.scanner.execute(scan_of(&code, instructor())),
        fx.scanner.execute(scan_of(&code, instructor())),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a.success() ^ b.success());
    let loser = if a.success() { &b } else { &a };
    assert_eq!(loser.rejection, Some(ScanRejection::AlreadyUsed));
    assert_eq!(fx.recorder.entries().len(), 1);
    assert_eq!(fx.outbox.all().len(), 1);
}

#[tokio::test]
async fn should_report_expired_when_conditional_update_loses_to_sweeper() {
    let fx = Fixture::new();
    let code = fx.issue().await;
    fx.codes.interfere_with(CodeStatus::Expired);

    let outcome = fx.scanner.execute(scan_of(&code, instructor())).await.unwrap();

    assert_eq!(outcome.rejection, Some(ScanRejection::Expired));
    assert!(outcome.metadata.code_expired);
    assert_eq!(fx.recorder.calls(), 0);
}

#[tokio::test]
async fn should_mark_scan_late_after_grace_period() {
    let fx = Fixture::with(MockRecorder::default(), Duration::minutes(25));
    let code = fx.issue().await;

    let outcome = fx.scanner.execute(scan_of(&code, instructor())).await.unwrap();

    assert_eq!(outcome.attendance_status, Some(AttendanceStatus::Late));
    assert_eq!(fx.recorder.entries()[0].status, AttendanceStatus::Late);
}

#[tokio::test]
async fn should_clamp_device_time_to_server_time() {
    let fx = Fixture::new();
    let code = fx.issue().await;
    fx.clock.advance(Duration::seconds(4));

    let mut input = scan_of(&code, instructor());
    input.scanned_at = Some(t0() + Duration::hours(1));
    let outcome = fx.scanner.execute(input).await.unwrap();

    assert_eq!(outcome.metadata.scanned_at, t0() + Duration::seconds(4));
    assert_eq!(outcome.attendance_status, Some(AttendanceStatus::Present));
}

#[tokio::test]
async fn should_keep_code_active_when_schedule_is_unknown() {
    let fx = Fixture::new();
    let orphan = IssueCodeUseCase {
        codes: fx.codes.clone(),
        clock: fx.clock.clone(),
        ttl: ttl(),
    }
    .execute(student(), schedule())
    .await
    .unwrap();

    let result = fx
        .scanner
        .execute(scan_of(&orphan.code.code, instructor()))
        .await;

    assert!(
        matches!(result, Err(CheckinServiceError::ScheduleNotFound(id)) if id == orphan.code.schedule_id),
        "expected ScheduleNotFound, got {result:?}"
    );
    assert_eq!(fx.codes.get(orphan.code.id).status, CodeStatus::Active);
    assert!(fx.outbox.all().is_empty());
}

#[tokio::test]
async fn should_keep_code_used_and_queue_retry_when_recorder_fails() {
    let fx = Fixture::with(MockRecorder::failing(), Duration::zero());
    let code = fx.issue().await;

    let result = fx.scanner.execute(scan_of(&code, instructor())).await;

    let Err(CheckinServiceError::DownstreamRecordingFailed { code_id }) = result else {
        panic!("expected DownstreamRecordingFailed, got {result:?}");
    };
    assert_eq!(fx.codes.get(code_id).status, CodeStatus::Used);

    let pending = fx.outbox.only();
    assert_eq!(pending.event.attempts, 1);
    assert_eq!(pending.event.next_attempt_at, t0() + Duration::seconds(5));
    assert!(pending.processed_at.is_none());
    assert!(pending.failed_at.is_none());
    assert!(
        pending
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("attendance service unavailable"))
    );

    // Rescanning cannot help; the relay owns delivery now.
    let again = fx.scanner.execute(scan_of(&code, instructor())).await.unwrap();
    assert_eq!(again.rejection, Some(ScanRejection::AlreadyUsed));
}
