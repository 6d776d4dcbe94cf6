use chrono::{DateTime, Utc};

use campus_domain::id::{ScheduleId, StudentId};

use crate::domain::clock::Clock;
use crate::domain::repository::AttendanceCodeRepository;
use crate::error::CheckinServiceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeStatusView {
    pub has_active_code: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub seconds_remaining: Option<i64>,
    pub can_issue_new: bool,
}

/// Read-only view of a student's current code for one schedule. An `active`
/// row past its window counts as no code; it is left for the sweeper.
pub struct GetCodeStatusUseCase<R, C>
where
    R: AttendanceCodeRepository,
    C: Clock,
{
    pub codes: R,
    pub clock: C,
}

impl<R, C> GetCodeStatusUseCase<R, C>
where
    R: AttendanceCodeRepository,
    C: Clock,
{
    pub async fn execute(
        &self,
        student_id: StudentId,
        schedule_id: ScheduleId,
    ) -> Result<CodeStatusView, CheckinServiceError> {
        let now = self.clock.now();
        let usable = self
            .codes
            .find_active(student_id, schedule_id)
            .await?
            .filter(|c| c.is_usable_at(now));

        Ok(match usable {
            Some(code) => CodeStatusView {
                has_active_code: true,
                expires_at: Some(code.expires_at),
                seconds_remaining: Some(code.seconds_remaining(now)),
                can_issue_new: false,
            },
            None => CodeStatusView {
                has_active_code: false,
                expires_at: None,
                seconds_remaining: None,
                can_issue_new: true,
            },
        })
    }
}
