use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::domain::clock::Clock;
use crate::domain::repository::AttendanceCodeRepository;
use crate::domain::types::{AttendanceCode, CodeEvent};
use crate::error::CheckinServiceError;

/// Move an `active` code past its window to `expired`. Losing the conditional
/// update is fine: the sweeper or a scan already moved it to a terminal state.
pub(crate) async fn expire_lazily<R: AttendanceCodeRepository>(
    codes: &R,
    code: &AttendanceCode,
    now: DateTime<Utc>,
) -> Result<bool, CheckinServiceError> {
    let next = code
        .status
        .apply(CodeEvent::Expire)
        .map_err(anyhow::Error::from)?;
    let changed = codes
        .compare_and_set_status(code.id, code.status, next, now)
        .await?;
    debug!(code_id = %code.id, changed, "lazy expiry");
    Ok(changed)
}

pub struct SweepExpiredUseCase<R, C>
where
    R: AttendanceCodeRepository,
    C: Clock,
{
    pub codes: R,
    pub clock: C,
}

impl<R, C> SweepExpiredUseCase<R, C>
where
    R: AttendanceCodeRepository,
    C: Clock,
{
    /// Expire every `active` code whose window has passed. Idempotent.
    pub async fn execute(&self) -> Result<u64, CheckinServiceError> {
        let now = self.clock.now();
        let expired = self.codes.expire_before(now).await?;
        if expired > 0 {
            info!(expired, "expired attendance codes swept");
        }
        Ok(expired)
    }
}
