use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use rand::RngExt;
use tracing::{info, warn};

use campus_domain::id::{ScheduleId, StudentId};

use crate::domain::clock::Clock;
use crate::domain::repository::AttendanceCodeRepository;
use crate::domain::types::{AttendanceCode, CODE_LEN};
use crate::error::CheckinServiceError;
use crate::usecase::sweep::expire_lazily;

/// Charset for check-in codes. 62 symbols over 32 positions is ~190 bits from the OS-seeded CSPRNG.
const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: AttendanceCode,
    /// `true` when an unexpired active code was handed back instead of minting.
    pub reused: bool,
    pub seconds_remaining: i64,
}

impl IssuedCode {
    fn new(code: AttendanceCode, reused: bool, now: DateTime<Utc>) -> Self {
        let seconds_remaining = code.seconds_remaining(now);
        Self {
            code,
            reused,
            seconds_remaining,
        }
    }
}

#[derive(Debug)]
pub struct BulkIssueItem {
    pub student_id: StudentId,
    pub result: Result<IssuedCode, CheckinServiceError>,
}

pub struct IssueCodeUseCase<R, C>
where
    R: AttendanceCodeRepository,
    C: Clock,
{
    pub codes: R,
    pub clock: C,
    pub ttl: Duration,
}

impl<R, C> IssueCodeUseCase<R, C>
where
    R: AttendanceCodeRepository,
    C: Clock,
{
    pub async fn execute(
        &self,
        student_id: StudentId,
        schedule_id: ScheduleId,
    ) -> Result<IssuedCode, CheckinServiceError> {
        let now = self.clock.now();

        // 1. Hand back a still-valid code so reopening the screen does not churn codes
        if let Some(existing) = self.codes.find_active(student_id, schedule_id).await? {
            if !existing.is_expired_at(now) {
                return Ok(IssuedCode::new(existing, true, now));
            }
            // 2. Stale active code must leave `active` before a new one can exist
            expire_lazily(&self.codes, &existing, now).await?;
        }

        // 3. Mint
        let code = AttendanceCode::mint(student_id, schedule_id, generate_code(), now, self.ttl);
        match self.codes.create(&code).await {
            Ok(()) => {
                info!(
                    code_id = %code.id,
                    student_id = %student_id,
                    schedule_id = %schedule_id,
                    expires_at = %code.expires_at,
                    "attendance code issued"
                );
                Ok(IssuedCode::new(code, false, now))
            }
            // 4. A concurrent request minted first; its code is the one to show
            Err(CheckinServiceError::ConflictingActiveCode) => {
                let winner = self
                    .codes
                    .find_active(student_id, schedule_id)
                    .await?
                    .filter(|c| !c.is_expired_at(now))
                    .ok_or_else(|| {
                        anyhow::anyhow!("active code conflict for {student_id}/{schedule_id} but none found")
                    })?;
                Ok(IssuedCode::new(winner, true, now))
            }
            Err(e) => Err(e),
        }
    }

    /// Issue for many students at once. Each student is independent; one
    /// failure never blocks the rest.
    pub async fn execute_bulk(
        &self,
        schedule_id: ScheduleId,
        student_ids: Vec<StudentId>,
    ) -> Vec<BulkIssueItem> {
        join_all(student_ids.into_iter().map(|student_id| async move {
            let result = self.execute(student_id, schedule_id).await;
            if let Err(ref e) = result {
                warn!(student_id = %student_id, schedule_id = %schedule_id, error = %e, "bulk issue failed for student");
            }
            BulkIssueItem { student_id, result }
        }))
        .await
    }
}
