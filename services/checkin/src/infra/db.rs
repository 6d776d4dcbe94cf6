use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, SqlErr, TransactionTrait,
    sea_query::Expr,
};
use uuid::Uuid;

use campus_checkin_schema::{attendance_codes, outbox_events};
use campus_domain::id::{AttendanceCodeId, InstructorId, ScheduleId, StudentId};

use crate::domain::repository::{AttendanceCodeRepository, OutboxRepository};
use crate::domain::types::{AttendanceCode, CodeStatus, OutboxEvent, ScanAudit};
use crate::error::CheckinServiceError;

/// Stored failure reasons are truncated to this many characters.
const MAX_ERROR_LEN: usize = 1024;

// ── AttendanceCode repository ─────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbAttendanceCodeRepository {
    pub db: DatabaseConnection,
}

impl AttendanceCodeRepository for DbAttendanceCodeRepository {
    async fn find_active(
        &self,
        student_id: StudentId,
        schedule_id: ScheduleId,
    ) -> Result<Option<AttendanceCode>, CheckinServiceError> {
        let model = attendance_codes::Entity::find()
            .filter(attendance_codes::Column::StudentId.eq(student_id.0))
            .filter(attendance_codes::Column::ScheduleId.eq(schedule_id.0))
            .filter(attendance_codes::Column::Status.eq(attendance_codes::CodeStatus::Active))
            .one(&self.db)
            .await
            .context("find active attendance code")?;
        Ok(model.map(code_from_model))
    }

    async fn find_by_code(
        &self,
        code: &str,
    ) -> Result<Option<AttendanceCode>, CheckinServiceError> {
        let model = attendance_codes::Entity::find()
            .filter(attendance_codes::Column::Code.eq(code))
            .one(&self.db)
            .await
            .context("find attendance code by code")?;
        Ok(model.map(code_from_model))
    }

    async fn create(&self, code: &AttendanceCode) -> Result<(), CheckinServiceError> {
        let result = attendance_codes::ActiveModel {
            id: Set(code.id.0),
            student_id: Set(code.student_id.0),
            schedule_id: Set(code.schedule_id.0),
            code: Set(code.code.clone()),
            status: Set(code.status.into()),
            expires_at: Set(code.expires_at),
            used_at: Set(None),
            used_by: Set(None),
            scan_location: Set(None),
            created_at: Set(code.created_at),
            updated_at: Set(code.updated_at),
        }
        .insert(&self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Err(CheckinServiceError::ConflictingActiveCode)
            }
            Err(e) => Err(anyhow::Error::new(e).context("create attendance code").into()),
        }
    }

    async fn compare_and_set_status(
        &self,
        id: AttendanceCodeId,
        expected: CodeStatus,
        new: CodeStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, CheckinServiceError> {
        let result = attendance_codes::Entity::update_many()
            .col_expr(
                attendance_codes::Column::Status,
                Expr::value(attendance_codes::CodeStatus::from(new)),
            )
            .col_expr(attendance_codes::Column::UpdatedAt, Expr::value(at))
            .filter(attendance_codes::Column::Id.eq(id.0))
            .filter(attendance_codes::Column::Status.eq(attendance_codes::CodeStatus::from(expected)))
            .exec(&self.db)
            .await
            .context("compare-and-set attendance code status")?;
        Ok(result.rows_affected == 1)
    }

    async fn mark_used_with_outbox(
        &self,
        id: AttendanceCodeId,
        audit: &ScanAudit,
        event: &OutboxEvent,
    ) -> Result<bool, CheckinServiceError> {
        let won = self
            .db
            .transaction::<_, bool, sea_orm::DbErr>(|txn| {
                let audit = audit.clone();
                let event = event.clone();
                Box::pin(async move {
                    let result = attendance_codes::Entity::update_many()
                        .col_expr(
                            attendance_codes::Column::Status,
                            Expr::value(attendance_codes::CodeStatus::Used),
                        )
                        .col_expr(attendance_codes::Column::UsedAt, Expr::value(audit.at))
                        .col_expr(
                            attendance_codes::Column::UsedBy,
                            Expr::value(audit.instructor_id.0),
                        )
                        .col_expr(
                            attendance_codes::Column::ScanLocation,
                            Expr::value(audit.location),
                        )
                        .col_expr(attendance_codes::Column::UpdatedAt, Expr::value(audit.at))
                        .filter(attendance_codes::Column::Id.eq(id.0))
                        .filter(
                            attendance_codes::Column::Status
                                .eq(attendance_codes::CodeStatus::Active),
                        )
                        .filter(attendance_codes::Column::ExpiresAt.gte(audit.at))
                        .exec(txn)
                        .await?;
                    if result.rows_affected != 1 {
                        return Ok(false);
                    }
                    insert_outbox_event(txn, &event).await?;
                    Ok(true)
                })
            })
            .await
            .context("mark attendance code used with outbox")?;
        Ok(won)
    }

    async fn expire_before(&self, before: DateTime<Utc>) -> Result<u64, CheckinServiceError> {
        let result = attendance_codes::Entity::update_many()
            .col_expr(
                attendance_codes::Column::Status,
                Expr::value(attendance_codes::CodeStatus::Expired),
            )
            .col_expr(attendance_codes::Column::UpdatedAt, Expr::value(before))
            .filter(attendance_codes::Column::Status.eq(attendance_codes::CodeStatus::Active))
            .filter(attendance_codes::Column::ExpiresAt.lt(before))
            .exec(&self.db)
            .await
            .context("expire attendance codes")?;
        Ok(result.rows_affected)
    }
}

impl From<CodeStatus> for attendance_codes::CodeStatus {
    fn from(status: CodeStatus) -> Self {
        match status {
            CodeStatus::Active => Self::Active,
            CodeStatus::Used => Self::Used,
            CodeStatus::Expired => Self::Expired,
        }
    }
}

impl From<attendance_codes::CodeStatus> for CodeStatus {
    fn from(status: attendance_codes::CodeStatus) -> Self {
        match status {
            attendance_codes::CodeStatus::Active => Self::Active,
            attendance_codes::CodeStatus::Used => Self::Used,
            attendance_codes::CodeStatus::Expired => Self::Expired,
        }
    }
}

fn code_from_model(model: attendance_codes::Model) -> AttendanceCode {
    AttendanceCode {
        id: AttendanceCodeId(model.id),
        student_id: StudentId(model.student_id),
        schedule_id: ScheduleId(model.schedule_id),
        code: model.code,
        status: model.status.into(),
        expires_at: model.expires_at,
        used_at: model.used_at,
        used_by: model.used_by.map(InstructorId),
        scan_location: model.scan_location,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

// ── Outbox repository ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbOutboxRepository {
    pub db: DatabaseConnection,
}

impl OutboxRepository for DbOutboxRepository {
    async fn fetch_due(
        &self,
        kind: &str,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<OutboxEvent>, CheckinServiceError> {
        let models = outbox_events::Entity::find()
            .filter(outbox_events::Column::Kind.eq(kind))
            .filter(outbox_events::Column::ProcessedAt.is_null())
            .filter(outbox_events::Column::FailedAt.is_null())
            .filter(outbox_events::Column::NextAttemptAt.lte(now))
            .order_by_asc(outbox_events::Column::NextAttemptAt)
            .limit(limit)
            .all(&self.db)
            .await
            .context("fetch due outbox events")?;
        Ok(models.into_iter().map(outbox_from_model).collect())
    }

    async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), CheckinServiceError> {
        outbox_events::Entity::update_many()
            .col_expr(outbox_events::Column::ProcessedAt, Expr::value(at))
            .filter(outbox_events::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .context("mark outbox event processed")?;
        Ok(())
    }

    async fn record_failure(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
        failed_at: Option<DateTime<Utc>>,
    ) -> Result<(), CheckinServiceError> {
        let error: String = error.chars().take(MAX_ERROR_LEN).collect();
        outbox_events::Entity::update_many()
            .col_expr(
                outbox_events::Column::Attempts,
                Expr::col(outbox_events::Column::Attempts).add(1),
            )
            .col_expr(outbox_events::Column::LastError, Expr::value(Some(error)))
            .col_expr(outbox_events::Column::NextAttemptAt, Expr::value(next_attempt_at))
            .col_expr(outbox_events::Column::FailedAt, Expr::value(failed_at))
            .filter(outbox_events::Column::Id.eq(id))
            .filter(outbox_events::Column::ProcessedAt.is_null())
            .exec(&self.db)
            .await
            .context("record outbox delivery failure")?;
        Ok(())
    }
}

async fn insert_outbox_event(
    txn: &DatabaseTransaction,
    event: &OutboxEvent,
) -> Result<(), sea_orm::DbErr> {
    outbox_events::ActiveModel {
        id: Set(event.id),
        kind: Set(event.kind.clone()),
        payload: Set(event.payload.clone()),
        idempotency_key: Set(event.idempotency_key.clone()),
        attempts: Set(event.attempts),
        last_error: Set(None),
        created_at: Set(event.created_at),
        next_attempt_at: Set(event.next_attempt_at),
        processed_at: Set(None),
        failed_at: Set(None),
    }
    .insert(txn)
    .await?;
    Ok(())
}

fn outbox_from_model(model: outbox_events::Model) -> OutboxEvent {
    OutboxEvent {
        id: model.id,
        kind: model.kind,
        payload: model.payload,
        idempotency_key: model.idempotency_key,
        attempts: model.attempts,
        created_at: model.created_at,
        next_attempt_at: model.next_attempt_at,
    }
}
