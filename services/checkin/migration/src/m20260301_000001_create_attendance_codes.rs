use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::ConnectionTrait;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AttendanceCodes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AttendanceCodes::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AttendanceCodes::StudentId).uuid().not_null())
                    .col(ColumnDef::new(AttendanceCodes::ScheduleId).uuid().not_null())
                    .col(
                        ColumnDef::new(AttendanceCodes::Code)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(AttendanceCodes::Status)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AttendanceCodes::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AttendanceCodes::UsedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(AttendanceCodes::UsedBy).uuid())
                    .col(ColumnDef::new(AttendanceCodes::ScanLocation).string())
                    .col(
                        ColumnDef::new(AttendanceCodes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AttendanceCodes::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Sweeper scans `status = 'active' AND expires_at < now`.
        manager
            .create_index(
                Index::create()
                    .table(AttendanceCodes::Table)
                    .col(AttendanceCodes::Status)
                    .col(AttendanceCodes::ExpiresAt)
                    .name("idx_attendance_codes_status_expires_at")
                    .to_owned(),
            )
            .await?;

        // One active code per (student, schedule). The issuer relies on this to
        // detect a concurrently minted code.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_attendance_codes_active_pair \
                 ON attendance_codes (student_id, schedule_id) WHERE status = 'active'",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AttendanceCodes::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum AttendanceCodes {
    Table,
    Id,
    StudentId,
    ScheduleId,
    Code,
    Status,
    ExpiresAt,
    UsedAt,
    UsedBy,
    ScanLocation,
    CreatedAt,
    UpdatedAt,
}
