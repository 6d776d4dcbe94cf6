use std::time::Duration;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use tonic::Code;
use tonic::transport::Channel;

use campus_domain::id::ScheduleId;
use campus_proto::attendance::{
    CreateAttendanceRecordRequest, attendance_record_service_client::AttendanceRecordServiceClient,
};
use campus_proto::schedule::{GetScheduleRequest, schedule_service_client::ScheduleServiceClient};

use crate::domain::repository::{AttendanceRecorder, ScheduleDirectory};
use crate::domain::types::{AttendanceEntry, RecordedAttendance, ScheduleWindow};
use crate::error::CheckinServiceError;

/// Deadlines for outbound RPCs. A call that runs out of time fails like any
/// other transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrpcTimeouts {
    /// Whole-call deadline, including waiting for the response.
    pub request: Duration,
    /// Limit on establishing the TCP connection.
    pub connect: Duration,
}

impl Default for GrpcTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(5),
            connect: Duration::from_secs(2),
        }
    }
}

/// Channel that connects on the first RPC, so the service starts even when a
/// peer is still coming up.
fn lazy_channel(url: &str, timeouts: GrpcTimeouts) -> Result<Channel, CheckinServiceError> {
    let endpoint = Channel::from_shared(url.to_owned())
        .with_context(|| format!("invalid gRPC endpoint {url}"))?
        .timeout(timeouts.request)
        .connect_timeout(timeouts.connect);
    Ok(endpoint.connect_lazy())
}

fn from_millis(ms: i64, field: &str) -> Result<DateTime<Utc>, CheckinServiceError> {
    Ok(DateTime::from_timestamp_millis(ms)
        .with_context(|| format!("{field} out of range: {ms}"))?)
}

/// gRPC client implementing `AttendanceRecorder` via `attendance.AttendanceRecordService`.
#[derive(Clone)]
pub struct GrpcAttendanceRecorder {
    client: AttendanceRecordServiceClient<Channel>,
}

impl GrpcAttendanceRecorder {
    pub fn lazy(url: &str, timeouts: GrpcTimeouts) -> Result<Self, CheckinServiceError> {
        Ok(Self {
            client: AttendanceRecordServiceClient::new(lazy_channel(url, timeouts)?),
        })
    }
}

impl AttendanceRecorder for GrpcAttendanceRecorder {
    async fn create(
        &self,
        entry: &AttendanceEntry,
    ) -> Result<RecordedAttendance, CheckinServiceError> {
        let resp = self
            .client
            .clone()
            .create_attendance_record(CreateAttendanceRecordRequest {
                student_id: entry.student_id.to_string(),
                schedule_id: entry.schedule_id.to_string(),
                instructor_id: entry.instructor_id.to_string(),
                scanned_at_ms: entry.scanned_at.timestamp_millis(),
                status: entry.status.as_str().to_owned(),
                source_code_id: entry.source_code_id.to_string(),
                location: entry.location.clone(),
            })
            .await
            .context("gRPC CreateAttendanceRecord")?;
        Ok(RecordedAttendance {
            record_id: resp.into_inner().id,
        })
    }
}

/// gRPC client implementing `ScheduleDirectory` via `schedule.ScheduleService`.
#[derive(Clone)]
pub struct GrpcScheduleDirectory {
    client: ScheduleServiceClient<Channel>,
}

impl GrpcScheduleDirectory {
    pub fn lazy(url: &str, timeouts: GrpcTimeouts) -> Result<Self, CheckinServiceError> {
        Ok(Self {
            client: ScheduleServiceClient::new(lazy_channel(url, timeouts)?),
        })
    }
}

impl ScheduleDirectory for GrpcScheduleDirectory {
    async fn find_window(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<Option<ScheduleWindow>, CheckinServiceError> {
        let result = self
            .client
            .clone()
            .get_schedule(GetScheduleRequest {
                schedule_id: schedule_id.to_string(),
            })
            .await;
        let schedule = match result {
            Ok(resp) => resp.into_inner(),
            Err(status) if status.code() == Code::NotFound => return Ok(None),
            Err(status) => {
                return Err(anyhow::Error::new(status).context("gRPC GetSchedule").into());
            }
        };
        Ok(Some(ScheduleWindow {
            starts_at: from_millis(schedule.starts_at_ms, "starts_at_ms")?,
            ends_at: from_millis(schedule.ends_at_ms, "ends_at_ms")?,
        }))
    }
}
