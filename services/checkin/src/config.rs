use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::domain::types::{DEFAULT_CODE_TTL_SECS, DEFAULT_LATE_GRACE_SECS, RetryPolicy};
use crate::infra::grpc::GrpcTimeouts;
use crate::state::CheckinPolicy;

/// Check-in service configuration loaded from environment variables.
#[derive(Debug)]
pub struct CheckinConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// gRPC endpoint for the attendance records service.
    pub attendance_grpc_url: String,
    /// gRPC endpoint for the scheduling service.
    pub schedule_grpc_url: String,
    /// TCP port for the HTTP server (default 3114). Env var: `CHECKIN_PORT`.
    pub checkin_port: u16,
    pub code_ttl_secs: i64,
    /// Seconds after schedule start during which a scan still counts as present.
    pub late_grace_secs: i64,
    pub sweep_interval_secs: u64,
    pub relay_interval_secs: u64,
    pub relay_batch_size: u64,
    /// Delivery attempts before an outbox event is marked failed.
    pub relay_max_attempts: i32,
    /// Deadline for each outbound gRPC call. Env var: `GRPC_TIMEOUT_SECS`.
    pub grpc_timeout_secs: u64,
    pub grpc_connect_timeout_secs: u64,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl CheckinConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL"),
            attendance_grpc_url: std::env::var("ATTENDANCE_GRPC_URL")
                .expect("ATTENDANCE_GRPC_URL"),
            schedule_grpc_url: std::env::var("SCHEDULE_GRPC_URL").expect("SCHEDULE_GRPC_URL"),
            checkin_port: env_or("CHECKIN_PORT", 3114),
            code_ttl_secs: env_or("CODE_TTL_SECS", DEFAULT_CODE_TTL_SECS),
            late_grace_secs: env_or("LATE_GRACE_SECS", DEFAULT_LATE_GRACE_SECS),
            sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", 30),
            relay_interval_secs: env_or("RELAY_INTERVAL_SECS", 5),
            relay_batch_size: env_or("RELAY_BATCH_SIZE", 50),
            relay_max_attempts: env_or("RELAY_MAX_ATTEMPTS", 8),
            grpc_timeout_secs: env_or("GRPC_TIMEOUT_SECS", 5),
            grpc_connect_timeout_secs: env_or("GRPC_CONNECT_TIMEOUT_SECS", 2),
        }
    }

    pub fn policy(&self) -> CheckinPolicy {
        CheckinPolicy {
            code_ttl: Duration::seconds(self.code_ttl_secs.max(1)),
            late_grace: Duration::seconds(self.late_grace_secs.max(0)),
            retry: RetryPolicy {
                max_attempts: self.relay_max_attempts.max(1),
                ..RetryPolicy::default()
            },
            relay_batch_size: self.relay_batch_size.max(1),
        }
    }

    pub fn sweep_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn relay_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.relay_interval_secs.max(1))
    }

    pub fn grpc_timeouts(&self) -> GrpcTimeouts {
        GrpcTimeouts {
            request: StdDuration::from_secs(self.grpc_timeout_secs.max(1)),
            connect: StdDuration::from_secs(self.grpc_connect_timeout_secs.max(1)),
        }
    }
}
