//! Periodic background tasks: the expiry sweeper and the outbox relay.
//!
//! Both stop when the shared `CancellationToken` is cancelled. A failed pass
//! is logged and retried on the next tick.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::state::AppState;
use crate::usecase::relay::RelayAttendanceUseCase;
use crate::usecase::sweep::SweepExpiredUseCase;

pub fn spawn_sweeper(
    state: AppState,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = every.as_secs(), "expiry sweeper started");
        let usecase = SweepExpiredUseCase {
            codes: state.code_repo(),
            clock: state.clock(),
        };
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = usecase.execute().await {
                        error!(error = %e.detail(), "expiry sweep failed");
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
        info!("expiry sweeper stopped");
    })
}

pub fn spawn_relay(
    state: AppState,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = every.as_secs(), "attendance outbox relay started");
        let usecase = RelayAttendanceUseCase {
            outbox: state.outbox_repo(),
            recorder: state.recorder(),
            clock: state.clock(),
            retry: state.policy.retry,
            batch_size: state.policy.relay_batch_size,
        };
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = usecase.execute().await {
                        error!(error = %e.detail(), "outbox relay pass failed");
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
        info!("attendance outbox relay stopped");
    })
}
