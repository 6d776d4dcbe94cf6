use axum::{Json, extract::State};
use serde::Serialize;

use campus_core::identity::IdentityHeaders;
use campus_domain::user::UserRole;

use crate::error::CheckinServiceError;
use crate::state::AppState;
use crate::usecase::sweep::SweepExpiredUseCase;

// ── POST /attendance/codes/sweep ─────────────────────────────────────────────

#[derive(Serialize)]
pub struct SweepResponse {
    pub expired_count: u64,
}

/// On-demand run of the same sweep the background worker performs.
pub async fn sweep_expired_codes(
    identity: IdentityHeaders,
    State(state): State<AppState>,
) -> Result<Json<SweepResponse>, CheckinServiceError> {
    if !identity.has_role(UserRole::Admin) {
        return Err(CheckinServiceError::Forbidden);
    }
    let usecase = SweepExpiredUseCase {
        codes: state.code_repo(),
        clock: state.clock(),
    };
    let expired_count = usecase.execute().await?;
    Ok(Json(SweepResponse { expired_count }))
}
