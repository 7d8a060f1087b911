/*
 * Responsibility
 * - handlers 共通の小物 (target id, write 後の cache invalidation)
 */
pub mod health;
pub mod projects;
pub mod session;
pub mod tasks;

use crate::api::v1::extractors::Gated;
use crate::error::AppError;
use crate::services::cache::InvalidationSet;
use crate::services::gate::Stage;
use crate::state::AppState;

/// Numeric id of the resource the gate admitted the request for.
fn target_id<R>(gated: &Gated<R>) -> Result<u64, AppError> {
    gated
        .admitted()
        .resource()
        .id
        .as_deref()
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| AppError::bad_request("INVALID_ID", "invalid id"))
}

/// Drop every cached view the write touched. The write already happened, so a
/// failure here is logged and the entries age out through their TTL.
async fn invalidate_after_write<R>(state: &AppState, gated: &Gated<R>, keys: InvalidationSet) {
    if let Err(err) = state.gate.complete(gated.admitted(), &keys).await {
        tracing::error!(
            stage = %Stage::CacheInvalidate,
            error = %err,
            resource = %gated.admitted().resource(),
            keys = ?keys,
            "cache invalidation failed after write"
        );
    }
}
