use axum::Json;

use crate::api::v1::dto::session::SessionResponse;
use crate::api::v1::extractors::{Gated, gated::ReadSession};
use crate::error::AppError;

/// GET /auth/session: echo the verified principal.
pub async fn read_session(gated: Gated<ReadSession>) -> Result<Json<SessionResponse>, AppError> {
    let principal = gated.principal()?;
    Ok(Json(SessionResponse::from(principal)))
}
