/*
 * Responsibility
 *  - Gated<R>: runs the admission pipeline for route R, hands the handler an Admitted
 *  - FromRequestParts 実装 (client key, bearer credential, target resource from the path)
 *  - Gate rejections become AppError (429 / 401 / 403)
 *
 * 置くもの
 *  - GatedRoute trait (what a route marker must declare)
 *  - transport → GateRequest の変換
 *
 * 置かないもの
 *  - 具体的なルート (types.rs)
 *  - policy / ownership ロジック (policies.rs)
 */
use std::collections::HashMap;
use std::marker::PhantomData;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Path},
    http::{HeaderMap, header, request::Parts},
};

use crate::error::AppError;
use crate::services::auth::Principal;
use crate::services::authz::ResourceRef;
use crate::services::gate::{Admitted, Endpoint, GateRequest};
use crate::state::AppState;

/// Static description of a gated route.
pub trait GatedRoute: Send + Sync + 'static {
    const ENDPOINT: Endpoint;
    /// Resource type the path id refers to. Differs from `ENDPOINT.kind` for
    /// nested collections (tasks of a project target the project).
    const TARGET: &'static str;
    /// Path parameter holding the target id; `None` targets the collection.
    const ID_PARAM: Option<&'static str> = None;

    fn resource(params: &HashMap<String, String>) -> ResourceRef {
        match Self::ID_PARAM.and_then(|p| params.get(p)) {
            Some(id) => ResourceRef::new(Self::TARGET, id.as_str()),
            None => ResourceRef::collection(Self::TARGET),
        }
    }
}

pub struct Gated<R> {
    admitted: Admitted,
    _route: PhantomData<R>,
}

impl<R> Gated<R> {
    pub fn admitted(&self) -> &Admitted {
        &self.admitted
    }

    /// The verified principal. Public routes have none.
    pub fn principal(&self) -> Result<&Principal, AppError> {
        self.admitted.principal().ok_or(AppError::Internal)
    }
}

// Missing header -> no credential. Anything that is not a bearer token is
// passed through and fails verification as malformed.
fn bearer_credential(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(header::AUTHORIZATION)?;
    let Ok(value) = raw.to_str() else {
        return Some("");
    };
    let value = value.trim();

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => Some(token.trim()),
        _ => Some(value),
    }
}

impl<R> FromRequestParts<AppState> for Gated<R>
where
    R: GatedRoute,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Routes without parameters have nothing to extract.
        let params = Path::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map(|Path(p)| p)
            .unwrap_or_default();

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let client_key = state.client_keys.client_key(&parts.headers, peer);

        let admitted = state
            .gate
            .admit(GateRequest {
                client_key: &client_key,
                credential: bearer_credential(&parts.headers),
                endpoint: R::ENDPOINT,
                resource: R::resource(&params),
            })
            .await?;

        Ok(Self {
            admitted,
            _route: PhantomData,
        })
    }
}

impl<R> std::fmt::Debug for Gated<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gated")
            .field("admitted", &self.admitted)
            .finish()
    }
}
