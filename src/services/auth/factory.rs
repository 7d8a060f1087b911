/// Factory: build `CredentialVerifier` from application `Config`.
use std::sync::Arc;

use crate::clock::SharedClock;
use crate::config::Config;
use crate::services::auth::{CredentialVerifier, KeyError, VerifierConfig};

pub fn build_verifier(
    config: &Config,
    clock: SharedClock,
) -> Result<Arc<CredentialVerifier>, KeyError> {
    let verifier = CredentialVerifier::new(
        VerifierConfig {
            key: config.access_key.clone(),
            issuer: config.auth_issuer.clone(),
            audience: config.auth_audience.clone(),
            leeway_seconds: config.access_token_leeway_seconds,
        },
        clock,
    )?;

    tracing::info!(verifier = ?verifier, "access token verifier ready");

    Ok(Arc::new(verifier))
}
