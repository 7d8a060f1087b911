use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, errors::ErrorKind};
use serde::Deserialize;
use thiserror::Error;

use crate::clock::SharedClock;
use crate::services::auth::principal::Principal;

/// Why a presented credential was not turned into a `Principal`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("malformed credential")]
    Malformed,
    #[error("invalid credential signature")]
    InvalidSignature,
    #[error("credential expired")]
    Expired,
    #[error("credential not yet valid")]
    NotYetValid,
    #[error("invalid '{0}' claim")]
    InvalidClaim(&'static str),
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid ed25519 public key pem: {0}")]
    InvalidPem(jsonwebtoken::errors::Error),
    #[error("empty hmac secret")]
    EmptySecret,
}

/// Verification key material.
///
/// Only the verifying half is ever held here; signing is done by the issuer.
#[derive(Clone)]
pub enum KeyMaterial {
    /// EdDSA (Ed25519) public key, PEM encoded.
    Ed25519PublicPem(String),
    /// HS256 shared secret.
    HmacSecret(Vec<u8>),
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        match self {
            Self::Ed25519PublicPem(_) => f.write_str("Ed25519PublicPem(..)"),
            Self::HmacSecret(_) => f.write_str("HmacSecret(..)"),
        }
    }
}

impl KeyMaterial {
    fn algorithm(&self) -> Algorithm {
        match self {
            Self::Ed25519PublicPem(_) => Algorithm::EdDSA,
            Self::HmacSecret(_) => Algorithm::HS256,
        }
    }

    fn decoding_key(&self) -> Result<DecodingKey, KeyError> {
        match self {
            Self::Ed25519PublicPem(pem) => {
                DecodingKey::from_ed_pem(pem.as_bytes()).map_err(KeyError::InvalidPem)
            }
            Self::HmacSecret(secret) if secret.is_empty() => Err(KeyError::EmptySecret),
            Self::HmacSecret(secret) => Ok(DecodingKey::from_secret(secret)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub key: KeyMaterial,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    // Clock-skew tolerance applied to `exp` and `nbf`, seconds.
    pub leeway_seconds: u64,
}

/// `roles` may be issued as a single string or an array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RolesClaim {
    One(String),
    Many(Vec<String>),
}

impl Default for RolesClaim {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl RolesClaim {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(role) => vec![role],
            Self::Many(roles) => roles,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct AccessTokenClaims {
    sub: String,
    exp: u64,
    #[serde(default)]
    iat: Option<u64>,
    #[serde(default)]
    nbf: Option<u64>,
    #[serde(default)]
    roles: RolesClaim,
}

/// Stateless bearer-token verifier.
///
/// `verify` is a pure function of (token, key material, clock reading): the same
/// inputs always give the same `Principal` or the same error.
pub struct CredentialVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
    leeway_seconds: u64,
    clock: SharedClock,
}

impl std::fmt::Debug for CredentialVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("CredentialVerifier")
            .field("algorithms", &self.validation.algorithms)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}

impl CredentialVerifier {
    pub fn new(config: VerifierConfig, clock: SharedClock) -> Result<Self, KeyError> {
        let decoding_key = config.key.decoding_key()?;

        let mut validation = Validation::new(config.key.algorithm());
        // exp/nbf are checked against our own clock below, not the system time.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        if let Some(issuer) = config.issuer.as_deref() {
            validation.set_issuer(&[issuer]);
        }
        match config.audience.as_deref() {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            decoding_key,
            validation,
            leeway_seconds: config.leeway_seconds,
            clock,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Principal, CredentialError> {
        // 1) structure: three segments with a decodable header
        jsonwebtoken::decode_header(token).map_err(|_| CredentialError::Malformed)?;

        // 2) signature (+ iss/aud when configured)
        let data =
            jsonwebtoken::decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)
                .map_err(|e| map_jwt_error(e.kind()))?;
        let claims = data.claims;

        // 3) lifetime
        let now = self.clock.unix_seconds();
        if claims.exp.saturating_add(self.leeway_seconds) <= now {
            return Err(CredentialError::Expired);
        }
        if let Some(nbf) = claims.nbf
            && nbf > now.saturating_add(self.leeway_seconds)
        {
            return Err(CredentialError::NotYetValid);
        }

        // 4) identity
        if claims.sub.trim().is_empty() {
            return Err(CredentialError::InvalidClaim("sub"));
        }

        let expires_at = to_datetime(claims.exp).ok_or(CredentialError::InvalidClaim("exp"))?;
        let issued_at = claims.iat.and_then(to_datetime);
        let roles: BTreeSet<String> = claims.roles.into_vec().into_iter().collect();

        Ok(Principal::new(claims.sub, roles, issued_at, expires_at))
    }
}

fn map_jwt_error(kind: &ErrorKind) -> CredentialError {
    match kind {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
            CredentialError::InvalidSignature
        }
        ErrorKind::InvalidIssuer => CredentialError::InvalidClaim("iss"),
        ErrorKind::InvalidAudience => CredentialError::InvalidClaim("aud"),
        ErrorKind::InvalidSubject => CredentialError::InvalidClaim("sub"),
        _ => CredentialError::Malformed,
    }
}

fn to_datetime(unix: u64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(i64::try_from(unix).ok()?, 0)
}
