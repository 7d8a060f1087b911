//! Request admission pipeline.
//!
//! `START → RATE_CHECK → AUTH_VERIFY → AUTHZ_CHECK → ADMITTED → (mutating) CACHE_INVALIDATE → DONE`
//!
//! The first failing stage ends the request. Rate limiting runs before any
//! signature work, and the token it deducts is never refunded.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::services::auth::{CredentialError, CredentialVerifier, Principal};
use crate::services::authz::{Action, AuthzEngine, Decision, DenyReason, PolicyTable, ResourceRef};
use crate::services::cache::{CacheError, CacheRegistry, InvalidationSet};
use crate::services::rate_limit::{Admission, TokenBucketStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    RateCheck,
    AuthVerify,
    AuthzCheck,
    Admitted,
    CacheInvalidate,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::RateCheck => "rate_check",
            Self::AuthVerify => "auth_verify",
            Self::AuthzCheck => "authz_check",
            Self::Admitted => "admitted",
            Self::CacheInvalidate => "cache_invalidate",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
}

/// Static description of a route, declared next to the route itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub kind: &'static str,
    pub action: Action,
    pub visibility: Visibility,
    // Extra rate domain on top of the global one (e.g. "auth").
    pub class: Option<&'static str>,
    pub cost: u32,
}

impl Endpoint {
    pub const fn protected(kind: &'static str, action: Action) -> Self {
        Self {
            kind,
            action,
            visibility: Visibility::Protected,
            class: None,
            cost: 1,
        }
    }

    pub const fn public(kind: &'static str, action: Action) -> Self {
        Self {
            kind,
            action,
            visibility: Visibility::Public,
            class: None,
            cost: 1,
        }
    }

    pub const fn in_class(mut self, class: &'static str) -> Self {
        self.class = Some(class);
        self
    }
}

/// Everything the gate needs from the transport for one request.
#[derive(Debug, Clone)]
pub struct GateRequest<'a> {
    pub client_key: &'a str,
    pub credential: Option<&'a str>,
    pub endpoint: Endpoint,
    pub resource: ResourceRef,
}

/// Context handed to business logic after admission. Never re-derived mid-request.
#[derive(Debug, Clone)]
pub struct Admitted {
    principal: Option<Arc<Principal>>,
    resource: ResourceRef,
    endpoint: Endpoint,
}

impl Admitted {
    /// `None` only for public endpoints.
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_deref()
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GateError {
    #[error("rate limit exceeded")]
    RateLimitExceeded {
        domain: &'static str,
        retry_after: Duration,
    },
    #[error("malformed credential")]
    MalformedCredential,
    #[error("invalid credential signature")]
    InvalidSignature,
    #[error("credential expired")]
    ExpiredCredential,
    #[error("authentication required")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    // Surfaced to clients exactly like `Forbidden`; only logs tell them apart.
    #[error("forbidden")]
    OwnershipLookupFailed,
}

impl GateError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::RateLimitExceeded { .. } => Stage::RateCheck,
            Self::MalformedCredential
            | Self::InvalidSignature
            | Self::ExpiredCredential
            | Self::Unauthorized => Stage::AuthVerify,
            Self::Forbidden | Self::OwnershipLookupFailed => Stage::AuthzCheck,
        }
    }
}

impl From<CredentialError> for GateError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::Malformed => Self::MalformedCredential,
            CredentialError::InvalidSignature => Self::InvalidSignature,
            CredentialError::Expired => Self::ExpiredCredential,
            CredentialError::NotYetValid | CredentialError::InvalidClaim(_) => Self::Unauthorized,
        }
    }
}

pub struct Gate {
    global: Arc<TokenBucketStore>,
    classes: HashMap<&'static str, Arc<TokenBucketStore>>,
    verifier: Arc<CredentialVerifier>,
    policies: PolicyTable,
    authz: AuthzEngine,
    caches: CacheRegistry,
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("global", &self.global.name())
            .field("classes", &self.classes.keys().collect::<Vec<_>>())
            .field("policies", &self.policies.len())
            .finish()
    }
}

impl Gate {
    pub fn new(
        global: Arc<TokenBucketStore>,
        verifier: Arc<CredentialVerifier>,
        policies: PolicyTable,
        authz: AuthzEngine,
        caches: CacheRegistry,
    ) -> Self {
        Self {
            global,
            classes: HashMap::new(),
            verifier,
            policies,
            authz,
            caches,
        }
    }

    /// Register an endpoint-class rate domain under the store's name.
    pub fn with_class(mut self, store: Arc<TokenBucketStore>) -> Self {
        self.classes.insert(store.name(), store);
        self
    }

    pub async fn admit(&self, req: GateRequest<'_>) -> Result<Admitted, GateError> {
        let result = self.run(&req).await;

        if let Err(err) = &result {
            tracing::warn!(
                stage = %err.stage(),
                error = %err,
                client = req.client_key,
                resource = %req.resource,
                action = %req.endpoint.action,
                "request rejected"
            );
        }
        result
    }

    async fn run(&self, req: &GateRequest<'_>) -> Result<Admitted, GateError> {
        let endpoint = req.endpoint;

        // RATE_CHECK
        self.check_rate(&self.global, req.client_key, endpoint.cost)?;
        if let Some(class) = endpoint.class {
            match self.classes.get(class) {
                Some(store) => self.check_rate(store, req.client_key, endpoint.cost)?,
                None => tracing::error!(class, "endpoint references unknown rate domain"),
            }
        }

        // AUTH_VERIFY
        if endpoint.visibility == Visibility::Public {
            return Ok(Admitted {
                principal: None,
                resource: req.resource.clone(),
                endpoint,
            });
        }

        let token = req.credential.ok_or(GateError::Unauthorized)?;
        let principal = self.verifier.verify(token)?;

        // AUTHZ_CHECK
        let Some(policy) = self.policies.get(endpoint.kind, endpoint.action) else {
            tracing::warn!(kind = endpoint.kind, action = %endpoint.action, "no access policy; denying");
            return Err(GateError::Forbidden);
        };

        match self.authz.authorize(&principal, policy, &req.resource).await {
            Decision::Allow => {}
            Decision::Deny(DenyReason::LookupFailed | DenyReason::LookupTimedOut) => {
                return Err(GateError::OwnershipLookupFailed);
            }
            Decision::Deny(reason) => {
                tracing::debug!(subject = principal.subject(), ?reason, "policy denied");
                return Err(GateError::Forbidden);
            }
        }

        tracing::debug!(
            stage = %Stage::Admitted,
            subject = principal.subject(),
            resource = %req.resource,
            action = %endpoint.action,
            "request admitted"
        );

        Ok(Admitted {
            principal: Some(Arc::new(principal)),
            resource: req.resource.clone(),
            endpoint,
        })
    }

    fn check_rate(
        &self,
        store: &TokenBucketStore,
        client_key: &str,
        cost: u32,
    ) -> Result<(), GateError> {
        match store.acquire(client_key, cost) {
            Admission::Admitted { .. } => Ok(()),
            Admission::Rejected { retry_after } => Err(GateError::RateLimitExceeded {
                domain: store.name(),
                retry_after,
            }),
        }
    }

    /// CACHE_INVALIDATE → DONE, after business logic succeeded.
    ///
    /// Non-mutating endpoints are a no-op.
    pub async fn complete(
        &self,
        admitted: &Admitted,
        invalidations: &InvalidationSet,
    ) -> Result<u64, CacheError> {
        if !admitted.endpoint.action.is_mutating() || invalidations.is_empty() {
            return Ok(0);
        }

        let removed = self.caches.invalidate(invalidations).await?;
        tracing::debug!(
            stage = %Stage::Done,
            resource = %admitted.resource,
            keys = invalidations.len(),
            removed,
            "write invalidations applied"
        );
        Ok(removed)
    }
}
