use std::time::Duration;

use crate::services::auth::Principal;
use crate::services::authz::policy::{AccessPolicy, ResourceRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    // Neither a role shortcut nor an ownership predicate applies.
    NoAllowPath,
    NotOwner,
    LookupFailed,
    LookupTimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Evaluates an `AccessPolicy` for a principal and target.
///
/// Order: role intersection (no lookup) → ownership predicate → default deny.
/// The ownership call is bounded by `ownership_timeout`; timeouts and errors deny.
#[derive(Debug, Clone)]
pub struct AuthzEngine {
    ownership_timeout: Duration,
}

impl AuthzEngine {
    pub fn new(ownership_timeout: Duration) -> Self {
        Self { ownership_timeout }
    }

    pub async fn authorize(
        &self,
        principal: &Principal,
        policy: &AccessPolicy,
        resource: &ResourceRef,
    ) -> Decision {
        if policy
            .allowed_roles()
            .intersection(principal.roles())
            .next()
            .is_some()
        {
            return Decision::Allow;
        }

        let Some(check) = policy.ownership() else {
            return Decision::Deny(DenyReason::NoAllowPath);
        };

        match tokio::time::timeout(self.ownership_timeout, check.check(principal, resource)).await
        {
            Ok(Ok(true)) => Decision::Allow,
            Ok(Ok(false)) => Decision::Deny(DenyReason::NotOwner),
            Ok(Err(err)) => {
                tracing::error!(
                    check = check.name(),
                    resource = %resource,
                    error = %err,
                    "ownership lookup failed; denying"
                );
                Decision::Deny(DenyReason::LookupFailed)
            }
            Err(_) => {
                tracing::error!(
                    check = check.name(),
                    resource = %resource,
                    timeout_ms = self.ownership_timeout.as_millis() as u64,
                    "ownership lookup timed out; denying"
                );
                Decision::Deny(DenyReason::LookupTimedOut)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::authz::ownership::{OwnershipCheck, OwnershipError};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// resource id -> creator subject
    struct IsCreator {
        creators: HashMap<String, String>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl OwnershipCheck for IsCreator {
        fn name(&self) -> &'static str {
            "is_creator"
        }

        async fn check(
            &self,
            principal: &Principal,
            resource: &ResourceRef,
        ) -> Result<bool, OwnershipError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let id = resource.id.as_deref().unwrap_or_default();
            Ok(self.creators.get(id).map(String::as_str) == Some(principal.subject()))
        }
    }

    struct Failing;

    #[async_trait]
    impl OwnershipCheck for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn check(&self, _: &Principal, _: &ResourceRef) -> Result<bool, OwnershipError> {
            Err(OwnershipError::Lookup("db unavailable".into()))
        }
    }

    struct Slow;

    #[async_trait]
    impl OwnershipCheck for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn check(&self, _: &Principal, _: &ResourceRef) -> Result<bool, OwnershipError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(true)
        }
    }

    fn user(subject: &str, roles: &[&str]) -> Principal {
        Principal::new(subject, roles.iter().copied(), None, Utc::now())
    }

    fn admin_or_creator() -> (AccessPolicy, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let check = IsCreator {
            creators: HashMap::from([("r".to_string(), "alice".to_string())]),
            calls: calls.clone(),
        };
        (AccessPolicy::roles(["ADMIN"]).with_ownership(check), calls)
    }

    #[tokio::test]
    async fn admin_or_creator_policy() {
        let engine = AuthzEngine::new(Duration::from_millis(100));
        let (policy, _) = admin_or_creator();
        let r = ResourceRef::new("project", "r");

        // non-admin creator
        assert!(engine.authorize(&user("alice", &["USER"]), &policy, &r).await.is_allowed());
        // non-admin non-creator
        assert_eq!(
            engine.authorize(&user("bob", &["USER"]), &policy, &r).await,
            Decision::Deny(DenyReason::NotOwner)
        );
        // admin non-creator
        assert!(engine.authorize(&user("carol", &["ADMIN"]), &policy, &r).await.is_allowed());
    }

    #[tokio::test]
    async fn role_match_skips_ownership_lookup() {
        let engine = AuthzEngine::new(Duration::from_millis(100));
        let (policy, calls) = admin_or_creator();

        let decision = engine
            .authorize(&user("carol", &["ROLE_ADMIN"]), &policy, &ResourceRef::new("project", "r"))
            .await;

        assert!(decision.is_allowed());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn role_match_allows_even_when_ownership_would_fail() {
        let engine = AuthzEngine::new(Duration::from_millis(100));
        let policy = AccessPolicy::roles(["ADMIN"]).with_ownership(Failing);

        let decision = engine
            .authorize(&user("carol", &["ADMIN"]), &policy, &ResourceRef::new("task", "1"))
            .await;

        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn default_deny_without_ownership_check() {
        let engine = AuthzEngine::new(Duration::from_millis(100));
        let r = ResourceRef::new("project", "r");

        assert_eq!(
            engine.authorize(&user("alice", &["USER"]), &AccessPolicy::roles(["ADMIN"]), &r).await,
            Decision::Deny(DenyReason::NoAllowPath)
        );
        assert_eq!(
            engine.authorize(&user("alice", &["ADMIN"]), &AccessPolicy::deny_all(), &r).await,
            Decision::Deny(DenyReason::NoAllowPath)
        );
    }

    #[tokio::test]
    async fn lookup_error_fails_closed() {
        let engine = AuthzEngine::new(Duration::from_millis(100));
        let policy = AccessPolicy::roles(["ADMIN"]).with_ownership(Failing);

        assert_eq!(
            engine
                .authorize(&user("alice", &["USER"]), &policy, &ResourceRef::new("task", "1"))
                .await,
            Decision::Deny(DenyReason::LookupFailed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_timeout_fails_closed() {
        let engine = AuthzEngine::new(Duration::from_millis(500));
        let policy = AccessPolicy::deny_all().with_ownership(Slow);

        assert_eq!(
            engine
                .authorize(&user("alice", &[]), &policy, &ResourceRef::new("task", "1"))
                .await,
            Decision::Deny(DenyReason::LookupTimedOut)
        );
    }
}
