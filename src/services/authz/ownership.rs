//! Ownership predicates ("is the caller the creator / assignee of X").
//!
//! These call out to the system of record and may be slow or fail. The engine
//! bounds them with a timeout; any error or timeout is a denial.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::services::auth::Principal;
use crate::services::authz::policy::ResourceRef;

#[derive(Debug, Error)]
pub enum OwnershipError {
    #[error("ownership lookup failed: {0}")]
    Lookup(String),
}

#[async_trait]
pub trait OwnershipCheck: Send + Sync + 'static {
    // Name used in logs to tell predicates apart.
    fn name(&self) -> &'static str;

    async fn check(
        &self,
        principal: &Principal,
        resource: &ResourceRef,
    ) -> Result<bool, OwnershipError>;
}

/// OR of several named predicates, evaluated in order.
///
/// The first `Ok(true)` wins. If none holds and any predicate failed, the failure is
/// returned so the caller denies (fail-closed) and logs it as a lookup error.
pub struct AnyOf {
    name: &'static str,
    checks: Vec<Arc<dyn OwnershipCheck>>,
}

impl AnyOf {
    pub fn new(name: &'static str, checks: Vec<Arc<dyn OwnershipCheck>>) -> Self {
        Self { name, checks }
    }
}

#[async_trait]
impl OwnershipCheck for AnyOf {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn check(
        &self,
        principal: &Principal,
        resource: &ResourceRef,
    ) -> Result<bool, OwnershipError> {
        let mut first_error = None;

        for check in &self.checks {
            match check.check(principal, resource).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(check = check.name(), error = %err, "ownership predicate failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct Fixed(Result<bool, &'static str>);

    #[async_trait]
    impl OwnershipCheck for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn check(&self, _: &Principal, _: &ResourceRef) -> Result<bool, OwnershipError> {
            self.0.map_err(|e| OwnershipError::Lookup(e.to_string()))
        }
    }

    fn any_of(results: Vec<Result<bool, &'static str>>) -> AnyOf {
        AnyOf::new(
            "any",
            results
                .into_iter()
                .map(|r| Arc::new(Fixed(r)) as Arc<dyn OwnershipCheck>)
                .collect(),
        )
    }

    fn principal() -> Principal {
        Principal::new("u1", Vec::<String>::new(), None, Utc::now())
    }

    #[tokio::test]
    async fn any_true_wins_even_after_a_failure() {
        let check = any_of(vec![Err("down"), Ok(true)]);
        let ok = check.check(&principal(), &ResourceRef::new("task", "1")).await;
        assert!(ok.unwrap());
    }

    #[tokio::test]
    async fn failure_without_a_match_is_an_error() {
        let check = any_of(vec![Ok(false), Err("down")]);
        let res = check.check(&principal(), &ResourceRef::new("task", "1")).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn empty_set_is_false() {
        let check = any_of(vec![]);
        let res = check.check(&principal(), &ResourceRef::new("task", "1")).await;
        assert!(!res.unwrap());
    }
}
