/*
 * Responsibility
 * - Static access rules: one AccessPolicy per (resource type, action)
 * - Built once at startup; requests only read them
 */
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::services::auth::normalize_role;
use crate::services::authz::ownership::OwnershipCheck;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    List,
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The target of a request: a resource type plus, when addressed, its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub kind: &'static str,
    pub id: Option<String>,
}

impl ResourceRef {
    pub fn new(kind: &'static str, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: Some(id.into()),
        }
    }

    /// The collection itself (list / create).
    pub fn collection(kind: &'static str) -> Self {
        Self { kind, id: None }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}:{}", self.kind, id),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// A role shortcut OR'd with an optional ownership predicate.
#[derive(Clone, Default)]
pub struct AccessPolicy {
    allowed_roles: BTreeSet<String>,
    ownership: Option<Arc<dyn OwnershipCheck>>,
}

impl fmt::Debug for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPolicy")
            .field("allowed_roles", &self.allowed_roles)
            .field("ownership", &self.ownership.as_ref().map(|c| c.name()))
            .finish()
    }
}

impl AccessPolicy {
    /// No role shortcut and no ownership path: every request is denied.
    pub fn deny_all() -> Self {
        Self::default()
    }

    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_roles: roles
                .into_iter()
                .map(|r| normalize_role(r.as_ref()))
                .filter(|r| !r.is_empty())
                .collect(),
            ownership: None,
        }
    }

    pub fn with_ownership(mut self, check: impl OwnershipCheck) -> Self {
        self.ownership = Some(Arc::new(check));
        self
    }

    pub fn with_shared_ownership(mut self, check: Arc<dyn OwnershipCheck>) -> Self {
        self.ownership = Some(check);
        self
    }

    pub fn allowed_roles(&self) -> &BTreeSet<String> {
        &self.allowed_roles
    }

    pub fn ownership(&self) -> Option<&Arc<dyn OwnershipCheck>> {
        self.ownership.as_ref()
    }
}

/// Policies keyed by (resource type, action). A missing entry means deny.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    rules: HashMap<(&'static str, Action), AccessPolicy>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: &'static str, action: Action, policy: AccessPolicy) -> Self {
        self.rules.insert((kind, action), policy);
        self
    }

    pub fn get(&self, kind: &'static str, action: Action) -> Option<&AccessPolicy> {
        self.rules.get(&(kind, action))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
