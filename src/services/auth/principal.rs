/*
 * Responsibility
 * - The verified identity handed to authorization and business logic
 * - Built once per request by the verifier, never mutated, never persisted
 */
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

/// Canonical role tag: trimmed, upper-case, without a `ROLE_` prefix.
///
/// `ROLE_ADMIN`, `admin` and `ADMIN` name the same role.
pub fn normalize_role(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    match upper.strip_prefix("ROLE_") {
        Some(rest) => rest.to_string(),
        None => upper,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    subject: String,
    roles: BTreeSet<String>,
    issued_at: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
}

impl Principal {
    pub fn new<I, S>(
        subject: impl Into<String>,
        roles: I,
        issued_at: Option<DateTime<Utc>>,
        expires_at: DateTime<Utc>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let roles = roles
            .into_iter()
            .map(|r| normalize_role(r.as_ref()))
            .filter(|r| !r.is_empty())
            .collect();

        Self {
            subject: subject.into(),
            roles,
            issued_at,
            expires_at,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(&normalize_role(role))
    }
}
