use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::services::auth::Principal;

/// What the gate verified about the caller's credential.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub subject: String,
    pub roles: Vec<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl From<&Principal> for SessionResponse {
    fn from(p: &Principal) -> Self {
        Self {
            subject: p.subject().to_string(),
            roles: p.roles().iter().cloned().collect(),
            issued_at: p.issued_at(),
            expires_at: p.expires_at(),
        }
    }
}
