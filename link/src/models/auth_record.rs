use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of a credential exchange, persisted between sessions.
///
/// JSON shape (also the body returned by `POST {base}/token/`):
///
/// ```json
/// {"authenticated": true, "user": "alice", "role": "operator",
///  "token": "eyJ...", "tokenExpiresAt": "2026-10-18T12:00:00Z"}
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationRecord {
    pub authenticated: bool,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub token_expires_at: DateTime<Utc>,
}

impl AuthenticationRecord {
    /// Live iff authenticated and `token_expires_at` lies after `now`.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.authenticated && self.token_expires_at > now
    }

    pub fn is_live(&self) -> bool {
        self.is_live_at(Utc::now())
    }
}

impl fmt::Debug for AuthenticationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationRecord")
            .field("authenticated", &self.authenticated)
            .field("user", &self.user)
            .field("role", &self.role)
            .field("token", &"<redacted>")
            .field("token_expires_at", &self.token_expires_at)
            .finish()
    }
}
