//! Authentication gate and session context.
//!
//! A [`Session`] owns the cached [`AuthenticationRecord`] and the credential
//! store slot it is persisted in. It is passed explicitly to everything that
//! needs the bearer token; there is no process-wide token.
//!
//! [`AuthGate`] decides from the session whether the caller is authenticated
//! and performs login/logout. Every protected operation calls
//! [`AuthGate::ensure_authenticated`] in strict mode first.

use crate::{
    credentials::CredentialStore,
    error::{Result, WebpacLinkError},
    models::AuthenticationRecord,
};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Credential store key of the persisted authentication record.
pub const AUTH_RECORD_KEY: &str = "webpac.auth";

/// Supplies the bearer token to attach to outgoing requests.
///
/// Implementations must return `None` once the token is no longer live, so a
/// stale token never reaches the wire.
pub trait TokenSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// Exchanges username/password for an authentication record.
#[async_trait::async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue_token(&self, username: &str, password: &str) -> Result<AuthenticationRecord>;
}

/// Per-client authentication context.
pub struct Session {
    store: Arc<dyn CredentialStore>,
    record: RwLock<Option<AuthenticationRecord>>,
    logged_in: AtomicBool,
}

impl Session {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            record: RwLock::new(None),
            logged_in: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Cached record, no I/O.
    pub fn cached_record(&self) -> Option<AuthenticationRecord> {
        self.record.read().clone()
    }

    /// Cached record, or the persisted one deserialized once and cached.
    ///
    /// A record that fails to parse is removed from the store and treated as
    /// absent.
    fn load_record(&self) -> Option<AuthenticationRecord> {
        if let Some(record) = self.record.read().as_ref() {
            return Some(record.clone());
        }

        let raw = match self.store.get(AUTH_RECORD_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("[AUTH] Failed to read credential store: {}", e);
                return None;
            },
        };

        match serde_json::from_str::<AuthenticationRecord>(&raw) {
            Ok(record) => {
                *self.record.write() = Some(record.clone());
                Some(record)
            },
            Err(e) => {
                let err = WebpacLinkError::MalformedCredentialRecord(e.to_string());
                log::warn!("[AUTH] {}; discarding stored record", err);
                if let Err(e) = self.store.remove(AUTH_RECORD_KEY) {
                    log::warn!("[AUTH] Failed to discard malformed record: {}", e);
                }
                None
            },
        }
    }

    fn persist(&self, record: AuthenticationRecord) -> Result<()> {
        let raw = serde_json::to_string(&record)?;
        self.store.set(AUTH_RECORD_KEY, &raw)?;
        *self.record.write() = Some(record);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.record.write() = None;
        self.logged_in.store(false, Ordering::SeqCst);
        self.store.remove(AUTH_RECORD_KEY)
    }

    fn set_logged_in(&self, value: bool) {
        self.logged_in.store(value, Ordering::SeqCst);
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }
}

impl TokenSource for Session {
    fn bearer_token(&self) -> Option<String> {
        self.load_record()
            .filter(|record| record.is_live_at(Utc::now()))
            .map(|record| record.token)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("record", &*self.record.read())
            .field("logged_in", &self.is_logged_in())
            .finish()
    }
}

/// Gatekeeper for protected operations.
#[derive(Clone, Debug)]
pub struct AuthGate {
    session: Arc<Session>,
}

impl AuthGate {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Compute liveness of the current record and update the logged-in flag.
    ///
    /// In strict mode a missing or expired record fails with
    /// [`WebpacLinkError::Unauthenticated`].
    pub fn ensure_authenticated(&self, strict: bool) -> Result<bool> {
        let live = self
            .session
            .load_record()
            .map(|record| record.is_live_at(Utc::now()))
            .unwrap_or(false);
        self.session.set_logged_in(live);

        if strict && !live {
            return Err(WebpacLinkError::Unauthenticated);
        }
        Ok(live)
    }

    /// Exchange credentials for a token and persist the resulting record.
    ///
    /// Returns `Ok(false)` when the gateway rejects the credentials; nothing is
    /// persisted in that case.
    pub async fn login(
        &self,
        issuer: &dyn TokenIssuer,
        username: &str,
        password: &str,
    ) -> Result<bool> {
        log::debug!("[AUTH] Logging in user '{}'", username);

        let record = match issuer.issue_token(username, password).await {
            Ok(record) => record,
            Err(e) => {
                self.session.set_logged_in(false);
                return Err(e);
            },
        };

        if !record.authenticated {
            log::debug!("[AUTH] Gateway rejected credentials for '{}'", username);
            self.session.set_logged_in(false);
            return Ok(false);
        }

        let expires_at = record.token_expires_at;
        if let Err(e) = self.session.persist(record) {
            self.session.set_logged_in(false);
            return Err(e);
        }
        self.session.set_logged_in(true);
        log::info!("[AUTH] User '{}' logged in (token expires {})", username, expires_at);
        Ok(true)
    }

    /// Forget the persisted record. An open push connection is left alone.
    pub fn logout(&self) -> Result<()> {
        log::debug!("[AUTH] Logging out");
        self.session.clear()
    }

    /// Cached flag, no I/O.
    pub fn is_logged_in(&self) -> bool {
        self.session.is_logged_in()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use chrono::{DateTime, Duration};

    struct FixedIssuer {
        response: Result<AuthenticationRecord>,
    }

    #[async_trait::async_trait]
    impl TokenIssuer for FixedIssuer {
        async fn issue_token(&self, _username: &str, _password: &str) -> Result<AuthenticationRecord> {
            match &self.response {
                Ok(record) => Ok(record.clone()),
                Err(_) => Err(WebpacLinkError::NetworkError("connection refused".into())),
            }
        }
    }

    fn record(expires_at: DateTime<Utc>) -> AuthenticationRecord {
        AuthenticationRecord {
            authenticated: true,
            user: "alice".into(),
            role: "operator".into(),
            token: "tok-123".into(),
            token_expires_at: expires_at,
        }
    }

    fn gate_with_store() -> (AuthGate, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        let session = Arc::new(Session::new(store.clone()));
        (AuthGate::new(session), store)
    }

    fn store_record(store: &MemoryCredentialStore, record: &AuthenticationRecord) {
        store
            .set(AUTH_RECORD_KEY, &serde_json::to_string(record).unwrap())
            .unwrap();
    }

    #[test]
    fn test_strict_fails_without_record() {
        let (gate, _store) = gate_with_store();

        assert!(matches!(
            gate.ensure_authenticated(true),
            Err(WebpacLinkError::Unauthenticated)
        ));
        assert!(!gate.ensure_authenticated(false).unwrap());
        assert!(!gate.is_logged_in());
    }

    #[test]
    fn test_strict_fails_for_expired_record() {
        let (gate, store) = gate_with_store();
        store_record(&store, &record(Utc::now() - Duration::minutes(1)));

        assert!(matches!(
            gate.ensure_authenticated(true),
            Err(WebpacLinkError::Unauthenticated)
        ));
        assert!(!gate.is_logged_in());
    }

    #[test]
    fn test_live_record_is_loaded_and_cached() {
        let (gate, store) = gate_with_store();
        store_record(&store, &record(Utc::now() + Duration::hours(1)));

        assert!(gate.ensure_authenticated(true).unwrap());
        assert!(gate.is_logged_in());
        assert_eq!(gate.session().bearer_token().as_deref(), Some("tok-123"));

        // Repeated checks are stable and served from the cache.
        store.set(AUTH_RECORD_KEY, "not json anymore").unwrap();
        assert!(gate.ensure_authenticated(true).unwrap());
        assert!(gate.ensure_authenticated(true).unwrap());
    }

    #[test]
    fn test_malformed_record_is_discarded() {
        let (gate, store) = gate_with_store();
        store.set(AUTH_RECORD_KEY, "{broken").unwrap();

        assert!(!gate.ensure_authenticated(false).unwrap());
        assert_eq!(store.get(AUTH_RECORD_KEY).unwrap(), None);
        assert!(matches!(
            gate.ensure_authenticated(true),
            Err(WebpacLinkError::Unauthenticated)
        ));
    }

    #[test]
    fn test_bearer_token_withheld_once_expired() {
        let (gate, store) = gate_with_store();
        store_record(&store, &record(Utc::now() - Duration::seconds(1)));
        assert_eq!(gate.session().bearer_token(), None);
    }

    #[tokio::test]
    async fn test_login_persists_record() {
        let (gate, store) = gate_with_store();
        let expires_at = Utc::now() + Duration::hours(8);
        let issuer = FixedIssuer {
            response: Ok(record(expires_at)),
        };

        assert!(gate.login(&issuer, "alice", "secret").await.unwrap());
        assert!(gate.is_logged_in());

        let raw = store.get(AUTH_RECORD_KEY).unwrap().expect("record persisted");
        let persisted: AuthenticationRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(persisted.token_expires_at, expires_at);
    }

    #[tokio::test]
    async fn test_rejected_login_persists_nothing() {
        let (gate, store) = gate_with_store();
        let issuer = FixedIssuer {
            response: Ok(AuthenticationRecord {
                authenticated: false,
                user: String::new(),
                role: String::new(),
                token: String::new(),
                token_expires_at: Utc::now() + Duration::hours(1),
            }),
        };

        assert!(!gate.login(&issuer, "alice", "wrong").await.unwrap());
        assert!(!gate.is_logged_in());
        assert_eq!(store.get(AUTH_RECORD_KEY).unwrap(), None);
        assert!(gate.ensure_authenticated(true).is_err());
    }

    #[tokio::test]
    async fn test_login_transport_error_leaves_logged_out() {
        let (gate, store) = gate_with_store();
        let issuer = FixedIssuer {
            response: Err(WebpacLinkError::Cancelled),
        };

        assert!(gate.login(&issuer, "alice", "secret").await.is_err());
        assert!(!gate.is_logged_in());
        assert_eq!(store.get(AUTH_RECORD_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_logout_clears_store_and_flag() {
        let (gate, store) = gate_with_store();
        let issuer = FixedIssuer {
            response: Ok(record(Utc::now() + Duration::hours(1))),
        };
        gate.login(&issuer, "alice", "secret").await.unwrap();

        gate.logout().unwrap();

        assert!(!gate.is_logged_in());
        assert_eq!(store.get(AUTH_RECORD_KEY).unwrap(), None);
        assert_eq!(gate.session().bearer_token(), None);
    }
}
