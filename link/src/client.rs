//! Main gateway client with builder pattern.
//!
//! [`WebpacClient`] is the composition root: it wires the session, the
//! authentication gate, the REST facade and (when enabled) the push
//! connection supervisor, subscription registry and event router.

use crate::{
    auth::{AuthGate, Session, TokenSource},
    config::ClientConfig,
    connection::{ConnectionSupervisor, Transport, WsTransport},
    credentials::{CredentialStore, MemoryCredentialStore},
    data_api::DataApi,
    error::{Result, WebpacLinkError},
    models::{
        ConnectionChangeEvent, ConnectionOptions, ConnectionState, SubscriptionInfo,
        SubscriptionKey, TransportError,
    },
    stream::EventStream,
    subscription::{EventRouter, Subscription, SubscriptionRegistry},
    timeouts::LinkTimeouts,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;

struct Realtime {
    supervisor: ConnectionSupervisor,
    router: Arc<EventRouter>,
    registry: Arc<SubscriptionRegistry>,
}

/// Client for a webpac controller gateway.
///
/// Use [`WebpacClientBuilder`] to construct instances.
///
/// # Examples
///
/// ```rust,no_run
/// use webpac_link::{ClientConfig, WebpacClient};
///
/// # async fn example() -> webpac_link::Result<()> {
/// let client = WebpacClient::builder()
///     .config(ClientConfig::new("http://localhost:5000/"))
///     .build()?;
///
/// if client.login("operator", "secret").await? {
///     let mut sub = client.subscribe("DB1112", ["W0"]).await?;
///     if let Some(Ok(change)) = sub.next().await {
///         println!("W0 = {}", change.value);
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct WebpacClient {
    config: ClientConfig,
    timeouts: LinkTimeouts,
    gate: AuthGate,
    data: DataApi,
    realtime: Option<Arc<Realtime>>,
}

impl WebpacClient {
    pub fn builder() -> WebpacClientBuilder {
        WebpacClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn timeouts(&self) -> &LinkTimeouts {
        &self.timeouts
    }

    pub fn session(&self) -> &Arc<Session> {
        self.gate.session()
    }

    fn realtime(&self) -> Result<&Realtime> {
        self.realtime.as_deref().ok_or_else(|| {
            WebpacLinkError::TransportMisconfigured(
                "real-time channel is disabled by configuration".to_string(),
            )
        })
    }

    // ── Authentication ──────────────────────────────────────────────────

    /// Exchange credentials for a token.
    ///
    /// On success the record is persisted and, if the real-time channel is
    /// enabled and not yet connected, the push connection is started. A
    /// failed start does not fail the login; it is reported on
    /// [`errors`](Self::errors).
    pub async fn login(&self, username: &str, password: &str) -> Result<bool> {
        if !self.gate.login(&self.data, username, password).await? {
            return Ok(false);
        }

        if let Some(realtime) = self.realtime.as_deref() {
            if !realtime.supervisor.is_connected() {
                if let Err(e) = realtime.supervisor.start().await {
                    log::warn!("[webpac-link] Push connection did not start after login: {}", e);
                }
            }
        }
        Ok(true)
    }

    /// Forget the stored record. An open push connection stays open.
    pub fn logout(&self) -> Result<()> {
        self.gate.logout()
    }

    /// Cached login flag, no I/O.
    pub fn is_logged_in(&self) -> bool {
        self.gate.is_logged_in()
    }

    pub fn ensure_authenticated(&self, strict: bool) -> Result<bool> {
        self.gate.ensure_authenticated(strict)
    }

    // ── Push connection ─────────────────────────────────────────────────

    /// (Re)start the push connection with the current token.
    pub async fn start(&self) -> Result<()> {
        self.gate.ensure_authenticated(true)?;
        self.realtime()?.supervisor.start().await
    }

    /// Close the push connection. No-op when real-time is disabled.
    pub async fn stop(&self) {
        if let Some(realtime) = self.realtime.as_deref() {
            realtime.supervisor.stop().await;
        }
    }

    pub fn connection_state(&self) -> Result<EventStream<ConnectionState>> {
        Ok(self.realtime()?.supervisor.connection_state())
    }

    /// `Disconnected` when real-time is disabled.
    pub fn current_connection_state(&self) -> ConnectionState {
        self.realtime
            .as_deref()
            .map(|realtime| realtime.supervisor.current_state())
            .unwrap_or_default()
    }

    pub fn errors(&self) -> Result<EventStream<TransportError>> {
        Ok(self.realtime()?.supervisor.errors())
    }

    // ── Subscriptions ───────────────────────────────────────────────────

    /// Subscribe to `variables` of a symbolic mapping.
    pub async fn subscribe<I, S>(&self, mapping: &str, variables: I) -> Result<Subscription>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscribe_key(SubscriptionKey::symbolic(mapping, variables))
            .await
    }

    /// Subscribe to raw `addresses` of a physical area.
    pub async fn subscribe_raw<I, S>(&self, area: &str, addresses: I) -> Result<Subscription>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscribe_key(SubscriptionKey::raw(area, addresses))
            .await
    }

    pub async fn subscribe_key(&self, key: SubscriptionKey) -> Result<Subscription> {
        self.gate.ensure_authenticated(true)?;
        let realtime = self.realtime()?;
        Ok(realtime.registry.register(key))
    }

    /// Drop every local subscription on this key and unregister it on the
    /// gateway. Returns the gateway's answer.
    pub async fn unsubscribe<I, S>(&self, mapping: &str, variables: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unsubscribe_key(&SubscriptionKey::symbolic(mapping, variables))
            .await
    }

    pub async fn unsubscribe_raw<I, S>(&self, area: &str, addresses: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unsubscribe_key(&SubscriptionKey::raw(area, addresses))
            .await
    }

    pub async fn unsubscribe_key(&self, key: &SubscriptionKey) -> Result<bool> {
        self.gate.ensure_authenticated(true)?;
        self.realtime()?.registry.unsubscribe(key).await
    }

    /// Up/down signals of the gateway's controller link.
    pub fn subscribe_connection_changed(&self) -> Result<EventStream<ConnectionChangeEvent>> {
        self.gate.ensure_authenticated(true)?;
        Ok(self.realtime()?.router.subscribe_connection_changed())
    }

    pub fn list_subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.realtime
            .as_deref()
            .map(|realtime| realtime.registry.snapshot())
            .unwrap_or_default()
    }

    // ── REST ────────────────────────────────────────────────────────────

    /// REST facade without the authentication gate in front.
    pub fn data(&self) -> &DataApi {
        &self.data
    }

    pub async fn list_symbols(&self) -> Result<Vec<String>> {
        self.gate.ensure_authenticated(true)?;
        self.data.list_symbols().await
    }

    pub async fn read_symbolic(&self, name: &str, path: Option<&str>) -> Result<JsonValue> {
        self.gate.ensure_authenticated(true)?;
        self.data.read_symbolic(name, path).await
    }

    pub async fn write_symbolic(&self, name: &str, values: &JsonValue) -> Result<bool> {
        self.gate.ensure_authenticated(true)?;
        self.data.write_symbolic(name, values).await
    }

    pub async fn list_blocks(&self) -> Result<Vec<String>> {
        self.gate.ensure_authenticated(true)?;
        self.data.list_blocks().await
    }

    pub async fn read_block(&self, name: &str, path: Option<&str>) -> Result<JsonValue> {
        self.gate.ensure_authenticated(true)?;
        self.data.read_block(name, path).await
    }

    pub async fn write_block(&self, name: &str, values: &JsonValue) -> Result<bool> {
        self.gate.ensure_authenticated(true)?;
        self.data.write_block(name, values).await
    }

    pub async fn read_absolute(&self, area: &str, address: &str) -> Result<JsonValue> {
        self.gate.ensure_authenticated(true)?;
        self.data.read_absolute(area, address).await
    }

    pub async fn write_absolute(&self, area: &str, address: &str, value: &JsonValue) -> Result<bool> {
        self.gate.ensure_authenticated(true)?;
        self.data.write_absolute(area, address, value).await
    }
}

impl std::fmt::Debug for WebpacClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebpacClient")
            .field("config", &self.config)
            .field("logged_in", &self.is_logged_in())
            .field("connection_state", &self.current_connection_state())
            .finish()
    }
}

/// Builder for configuring [`WebpacClient`] instances.
pub struct WebpacClientBuilder {
    config: ClientConfig,
    credential_store: Option<Arc<dyn CredentialStore>>,
    transport: Option<Arc<dyn Transport>>,
    timeouts: LinkTimeouts,
    connection_options: ConnectionOptions,
}

impl WebpacClientBuilder {
    fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            credential_store: None,
            transport: None,
            timeouts: LinkTimeouts::default(),
            connection_options: ConnectionOptions::default(),
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Shorthand for replacing only the server URL.
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self
    }

    pub fn use_realtime(mut self, enabled: bool) -> Self {
        self.config.use_realtime = enabled;
        self
    }

    /// Where the authentication record is persisted.
    ///
    /// Defaults to a [`MemoryCredentialStore`], which forgets the login when
    /// the process exits.
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = Some(store);
        self
    }

    /// Replace the default websocket transport, e.g. with a
    /// [`LoopbackTransport`](crate::connection::LoopbackTransport).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// # Example
    ///
    /// ```rust,no_run
    /// use webpac_link::{LinkTimeouts, WebpacClient};
    ///
    /// # fn example() -> webpac_link::Result<()> {
    /// let client = WebpacClient::builder()
    ///     .server_url("http://10.0.0.5:5000/")
    ///     .timeouts(LinkTimeouts::fast())
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn timeouts(mut self, timeouts: LinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = options;
        self
    }

    /// Build the client
    pub fn build(self) -> Result<WebpacClient> {
        self.config.validate()?;

        let mut client_builder = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(std::time::Duration::from_secs(90));
        if !LinkTimeouts::is_no_timeout(self.timeouts.request_timeout) {
            client_builder = client_builder.timeout(self.timeouts.request_timeout);
        }
        if !LinkTimeouts::is_no_timeout(self.timeouts.connection_timeout) {
            client_builder = client_builder.connect_timeout(self.timeouts.connection_timeout);
        }
        let http_client = client_builder
            .build()
            .map_err(|e| WebpacLinkError::ConfigurationError(e.to_string()))?;

        let store = self
            .credential_store
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let session = Arc::new(Session::new(store));
        let tokens: Arc<dyn TokenSource> = session.clone();
        let gate = AuthGate::new(session);

        let data = DataApi::new(
            &self.config.api_base_url(),
            http_client,
            tokens.clone(),
            self.connection_options.max_http_retries,
        )?;

        let logged_in = gate.ensure_authenticated(false)?;

        let realtime = if self.config.use_realtime {
            let transport = self.transport.unwrap_or_else(|| {
                Arc::new(
                    WsTransport::new(self.timeouts.clone(), self.connection_options.clone())
                        .with_token_source(tokens.clone()),
                )
            });
            let registry = Arc::new(SubscriptionRegistry::new(transport.clone()));
            let router = Arc::new(EventRouter::new(registry.clone()));
            let supervisor =
                ConnectionSupervisor::configure(&self.config, tokens, transport, router.clone())?;
            Some(Arc::new(Realtime {
                supervisor,
                router,
                registry,
            }))
        } else {
            None
        };

        log::debug!(
            "[webpac-link] Client built for {} (real-time: {}, logged in: {})",
            self.config.server_url,
            realtime.is_some(),
            logged_in
        );

        Ok(WebpacClient {
            config: self.config,
            timeouts: self.timeouts,
            gate,
            data,
            realtime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::LoopbackTransport;

    #[test]
    fn test_build_with_defaults() {
        let client = WebpacClient::builder().build().unwrap();
        assert_eq!(client.config().server_url, "http://localhost:5000/");
        assert!(!client.is_logged_in());
        assert_eq!(client.current_connection_state(), ConnectionState::Disconnected);
        assert_eq!(client.data().base_url().as_str(), "http://localhost:5000/api/");
    }

    #[test]
    fn test_build_rejects_bad_server_url() {
        let result = WebpacClient::builder().server_url("localhost:5000").build();
        assert!(matches!(result, Err(WebpacLinkError::ConfigurationError(_))));
    }

    #[test]
    fn test_build_fails_fast_on_missing_channel() {
        let result = WebpacClient::builder()
            .config(ClientConfig::default().with_channel_name(""))
            .transport(Arc::new(LoopbackTransport::new()))
            .build();
        assert!(matches!(result, Err(WebpacLinkError::TransportMisconfigured(_))));
    }

    #[test]
    fn test_realtime_disabled_skips_channel_checks() {
        let client = WebpacClient::builder()
            .config(ClientConfig::default().with_channel_name("").with_realtime(false))
            .build()
            .unwrap();
        assert!(client.list_subscriptions().is_empty());
        assert!(matches!(
            client.connection_state(),
            Err(WebpacLinkError::TransportMisconfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_subscribe_requires_login() {
        let client = WebpacClient::builder()
            .transport(Arc::new(LoopbackTransport::new()))
            .build()
            .unwrap();
        assert!(matches!(
            client.subscribe("DB1112", ["W0"]).await,
            Err(WebpacLinkError::Unauthenticated)
        ));
        assert!(matches!(
            client.subscribe_connection_changed(),
            Err(WebpacLinkError::Unauthenticated)
        ));
    }
}
