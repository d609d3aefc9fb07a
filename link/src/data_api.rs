//! One-shot REST access to the gateway's tag namespaces.

use crate::{
    auth::{TokenIssuer, TokenSource},
    error::{Result, WebpacLinkError},
    models::{AuthenticationRecord, LoginRequest},
};
use log::{debug, warn};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;

/// Authenticated REST operations over the symbolic, block and absolute
/// namespaces, plus the token endpoint.
///
/// Every call attaches `Authorization: Bearer <token>` when the session holds
/// a live token. Idempotent reads are retried on connect and timeout errors
/// with linear backoff.
#[derive(Clone)]
pub struct DataApi {
    base_url: Url,
    http_client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    max_retries: u32,
}

impl DataApi {
    pub(crate) fn new(
        base_url: &str,
        http_client: reqwest::Client,
        tokens: Arc<dyn TokenSource>,
        max_retries: u32,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            WebpacLinkError::ConfigurationError(format!("Invalid API URL '{}': {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(WebpacLinkError::ConfigurationError(format!(
                "API URL '{}' cannot carry a path",
                base_url
            )));
        }
        Ok(Self {
            base_url,
            http_client,
            tokens,
            max_retries,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                WebpacLinkError::ConfigurationError("API URL cannot carry a path".to_string())
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    /// `{base}/{namespace}/{name}[/{a}/{b}...]` for a dotted `a.b...` path.
    fn variable_url(&self, namespace: &str, name: &str, path: Option<&str>) -> Result<Url> {
        let parts = path
            .into_iter()
            .flat_map(|p| p.split('.'))
            .filter(|part| !part.is_empty());
        self.endpoint([namespace, name].into_iter().chain(parts))
    }

    async fn send(&self, method: Method, url: Url, body: Option<&JsonValue>) -> Result<reqwest::Response> {
        let retriable_method = method == Method::GET;
        let mut retries = 0;
        let overall_start = Instant::now();

        loop {
            let mut req_builder = self.http_client.request(method.clone(), url.clone());
            if let Some(token) = self.tokens.bearer_token() {
                req_builder = req_builder.bearer_auth(token);
            }
            if let Some(body) = body {
                req_builder = req_builder.json(body);
            }

            let attempt_start = Instant::now();
            debug!(
                "[DATA_API] Sending {} to {} (attempt {}/{})",
                method,
                url,
                retries + 1,
                self.max_retries + 1
            );

            match req_builder.send().await {
                Ok(response) => {
                    debug!(
                        "[DATA_API] Response received: status={} duration_ms={}",
                        response.status(),
                        attempt_start.elapsed().as_millis()
                    );
                    return Self::check_status(response).await;
                },
                Err(e) if retriable_method && retries < self.max_retries && Self::is_retriable(&e) => {
                    warn!(
                        "[DATA_API] Retriable error (attempt {}/{}): {} duration_ms={}",
                        retries + 1,
                        self.max_retries + 1,
                        e,
                        attempt_start.elapsed().as_millis()
                    );
                    retries += 1;
                    tokio::time::sleep(std::time::Duration::from_millis(100 * retries as u64)).await;
                },
                Err(e) => {
                    warn!(
                        "[DATA_API] Fatal error: {} total_ms={}",
                        e,
                        overall_start.elapsed().as_millis()
                    );
                    return Err(e.into());
                },
            }
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(WebpacLinkError::Unauthenticated);
        }

        let message = response
            .text()
            .await
            .ok()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());
        warn!("[DATA_API] Server error: status={} message=\"{}\"", status, message);
        Err(WebpacLinkError::ServerError {
            status_code: status.as_u16(),
            message,
        })
    }

    fn is_retriable(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect()
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.send(Method::GET, url, None).await?;
        Ok(response.json().await?)
    }

    /// Writes answer with a JSON boolean; an empty body counts as success.
    async fn patch(&self, url: Url, body: &JsonValue) -> Result<bool> {
        let response = self.send(Method::PATCH, url, Some(body)).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(true);
        }
        let value: JsonValue = serde_json::from_str(&text)?;
        Ok(value.as_bool().unwrap_or(true))
    }

    /// `GET {base}/symbolic/`
    pub async fn list_symbols(&self) -> Result<Vec<String>> {
        self.get_json(self.endpoint(["symbolic", ""])?).await
    }

    /// `GET {base}/symbolic/{name}[/{path...}]`. `path` is dotted (`a.b.c`).
    pub async fn read_symbolic(&self, name: &str, path: Option<&str>) -> Result<JsonValue> {
        self.get_json(self.variable_url("symbolic", name, path)?).await
    }

    /// `PATCH {base}/symbolic/{name}` with a `{variable: value}` body.
    pub async fn write_symbolic(&self, name: &str, values: &JsonValue) -> Result<bool> {
        self.patch(self.endpoint(["symbolic", name])?, values).await
    }

    /// `GET {base}/blocks/`
    pub async fn list_blocks(&self) -> Result<Vec<String>> {
        self.get_json(self.endpoint(["blocks", ""])?).await
    }

    pub async fn read_block(&self, name: &str, path: Option<&str>) -> Result<JsonValue> {
        self.get_json(self.variable_url("blocks", name, path)?).await
    }

    pub async fn write_block(&self, name: &str, values: &JsonValue) -> Result<bool> {
        self.patch(self.endpoint(["blocks", name])?, values).await
    }

    /// `GET {base}/absolutes/{area}/{address}`
    pub async fn read_absolute(&self, area: &str, address: &str) -> Result<JsonValue> {
        self.get_json(self.endpoint(["absolutes", area, address])?).await
    }

    /// `PATCH {base}/absolutes/{area}/{address}`
    pub async fn write_absolute(&self, area: &str, address: &str, value: &JsonValue) -> Result<bool> {
        self.patch(self.endpoint(["absolutes", area, address])?, value).await
    }
}

#[async_trait::async_trait]
impl TokenIssuer for DataApi {
    /// `POST {base}/token/`. Rejected credentials (400/401/403) come back as
    /// a record with `authenticated = false`.
    async fn issue_token(&self, username: &str, password: &str) -> Result<AuthenticationRecord> {
        let url = self.endpoint(["token", ""])?;
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        debug!("[DATA_API] Requesting token for '{}'", username);

        let response = self.http_client.post(url).json(&body).send().await?;
        let status = response.status();
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            debug!("[DATA_API] Token request rejected: status={}", status);
            return Ok(AuthenticationRecord {
                authenticated: false,
                user: username.to_string(),
                role: String::new(),
                token: String::new(),
                token_expires_at: Default::default(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(WebpacLinkError::AuthenticationError(format!(
                "token endpoint returned {}: {}",
                status, message
            )));
        }
        Ok(response.json().await?)
    }
}

impl std::fmt::Debug for DataApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataApi")
            .field("base_url", &self.base_url.as_str())
            .field("max_retries", &self.max_retries)
            .finish()
    }
}
