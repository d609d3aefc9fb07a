//! In-process mock of the gateway's REST API.
//!
//! Routes mirror the real gateway under `/api/`. Every tag route requires
//! `Authorization: Bearer TOKEN` and answers 401 otherwise.

#![allow(dead_code)]

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use webpac_link::{
    ClientConfig, CredentialStore, LinkTimeouts, LoopbackTransport, MemoryCredentialStore,
    WebpacClient,
};

pub const VALID_USER: &str = "operator";
pub const VALID_PASSWORD: &str = "secret";
pub const TOKEN: &str = "mock-token-1";

#[derive(Default)]
pub struct GatewayState {
    /// `(path, body)` of every accepted PATCH
    pub writes: Mutex<Vec<(String, Value)>>,
    pub token_requests: Mutex<usize>,
}

pub struct MockGateway {
    pub base_url: String,
    pub state: Arc<GatewayState>,
    _server: JoinHandle<()>,
}

impl MockGateway {
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.base_url.clone())
    }

    /// Client for REST-only tests.
    pub fn rest_client(&self, store: Arc<dyn CredentialStore>) -> WebpacClient {
        WebpacClient::builder()
            .config(self.config().with_realtime(false))
            .credential_store(store)
            .timeouts(LinkTimeouts::fast())
            .build()
            .expect("client builds")
    }

    /// Client whose push channel runs over `transport`.
    pub fn realtime_client(&self, transport: Arc<LoopbackTransport>) -> WebpacClient {
        WebpacClient::builder()
            .config(self.config())
            .credential_store(Arc::new(MemoryCredentialStore::new()))
            .transport(transport)
            .timeouts(LinkTimeouts::fast())
            .build()
            .expect("client builds")
    }

    pub fn writes(&self) -> Vec<(String, Value)> {
        self.state.writes.lock().unwrap().clone()
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {}", TOKEN);
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        == Some(expected.as_str())
}

fn guard(headers: &HeaderMap) -> Result<(), StatusCode> {
    if authorized(headers) {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

async fn token(
    State(state): State<Arc<GatewayState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    *state.token_requests.lock().unwrap() += 1;
    let valid = body["username"] == VALID_USER && body["password"] == VALID_PASSWORD;
    if !valid {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "authenticated": false })));
    }
    (
        StatusCode::OK,
        Json(json!({
            "authenticated": true,
            "user": VALID_USER,
            "role": "operator",
            "token": TOKEN,
            "tokenExpiresAt": (Utc::now() + Duration::hours(1)).to_rfc3339(),
        })),
    )
}

async fn list_symbols(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    guard(&headers)?;
    Ok(Json(json!(["DB1112", "DB1113"])))
}

async fn read_symbolic(headers: HeaderMap, Path(name): Path<String>) -> Result<Json<Value>, StatusCode> {
    guard(&headers)?;
    Ok(Json(json!({ "name": name, "W0": 42, "Motor": { "Speed": 1500 } })))
}

async fn read_symbolic_path(
    headers: HeaderMap,
    Path((name, path)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    guard(&headers)?;
    Ok(Json(json!({ "name": name, "path": path.trim_start_matches('/') })))
}

async fn write_symbolic(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    guard(&headers)?;
    state
        .writes
        .lock()
        .unwrap()
        .push((format!("symbolic/{}", name), body));
    Ok(Json(json!(true)))
}

async fn list_blocks(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    guard(&headers)?;
    Ok(Json(json!(["DB1"])))
}

async fn write_block(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Result<StatusCode, StatusCode> {
    guard(&headers)?;
    state
        .writes
        .lock()
        .unwrap()
        .push((format!("blocks/{}", name), body));
    // Empty body counts as success.
    Ok(StatusCode::NO_CONTENT)
}

async fn read_absolute(
    headers: HeaderMap,
    Path((area, address)): Path<(String, String)>,
) -> Result<Json<Value>, (StatusCode, String)> {
    guard(&headers).map_err(|status| (status, String::new()))?;
    if area != "DB1112" {
        return Err((StatusCode::NOT_FOUND, format!("unknown area {}", area)));
    }
    Ok(Json(json!({ "area": area, "address": address, "value": 7 })))
}

async fn write_absolute(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path((area, address)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    guard(&headers)?;
    state
        .writes
        .lock()
        .unwrap()
        .push((format!("absolutes/{}/{}", area, address), body));
    Ok(Json(json!(area == "DB1112")))
}

pub async fn spawn_gateway() -> MockGateway {
    let state = Arc::new(GatewayState::default());
    let app = Router::new()
        .route("/api/token/", post(token))
        .route("/api/symbolic/", get(list_symbols))
        .route("/api/symbolic/:name", get(read_symbolic).patch(write_symbolic))
        .route("/api/symbolic/:name/*path", get(read_symbolic_path))
        .route("/api/blocks/", get(list_blocks))
        .route("/api/blocks/:name", get(read_symbolic).patch(write_block))
        .route("/api/absolutes/:area/:address", get(read_absolute).patch(write_absolute))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock gateway");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock gateway serves");
    });

    MockGateway {
        base_url: format!("http://{}/", addr),
        state,
        _server: server,
    }
}
