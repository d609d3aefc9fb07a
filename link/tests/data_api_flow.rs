//! REST facade and login flow against an in-process mock gateway.

use serde_json::json;
use std::sync::Arc;
use webpac_link::{
    AuthenticationRecord, CredentialStore, MemoryCredentialStore, WebpacLinkError, AUTH_RECORD_KEY,
};

mod common;

use common::{spawn_gateway, TOKEN, VALID_PASSWORD, VALID_USER};

#[tokio::test]
async fn test_login_persists_server_record() {
    let gateway = spawn_gateway().await;
    let store = Arc::new(MemoryCredentialStore::new());
    let client = gateway.rest_client(store.clone());

    assert!(!client.is_logged_in());
    assert!(client.login(VALID_USER, VALID_PASSWORD).await.unwrap());
    assert!(client.is_logged_in());

    let raw = store.get(AUTH_RECORD_KEY).unwrap().expect("record persisted");
    let record: AuthenticationRecord = serde_json::from_str(&raw).unwrap();
    assert!(record.authenticated);
    assert_eq!(record.token, TOKEN);
    assert!(record.is_live());
}

#[tokio::test]
async fn test_invalid_login_persists_nothing() {
    let gateway = spawn_gateway().await;
    let store = Arc::new(MemoryCredentialStore::new());
    let client = gateway.rest_client(store.clone());

    assert!(!client.login(VALID_USER, "wrong").await.unwrap());
    assert!(!client.is_logged_in());
    assert_eq!(store.get(AUTH_RECORD_KEY).unwrap(), None);
    assert_eq!(*gateway.state.token_requests.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_protected_calls_refused_before_login() {
    let gateway = spawn_gateway().await;
    let client = gateway.rest_client(Arc::new(MemoryCredentialStore::new()));

    assert!(matches!(
        client.list_symbols().await,
        Err(WebpacLinkError::Unauthenticated)
    ));
    // Bypassing the gate reaches the server, which answers 401.
    assert!(matches!(
        client.data().list_symbols().await,
        Err(WebpacLinkError::Unauthenticated)
    ));
}

#[tokio::test]
async fn test_symbolic_reads_and_writes() {
    let gateway = spawn_gateway().await;
    let client = gateway.rest_client(Arc::new(MemoryCredentialStore::new()));
    client.login(VALID_USER, VALID_PASSWORD).await.unwrap();

    assert_eq!(client.list_symbols().await.unwrap(), vec!["DB1112", "DB1113"]);

    let whole = client.read_symbolic("DB1112", None).await.unwrap();
    assert_eq!(whole["W0"], json!(42));

    let nested = client
        .read_symbolic("DB1112", Some("Motor.Speed"))
        .await
        .unwrap();
    assert_eq!(nested, json!({ "name": "DB1112", "path": "Motor/Speed" }));

    assert!(client
        .write_symbolic("DB1112", &json!({ "W0": 5 }))
        .await
        .unwrap());
    assert_eq!(
        gateway.writes(),
        vec![("symbolic/DB1112".to_string(), json!({ "W0": 5 }))]
    );
}

#[tokio::test]
async fn test_block_write_with_empty_body_succeeds() {
    let gateway = spawn_gateway().await;
    let client = gateway.rest_client(Arc::new(MemoryCredentialStore::new()));
    client.login(VALID_USER, VALID_PASSWORD).await.unwrap();

    assert_eq!(client.list_blocks().await.unwrap(), vec!["DB1"]);
    assert!(client.write_block("DB1", &json!({ "A": 1 })).await.unwrap());
    assert_eq!(gateway.writes()[0].0, "blocks/DB1");
}

#[tokio::test]
async fn test_absolute_access_and_server_errors() {
    let gateway = spawn_gateway().await;
    let client = gateway.rest_client(Arc::new(MemoryCredentialStore::new()));
    client.login(VALID_USER, VALID_PASSWORD).await.unwrap();

    let value = client.read_absolute("DB1112", "W0").await.unwrap();
    assert_eq!(value["value"], json!(7));

    assert!(client.write_absolute("DB1112", "W0", &json!(9)).await.unwrap());
    assert!(!client.write_absolute("DB9", "W0", &json!(9)).await.unwrap());

    match client.read_absolute("DB9", "W0").await {
        Err(WebpacLinkError::ServerError {
            status_code,
            message,
        }) => {
            assert_eq!(status_code, 404);
            assert!(message.contains("unknown area"));
        },
        other => panic!("expected server error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_persisted_login_survives_new_client() {
    let gateway = spawn_gateway().await;
    let store = Arc::new(MemoryCredentialStore::new());
    gateway
        .rest_client(store.clone())
        .login(VALID_USER, VALID_PASSWORD)
        .await
        .unwrap();

    let second = gateway.rest_client(store.clone());
    assert!(second.is_logged_in(), "derived from the stored record at build");
    assert!(second.list_symbols().await.is_ok());

    second.logout().unwrap();
    assert!(!second.is_logged_in());
    assert_eq!(store.get(AUTH_RECORD_KEY).unwrap(), None);
}

#[tokio::test]
async fn test_malformed_stored_record_reads_as_logged_out() {
    let gateway = spawn_gateway().await;
    let store = Arc::new(MemoryCredentialStore::new());
    store.set(AUTH_RECORD_KEY, "{not json").unwrap();

    let client = gateway.rest_client(store.clone());
    assert!(!client.is_logged_in());
    assert_eq!(store.get(AUTH_RECORD_KEY).unwrap(), None, "record discarded");
}
