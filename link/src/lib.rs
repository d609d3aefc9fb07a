//! # webpac-link
//!
//! Client library for webpac controller gateways.
//!
//! Two channels reach the gateway:
//!
//! - a REST facade for one-shot reads and writes of symbolic, block and
//!   absolute tag values ([`DataApi`])
//! - one shared push connection over which any number of subscriptions are
//!   multiplexed ([`ConnectionSupervisor`], [`SubscriptionRegistry`],
//!   [`EventRouter`])
//!
//! Both carry the bearer token of the current [`Session`], gated by
//! [`AuthGate`]. [`WebpacClient`] wires everything together.
//!
//! ```rust,no_run
//! use webpac_link::{ClientConfig, WebpacClient};
//!
//! # async fn example() -> webpac_link::Result<()> {
//! let client = WebpacClient::builder()
//!     .config(ClientConfig::new("http://localhost:5000/"))
//!     .build()?;
//! client.login("operator", "secret").await?;
//!
//! let mut sub = client.subscribe_raw("DB1112", ["W0"]).await?;
//! while let Some(event) = sub.next().await {
//!     println!("{:?}", event?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod data_api;
pub mod error;
pub mod models;
pub mod stream;
pub mod subscription;
pub mod timeouts;

pub use auth::{AuthGate, Session, TokenIssuer, TokenSource, AUTH_RECORD_KEY};
pub use client::{WebpacClient, WebpacClientBuilder};
pub use config::ClientConfig;
pub use connection::{
    ConnectRequest, ConnectionSupervisor, FrameSink, Invocation, LoopbackTransport, Transport,
    TransportEvent, WsTransport,
};
pub use credentials::{CredentialStore, MemoryCredentialStore};
pub use data_api::DataApi;
pub use error::{Result, WebpacLinkError};
pub use models::{
    AuthenticationRecord, ChangeEvent, ConnectionChangeEvent, ConnectionOptions, ConnectionState,
    DataChanged, SubscriptionInfo, SubscriptionKey, SubscriptionKind, TransportError,
};
pub use stream::EventStream;
pub use subscription::{EventRouter, Subscription, SubscriptionRegistry};
pub use timeouts::LinkTimeouts;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
