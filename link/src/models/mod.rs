//! Data models for the webpac-link client library.
//!
//! Domain types (authentication records, change events, subscription keys)
//! and the JSON frames exchanged on the push connection.

pub mod auth_record;
pub mod change_event;
pub mod client_message;
pub mod connection_options;
pub mod connection_state;
pub mod inbound_frame;
pub mod login_request;
pub mod server_message;
pub mod subscription_info;
pub mod subscription_key;
pub mod transport_error;


pub use auth_record::AuthenticationRecord;
pub use change_event::{ChangeEvent, ConnectionChangeEvent};
pub use client_message::ClientMessage;
pub use connection_options::ConnectionOptions;
pub use connection_state::ConnectionState;
pub use inbound_frame::{DataChanged, InboundFrame};
pub use login_request::LoginRequest;
pub use server_message::ServerMessage;
pub use subscription_info::SubscriptionInfo;
pub use subscription_key::{SubscriptionKey, SubscriptionKind};
pub use transport_error::TransportError;
