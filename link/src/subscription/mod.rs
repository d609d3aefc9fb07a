//! Subscription multiplexing over the shared push connection.
//!
//! - [`registry`]: the routing table, owns every entry's sending half
//! - [`router`]: fans decoded pushes out to matching entries
//! - [`handle`]: the caller's [`Subscription`] stream

pub mod handle;
pub mod registry;
pub mod router;

pub use handle::Subscription;
pub use registry::SubscriptionRegistry;
pub use router::EventRouter;
