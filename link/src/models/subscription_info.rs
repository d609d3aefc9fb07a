use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::subscription_key::SubscriptionKey;

/// Snapshot of one registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    /// Client-side id, unique per registry
    pub id: u64,
    pub key: SubscriptionKey,
    pub created_at: DateTime<Utc>,
}
