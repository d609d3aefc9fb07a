use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Namespace a subscription is keyed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    /// Symbolic mapping name + variable names
    Symbolic,
    /// Physical area + addresses
    Raw,
}

/// Routing key of a subscription: a mapping (or area) and an ordered set of
/// variables (or addresses).
///
/// Variables keep the caller's order with duplicates removed, and are sent to
/// the gateway in that order. Two keys with the same variables in a different
/// order are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionKey {
    pub kind: SubscriptionKind,
    pub mapping: String,
    pub variables: Vec<String>,
}

fn dedup_in_order<I, S>(variables: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = BTreeSet::new();
    variables
        .into_iter()
        .map(Into::into)
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

impl SubscriptionKey {
    pub fn symbolic<I, S>(mapping: impl Into<String>, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: SubscriptionKind::Symbolic,
            mapping: mapping.into(),
            variables: dedup_in_order(variables),
        }
    }

    pub fn raw<I, S>(area: impl Into<String>, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: SubscriptionKind::Raw,
            mapping: area.into(),
            variables: dedup_in_order(addresses),
        }
    }

    /// `true` when an inbound change for `(mapping, variable)` belongs to this key.
    pub fn matches(&self, mapping: &str, variable: &str) -> bool {
        self.mapping == mapping && self.variables.iter().any(|v| v == variable)
    }

    fn variable_set(&self) -> BTreeSet<&str> {
        self.variables.iter().map(String::as_str).collect()
    }

    /// Hub method that registers this key server-side.
    pub fn subscribe_target(&self) -> &'static str {
        match self.kind {
            SubscriptionKind::Symbolic => "Subscribe",
            SubscriptionKind::Raw => "SubscribeRaw",
        }
    }

    /// Hub method that removes this key server-side.
    pub fn unsubscribe_target(&self) -> &'static str {
        match self.kind {
            SubscriptionKind::Symbolic => "Unsubscribe",
            SubscriptionKind::Raw => "UnsubscribeRaw",
        }
    }

    /// Invocation arguments: `[mapping, [variables...]]`.
    pub fn arguments(&self) -> Vec<JsonValue> {
        vec![
            JsonValue::String(self.mapping.clone()),
            JsonValue::Array(
                self.variables
                    .iter()
                    .map(|v| JsonValue::String(v.clone()))
                    .collect(),
            ),
        ]
    }
}

impl PartialEq for SubscriptionKey {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.mapping == other.mapping
            && self.variable_set() == other.variable_set()
    }
}

impl Eq for SubscriptionKey {}

impl Hash for SubscriptionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.mapping.hash(state);
        self.variable_set().hash(state);
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vars: Vec<&str> = self.variables.iter().map(String::as_str).collect();
        match self.kind {
            SubscriptionKind::Symbolic => write!(f, "{}[{}]", self.mapping, vars.join(",")),
            SubscriptionKind::Raw => write!(f, "raw:{}[{}]", self.mapping, vars.join(",")),
        }
    }
}
