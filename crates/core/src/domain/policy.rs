// Delivery Policy

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the consumer orders "take from queue" and "persist".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// BLPOP then insert. A failed insert loses the payload.
    AtMostOnce,
    /// BLMOVE into a processing list, insert, then acknowledge.
    /// A failed insert moves the entry back to the head of the channel.
    #[default]
    AtLeastOnce,
}

impl fmt::Display for DeliveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryPolicy::AtMostOnce => write!(f, "at_most_once"),
            DeliveryPolicy::AtLeastOnce => write!(f, "at_least_once"),
        }
    }
}
