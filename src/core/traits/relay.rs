use serde::{Deserialize, Serialize};

use crate::core::errors::Result;

/// Payload of a retrieval request as it appears on the cross-context
/// channel. Every field is attacker-controlled; the receiver validates the
/// tag and the integrity hash before trusting anything.
///
/// Wire field names match what the injected program sends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    #[serde(rename = "sourceScript")]
    pub sender_tag: Option<String>,
    #[serde(rename = "hash")]
    pub integrity_hash: Option<String>,
}

/// A message observed on the cross-context channel. The origin is attached
/// by the channel itself, not by the sender, so it is the one field the
/// receiver may rely on for filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub origin: Option<String>,
    pub request: Option<RelayRequest>,
}

/// The trusted side's answer: one secret value, tagged so the injected
/// program can tell it apart from unrelated messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretDelivery {
    #[serde(rename = "sourceScript")]
    pub sender_tag: String,
    #[serde(rename = "password")]
    pub secret: String,
}

/// Port for posting a delivery back across the channel, scoped to the
/// requesting context's origin.
pub trait ReplySink: Send + Sync {
    fn post(&self, target_origin: &str, delivery: SecretDelivery) -> Result<()>;
}
