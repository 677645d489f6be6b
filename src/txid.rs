//! Client-side transaction identity.
//!
//! Transaction ids are minted before any network call so a flow can be
//! retried against the gateway and the backend under the same identity.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use std::fmt;

const RANDOM_SUFFIX_LEN: usize = 6;

/// Collision-resistant client-generated transaction identifier.
///
/// Minted once per purchase attempt; a regeneration of an existing order's
/// transaction reuses the id supplied by the caller instead of minting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientTxnId(String);

impl ClientTxnId {
    /// Wraps an existing identifier (regeneration path).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientTxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generates a fresh transaction id: millisecond timestamp plus a short
/// random alphanumeric suffix.
pub fn generate() -> ClientTxnId {
    let millis = Utc::now().timestamp_millis();
    let suffix: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(char::from)
        .collect();
    ClientTxnId(format!("{}{}", millis, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_ids_are_unique() {
        let ids: HashSet<String> = (0..1000)
            .map(|_| generate().as_str().to_string())
            .collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn generated_id_embeds_a_plausible_timestamp() {
        let id = generate();
        let millis: i64 = id.as_str()[..13].parse().expect("timestamp prefix");
        let now = Utc::now().timestamp_millis();
        assert!((now - millis).abs() < 5_000);
    }

    #[test]
    fn wrapped_id_round_trips() {
        let id = ClientTxnId::new("1700000000000abc123");
        assert_eq!(id.as_str(), "1700000000000abc123");
        assert_eq!(id.to_string(), "1700000000000abc123");
    }
}
