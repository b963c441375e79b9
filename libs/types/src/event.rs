//! Transaction lifecycle events
//!
//! A transaction progresses through an ordered set of states. The derived
//! `Ord` on [`TxState`] is the total order used to decide whether a newly
//! observed event supersedes a buffered one: `Unknown` sits below every
//! real state, so anything observed later can replace it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a tracked transaction.
///
/// Variant order is significant: it defines how far along the lifecycle a
/// state is. A state `a` is a regression relative to `b` iff `a < b`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum TxState {
    /// Bottom state: never reported by the chain, used for empty slots.
    #[default]
    Unknown,
    Submitted,
    Proving,
    Verifying,
    Complete,
}

impl From<String> for TxState {
    fn from(s: String) -> Self {
        TxState::parse(&s)
    }
}

impl TxState {
    /// Lowercase wire/CSS name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            TxState::Unknown => "unknown",
            TxState::Submitted => "submitted",
            TxState::Proving => "proving",
            TxState::Verifying => "verifying",
            TxState::Complete => "complete",
        }
    }

    /// Parse a state name, case-insensitively. Unrecognized names map to
    /// `Unknown` rather than failing: the storage layer may report states
    /// this binary does not know about yet.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "submitted" => TxState::Submitted,
            "proving" => TxState::Proving,
            "verifying" => TxState::Verifying,
            "complete" => TxState::Complete,
            _ => TxState::Unknown,
        }
    }

    /// Human-readable label for rendering.
    pub fn label(&self) -> &'static str {
        match self {
            TxState::Unknown => "Unknown",
            TxState::Submitted => "Submitted",
            TxState::Proving => "Proving",
            TxState::Verifying => "Verifying",
            TxState::Complete => "Complete",
        }
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable fact about one transaction's observed state at a point in
/// time. The broadcaster treats `tx_id` as the entity identity and does not
/// interpret `prover_id` or `tag` beyond serializing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub state: TxState,
    pub tx_id: String,
    pub prover_id: String,
    #[serde(default)]
    pub tag: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Whether any of the searchable fields contains `needle`.
    pub fn matches(&self, needle: &str) -> bool {
        self.prover_id.contains(needle) || self.tx_id.contains(needle) || self.tag.contains(needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_order() {
        assert!(TxState::Unknown < TxState::Submitted);
        assert!(TxState::Submitted < TxState::Proving);
        assert!(TxState::Proving < TxState::Verifying);
        assert!(TxState::Verifying < TxState::Complete);
    }

    #[test]
    fn test_state_parse() {
        assert_eq!(TxState::parse("proving"), TxState::Proving);
        assert_eq!(TxState::parse("Verifying"), TxState::Verifying);
        assert_eq!(TxState::parse("COMPLETE"), TxState::Complete);
        assert_eq!(TxState::parse("garbage"), TxState::Unknown);
        assert_eq!(TxState::parse(""), TxState::Unknown);
    }

    #[test]
    fn test_event_deserialization() {
        let payload = r#"{
            "state": "proving",
            "tx_id": "9d4c5c7a",
            "prover_id": "prover-1",
            "tag": "starknet",
            "timestamp": "2024-03-01T12:30:45Z"
        }"#;
        let event: Event = serde_json::from_str(payload).unwrap();
        assert_eq!(event.state, TxState::Proving);
        assert_eq!(event.tx_id, "9d4c5c7a");
        assert_eq!(event.tag, "starknet");
    }

    #[test]
    fn test_event_deserialization_unknown_state() {
        let payload = r#"{
            "state": "archived",
            "tx_id": "9d4c5c7a",
            "prover_id": "prover-1",
            "timestamp": "2024-03-01T12:30:45Z"
        }"#;
        let event: Event = serde_json::from_str(payload).unwrap();
        assert_eq!(event.state, TxState::Unknown);
        assert_eq!(event.tag, "");
    }

    #[test]
    fn test_event_serialization_round_trip() {
        let event = Event {
            state: TxState::Complete,
            tx_id: "abc".into(),
            prover_id: "def".into(),
            tag: "polygon".into(),
            timestamp: "2024-03-01T12:30:45Z".parse().unwrap(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn test_event_matches() {
        let event = Event {
            state: TxState::Submitted,
            tx_id: "abc123".into(),
            prover_id: "prover-9".into(),
            tag: "starknet".into(),
            timestamp: Utc::now(),
        };
        assert!(event.matches("abc"));
        assert!(event.matches("prover-9"));
        assert!(event.matches("stark"));
        assert!(!event.matches("polygon"));
    }
}
