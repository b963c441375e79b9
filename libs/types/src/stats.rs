//! Dashboard statistics types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate counters shown at the top of the dashboard, together with
/// their change relative to the previous period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub registered_users: u64,
    pub proofs_generated: u64,
    #[serde(rename = "programs")]
    pub provers_deployed: u64,
    pub proofs_verified: u64,
    #[serde(default)]
    pub registered_users_delta: f64,
    #[serde(default)]
    pub proofs_generated_delta: f64,
    #[serde(rename = "programs_delta", default)]
    pub provers_deployed_delta: f64,
    #[serde(default)]
    pub proofs_verified_delta: f64,
}

/// Time range a stats query covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatsRange {
    #[default]
    #[serde(rename = "1w")]
    Week,
    #[serde(rename = "1m")]
    Month,
    #[serde(rename = "6m")]
    HalfYear,
    #[serde(rename = "1y")]
    Year,
}

impl StatsRange {
    /// All ranges the stats cache keeps warm.
    pub const ALL: [StatsRange; 4] = [
        StatsRange::Week,
        StatsRange::Month,
        StatsRange::HalfYear,
        StatsRange::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatsRange::Week => "1w",
            StatsRange::Month => "1m",
            StatsRange::HalfYear => "6m",
            StatsRange::Year => "1y",
        }
    }

    /// Parse a range query parameter, defaulting to one week.
    pub fn parse(s: &str) -> Self {
        match s {
            "1m" => StatsRange::Month,
            "6m" => StatsRange::HalfYear,
            "1y" => StatsRange::Year,
            _ => StatsRange::Week,
        }
    }
}

impl fmt::Display for StatsRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_parse() {
        assert_eq!(StatsRange::parse("1w"), StatsRange::Week);
        assert_eq!(StatsRange::parse("1m"), StatsRange::Month);
        assert_eq!(StatsRange::parse("6m"), StatsRange::HalfYear);
        assert_eq!(StatsRange::parse("1y"), StatsRange::Year);
        assert_eq!(StatsRange::parse(""), StatsRange::Week);
        assert_eq!(StatsRange::parse("2d"), StatsRange::Week);
    }

    #[test]
    fn test_stats_json_field_names() {
        let stats = Stats {
            registered_users: 1,
            proofs_generated: 2,
            provers_deployed: 3,
            proofs_verified: 4,
            ..Stats::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["registered_users"], 1);
        assert_eq!(json["programs"], 3);
        assert_eq!(json["programs_delta"], 0.0);
    }
}
