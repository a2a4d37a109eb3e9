//! Conflict strategies and the conflict-file format.

use crate::error::ProtocolError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Policy for resolving regions edited on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Merge line-wise; unresolved regions fall back to the local side.
    #[default]
    ThreeWayMerge,
    /// The local side wins every conflicting region.
    LocalWins,
    /// The remote side wins every conflicting region.
    RemoteWins,
    /// Nothing is resolved; both versions go to a `.conflict` sibling file.
    ConflictFile,
}

impl ConflictStrategy {
    /// Returns the configuration name of this strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::ThreeWayMerge => "three-way-merge",
            ConflictStrategy::LocalWins => "local-wins",
            ConflictStrategy::RemoteWins => "remote-wins",
            ConflictStrategy::ConflictFile => "conflict-file",
        }
    }

    /// Returns true if conflicting regions are settled automatically.
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, ConflictStrategy::ConflictFile)
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "three-way-merge" => Ok(ConflictStrategy::ThreeWayMerge),
            "local-wins" => Ok(ConflictStrategy::LocalWins),
            "remote-wins" => Ok(ConflictStrategy::RemoteWins),
            "conflict-file" => Ok(ConflictStrategy::ConflictFile),
            other => Err(ProtocolError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Renders the contents of a `.conflict` file holding both versions.
pub fn format_conflict_file(
    path: &str,
    local: &str,
    remote: &str,
    detected_at: DateTime<Utc>,
) -> String {
    [
        format!("# Sync Conflict: {path}"),
        format!(
            "# Detected: {}",
            detected_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        ),
        "# Resolve by keeping one version and deleting this file.".to_string(),
        String::new(),
        "## Local Version".to_string(),
        String::new(),
        local.to_string(),
        String::new(),
        "## Remote Version".to_string(),
        String::new(),
        remote.to_string(),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn strategy_names() {
        for strategy in [
            ConflictStrategy::ThreeWayMerge,
            ConflictStrategy::LocalWins,
            ConflictStrategy::RemoteWins,
            ConflictStrategy::ConflictFile,
        ] {
            assert_eq!(strategy.as_str().parse::<ConflictStrategy>(), Ok(strategy));
        }
        assert!("notion-wins".parse::<ConflictStrategy>().is_err());
        assert_eq!(ConflictStrategy::default(), ConflictStrategy::ThreeWayMerge);
    }

    #[test]
    fn serde_uses_kebab_case() {
        let json = serde_json::to_string(&ConflictStrategy::ConflictFile).unwrap();
        assert_eq!(json, "\"conflict-file\"");
        let parsed: ConflictStrategy = serde_json::from_str("\"remote-wins\"").unwrap();
        assert_eq!(parsed, ConflictStrategy::RemoteWins);
    }

    #[test]
    fn only_conflict_file_defers() {
        assert!(ConflictStrategy::LocalWins.auto_resolves());
        assert!(!ConflictStrategy::ConflictFile.auto_resolves());
    }

    #[test]
    fn conflict_file_layout() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let out = format_conflict_file("docs/test.md", "local ver", "remote ver", at);
        assert!(out.starts_with("# Sync Conflict: docs/test.md\n# Detected: 2024-05-01T12:30:00.000Z\n"));
        let local_at = out.find("## Local Version").unwrap();
        let remote_at = out.find("## Remote Version").unwrap();
        assert!(local_at < remote_at);
        assert!(out[local_at..remote_at].contains("local ver"));
        assert!(out[remote_at..].contains("remote ver"));
    }
}
