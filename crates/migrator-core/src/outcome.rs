use std::fmt;

use chrono::{DateTime, Utc};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What happened to a migration during a run, or its state in a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Migrated,
    Reverted,
    /// Applied, but the file no longer matches the recorded fingerprint.
    Changed,
    Applied,
    Pending,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OutcomeStatus::Migrated => "migrate ok",
            OutcomeStatus::Reverted => "down ok",
            OutcomeStatus::Changed => "the migration file has been changed, attention!!!",
            OutcomeStatus::Applied => "Ok",
            OutcomeStatus::Pending => "No migrate",
        };
        f.write_str(label)
    }
}

/// One line of the result trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub name: String,
    pub status: OutcomeStatus,
    /// Only set in status listings.
    pub version: Option<i64>,
    pub applied_at: Option<DateTime<Utc>>,
}

impl Outcome {
    pub fn new(name: impl Into<String>, status: OutcomeStatus) -> Self {
        Self {
            name: name.into(),
            status,
            version: None,
            applied_at: None,
        }
    }

    pub fn version_label(&self) -> String {
        self.version
            .map_or_else(|| "-".to_string(), |v| v.to_string())
    }

    pub fn applied_at_label(&self) -> String {
        self.applied_at
            .map_or_else(|| "-".to_string(), |t| t.format(TIME_FORMAT).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_labels() {
        assert_eq!(OutcomeStatus::Migrated.to_string(), "migrate ok");
        assert_eq!(OutcomeStatus::Reverted.to_string(), "down ok");
        assert_eq!(OutcomeStatus::Pending.to_string(), "No migrate");
        assert!(OutcomeStatus::Changed.to_string().contains("has been changed"));
    }

    #[test]
    fn labels_fall_back_to_dash() {
        let mut outcome = Outcome::new("a.sql", OutcomeStatus::Pending);
        assert_eq!(outcome.version_label(), "-");
        assert_eq!(outcome.applied_at_label(), "-");

        outcome.version = Some(3);
        outcome.applied_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 5).unwrap());
        assert_eq!(outcome.version_label(), "3");
        assert_eq!(outcome.applied_at_label(), "2024-01-01 12:30:05");
    }
}
