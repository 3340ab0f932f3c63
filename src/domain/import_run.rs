// ============================================================
// IMPORT RUN
// ============================================================
// Persisted record tracking one upload-to-completion cycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of an import run.
///
/// Runs advance pending → parsing → validating → processing → completed.
/// The terminal failed and cancelled states may be entered from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Pending,
    Parsing,
    Validating,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "pending",
            ImportStatus::Parsing => "parsing",
            ImportStatus::Validating => "validating",
            ImportStatus::Processing => "processing",
            ImportStatus::Completed => "completed",
            ImportStatus::Failed => "failed",
            ImportStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ImportStatus::Pending),
            "parsing" => Some(ImportStatus::Parsing),
            "validating" => Some(ImportStatus::Validating),
            "processing" => Some(ImportStatus::Processing),
            "completed" => Some(ImportStatus::Completed),
            "failed" => Some(ImportStatus::Failed),
            "cancelled" => Some(ImportStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportStatus::Completed | ImportStatus::Failed | ImportStatus::Cancelled
        )
    }

    /// Whether the run may move from `self` to `next`.
    pub fn can_transition_to(&self, next: ImportStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            ImportStatus::Failed | ImportStatus::Cancelled => true,
            ImportStatus::Pending => false,
            ImportStatus::Parsing => *self == ImportStatus::Pending,
            ImportStatus::Validating => *self == ImportStatus::Parsing,
            ImportStatus::Processing => *self == ImportStatus::Validating,
            ImportStatus::Completed => *self == ImportStatus::Processing,
        }
    }
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One upload-to-completion cycle, as persisted in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRun {
    pub id: i64,
    pub user_id: i64,
    pub filename: String,
    pub original_filename: String,
    pub file_size: i64,
    pub total_rows: i64,
    pub processed_rows: i64,
    pub successful_rows: i64,
    pub failed_rows: i64,
    pub status: ImportStatus,
    pub error_log: Vec<RowFailure>,
    pub created_pages: Vec<CreatedPageRef>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Reference to one page created by a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedPageRef {
    pub page_id: i64,
    pub title: String,
    pub slug: String,
    pub row_number: usize,
}

/// One row that failed during validation or creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowFailure {
    pub row_number: usize,
    pub error: String,
    /// Original field values of the failed row, for later inspection
    pub data: std::collections::HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ImportStatus::Pending,
            ImportStatus::Parsing,
            ImportStatus::Validating,
            ImportStatus::Processing,
            ImportStatus::Completed,
            ImportStatus::Failed,
            ImportStatus::Cancelled,
        ] {
            assert_eq!(ImportStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ImportStatus::parse("bogus"), None);
    }

    #[test]
    fn test_transitions_are_monotonic() {
        assert!(ImportStatus::Pending.can_transition_to(ImportStatus::Parsing));
        assert!(ImportStatus::Parsing.can_transition_to(ImportStatus::Validating));
        assert!(ImportStatus::Validating.can_transition_to(ImportStatus::Processing));
        assert!(ImportStatus::Processing.can_transition_to(ImportStatus::Completed));

        assert!(!ImportStatus::Pending.can_transition_to(ImportStatus::Processing));
        assert!(!ImportStatus::Processing.can_transition_to(ImportStatus::Parsing));
        assert!(!ImportStatus::Validating.can_transition_to(ImportStatus::Pending));
    }

    #[test]
    fn test_terminal_states_reachable_from_any_live_state() {
        for live in [
            ImportStatus::Pending,
            ImportStatus::Parsing,
            ImportStatus::Validating,
            ImportStatus::Processing,
        ] {
            assert!(live.can_transition_to(ImportStatus::Failed));
            assert!(live.can_transition_to(ImportStatus::Cancelled));
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [
            ImportStatus::Completed,
            ImportStatus::Failed,
            ImportStatus::Cancelled,
        ] {
            assert!(!terminal.can_transition_to(ImportStatus::Processing));
            assert!(!terminal.can_transition_to(ImportStatus::Failed));
        }
    }
}
