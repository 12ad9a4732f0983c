use chrono::{NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

// ─── Per-table state machine ──────────────────────────────────────────────────

/// Lifecycle of one table's transfer. Transitions are strictly
/// `Idle → SchemaResolved → Streaming → (Completed | Aborted)`; the terminal
/// state is recorded in the table's [`TableOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferState {
    Idle,
    SchemaResolved,
    Streaming,
    Completed,
    Aborted,
}

// ─── Outcomes ─────────────────────────────────────────────────────────────────

/// Terminal result of one table's transfer.
#[derive(Debug, Clone, Serialize)]
pub enum TableOutcome {
    Completed {
        rows_copied: u64,
        batches: usize,
    },
    /// Prior committed batches remain in the target; `last_offset` is the
    /// cursor offset of the last successfully committed row.
    Aborted {
        rows_copied: u64,
        last_offset: u64,
        error: String,
    },
    /// The job was cancelled before this table left `Idle`.
    Skipped,
}

impl TableOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TableOutcome::Completed { .. })
    }

    pub fn rows_copied(&self) -> u64 {
        match self {
            TableOutcome::Completed { rows_copied, .. }
            | TableOutcome::Aborted { rows_copied, .. } => *rows_copied,
            TableOutcome::Skipped => 0,
        }
    }
}

/// One table's entry in the final summary.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub table: String,
    pub outcome: TableOutcome,
}

/// Required output of any run: the per-table summary.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    /// Date whose salt governed this run, `YYYYMMDD`.
    pub salt_date: String,
    pub started_at: String,
    pub tables: Vec<TableReport>,
}

impl RunSummary {
    pub fn new(date: NaiveDate) -> Self {
        RunSummary {
            run_id: format!(
                "run_{}_{}",
                Utc::now().format("%Y%m%d_%H%M%S"),
                Uuid::new_v4().simple()
            ),
            salt_date: date.format("%Y%m%d").to_string(),
            started_at: Utc::now().to_rfc3339(),
            tables: Vec::new(),
        }
    }

    pub fn total_rows_copied(&self) -> u64 {
        self.tables.iter().map(|t| t.outcome.rows_copied()).sum()
    }

    pub fn failed_tables(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| matches!(t.outcome, TableOutcome::Aborted { .. }))
            .count()
    }
}
