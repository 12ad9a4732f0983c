use std::sync::Mutex;
use tracing::{debug, info};

use crate::domain::audit::AuditRecord;
use crate::domain::ports::{AuditSink, ProgressSink};
use crate::domain::value_objects::TableName;

// ─── Audit sinks ──────────────────────────────────────────────────────────────

/// Default audit sink: emits every record as a structured debug event. The
/// tracing subscriber (e.g. a dated log file appender set up by the caller)
/// owns persistence.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        debug!(
            table = %record.table,
            column = %record.column,
            before = %record.before,
            after = %record.after,
            batch = record.batch_index,
            rows = record.row_count,
            "sample"
        );
    }
}

/// Collecting sink for the CLI's `--verbose` sample table, tests and other
/// programmatic consumers.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}

// ─── Progress sinks ───────────────────────────────────────────────────────────

/// Default progress sink: one info event per committed batch.
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn batch_committed(&self, table: &TableName, batch_index: usize, rows: usize, total: u64) {
        info!(
            table = %table.0,
            batch = batch_index,
            rows,
            total,
            "batch committed"
        );
    }
}

/// Progress sink that reports nothing.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn batch_committed(&self, _table: &TableName, _batch_index: usize, _rows: usize, _total: u64) {}
}
