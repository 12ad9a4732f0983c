use anyhow::Result;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::application::anonymizer::Anonymizer;
use crate::domain::audit::AuditRecord;
use crate::domain::job::{ReplicationJob, TableSpec, ValueErrorPolicy};
use crate::domain::ports::{AuditSink, ProgressSink, RowSink, RowSource};
use crate::domain::summary::{RunSummary, TableOutcome, TableReport, TransferState};
use crate::domain::value_objects::{RowMap, Schema, TableName};

/// Rows per batch when the configuration does not say otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    pub batch_size: usize,
    pub on_value_error: ValueErrorPolicy,
}

impl Default for TransferOptions {
    fn default() -> Self {
        TransferOptions {
            batch_size: DEFAULT_BATCH_SIZE,
            on_value_error: ValueErrorPolicy::default(),
        }
    }
}

/// Streams rows source → target, one table at a time, pushing each row
/// through the anonymization engine and committing fixed-size batches
/// atomically.
///
/// Tables are strictly sequential: the target connection and the audit log
/// are shared, unsynchronized resources, and interleaving would make the
/// per-table summary ambiguous. Batches are produced and consumed in source
/// cursor order; a batch that fails to commit aborts its table (prior batches
/// stay committed) and the job moves on to the next table.
pub struct TransferEngine {
    source: Arc<dyn RowSource>,
    sink: Arc<dyn RowSink>,
    anonymizer: Arc<Anonymizer>,
    audit: Arc<dyn AuditSink>,
    progress: Arc<dyn ProgressSink>,
    options: TransferOptions,
    cancel: Arc<AtomicBool>,
}

impl TransferEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn RowSource>,
        sink: Arc<dyn RowSink>,
        anonymizer: Arc<Anonymizer>,
        audit: Arc<dyn AuditSink>,
        progress: Arc<dyn ProgressSink>,
        options: TransferOptions,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        TransferEngine {
            source,
            sink,
            anonymizer,
            audit,
            progress,
            options,
            cancel,
        }
    }

    /// Run the whole job and produce the per-table summary. Individual table
    /// failures are recorded, not propagated: unrelated tables are
    /// independent and a best-effort replica is more useful than none.
    pub async fn run(
        &self,
        source_schema: &Schema,
        target_schema: &Schema,
        job: &ReplicationJob,
        date: NaiveDate,
    ) -> RunSummary {
        let mut summary = RunSummary::new(date);

        for spec in &job.tables {
            let outcome = if self.cancel.load(Ordering::SeqCst) {
                info!(table = %spec.name, "cancellation requested, table skipped");
                TableOutcome::Skipped
            } else {
                self.transfer_table(source_schema, target_schema, spec).await
            };

            if let TableOutcome::Aborted { error, .. } = &outcome {
                warn!(table = %spec.name, error = %error, "table aborted");
            }
            summary.tables.push(TableReport {
                table: spec.name.clone(),
                outcome,
            });
        }

        info!(
            run_id = %summary.run_id,
            rows = summary.total_rows_copied(),
            failed = summary.failed_tables(),
            "job finished"
        );
        summary
    }

    /// Drive one table through `Idle → SchemaResolved → Streaming →
    /// (Completed | Aborted)`. Errors are folded into the outcome together
    /// with the state they occurred in and the affected offset range.
    #[instrument(skip(self, source_schema, target_schema, spec), fields(table = %spec.name))]
    async fn transfer_table(
        &self,
        source_schema: &Schema,
        target_schema: &Schema,
        spec: &TableSpec,
    ) -> TableOutcome {
        let table = TableName(spec.name.clone());
        let mut state = TransferState::Idle;

        // Idle → SchemaResolved
        let columns = match self.source.column_schema(source_schema, &table).await {
            Ok(cols) if !cols.is_empty() => cols,
            Ok(_) => return aborted(state, 0, "source table has no columns".to_string()),
            Err(e) => return aborted(state, 0, format!("schema resolution failed: {e:#}")),
        };
        if let Err(e) = self
            .sink
            .prepare_table(target_schema, &table, &columns)
            .await
        {
            return aborted(state, 0, format!("target table preparation failed: {e:#}"));
        }
        state = TransferState::SchemaResolved;

        let total = match self
            .source
            .count_rows(source_schema, &table, spec.filter.as_deref())
            .await
        {
            Ok(n) => n,
            Err(e) => return aborted(state, 0, format!("row count failed: {e:#}")),
        };

        // SchemaResolved → Streaming
        let mut cursor = match self
            .source
            .open_cursor(source_schema, &table, &columns, spec.filter.as_deref())
            .await
        {
            Ok(c) => c,
            Err(e) => return aborted(state, 0, format!("cursor open failed: {e:#}")),
        };
        state = TransferState::Streaming;
        info!(total, filter = spec.filter.as_deref().unwrap_or(""), "streaming started");

        let mut rows_copied: u64 = 0;
        let mut offset: u64 = 0;
        let mut batch_index: usize = 0;

        loop {
            let mut rows = match cursor.next_batch(self.options.batch_size).await {
                Ok(rows) => rows,
                Err(e) => {
                    return aborted(
                        state,
                        rows_copied,
                        format!("read failed after offset {offset}: {e:#}"),
                    )
                }
            };
            if rows.is_empty() {
                break;
            }

            let batch_start = offset;
            offset += rows.len() as u64;

            if let Err(e) = self.transform_batch(&mut rows, spec, &table, batch_start, batch_index)
            {
                return aborted(state, rows_copied, e);
            }

            if !rows.is_empty() {
                if let Err(e) = self
                    .sink
                    .write_batch(target_schema, &table, &columns, &rows)
                    .await
                {
                    return aborted(
                        state,
                        rows_copied,
                        format!(
                            "commit failed for batch {batch_index} (rows {batch_start}..{offset}): {e:#}"
                        ),
                    );
                }
                rows_copied += rows.len() as u64;
                self.progress
                    .batch_committed(&table, batch_index, rows.len(), total);
            }
            batch_index += 1;
        }

        // Streaming → Completed
        info!(rows = rows_copied, batches = batch_index, "table completed");
        TableOutcome::Completed {
            rows_copied,
            batches: batch_index,
        }
    }

    /// Anonymize every row of a batch in place and emit audit records for
    /// the sampled (first) row. A value-level error either fails the batch
    /// (abort-table policy) or drops the offending row (skip-row policy) —
    /// it never lets a raw value through.
    fn transform_batch(
        &self,
        rows: &mut Vec<RowMap>,
        spec: &TableSpec,
        table: &TableName,
        batch_start: u64,
        batch_index: usize,
    ) -> std::result::Result<(), String> {
        if spec.rules.is_empty() {
            return Ok(());
        }

        let row_count = rows.len();
        let mut dropped: Vec<usize> = Vec::new();

        for (i, row) in rows.iter_mut().enumerate() {
            let row_offset = batch_start + i as u64;
            match self.anonymizer.anonymize_row(row, &spec.rules, row_offset) {
                Ok(changes) => {
                    if i == 0 {
                        for change in changes {
                            self.audit.record(AuditRecord {
                                table: table.0.clone(),
                                column: change.column,
                                before: change.before,
                                after: change.after,
                                batch_index,
                                row_count,
                            });
                        }
                    }
                }
                Err(e) => match self.options.on_value_error {
                    ValueErrorPolicy::AbortTable => {
                        return Err(format!(
                            "value transform failed at offset {row_offset}: {e}"
                        ));
                    }
                    ValueErrorPolicy::SkipRow => {
                        warn!(offset = row_offset, error = %e, "row skipped");
                        dropped.push(i);
                    }
                },
            }
        }

        for &i in dropped.iter().rev() {
            rows.remove(i);
        }
        Ok(())
    }
}

fn aborted(state: TransferState, rows_copied: u64, error: String) -> TableOutcome {
    TableOutcome::Aborted {
        rows_copied,
        last_offset: rows_copied,
        error: format!("[{state:?}] {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::anonymizer::Anonymizer;
    use crate::application::audit::{MemoryAuditSink, NullProgress};
    use crate::domain::corpus::NameCorpus;
    use crate::domain::job::{ColumnRule, RuleKind};
    use crate::domain::ports::RowCursor;
    use crate::domain::salt::RunSalt;
    use crate::domain::value_objects::ColumnSchema;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    // ── In-memory fakes ──

    struct VecCursor {
        rows: Vec<RowMap>,
        cursor: usize,
        fail_read_at: Option<usize>,
    }

    #[async_trait]
    impl RowCursor for VecCursor {
        async fn next_batch(&mut self, max: usize) -> Result<Vec<RowMap>> {
            if let Some(at) = self.fail_read_at {
                if self.cursor >= at {
                    anyhow::bail!("connection reset by peer");
                }
            }
            let end = (self.cursor + max).min(self.rows.len());
            let batch = self.rows[self.cursor..end].to_vec();
            self.cursor = end;
            Ok(batch)
        }
    }

    struct MemorySource {
        rows: Vec<RowMap>,
        columns: Vec<ColumnSchema>,
        fail_read_at: Option<usize>,
    }

    impl MemorySource {
        fn new(rows: Vec<RowMap>) -> Self {
            let columns = rows
                .first()
                .map(|r| {
                    r.keys()
                        .map(|name| ColumnSchema {
                            name: name.clone(),
                            data_type: "varchar".to_string(),
                            is_nullable: true,
                        })
                        .collect()
                })
                .unwrap_or_default();
            MemorySource {
                rows,
                columns,
                fail_read_at: None,
            }
        }

        /// The fake understands exactly one predicate shape: `col = 'value'`.
        fn filtered(&self, filter: Option<&str>) -> Vec<RowMap> {
            let Some(filter) = filter else {
                return self.rows.clone();
            };
            let Some((col, value)) = filter.split_once('=') else {
                return self.rows.clone();
            };
            let col = col.trim();
            let value = value.trim().trim_matches('\'');
            self.rows
                .iter()
                .filter(|r| r.get(col).and_then(Value::as_str) == Some(value))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl RowSource for MemorySource {
        async fn column_schema(
            &self,
            _schema: &Schema,
            _table: &TableName,
        ) -> Result<Vec<ColumnSchema>> {
            Ok(self.columns.clone())
        }

        async fn count_rows(
            &self,
            _schema: &Schema,
            _table: &TableName,
            filter: Option<&str>,
        ) -> Result<u64> {
            Ok(self.filtered(filter).len() as u64)
        }

        async fn open_cursor(
            &self,
            _schema: &Schema,
            _table: &TableName,
            _columns: &[ColumnSchema],
            filter: Option<&str>,
        ) -> Result<Box<dyn RowCursor>> {
            Ok(Box::new(VecCursor {
                rows: self.filtered(filter),
                cursor: 0,
                fail_read_at: self.fail_read_at,
            }))
        }

        async fn fetch_reference_values(
            &self,
            _schema: &Schema,
            _table: &TableName,
            _column: &str,
        ) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct MemorySink {
        tables: Mutex<BTreeMap<String, Vec<RowMap>>>,
        prepared: Mutex<Vec<String>>,
        batch_sizes: Mutex<BTreeMap<String, Vec<usize>>>,
        /// Fail the write of this batch index, per table.
        fail_on_batch: Option<usize>,
    }

    impl MemorySink {
        fn rows(&self, table: &str) -> Vec<RowMap> {
            self.tables
                .lock()
                .unwrap()
                .get(table)
                .cloned()
                .unwrap_or_default()
        }

        fn batches(&self, table: &str) -> Vec<usize> {
            self.batch_sizes
                .lock()
                .unwrap()
                .get(table)
                .cloned()
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl RowSink for MemorySink {
        async fn prepare_table(
            &self,
            _schema: &Schema,
            table: &TableName,
            _columns: &[ColumnSchema],
        ) -> Result<()> {
            self.prepared.lock().unwrap().push(table.0.clone());
            Ok(())
        }

        async fn write_batch(
            &self,
            _schema: &Schema,
            table: &TableName,
            _columns: &[ColumnSchema],
            rows: &[RowMap],
        ) -> Result<()> {
            let mut sizes = self.batch_sizes.lock().unwrap();
            let table_batches = sizes.entry(table.0.clone()).or_default();
            if Some(table_batches.len()) == self.fail_on_batch {
                anyhow::bail!("duplicate key value violates unique constraint");
            }
            table_batches.push(rows.len());
            self.tables
                .lock()
                .unwrap()
                .entry(table.0.clone())
                .or_default()
                .extend(rows.iter().cloned());
            Ok(())
        }
    }

    // ── Builders ──

    fn emp_row(i: usize) -> RowMap {
        [
            ("emp_no".to_string(), json!(format!("E{i:03}"))),
            ("emp_name".to_string(), json!("王小明")),
            ("tel".to_string(), json!("0912-345-678")),
            ("data_year".to_string(), json!(if i % 2 == 0 { "114" } else { "113" })),
        ]
        .into_iter()
        .collect()
    }

    fn rows(n: usize) -> Vec<RowMap> {
        (0..n).map(emp_row).collect()
    }

    fn anonymizer() -> Arc<Anonymizer> {
        let salt = RunSalt::derive(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        Arc::new(Anonymizer::new(Arc::new(NameCorpus::builtin()), salt))
    }

    fn spec(name: &str) -> TableSpec {
        TableSpec {
            name: name.to_string(),
            filter: None,
            rules: vec![
                ColumnRule {
                    column: "emp_name".to_string(),
                    kind: RuleKind::Name,
                    seed_column: Some("emp_no".to_string()),
                },
                ColumnRule {
                    column: "tel".to_string(),
                    kind: RuleKind::Phone,
                    seed_column: Some("emp_no".to_string()),
                },
            ],
        }
    }

    struct Harness {
        engine: TransferEngine,
        sink: Arc<MemorySink>,
        audit: Arc<MemoryAuditSink>,
        cancel: Arc<AtomicBool>,
    }

    fn harness(source: MemorySource, sink: MemorySink, options: TransferOptions) -> Harness {
        let sink = Arc::new(sink);
        let audit = Arc::new(MemoryAuditSink::new());
        let cancel = Arc::new(AtomicBool::new(false));
        let engine = TransferEngine::new(
            Arc::new(source),
            Arc::clone(&sink) as Arc<dyn RowSink>,
            anonymizer(),
            Arc::clone(&audit) as Arc<dyn AuditSink>,
            Arc::new(NullProgress),
            options,
            Arc::clone(&cancel),
        );
        Harness {
            engine,
            sink,
            audit,
            cancel,
        }
    }

    fn small_batches() -> TransferOptions {
        TransferOptions {
            batch_size: 5,
            on_value_error: ValueErrorPolicy::AbortTable,
        }
    }

    async fn run_job(h: &Harness, tables: Vec<TableSpec>) -> RunSummary {
        let job = ReplicationJob { tables };
        h.engine
            .run(
                &Schema("src".into()),
                &Schema("tgt".into()),
                &job,
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            )
            .await
    }

    // ── Batching arithmetic ──

    #[tokio::test]
    async fn test_batches_cover_all_rows_exactly_once() {
        // 12 rows, batch size 5 → ⌈12/5⌉ = 3 batches of 5, 5, 2.
        let h = harness(MemorySource::new(rows(12)), MemorySink::default(), small_batches());
        let summary = run_job(&h, vec![spec("emp_data")]).await;

        assert!(summary.tables[0].outcome.is_completed());
        assert_eq!(summary.tables[0].outcome.rows_copied(), 12);
        assert_eq!(h.sink.batches("emp_data"), vec![5, 5, 2]);

        let written = h.sink.rows("emp_data");
        let mut ids: Vec<&str> = written
            .iter()
            .map(|r| r["emp_no"].as_str().unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 12, "no duplicate or missing rows");
    }

    #[tokio::test]
    async fn test_exact_multiple_of_batch_size() {
        let h = harness(MemorySource::new(rows(10)), MemorySink::default(), small_batches());
        let summary = run_job(&h, vec![spec("emp_data")]).await;
        assert_eq!(h.sink.batches("emp_data"), vec![5, 5]);
        assert_eq!(summary.tables[0].outcome.rows_copied(), 10);
    }

    #[tokio::test]
    async fn test_empty_table_completes_with_zero_batches() {
        let mut src = MemorySource::new(rows(3));
        src.rows.clear();
        let h = harness(src, MemorySink::default(), small_batches());
        let summary = run_job(&h, vec![spec("emp_data")]).await;
        match &summary.tables[0].outcome {
            TableOutcome::Completed {
                rows_copied,
                batches,
            } => {
                assert_eq!(*rows_copied, 0);
                assert_eq!(*batches, 0);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    // ── Filter pushdown ──

    #[tokio::test]
    async fn test_filter_applied_at_source() {
        let h = harness(MemorySource::new(rows(10)), MemorySink::default(), small_batches());
        let mut table = spec("emp_data");
        table.filter = Some("data_year = '114'".to_string());
        let summary = run_job(&h, vec![table]).await;

        // Even offsets carry data_year 114: 5 of 10 rows.
        assert_eq!(summary.tables[0].outcome.rows_copied(), 5);
        assert!(h
            .sink
            .rows("emp_data")
            .iter()
            .all(|r| r["data_year"] == json!("114")));
    }

    // ── Anonymization is applied in transit ──

    #[tokio::test]
    async fn test_written_rows_are_anonymized() {
        let h = harness(MemorySource::new(rows(4)), MemorySink::default(), small_batches());
        run_job(&h, vec![spec("emp_data")]).await;

        for row in h.sink.rows("emp_data") {
            assert_ne!(row["emp_name"], json!("王小明"));
            assert_ne!(row["tel"], json!("0912-345-678"));
            // Phone keeps its separators in place.
            let tel = row["tel"].as_str().unwrap();
            assert_eq!(&tel[..5], "0912-");
        }
    }

    // ── Partial-failure isolation ──

    #[tokio::test]
    async fn test_commit_failure_keeps_prior_batches_and_next_table_runs() {
        let sink = MemorySink {
            fail_on_batch: Some(1),
            ..MemorySink::default()
        };
        let h = harness(MemorySource::new(rows(12)), sink, small_batches());
        let summary = run_job(&h, vec![spec("emp_data"), spec("dependent_data")]).await;

        match &summary.tables[0].outcome {
            TableOutcome::Aborted {
                rows_copied,
                last_offset,
                error,
            } => {
                assert_eq!(*rows_copied, 5, "batch 0 stays committed");
                assert_eq!(*last_offset, 5);
                assert!(error.contains("batch 1"), "{error}");
                assert!(error.contains("rows 5..10"), "{error}");
            }
            other => panic!("expected Aborted, got {other:?}"),
        }
        assert_eq!(h.sink.rows("emp_data").len(), 5);

        // fail_on_batch counts per table, so the second table hits it too —
        // what matters is that it *started* and committed its first batch.
        assert_eq!(h.sink.batches("dependent_data"), vec![5]);
    }

    #[tokio::test]
    async fn test_read_failure_aborts_table() {
        let mut src = MemorySource::new(rows(12));
        src.fail_read_at = Some(5);
        let h = harness(src, MemorySink::default(), small_batches());
        let summary = run_job(&h, vec![spec("emp_data")]).await;

        match &summary.tables[0].outcome {
            TableOutcome::Aborted { rows_copied, error, .. } => {
                assert_eq!(*rows_copied, 5);
                assert!(error.contains("read failed"), "{error}");
            }
            other => panic!("expected Aborted, got {other:?}"),
        }
    }

    // ── Value-error policies ──

    fn rows_with_bad_phone(n: usize, bad_at: usize) -> Vec<RowMap> {
        let mut all = rows(n);
        all[bad_at].insert("tel".to_string(), json!("n/a"));
        all
    }

    #[tokio::test]
    async fn test_value_error_aborts_table_by_default() {
        let h = harness(
            MemorySource::new(rows_with_bad_phone(8, 6)),
            MemorySink::default(),
            small_batches(),
        );
        let summary = run_job(&h, vec![spec("emp_data")]).await;

        match &summary.tables[0].outcome {
            TableOutcome::Aborted { rows_copied, error, .. } => {
                assert_eq!(*rows_copied, 5, "first batch already committed");
                assert!(error.contains("offset 6"), "{error}");
                assert!(error.contains("phone"), "{error}");
            }
            other => panic!("expected Aborted, got {other:?}"),
        }
        // The failing batch was never partially committed.
        assert_eq!(h.sink.rows("emp_data").len(), 5);
    }

    #[tokio::test]
    async fn test_value_error_skip_row_policy() {
        let options = TransferOptions {
            batch_size: 5,
            on_value_error: ValueErrorPolicy::SkipRow,
        };
        let h = harness(
            MemorySource::new(rows_with_bad_phone(8, 6)),
            MemorySink::default(),
            options,
        );
        let summary = run_job(&h, vec![spec("emp_data")]).await;

        assert!(summary.tables[0].outcome.is_completed());
        assert_eq!(summary.tables[0].outcome.rows_copied(), 7);
        assert_eq!(h.sink.batches("emp_data"), vec![5, 2]);
    }

    // ── Cancellation ──

    #[tokio::test]
    async fn test_cancel_before_run_skips_everything() {
        let h = harness(MemorySource::new(rows(5)), MemorySink::default(), small_batches());
        h.cancel.store(true, Ordering::SeqCst);
        let summary = run_job(&h, vec![spec("emp_data"), spec("dependent_data")]).await;

        assert!(summary
            .tables
            .iter()
            .all(|t| matches!(t.outcome, TableOutcome::Skipped)));
        assert!(h.sink.rows("emp_data").is_empty());
    }

    #[tokio::test]
    async fn test_cancel_between_tables() {
        struct CancellingProgress(Arc<AtomicBool>);
        impl ProgressSink for CancellingProgress {
            fn batch_committed(&self, _: &TableName, _: usize, _: usize, _: u64) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let sink = Arc::new(MemorySink::default());
        let cancel = Arc::new(AtomicBool::new(false));
        let engine = TransferEngine::new(
            Arc::new(MemorySource::new(rows(3))),
            Arc::clone(&sink) as Arc<dyn RowSink>,
            anonymizer(),
            Arc::new(MemoryAuditSink::new()),
            Arc::new(CancellingProgress(Arc::clone(&cancel))),
            small_batches(),
            Arc::clone(&cancel),
        );

        let job = ReplicationJob {
            tables: vec![spec("emp_data"), spec("dependent_data")],
        };
        let summary = engine
            .run(
                &Schema("src".into()),
                &Schema("tgt".into()),
                &job,
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            )
            .await;

        // The first table finishes (cancellation is only honored before a
        // table starts), the second never leaves Idle.
        assert!(summary.tables[0].outcome.is_completed());
        assert!(matches!(summary.tables[1].outcome, TableOutcome::Skipped));
        assert!(sink.rows("dependent_data").is_empty());
    }

    // ── Audit sampling ──

    #[tokio::test]
    async fn test_audit_one_record_per_column_per_batch() {
        let h = harness(MemorySource::new(rows(12)), MemorySink::default(), small_batches());
        run_job(&h, vec![spec("emp_data")]).await;

        let records = h.audit.records();
        // 3 batches × 2 rule columns, sampled from the first row of each.
        assert_eq!(records.len(), 6);
        for record in &records {
            assert_eq!(record.table, "emp_data");
            assert_ne!(record.before, record.after);
            assert!(record.row_count > 0);
        }
        assert_eq!(
            records
                .iter()
                .filter(|r| r.column == "emp_name")
                .map(|r| r.batch_index)
                .collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }
}
