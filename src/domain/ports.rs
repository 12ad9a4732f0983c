use crate::domain::{
    audit::AuditRecord,
    corpus::NameCorpus,
    value_objects::{ColumnSchema, Provenance, RowMap, Schema, TableName},
};
use anyhow::Result;
use async_trait::async_trait;

/// Port: forward-only stream of source rows (implemented by a channel-backed
/// cursor over a sqlx fetch stream). `next_batch` returns at most `max` rows;
/// an empty vec means the cursor is exhausted.
#[async_trait]
pub trait RowCursor: Send {
    async fn next_batch(&mut self, max: usize) -> Result<Vec<RowMap>>;
}

/// Port: read access to the source database (implemented by SqlxRowSource)
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Resolve column names, types and nullability for a table.
    async fn column_schema(&self, schema: &Schema, table: &TableName)
        -> Result<Vec<ColumnSchema>>;

    /// Count the rows the cursor will produce, honoring the filter.
    async fn count_rows(
        &self,
        schema: &Schema,
        table: &TableName,
        filter: Option<&str>,
    ) -> Result<u64>;

    /// Open a read cursor in source order. The filter predicate is pushed
    /// into the query, never applied client-side.
    async fn open_cursor(
        &self,
        schema: &Schema,
        table: &TableName,
        columns: &[ColumnSchema],
        filter: Option<&str>,
    ) -> Result<Box<dyn RowCursor>>;

    /// Distinct non-null values of a reference column, for corpus building.
    async fn fetch_reference_values(
        &self,
        schema: &Schema,
        table: &TableName,
        column: &str,
    ) -> Result<Vec<String>>;
}

/// Port: write access to the target database (implemented by SqlxRowSink)
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Create the target table if missing, with every text-bearing source
    /// type mapped to its wide-character equivalent.
    async fn prepare_table(
        &self,
        schema: &Schema,
        table: &TableName,
        columns: &[ColumnSchema],
    ) -> Result<()>;

    /// Write one batch inside a single transaction: all rows commit together
    /// or none do.
    async fn write_batch(
        &self,
        schema: &Schema,
        table: &TableName,
        columns: &[ColumnSchema],
        rows: &[RowMap],
    ) -> Result<()>;
}

/// Port: persistence of built name corpora, keyed by provenance.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    async fn load(&self, provenance: &Provenance) -> Result<Option<NameCorpus>>;
    async fn save(&self, corpus: &NameCorpus) -> Result<()>;
}

/// Port: consumer of before/after audit records. The collaborator owns
/// formatting and persistence; the core only emits.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Port: per-batch progress reporting, called after each committed batch.
pub trait ProgressSink: Send + Sync {
    fn batch_committed(&self, table: &TableName, batch_index: usize, rows: usize, total: u64);
}
