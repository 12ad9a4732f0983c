use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::ports::{RowCursor, RowSink, RowSource};
use crate::domain::value_objects::{ColumnSchema, RowMap, Schema, TableName};
use crate::infrastructure::config::DbConfig;
use crate::infrastructure::db::dialect::{from_driver, Dialect};
use crate::infrastructure::db::row_mapper::row_to_map;
use crate::infrastructure::db::sql_utils::{
    build_count, build_create_table, build_insert, build_plain_select, build_typed_select,
};

/// Rows per INSERT statement inside a batch transaction. Keeps statements
/// under the packet/parameter limits of every supported driver while the
/// batch as a whole still commits atomically.
const INSERT_CHUNK: usize = 500;

/// Depth of the cursor channel, in batches. One batch in flight while the
/// previous one is being transformed is all the lookahead we need.
const CURSOR_DEPTH: usize = 2;

pub struct SqlxRowSource {
    pool: AnyPool,
    dialect: Arc<dyn Dialect>,
    batch_size: usize,
}

pub struct SqlxRowSink {
    pool: AnyPool,
    dialect: Arc<dyn Dialect>,
}

/// Connect to the source database described in `cfg`.
pub async fn connect_source(cfg: &DbConfig, batch_size: usize) -> Result<SqlxRowSource> {
    let (pool, dialect) = connect(cfg).await?;
    Ok(SqlxRowSource {
        pool,
        dialect,
        batch_size,
    })
}

/// Connect to the target database described in `cfg`.
pub async fn connect_target(cfg: &DbConfig) -> Result<SqlxRowSink> {
    let (pool, dialect) = connect(cfg).await?;
    Ok(SqlxRowSink { pool, dialect })
}

async fn connect(cfg: &DbConfig) -> Result<(AnyPool, Arc<dyn Dialect>)> {
    sqlx::any::install_default_drivers();

    let pool = AnyPoolOptions::new()
        .max_connections(5)
        .connect(&cfg.url())
        .await
        .with_context(|| {
            format!(
                "Failed to connect to {} (driver: {})",
                cfg.dbname, cfg.driver
            )
        })?;

    debug!(
        "Connected to {}/{} via {} driver",
        cfg.host, cfg.dbname, cfg.driver
    );

    Ok((pool, Arc::from(from_driver(&cfg.driver))))
}

/// Read a column from an AnyRow as String, handling MySQL's habit of returning
/// information_schema string columns as BLOB to sqlx AnyRow.
fn blob_or_string(row: &sqlx::any::AnyRow, idx: usize) -> Result<String> {
    use sqlx::{Column, Row, TypeInfo};
    let type_name = row.column(idx).type_info().name();
    if type_name == "BLOB" {
        let bytes: Vec<u8> = row.try_get(idx)?;
        String::from_utf8(bytes).context("column bytes are not valid UTF-8")
    } else {
        Ok(row.try_get(idx)?)
    }
}

fn select_for(
    schema: &Schema,
    table: &TableName,
    columns: &[ColumnSchema],
    filter: Option<&str>,
    dialect: &dyn Dialect,
) -> String {
    // Dialects with information_schema introspection (Postgres, MySQL,
    // MariaDB) use a typed SELECT where unsupported column types are cast to
    // text, and the mapper reconstructs the correct Value variant from the
    // type hint. SQLite's loose affinity means AnyRow decodes all storage
    // classes natively, so SELECT * suffices.
    if dialect.needs_introspection() {
        build_typed_select(schema, table, columns, filter, dialect)
    } else {
        build_plain_select(schema, table, filter, dialect)
    }
}

/// Cursor backed by a reader task. The task owns the query string and a pool
/// handle, streams rows off the wire, and sends decoded maps over a bounded
/// channel — so the cursor itself carries no borrow of the query.
struct ChannelCursor {
    rx: mpsc::Receiver<Result<Vec<RowMap>>>,
    /// Rows received from the reader but not yet handed out; the reader's
    /// batch size may exceed the caller's `max`.
    pending: Vec<RowMap>,
    done: bool,
}

#[async_trait]
impl RowCursor for ChannelCursor {
    async fn next_batch(&mut self, max: usize) -> Result<Vec<RowMap>> {
        let max = max.max(1);
        if self.pending.is_empty() && !self.done {
            match self.rx.recv().await {
                Some(Ok(batch)) => self.pending = batch,
                Some(Err(e)) => {
                    self.done = true;
                    return Err(e);
                }
                None => self.done = true,
            }
        }
        if self.pending.len() > max {
            let rest = self.pending.split_off(max);
            return Ok(std::mem::replace(&mut self.pending, rest));
        }
        Ok(std::mem::take(&mut self.pending))
    }
}

#[async_trait]
impl RowSource for SqlxRowSource {
    async fn column_schema(
        &self,
        schema: &Schema,
        table: &TableName,
    ) -> Result<Vec<ColumnSchema>> {
        let sql = self.dialect.introspect_sql();
        let query = if self.dialect.binds_schema() {
            sqlx::query(sql).bind(&schema.0).bind(&table.0)
        } else {
            sqlx::query(sql).bind(&table.0)
        };
        let rows = query.fetch_all(&self.pool).await.with_context(|| {
            format!("Failed to fetch column schema for {}.{}", schema.0, table.0)
        })?;

        let mut cols = Vec::with_capacity(rows.len());
        for row in &rows {
            // MySQL/MariaDB returns information_schema strings as BLOB — handle both.
            cols.push(ColumnSchema {
                name: blob_or_string(row, 0)?,
                data_type: blob_or_string(row, 1)?,
                is_nullable: blob_or_string(row, 2)?.eq_ignore_ascii_case("yes"),
            });
        }
        Ok(cols)
    }

    async fn count_rows(
        &self,
        schema: &Schema,
        table: &TableName,
        filter: Option<&str>,
    ) -> Result<u64> {
        use sqlx::Row;
        let sql = build_count(schema, table, filter, self.dialect.as_ref());
        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count {}.{}", schema.0, table.0))?;
        let n: i64 = row.try_get(0)?;
        Ok(n.max(0) as u64)
    }

    async fn open_cursor(
        &self,
        schema: &Schema,
        table: &TableName,
        columns: &[ColumnSchema],
        filter: Option<&str>,
    ) -> Result<Box<dyn RowCursor>> {
        let sql = select_for(schema, table, columns, filter, self.dialect.as_ref());
        debug!("Streaming: {}", sql);

        let type_map: BTreeMap<String, String> = columns
            .iter()
            .map(|c| (c.name.clone(), c.data_type.clone()))
            .collect();

        let pool = self.pool.clone();
        let dialect = Arc::clone(&self.dialect);
        let batch_size = self.batch_size;
        let (tx, rx) = mpsc::channel(CURSOR_DEPTH);

        tokio::spawn(async move {
            let mut stream = sqlx::query(&sql).fetch(&pool);
            let mut batch = Vec::with_capacity(batch_size);
            while let Some(item) = stream.next().await {
                match item
                    .map_err(anyhow::Error::from)
                    .and_then(|row| row_to_map(&row, &type_map, dialect.as_ref()))
                {
                    Ok(map) => {
                        batch.push(map);
                        if batch.len() >= batch_size {
                            let full = std::mem::replace(
                                &mut batch,
                                Vec::with_capacity(batch_size),
                            );
                            if tx.send(Ok(full)).await.is_err() {
                                return; // consumer dropped the cursor
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
            if !batch.is_empty() {
                let _ = tx.send(Ok(batch)).await;
            }
        });

        Ok(Box::new(ChannelCursor {
            rx,
            pending: Vec::new(),
            done: false,
        }))
    }

    async fn fetch_reference_values(
        &self,
        schema: &Schema,
        table: &TableName,
        column: &str,
    ) -> Result<Vec<String>> {
        let d = self.dialect.as_ref();
        let col_q = d.quote_ident(column);
        let sql = format!(
            "SELECT DISTINCT {} FROM {}{} WHERE {} IS NOT NULL",
            d.cast_to_text(&col_q),
            d.schema_prefix(&schema.0),
            d.quote_ident(&table.0),
            col_q,
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await.with_context(|| {
            format!(
                "Failed to fetch reference values from {}.{}.{}",
                schema.0, table.0, column
            )
        })?;

        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            values.push(blob_or_string(row, 0)?);
        }
        Ok(values)
    }
}

#[async_trait]
impl RowSink for SqlxRowSink {
    async fn prepare_table(
        &self,
        schema: &Schema,
        table: &TableName,
        columns: &[ColumnSchema],
    ) -> Result<()> {
        let d = self.dialect.as_ref();
        let create = build_create_table(schema, table, columns, d);
        debug!("Preparing: {}", create);
        sqlx::query(&create)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to create {}.{}", schema.0, table.0))?;

        // Re-runs replace, never append. DELETE rather than TRUNCATE: it works
        // on every supported driver and respects an open transaction if the
        // pool ever wraps one around us.
        let clear = format!(
            "DELETE FROM {}{}",
            d.schema_prefix(&schema.0),
            d.quote_ident(&table.0)
        );
        sqlx::query(&clear)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to clear {}.{}", schema.0, table.0))?;
        Ok(())
    }

    async fn write_batch(
        &self,
        schema: &Schema,
        table: &TableName,
        columns: &[ColumnSchema],
        rows: &[RowMap],
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .with_context(|| format!("Failed to open transaction for {}.{}", schema.0, table.0))?;

        for chunk in rows.chunks(INSERT_CHUNK) {
            let insert = build_insert(schema, table, columns, chunk, self.dialect.as_ref());
            sqlx::query(&insert)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to insert into {}.{}", schema.0, table.0))?;
        }

        tx.commit()
            .await
            .with_context(|| format!("Failed to commit batch for {}.{}", schema.0, table.0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(n: usize) -> Vec<RowMap> {
        (0..n)
            .map(|i| {
                [("emp_no".to_string(), json!(format!("E{:03}", i)))]
                    .into_iter()
                    .collect()
            })
            .collect()
    }

    fn cursor_over(rx: mpsc::Receiver<Result<Vec<RowMap>>>) -> ChannelCursor {
        ChannelCursor {
            rx,
            pending: Vec::new(),
            done: false,
        }
    }

    #[tokio::test]
    async fn test_cursor_caps_batches_at_max() {
        let (tx, rx) = mpsc::channel(CURSOR_DEPTH);
        let mut cursor = cursor_over(rx);
        tx.send(Ok(rows(5))).await.unwrap();
        drop(tx);

        let first = cursor.next_batch(2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0]["emp_no"], json!("E000"));
        assert_eq!(cursor.next_batch(2).await.unwrap().len(), 2);
        let last = cursor.next_batch(2).await.unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0]["emp_no"], json!("E004"));
        assert!(cursor.next_batch(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cursor_drains_pending_after_reader_exits() {
        let (tx, rx) = mpsc::channel(CURSOR_DEPTH);
        let mut cursor = cursor_over(rx);
        tx.send(Ok(rows(3))).await.unwrap();
        drop(tx);

        assert_eq!(cursor.next_batch(10).await.unwrap().len(), 3);
        assert!(cursor.next_batch(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cursor_spans_reader_batches() {
        let (tx, rx) = mpsc::channel(CURSOR_DEPTH);
        let mut cursor = cursor_over(rx);
        tx.send(Ok(rows(2))).await.unwrap();
        tx.send(Ok(rows(2))).await.unwrap();
        drop(tx);

        // Caller asks for more than one reader batch holds: it gets the
        // buffered rows now and the next reader batch on the next call.
        assert_eq!(cursor.next_batch(3).await.unwrap().len(), 2);
        assert_eq!(cursor.next_batch(3).await.unwrap().len(), 2);
        assert!(cursor.next_batch(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cursor_surfaces_reader_error_then_ends() {
        let (tx, rx) = mpsc::channel(CURSOR_DEPTH);
        let mut cursor = cursor_over(rx);
        tx.send(Err(anyhow::anyhow!("connection reset"))).await.unwrap();
        drop(tx);

        assert!(cursor.next_batch(5).await.is_err());
        assert!(cursor.next_batch(5).await.unwrap().is_empty());
    }
}
