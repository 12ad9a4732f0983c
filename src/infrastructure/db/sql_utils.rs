use crate::domain::value_objects::{ColumnSchema, RowMap, Schema, TableName};
use crate::infrastructure::db::dialect::QueryDialect;

// ─────────────────────────────────────────────────────────────────────────────
// Read-side builders
// ─────────────────────────────────────────────────────────────────────────────

/// Build a `SELECT * FROM <schema>.<table> [WHERE <filter>]` query.
/// Used for SQLite, where AnyRow decodes all storage classes natively and no
/// per-column cast is needed.
pub fn build_plain_select(
    schema: &Schema,
    table: &TableName,
    filter: Option<&str>,
    dialect: &dyn QueryDialect,
) -> String {
    let prefix = dialect.schema_prefix(&schema.0);
    let table_q = dialect.quote_ident(&table.0);
    match filter {
        Some(pred) => format!("SELECT * FROM {}{} WHERE {}", prefix, table_q, pred),
        None => format!("SELECT * FROM {}{}", prefix, table_q),
    }
}

/// Build a typed SELECT where every column whose `information_schema.data_type`
/// is not natively supported by `sqlx::AnyRow` is wrapped in the dialect cast
/// expression (e.g. `::TEXT` for PostgreSQL, `CONVERT(… USING utf8mb4)` for
/// MySQL). The filter predicate, when present, is appended verbatim — it comes
/// from the job configuration, not from user input at runtime.
pub fn build_typed_select(
    schema: &Schema,
    table: &TableName,
    columns: &[ColumnSchema],
    filter: Option<&str>,
    dialect: &dyn QueryDialect,
) -> String {
    let prefix = dialect.schema_prefix(&schema.0);
    let table_q = dialect.quote_ident(&table.0);

    let col_exprs: Vec<String> = columns
        .iter()
        .map(|col| {
            let q = dialect.quote_ident(&col.name);
            if dialect.is_native_type(&col.data_type) {
                q
            } else {
                dialect.cast_to_text(&q)
            }
        })
        .collect();

    let mut sql = format!("SELECT {} FROM {}{}", col_exprs.join(", "), prefix, table_q);
    if let Some(pred) = filter {
        sql.push_str(" WHERE ");
        sql.push_str(pred);
    }
    sql
}

/// Build a `SELECT COUNT(*)` with the same filter the cursor will use, so the
/// progress total matches what actually streams.
pub fn build_count(
    schema: &Schema,
    table: &TableName,
    filter: Option<&str>,
    dialect: &dyn QueryDialect,
) -> String {
    let prefix = dialect.schema_prefix(&schema.0);
    let table_q = dialect.quote_ident(&table.0);
    match filter {
        Some(pred) => format!("SELECT COUNT(*) FROM {}{} WHERE {}", prefix, table_q, pred),
        None => format!("SELECT COUNT(*) FROM {}{}", prefix, table_q),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Write-side builders
// ─────────────────────────────────────────────────────────────────────────────

/// Build the replica `CREATE TABLE IF NOT EXISTS`, with every source type
/// mapped through the dialect's widening table. Nullability is preserved;
/// keys, defaults and indexes are not — the replica is a data copy, not a
/// schema copy.
pub fn build_create_table(
    schema: &Schema,
    table: &TableName,
    columns: &[ColumnSchema],
    dialect: &dyn QueryDialect,
) -> String {
    let prefix = dialect.schema_prefix(&schema.0);
    let table_q = dialect.quote_ident(&table.0);

    let col_defs: Vec<String> = columns
        .iter()
        .map(|col| {
            let q = dialect.quote_ident(&col.name);
            let ty = dialect.target_column_type(&col.data_type);
            if col.is_nullable {
                format!("{} {}", q, ty)
            } else {
                format!("{} {} NOT NULL", q, ty)
            }
        })
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {}{} ({})",
        prefix,
        table_q,
        col_defs.join(", ")
    )
}

/// Build a multi-row INSERT for one batch. Values are rendered as dialect
/// literals; a column missing from a row map becomes NULL.
pub fn build_insert(
    schema: &Schema,
    table: &TableName,
    columns: &[ColumnSchema],
    rows: &[RowMap],
    dialect: &dyn QueryDialect,
) -> String {
    let prefix = dialect.schema_prefix(&schema.0);
    let table_q = dialect.quote_ident(&table.0);
    let col_list: Vec<String> = columns.iter().map(|c| dialect.quote_ident(&c.name)).collect();

    let tuples: Vec<String> = rows
        .iter()
        .map(|row| {
            let vals: Vec<String> = columns
                .iter()
                .map(|col| {
                    row.get(&col.name)
                        .map(|v| dialect.sql_literal(v))
                        .unwrap_or_else(|| "NULL".to_string())
                })
                .collect();
            format!("({})", vals.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO {}{} ({}) VALUES {}",
        prefix,
        table_q,
        col_list.join(", "),
        tuples.join(", ")
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
