use anyhow::{Context, Result};
use serde_json::{json, Value};
use sqlx::any::AnyRow;
use sqlx::{Column, Row, TypeInfo};

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// SQL dialect: query building and literal formatting.
///
/// Implemented per driver. The interface is pure string manipulation with no
/// sqlx dependency, so it crosses the layer boundary cleanly.
pub trait QueryDialect: Send + Sync {
    /// Return the driver name as a lowercase string ("postgres", "mysql", …).
    /// Used for log context only — never for branching logic (use the other
    /// methods for that).
    fn name(&self) -> &'static str;

    /// Return `true` if this dialect supports `information_schema.columns`
    /// introspection, enabling the typed SELECT path.
    /// Defaults to `true`; override to `false` for SQLite (pragma-based).
    fn needs_introspection(&self) -> bool {
        true
    }

    /// Whether `introspect_sql` takes a schema bind before the table bind.
    /// SQLite's pragma only knows the table name.
    fn binds_schema(&self) -> bool {
        true
    }

    /// Quote an identifier (table, column, schema) per dialect.
    /// - MySQL / MariaDB → backtick: `` `col` ``
    /// - PostgreSQL / SQLite → double-quote: `"col"`
    fn quote_ident(&self, s: &str) -> String;

    /// Return the `schema.` prefix for a qualified table reference.
    /// SQLite has no schema namespace, so it returns `""`.
    fn schema_prefix(&self, schema: &str) -> String {
        format!("{}.", self.quote_ident(schema))
    }

    /// Produce the cast expression that coerces an unsupported column type to
    /// a string readable by `sqlx::AnyRow`.
    /// - PostgreSQL  : `"col"::TEXT AS "col"`
    /// - MySQL/MariaDB : `CONVERT(\`col\` USING utf8mb4) AS \`col\``
    fn cast_to_text(&self, col_quoted: &str) -> String;

    /// Return `true` if `data_type` (an `information_schema.data_type` value)
    /// is natively decodable by `sqlx::AnyRow` without any explicit cast.
    fn is_native_type(&self, data_type: &str) -> bool;

    /// The SQL to introspect column name, type, and nullability. Uses
    /// driver-appropriate placeholders ($1/$2 vs ?/?) and binds either
    /// (schema, table) or just (table), per `binds_schema`.
    fn introspect_sql(&self) -> &'static str;

    /// Map a source column type onto the type the replica table is created
    /// with. Anything text-bearing maps to an unbounded wide-character type:
    /// substituted names and addresses may be longer than the source column
    /// allowed, and source data may arrive from narrower charsets.
    fn target_column_type(&self, data_type: &str) -> &'static str {
        match data_type.to_lowercase().as_str() {
            "boolean" | "bool" => "BOOLEAN",
            "smallint" | "int2" | "tinyint" | "mediumint" | "int" | "int4" | "integer"
            | "bigint" | "int8" | "serial" | "bigserial" | "smallserial" => "BIGINT",
            "real" | "float" | "float4" | "double" | "float8" | "double precision" => {
                "DOUBLE PRECISION"
            }
            "numeric" | "decimal" | "money" | "smallmoney" => "NUMERIC",
            _ => self.wide_text_type(),
        }
    }

    /// The unbounded wide-character text type for this dialect.
    fn wide_text_type(&self) -> &'static str {
        "TEXT"
    }

    /// Escape a string for inclusion in a single-quoted literal. The default
    /// doubles quotes only; MySQL/MariaDB override to also double
    /// backslashes, which they treat as escape characters inside literals —
    /// a value ending in `\` would otherwise swallow the closing quote.
    fn escape_string(&self, s: &str) -> String {
        s.replace('\'', "''")
    }

    /// Format a JSON `Value` as an SQL literal for this dialect.
    /// - NULL          → `NULL`
    /// - Bool          → `TRUE` / `FALSE`
    /// - Number        → bare number
    /// - String        → `'escaped'`
    /// - Object/Array  → `'json'` with `::jsonb` cast on PostgreSQL only
    fn sql_literal(&self, val: &Value) -> String {
        match val {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => format!("'{}'", self.escape_string(s)),
            Value::Array(_) | Value::Object(_) => {
                let json_str = serde_json::to_string(val).unwrap_or_default();
                self.json_literal(&self.escape_string(&json_str))
            }
        }
    }

    /// Render a pre-serialised JSON string as a dialect-appropriate literal.
    /// Override in PostgreSQL to append `::jsonb`.
    fn json_literal(&self, json_str: &str) -> String {
        format!("'{}'", json_str)
    }
}

/// Row decoder: read a single `AnyRow` column into a `serde_json::Value`.
///
/// Implemented per driver. Lives in infrastructure only — callers outside
/// this module receive `Value`s, never raw `AnyRow`s.
pub trait RowDecoder: Send + Sync {
    /// Decode the column at `idx` using `type_hint` (an `information_schema`
    /// `data_type` string) to reconstruct the correct `Value` variant.
    fn decode_column(&self, row: &AnyRow, idx: usize, type_hint: &str) -> Result<Value>;
}

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL
// ─────────────────────────────────────────────────────────────────────────────

pub struct PostgresDialect;

impl QueryDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_ident(&self, s: &str) -> String {
        format!("\"{}\"", s.replace('"', "\"\""))
    }

    fn cast_to_text(&self, col_quoted: &str) -> String {
        format!("{}::TEXT AS {}", col_quoted, col_quoted)
    }

    fn is_native_type(&self, data_type: &str) -> bool {
        matches!(
            data_type.to_lowercase().as_str(),
            "boolean" | "smallint" | "integer" | "bigint" | "real" | "double precision"
        )
    }

    fn introspect_sql(&self) -> &'static str {
        "SELECT column_name::TEXT, data_type::TEXT, is_nullable::TEXT \
         FROM information_schema.columns \
         WHERE table_schema = $1 AND table_name = $2 \
         ORDER BY ordinal_position"
    }

    fn json_literal(&self, json_str: &str) -> String {
        format!("'{}'::jsonb", json_str)
    }
}

impl RowDecoder for PostgresDialect {
    fn decode_column(&self, row: &AnyRow, idx: usize, type_hint: &str) -> Result<Value> {
        col_to_json(row, idx, type_hint)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MySQL / MariaDB
// ─────────────────────────────────────────────────────────────────────────────

pub struct MysqlDialect;

impl QueryDialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_ident(&self, s: &str) -> String {
        format!("`{}`", s.replace('`', "``"))
    }

    fn cast_to_text(&self, col_quoted: &str) -> String {
        // CAST(col AS CHAR) and CONVERT(col USING utf8mb4) both return BLOB
        // to sqlx AnyRow — we detect BLOB in the mapper and read Vec<u8>.
        format!("CONVERT({} USING utf8mb4) AS {}", col_quoted, col_quoted)
    }

    fn is_native_type(&self, data_type: &str) -> bool {
        matches!(
            data_type.to_lowercase().as_str(),
            "int" | "mediumint" | "bigint" | "float" | "double"
        )
    }

    fn introspect_sql(&self) -> &'static str {
        "SELECT column_name, data_type, is_nullable \
         FROM information_schema.columns \
         WHERE table_schema = ? AND table_name = ? \
         ORDER BY ordinal_position"
    }

    fn escape_string(&self, s: &str) -> String {
        // Backslash first, or the doubled quotes would be re-escaped.
        s.replace('\\', "\\\\").replace('\'', "''")
    }

    fn wide_text_type(&self) -> &'static str {
        // CJK names and addresses need the 4-byte charset; utf8mb3 truncates.
        "LONGTEXT CHARACTER SET utf8mb4"
    }
    // json_literal: default (no ::jsonb cast)
}

impl RowDecoder for MysqlDialect {
    fn decode_column(&self, row: &AnyRow, idx: usize, type_hint: &str) -> Result<Value> {
        // MySQL returns non-native columns as BLOB regardless of any SQL cast.
        // Detect at runtime and read raw bytes, then reinterpret using the type hint.
        let anyrow_type = row.column(idx).type_info().name();
        if anyrow_type == "BLOB" {
            blob_to_json(row, idx, type_hint)
        } else {
            col_to_json(row, idx, type_hint)
        }
    }
}

// MariaDB shares MySQL's wire protocol and AnyRow behaviour.
pub struct MariadbDialect;

impl QueryDialect for MariadbDialect {
    fn name(&self) -> &'static str {
        "mariadb"
    }

    fn quote_ident(&self, s: &str) -> String {
        MysqlDialect.quote_ident(s)
    }

    fn cast_to_text(&self, col_quoted: &str) -> String {
        MysqlDialect.cast_to_text(col_quoted)
    }

    fn is_native_type(&self, data_type: &str) -> bool {
        MysqlDialect.is_native_type(data_type)
    }

    fn introspect_sql(&self) -> &'static str {
        MysqlDialect.introspect_sql()
    }

    fn escape_string(&self, s: &str) -> String {
        MysqlDialect.escape_string(s)
    }

    fn wide_text_type(&self) -> &'static str {
        MysqlDialect.wide_text_type()
    }
}

impl RowDecoder for MariadbDialect {
    fn decode_column(&self, row: &AnyRow, idx: usize, type_hint: &str) -> Result<Value> {
        MysqlDialect.decode_column(row, idx, type_hint)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite
// ─────────────────────────────────────────────────────────────────────────────

pub struct SqliteDialect;

impl QueryDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn needs_introspection(&self) -> bool {
        false
    }

    fn binds_schema(&self) -> bool {
        false
    }

    fn quote_ident(&self, s: &str) -> String {
        format!("\"{}\"", s.replace('"', "\"\""))
    }

    fn schema_prefix(&self, _schema: &str) -> String {
        // SQLite has no schema namespace
        String::new()
    }

    fn cast_to_text(&self, col_quoted: &str) -> String {
        format!("CAST({} AS TEXT) AS {}", col_quoted, col_quoted)
    }

    fn is_native_type(&self, data_type: &str) -> bool {
        // SQLite uses type affinity — all common storage classes are native.
        matches!(
            data_type.to_uppercase().as_str(),
            "INTEGER" | "INT" | "REAL" | "NUMERIC" | "TEXT" | "BLOB"
        )
    }

    fn introspect_sql(&self) -> &'static str {
        // No information_schema; the pragma reports (name, type, notnull, …).
        // Column order and nullability-encoding differ from the standard path,
        // the client normalizes both.
        "SELECT name, type, CASE \"notnull\" WHEN 0 THEN 'YES' ELSE 'NO' END \
         FROM pragma_table_info(?)"
    }
    // json_literal: default (no ::jsonb cast)
    // wide_text_type: default TEXT (SQLite text is unbounded UTF-8 already)
}

impl RowDecoder for SqliteDialect {
    fn decode_column(&self, row: &AnyRow, idx: usize, type_hint: &str) -> Result<Value> {
        col_to_json(row, idx, type_hint)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Resolve the dialect pair (QueryDialect + RowDecoder) from a driver name string.
/// Returns `Box<dyn Dialect>` where `Dialect` is the combined supertrait alias.
pub fn from_driver(driver: &str) -> Box<dyn Dialect> {
    match driver {
        "mysql" => Box::new(MysqlDialect),
        "mariadb" => Box::new(MariadbDialect),
        "sqlite" => Box::new(SqliteDialect),
        _ => Box::new(PostgresDialect),
    }
}

/// Combined supertrait — convenience alias so callers only store one object.
pub trait Dialect: QueryDialect + RowDecoder {}
impl Dialect for PostgresDialect {}
impl Dialect for MysqlDialect {}
impl Dialect for MariadbDialect {}
impl Dialect for SqliteDialect {}

// ─────────────────────────────────────────────────────────────────────────────
// Shared decoding helpers (private to this module)
// ─────────────────────────────────────────────────────────────────────────────

/// Decode a BLOB column (MySQL/MariaDB non-native types) as raw UTF-8 bytes,
/// then reinterpret the string using the `information_schema` type hint.
fn blob_to_json(row: &AnyRow, idx: usize, type_hint: &str) -> Result<Value> {
    let bytes: Option<Vec<u8>> = row.try_get(idx)?;
    match bytes {
        None => Ok(Value::Null),
        Some(b) => bytes_to_json(b, type_hint),
    }
}

/// Reinterpret raw column bytes using the `information_schema` type hint.
/// Invalid UTF-8 is an error, not an empty value: a mangled byte sequence
/// must abort the table instead of writing blanks into the replica.
fn bytes_to_json(b: Vec<u8>, type_hint: &str) -> Result<Value> {
    let s = String::from_utf8(b).context("column bytes are not valid UTF-8")?;
    Ok(match type_hint.to_uppercase().as_str() {
        "DECIMAL" | "NUMERIC" => s
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::String(s)),
        "JSON" | "JSONB" => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        _ => Value::String(s),
    })
}

/// Decode a column whose AnyRow type is supported natively or has been
/// cast to TEXT in the SELECT query.
fn col_to_json(row: &AnyRow, idx: usize, type_name: &str) -> Result<Value> {
    let v = match type_name.to_uppercase().as_str() {
        // ── Booleans ──────────────────────────────────────────────────────────
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(idx)?
            .map_or(Value::Null, Value::Bool),

        // ── Integers ──────────────────────────────────────────────────────────
        "INT2" | "SMALLINT" | "SMALLSERIAL" => row
            .try_get::<Option<i32>, _>(idx)?
            .map_or(Value::Null, |v| json!(v)),

        "TINYINT" => match row.try_get::<Option<String>, _>(idx)? {
            None => Value::Null,
            Some(s) => s
                .parse::<i32>()
                .map(|v| json!(v))
                .unwrap_or_else(|_| Value::String(s)),
        },

        "INT4" | "INT" | "INTEGER" | "SERIAL" => row
            .try_get::<Option<i32>, _>(idx)?
            .map_or(Value::Null, |v| json!(v)),

        "INT8" | "BIGINT" | "BIGSERIAL" => row
            .try_get::<Option<i64>, _>(idx)?
            .map_or(Value::Null, |v| json!(v)),

        // ── Floats ────────────────────────────────────────────────────────────
        "FLOAT4" | "REAL" | "FLOAT" => row
            .try_get::<Option<f32>, _>(idx)?
            .map_or(Value::Null, |v| json!(v as f64)),

        "FLOAT8" | "DOUBLE" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(idx)?
            .map_or(Value::Null, |v| json!(v)),

        // ── NUMERIC / DECIMAL → cast to TEXT in SELECT, parse back to Number ─
        "NUMERIC" | "DECIMAL" => match row.try_get::<Option<String>, _>(idx)? {
            None => Value::Null,
            Some(s) => s
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::String(s)),
        },

        // ── JSON / JSONB → cast to TEXT in SELECT, parse back to Value ────────
        "JSON" | "JSONB" => match row.try_get::<Option<String>, _>(idx)? {
            None => Value::Null,
            Some(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        },

        // ── ARRAY (PostgreSQL) → stored as Value::String ──────────────────────
        "ARRAY" => row
            .try_get::<Option<String>, _>(idx)?
            .map_or(Value::Null, Value::String),

        // ── Everything else: TEXT, VARCHAR, CHAR, UUID, TIMESTAMP, DATE …
        _ => row
            .try_get::<Option<String>, _>(idx)?
            .map_or(Value::Null, Value::String),
    };
    Ok(v)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── QueryDialect — quote_ident ──────────────────────────────────────────

    #[test]
    fn test_postgres_quote_ident() {
        let d = PostgresDialect;
        assert_eq!(d.quote_ident("emp_data"), r#""emp_data""#);
        assert_eq!(d.quote_ident(r#"ta"ble"#), r#""ta""ble""#);
    }

    #[test]
    fn test_mysql_quote_ident() {
        let d = MysqlDialect;
        assert_eq!(d.quote_ident("emp_data"), "`emp_data`");
        assert_eq!(d.quote_ident("ta`ble"), "`ta``ble`");
    }

    #[test]
    fn test_sqlite_quote_ident() {
        let d = SqliteDialect;
        assert_eq!(d.quote_ident("emp_data"), r#""emp_data""#);
    }

    // ── QueryDialect — schema_prefix ───────────────────────────────────────

    #[test]
    fn test_postgres_schema_prefix() {
        assert_eq!(PostgresDialect.schema_prefix("hrm"), r#""hrm"."#);
    }

    #[test]
    fn test_sqlite_schema_prefix_empty() {
        assert_eq!(SqliteDialect.schema_prefix("ignored"), "");
    }

    #[test]
    fn test_mysql_schema_prefix() {
        assert_eq!(MysqlDialect.schema_prefix("hrm"), "`hrm`.");
    }

    // ── QueryDialect — cast_to_text ─────────────────────────────────────────

    #[test]
    fn test_postgres_cast_to_text() {
        assert_eq!(
            PostgresDialect.cast_to_text(r#""emp_name""#),
            r#""emp_name"::TEXT AS "emp_name""#
        );
    }

    #[test]
    fn test_mysql_cast_to_text() {
        assert_eq!(
            MysqlDialect.cast_to_text("`emp_name`"),
            "CONVERT(`emp_name` USING utf8mb4) AS `emp_name`"
        );
    }

    // ── QueryDialect — is_native_type ──────────────────────────────────────

    #[test]
    fn test_postgres_native_types() {
        let d = PostgresDialect;
        assert!(d.is_native_type("boolean"));
        assert!(d.is_native_type("integer"));
        assert!(d.is_native_type("bigint"));
        assert!(!d.is_native_type("numeric"));
        assert!(!d.is_native_type("varchar"));
        assert!(!d.is_native_type("json"));
    }

    #[test]
    fn test_mysql_native_types() {
        let d = MysqlDialect;
        assert!(d.is_native_type("int"));
        assert!(!d.is_native_type("tinyint"));
        assert!(d.is_native_type("double"));
        assert!(!d.is_native_type("decimal"));
        assert!(!d.is_native_type("varchar"));
        assert!(!d.is_native_type("date"));
    }

    // ── QueryDialect — target_column_type ──────────────────────────────────

    #[test]
    fn test_text_bearing_types_widen() {
        let d = MysqlDialect;
        assert_eq!(d.target_column_type("varchar"), "LONGTEXT CHARACTER SET utf8mb4");
        assert_eq!(d.target_column_type("nvarchar"), "LONGTEXT CHARACTER SET utf8mb4");
        assert_eq!(d.target_column_type("char"), "LONGTEXT CHARACTER SET utf8mb4");
        assert_eq!(PostgresDialect.target_column_type("character varying"), "TEXT");
        assert_eq!(SqliteDialect.target_column_type("varchar"), "TEXT");
    }

    #[test]
    fn test_numeric_types_keep_their_family() {
        let d = PostgresDialect;
        assert_eq!(d.target_column_type("integer"), "BIGINT");
        assert_eq!(d.target_column_type("smallint"), "BIGINT");
        assert_eq!(d.target_column_type("double precision"), "DOUBLE PRECISION");
        assert_eq!(d.target_column_type("numeric"), "NUMERIC");
        assert_eq!(d.target_column_type("boolean"), "BOOLEAN");
    }

    #[test]
    fn test_unknown_types_fall_back_to_wide_text() {
        // Dates, timestamps, uuids — anything unrecognized lands in text, which
        // the decoder already stringifies on the way out of the source.
        assert_eq!(PostgresDialect.target_column_type("timestamp with time zone"), "TEXT");
        assert_eq!(PostgresDialect.target_column_type("uuid"), "TEXT");
    }

    // ── QueryDialect — sql_literal ─────────────────────────────────────────

    #[test]
    fn test_sql_literal_null() {
        assert_eq!(PostgresDialect.sql_literal(&Value::Null), "NULL");
        assert_eq!(MysqlDialect.sql_literal(&Value::Null), "NULL");
    }

    #[test]
    fn test_sql_literal_bool() {
        assert_eq!(PostgresDialect.sql_literal(&Value::Bool(true)), "TRUE");
        assert_eq!(MysqlDialect.sql_literal(&Value::Bool(false)), "FALSE");
    }

    #[test]
    fn test_sql_literal_string_escapes() {
        let v = Value::String("it's fine".to_string());
        assert_eq!(PostgresDialect.sql_literal(&v), "'it''s fine'");
        assert_eq!(MysqlDialect.sql_literal(&v), "'it''s fine'");
    }

    #[test]
    fn test_sql_literal_mysql_doubles_backslash() {
        // A trailing backslash must not swallow the closing quote.
        let v = Value::String("C:\\temp\\".to_string());
        assert_eq!(MysqlDialect.sql_literal(&v), "'C:\\\\temp\\\\'");
        assert_eq!(MariadbDialect.sql_literal(&v), "'C:\\\\temp\\\\'");
    }

    #[test]
    fn test_sql_literal_postgres_keeps_backslash() {
        // standard_conforming_strings: backslash is an ordinary character.
        let v = Value::String("C:\\temp\\".to_string());
        assert_eq!(PostgresDialect.sql_literal(&v), "'C:\\temp\\'");
        assert_eq!(SqliteDialect.sql_literal(&v), "'C:\\temp\\'");
    }

    #[test]
    fn test_sql_literal_mysql_backslash_before_quote() {
        let v = Value::String("a\\'b".to_string());
        assert_eq!(MysqlDialect.sql_literal(&v), "'a\\\\''b'");
    }

    #[test]
    fn test_sql_literal_json_mysql_escapes_backslashes() {
        // Serialized JSON carries its own backslash escapes; MySQL must see
        // them doubled so the stored document round-trips.
        let v = serde_json::json!({"k": "line\nbreak"});
        let lit = MysqlDialect.sql_literal(&v);
        assert!(lit.contains("\\\\n"), "Expected doubled escape, got: {}", lit);
    }

    #[test]
    fn test_sql_literal_cjk_passthrough() {
        let v = Value::String("台北市中正區".to_string());
        assert_eq!(PostgresDialect.sql_literal(&v), "'台北市中正區'");
    }

    #[test]
    fn test_sql_literal_json_postgres_has_cast() {
        let v = serde_json::json!({"k": "v"});
        let lit = PostgresDialect.sql_literal(&v);
        assert!(lit.ends_with("::jsonb"), "Expected ::jsonb, got: {}", lit);
    }

    #[test]
    fn test_sql_literal_json_mysql_no_cast() {
        let v = serde_json::json!({"k": "v"});
        let lit = MysqlDialect.sql_literal(&v);
        assert!(
            !lit.contains("::"),
            "MySQL must not have any cast, got: {}",
            lit
        );
        assert!(lit.starts_with('\''));
    }

    // ── Decoding helpers ───────────────────────────────────────────────────

    #[test]
    fn test_bytes_decode_follows_type_hint() {
        assert_eq!(
            bytes_to_json(b"52000.5".to_vec(), "DECIMAL").unwrap(),
            serde_json::json!(52000.5)
        );
        assert_eq!(
            bytes_to_json(br#"{"k":1}"#.to_vec(), "JSON").unwrap(),
            serde_json::json!({"k": 1})
        );
        assert_eq!(
            bytes_to_json("王小明".as_bytes().to_vec(), "VARCHAR").unwrap(),
            serde_json::json!("王小明")
        );
    }

    #[test]
    fn test_bytes_invalid_utf8_is_an_error() {
        // Truncated multi-byte sequence: must surface, never decode to "".
        let err = bytes_to_json(vec![0xe7, 0x8e], "VARCHAR").unwrap_err();
        assert!(err.to_string().contains("UTF-8"), "got: {}", err);
    }

    // ── QueryDialect — introspection flags ─────────────────────────────────

    #[test]
    fn test_needs_introspection() {
        assert!(PostgresDialect.needs_introspection());
        assert!(MysqlDialect.needs_introspection());
        assert!(MariadbDialect.needs_introspection());
        assert!(!SqliteDialect.needs_introspection());
    }

    #[test]
    fn test_sqlite_introspects_without_schema_bind() {
        assert!(!SqliteDialect.binds_schema());
        assert!(SqliteDialect.introspect_sql().contains("pragma_table_info"));
        assert!(MysqlDialect.binds_schema());
    }

    // ── Factory ────────────────────────────────────────────────────────────

    #[test]
    fn test_from_driver_names() {
        assert_eq!(from_driver("postgres").name(), "postgres");
        assert_eq!(from_driver("mysql").name(), "mysql");
        assert_eq!(from_driver("mariadb").name(), "mariadb");
        assert_eq!(from_driver("sqlite").name(), "sqlite");
        assert_eq!(from_driver("unknown").name(), "postgres"); // default
    }
}
