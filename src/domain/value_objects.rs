use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Type alias for a database row represented as a sorted map of column name → JSON value.
pub type RowMap = BTreeMap<String, Value>;

/// Newtype to avoid confusion between schema names
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Schema(pub String);

/// Newtype for table names
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName(pub String);

/// Newtype for column names
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ColumnName(pub String);

/// Identity of the reference source a name corpus was built from
/// (e.g. `"hrm.emp_data.emp_name"`). Used as the cache key, so two jobs
/// pointing at different reference columns never share a corpus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance(pub String);

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One source column as reported by `information_schema.columns` (or the
/// SQLite pragma equivalent): name, declared data type, and nullability.
///
/// The transfer engine resolves these once per table, before streaming
/// starts, and uses them both to build the typed SELECT and to create a
/// compatible target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
}
