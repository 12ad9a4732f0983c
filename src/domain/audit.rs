use serde::Serialize;

/// One logged before/after observation: a single column of a sampled row,
/// captured atomically from the same transformation call. Append-only — never
/// mutated after it is emitted.
///
/// The core guarantees one record per transformed column per sampled row
/// (the first row of each batch); formatting and persistence belong to the
/// audit collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub table: String,
    pub column: String,
    pub before: String,
    pub after: String,
    pub batch_index: usize,
    pub row_count: usize,
}
