use thiserror::Error;

/// A per-value transformation failure. These never silently substitute a
/// wrong-but-plausible value: the transfer engine surfaces them and applies
/// its configured policy (abort the table or skip the row).
#[derive(Debug, Error)]
pub enum TransformError {
    /// The rule kind string did not match any known rule. Caught at
    /// configuration time under normal operation; kept here so programmatic
    /// construction fails the same way.
    #[error("unknown rule kind: '{0}'")]
    UnknownRuleKind(String),

    /// The requested corpus bucket holds no fragments.
    #[error("name corpus bucket for length {bucket} is empty")]
    EmptyBucket { bucket: usize },

    /// The input value cannot carry the rule's format (e.g. a phone number
    /// with fewer than five digits). Signals a data-quality problem upstream.
    #[error("value does not fit the {rule} format: {reason}")]
    FormatMismatch {
        rule: &'static str,
        reason: String,
    },
}

/// Failure while building or loading the name corpus. Only fatal to a job
/// that actually exercises a `name` or `spouse-name` rule.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("reference source unreachable: {0}")]
    Unreachable(String),

    #[error("reference column '{0}' produced no usable name fragments")]
    EmptySource(String),
}

/// Job-level configuration problems. All of these fail the run before any
/// row is transferred.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("job has no tables to replicate")]
    EmptyTableList,

    #[error("table '{0}' has a rule with an empty column name")]
    EmptyColumnName(String),

    #[error("table '{0}' is listed more than once")]
    DuplicateTable(String),

    #[error("filter for table '{table}' is malformed: {reason}")]
    MalformedFilter { table: String, reason: String },
}
