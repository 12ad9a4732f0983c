use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::domain::errors::{ConfigurationError, TransformError};

// ─── Rule kinds ───────────────────────────────────────────────────────────────

/// The closed set of de-identification rules. Represented as a tagged enum,
/// never resolved by late string lookup: an unknown kind fails configuration
/// parsing before any I/O happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    /// Replace a person name with a same-length substitute from the corpus.
    Name,
    /// Like `Name`, but salted so it never collides with the row's own name.
    SpouseName,
    /// Keep the city prefix, regenerate district / road / house number.
    Address,
    /// Keep formatting and all digits except the last five.
    Phone,
    /// Format-preserving mask of a national identifier.
    Id,
    /// Always the empty sentinel; the original value is discarded.
    Clear,
}

impl RuleKind {
    /// Whether this rule draws names from the corpus.
    pub fn needs_corpus(&self) -> bool {
        matches!(self, RuleKind::Name | RuleKind::SpouseName)
    }

    /// Whether this rule derives a generator from the seed column.
    pub fn needs_seed(&self) -> bool {
        !matches!(self, RuleKind::Clear | RuleKind::Id)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Name => "name",
            RuleKind::SpouseName => "spouse-name",
            RuleKind::Address => "address",
            RuleKind::Phone => "phone",
            RuleKind::Id => "id",
            RuleKind::Clear => "clear",
        }
    }
}

impl FromStr for RuleKind {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(RuleKind::Name),
            "spouse-name" => Ok(RuleKind::SpouseName),
            "address" => Ok(RuleKind::Address),
            "phone" => Ok(RuleKind::Phone),
            "id" => Ok(RuleKind::Id),
            "clear" => Ok(RuleKind::Clear),
            other => Err(TransformError::UnknownRuleKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Job model ────────────────────────────────────────────────────────────────

/// One column's de-identification rule. Immutable during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRule {
    pub column: String,
    pub kind: RuleKind,
    /// Source column whose value seeds the generator for this rule. When
    /// absent, the engine falls back to the row's cursor offset.
    #[serde(default)]
    pub seed_column: Option<String>,
}

/// One table to replicate: name, optional filter predicate (appended verbatim
/// to the source query's WHERE clause), and the rules to apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub rules: Vec<ColumnRule>,
}

/// What to do when a single value fails its transform mid-table.
///
/// The safe default aborts the table (prior batches are kept); `SkipRow`
/// drops the offending row and keeps streaming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueErrorPolicy {
    #[default]
    AbortTable,
    SkipRow,
}

/// One end-to-end run: the ordered list of tables to copy. Endpoints and
/// batch sizing live in the configuration layer; this is the part the
/// transfer engine consumes.
#[derive(Debug, Clone)]
pub struct ReplicationJob {
    pub tables: Vec<TableSpec>,
}

impl ReplicationJob {
    /// Fail-fast validation, run before any connection is opened.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.tables.is_empty() {
            return Err(ConfigurationError::EmptyTableList);
        }

        let mut seen = BTreeSet::new();
        for spec in &self.tables {
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigurationError::DuplicateTable(spec.name.clone()));
            }
            for rule in &spec.rules {
                if rule.column.trim().is_empty() {
                    return Err(ConfigurationError::EmptyColumnName(spec.name.clone()));
                }
            }
            if let Some(filter) = &spec.filter {
                // The filter is an opaque predicate fragment, but a bare
                // semicolon or comment marker can only smuggle a second
                // statement into the source query.
                if filter.contains(';') || filter.contains("--") {
                    return Err(ConfigurationError::MalformedFilter {
                        table: spec.name.clone(),
                        reason: "statement separators are not allowed".to_string(),
                    });
                }
                if filter.trim().is_empty() {
                    return Err(ConfigurationError::MalformedFilter {
                        table: spec.name.clone(),
                        reason: "filter is empty".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// True when any table carries a rule that samples from the name corpus.
    /// Corpus construction is skipped entirely otherwise.
    pub fn needs_corpus(&self) -> bool {
        self.tables
            .iter()
            .flat_map(|t| &t.rules)
            .any(|r| r.kind.needs_corpus())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(column: &str, kind: RuleKind) -> ColumnRule {
        ColumnRule {
            column: column.to_string(),
            kind,
            seed_column: Some("emp_no".to_string()),
        }
    }

    fn spec(name: &str, rules: Vec<ColumnRule>) -> TableSpec {
        TableSpec {
            name: name.to_string(),
            filter: None,
            rules,
        }
    }

    // ── RuleKind ──

    #[test]
    fn test_rule_kind_round_trip() {
        for kind in [
            RuleKind::Name,
            RuleKind::SpouseName,
            RuleKind::Address,
            RuleKind::Phone,
            RuleKind::Id,
            RuleKind::Clear,
        ] {
            assert_eq!(kind.as_str().parse::<RuleKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_rule_kind_rejected() {
        let err = "rot13".parse::<RuleKind>().unwrap_err();
        assert!(err.to_string().contains("rot13"));
    }

    #[test]
    fn test_rule_kind_kebab_case_serde() {
        let kind: RuleKind = serde_json::from_str(r#""spouse-name""#).unwrap();
        assert_eq!(kind, RuleKind::SpouseName);
        assert!(serde_json::from_str::<RuleKind>(r#""spouse_name""#).is_err());
    }

    #[test]
    fn test_needs_seed() {
        assert!(RuleKind::Name.needs_seed());
        assert!(RuleKind::Phone.needs_seed());
        assert!(!RuleKind::Clear.needs_seed());
        assert!(!RuleKind::Id.needs_seed());
    }

    // ── Job validation ──

    #[test]
    fn test_empty_job_rejected() {
        let job = ReplicationJob { tables: vec![] };
        assert!(matches!(
            job.validate(),
            Err(ConfigurationError::EmptyTableList)
        ));
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let job = ReplicationJob {
            tables: vec![spec("emp_data", vec![]), spec("emp_data", vec![])],
        };
        assert!(matches!(
            job.validate(),
            Err(ConfigurationError::DuplicateTable(_))
        ));
    }

    #[test]
    fn test_filter_with_semicolon_rejected() {
        let mut t = spec("emp_data", vec![]);
        t.filter = Some("1=1; DROP TABLE emp_data".to_string());
        let job = ReplicationJob { tables: vec![t] };
        assert!(matches!(
            job.validate(),
            Err(ConfigurationError::MalformedFilter { .. })
        ));
    }

    #[test]
    fn test_valid_job_passes() {
        let mut t = spec("emp_data", vec![rule("emp_name", RuleKind::Name)]);
        t.filter = Some("data_year = '114'".to_string());
        let job = ReplicationJob { tables: vec![t] };
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_needs_corpus() {
        let with_name = ReplicationJob {
            tables: vec![spec("emp_data", vec![rule("emp_name", RuleKind::Name)])],
        };
        assert!(with_name.needs_corpus());

        let without = ReplicationJob {
            tables: vec![spec("emp_data", vec![rule("tel", RuleKind::Phone)])],
        };
        assert!(!without.needs_corpus());
    }
}
