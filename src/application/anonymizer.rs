use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::domain::corpus::NameCorpus;
use crate::domain::errors::TransformError;
use crate::domain::geo::{self, ROADS};
use crate::domain::job::{ColumnRule, RuleKind};
use crate::domain::salt::RunSalt;
use crate::domain::value_objects::RowMap;

/// Bound on the spouse-name rejection-sampling loop. After this many
/// regenerations the engine falls back to a deterministic minimally-perturbed
/// variant instead of looping further.
pub const SPOUSE_MAX_ATTEMPTS: u64 = 5;

/// One column's before/after capture, taken from the same transformation
/// call that produced the new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub column: String,
    pub before: String,
    pub after: String,
}

/// Deterministic column-value transforms.
///
/// Pure given `(value, rule, seed value, salt)` — the corpus is injected at
/// construction, never reached for ambiently, so isolated corpora can run
/// side by side in tests or concurrent jobs. Every seeded rule derives its
/// generator from the seed column's value combined with the run salt, which
/// is what makes output reproducible within a day and divergent across days.
pub struct Anonymizer {
    corpus: Arc<NameCorpus>,
    fallback: NameCorpus,
    salt: RunSalt,
}

impl Anonymizer {
    pub fn new(corpus: Arc<NameCorpus>, salt: RunSalt) -> Self {
        Anonymizer {
            corpus,
            fallback: NameCorpus::builtin(),
            salt,
        }
    }

    /// Apply every rule to the row in place, returning the before/after
    /// captures in rule order.
    ///
    /// `row_offset` (the row's position in the source cursor) is the seed of
    /// last resort for rules without a seed column. Null and empty values
    /// pass through untransformed — there is nothing to de-identify and
    /// nothing to leak.
    pub fn anonymize_row(
        &self,
        row: &mut RowMap,
        rules: &[ColumnRule],
        row_offset: u64,
    ) -> Result<Vec<FieldChange>, TransformError> {
        let mut changes = Vec::with_capacity(rules.len());
        // The row's own anonymized name, once a `name` rule has produced it.
        // Spouse-name rejection-samples against this.
        let mut own_name: Option<String> = None;

        for rule in rules {
            let Some(value) = row.get(&rule.column) else {
                debug!(column = %rule.column, "rule column absent from row, skipping");
                continue;
            };

            let before = match value {
                Value::String(s) => s.clone(),
                Value::Null => {
                    if rule.kind == RuleKind::Clear {
                        String::new()
                    } else {
                        continue;
                    }
                }
                other => other.to_string(),
            };

            if before.is_empty() && rule.kind != RuleKind::Clear {
                continue;
            }

            let seed = self.resolve_seed(row, rule, row_offset);
            let after = self.apply_rule(rule.kind, &before, &seed, own_name.as_deref())?;

            if rule.kind == RuleKind::Name {
                own_name = Some(after.clone());
            }

            row.insert(rule.column.clone(), Value::String(after.clone()));
            changes.push(FieldChange {
                column: rule.column.clone(),
                before,
                after,
            });
        }

        Ok(changes)
    }

    /// Map one value through one rule. Pure given the constructor inputs.
    pub fn apply_rule(
        &self,
        kind: RuleKind,
        value: &str,
        seed: &str,
        own_name: Option<&str>,
    ) -> Result<String, TransformError> {
        match kind {
            RuleKind::Name => self.substitute_name(value, seed),
            RuleKind::SpouseName => self.substitute_spouse_name(value, seed, own_name),
            RuleKind::Address => Ok(self.substitute_address(value, seed)),
            RuleKind::Phone => self.mask_phone(value, seed),
            RuleKind::Id => mask_national_id(value),
            RuleKind::Clear => Ok(String::new()),
        }
    }

    fn resolve_seed(&self, row: &RowMap, rule: &ColumnRule, row_offset: u64) -> String {
        rule.seed_column
            .as_ref()
            .and_then(|col| row.get(col))
            .and_then(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| row_offset.to_string())
    }

    // ── name ──────────────────────────────────────────────────────────────

    fn substitute_name(&self, value: &str, seed: &str) -> Result<String, TransformError> {
        let len = value.chars().count();
        let mut rng = StdRng::seed_from_u64(self.salt.seed_for(seed));
        self.sample_with_fallback(len, &mut rng, 0)
    }

    /// Sample from the active corpus; on an empty bucket, retry against the
    /// compiled-in pools. Only when the active corpus already *is* the
    /// builtin one does the error propagate.
    fn sample_with_fallback(
        &self,
        len: usize,
        rng: &mut StdRng,
        offset: usize,
    ) -> Result<String, TransformError> {
        match self.corpus.sample_name_offset(len, rng, offset) {
            Ok(name) => Ok(name),
            Err(TransformError::EmptyBucket { bucket }) if !self.corpus.is_builtin() => {
                debug!(bucket, "corpus bucket empty, sampling builtin pool");
                self.fallback.sample_name_offset(len, rng, offset)
            }
            Err(e) => Err(e),
        }
    }

    // ── spouse-name ───────────────────────────────────────────────────────

    fn substitute_spouse_name(
        &self,
        value: &str,
        seed: &str,
        own_name: Option<&str>,
    ) -> Result<String, TransformError> {
        let len = value.chars().count();
        let base = self.salt.spouse_seed_for(seed);

        // Rejection sampling, bounded: regenerate with an incremented seed
        // until the candidate differs from the row's own anonymized name.
        for attempt in 0..SPOUSE_MAX_ATTEMPTS {
            let mut rng = StdRng::seed_from_u64(base.wrapping_add(attempt));
            let candidate = self.sample_with_fallback(len, &mut rng, 0)?;
            if own_name != Some(candidate.as_str()) {
                return Ok(candidate);
            }
        }

        // All attempts collided. Deterministic fallback: the first draw with
        // its given-name index advanced by one.
        let mut rng = StdRng::seed_from_u64(base);
        self.sample_with_fallback(len, &mut rng, 1)
    }

    // ── address ───────────────────────────────────────────────────────────

    fn substitute_address(&self, value: &str, seed: &str) -> String {
        let normalized = normalize_width(value);
        let mut rng = StdRng::seed_from_u64(self.salt.seed_for(seed));

        match geo::match_city(&normalized) {
            Some((city, districts)) => {
                let district = districts[rng.random_range(0..districts.len())];
                let road = ROADS[rng.random_range(0..ROADS.len())];
                let section = rng.random_range(1..=5);
                let lane = rng.random_range(1..=100);
                let number = rng.random_range(1..=500);
                format!("{city}{district}{road}{section}段{lane}巷{number}號")
            }
            // Unrecognized prefix: keep the text, rewrite every digit run.
            None => replace_digit_runs(&normalized, &mut rng),
        }
    }

    // ── phone ─────────────────────────────────────────────────────────────

    fn mask_phone(&self, value: &str, seed: &str) -> Result<String, TransformError> {
        let mut chars: Vec<char> = value.chars().collect();
        let digit_positions: Vec<usize> = chars
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_ascii_digit())
            .map(|(i, _)| i)
            .collect();

        if digit_positions.len() < 5 {
            return Err(TransformError::FormatMismatch {
                rule: "phone",
                reason: format!("{} digit(s), need at least 5", digit_positions.len()),
            });
        }

        let mut rng = StdRng::seed_from_u64(self.salt.seed_for(seed));
        for &pos in &digit_positions[digit_positions.len() - 5..] {
            chars[pos] = char::from(b'0' + rng.random_range(0..=9u8));
        }
        Ok(chars.into_iter().collect())
    }
}

// ─── Stateless helpers ────────────────────────────────────────────────────────

/// Format-preserving mask of a national identifier: `A123456789` →
/// `A12*****89`. A ten-character value that is not letter-plus-nine-digits is
/// fully masked rather than leaked; any other length is a format error.
fn mask_national_id(value: &str) -> Result<String, TransformError> {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() != 10 {
        return Err(TransformError::FormatMismatch {
            rule: "id",
            reason: format!("{} character(s), expected 10", chars.len()),
        });
    }

    let well_formed =
        chars[0].is_ascii_uppercase() && chars[1..].iter().all(|c| c.is_ascii_digit());
    if !well_formed {
        return Ok("*".repeat(10));
    }

    let prefix: String = chars[..3].iter().collect();
    let suffix: String = chars[8..].iter().collect();
    Ok(format!("{prefix}*****{suffix}"))
}

/// Normalize full-width digits ０-９ to ASCII and 臺 to 台. The output of the
/// address rule must never contain a full-width digit.
fn normalize_width(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '０'..='９' => char::from(b'0' + (c as u32 - '０' as u32) as u8),
            '臺' => '台',
            other => other,
        })
        .collect()
}

/// Replace every maximal run of ASCII digits with a fresh 1..=999 draw.
fn replace_digit_runs(s: &str, rng: &mut StdRng) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_run = false;
    for c in s.chars() {
        if c.is_ascii_digit() {
            if !in_run {
                out.push_str(&rng.random_range(1..=999).to_string());
                in_run = true;
            }
        } else {
            in_run = false;
            out.push(c);
        }
    }
    out
}
