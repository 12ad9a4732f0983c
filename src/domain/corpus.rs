use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::errors::{CorpusError, TransformError};
use crate::domain::value_objects::Provenance;

/// Provenance tag of the compiled-in fallback corpus.
pub const BUILTIN_PROVENANCE: &str = "builtin";

/// Supported name lengths in logical characters. Inputs outside this range
/// are clamped to the nearest bucket.
pub const BUCKET_LENGTHS: [usize; 3] = [2, 3, 4];

// Compiled-in fallback pools, used when no reference source is configured or
// a reference bucket turns out empty.
const DEFAULT_SURNAMES: &[&str] = &[
    "陳", "林", "黃", "張", "李", "王", "吳", "劉", "蔡", "楊",
    "許", "鄭", "謝", "郭", "洪", "曾", "邱", "廖", "賴", "周",
    "徐", "蘇", "葉", "莊", "呂", "江", "何", "蕭", "羅", "高",
    "潘", "簡", "朱", "鍾", "彭", "游", "詹", "胡", "施", "沈",
];

const DEFAULT_COMPOUND_SURNAMES: &[&str] = &["歐陽", "張簡", "范姜", "陳黃", "周黃"];

const DEFAULT_GIVEN_NAMES: &[&str] = &[
    "志明", "淑芬", "建華", "美玲", "俊傑", "雅婷", "家豪", "詠晴", "宗翰", "宜君",
    "冠宇", "怡君", "承恩", "欣怡", "柏翰", "雅雯", "家瑋", "心怡", "彥廷", "詩涵",
    "子軒", "鈺婷", "智偉", "佩珊", "志偉", "佳穎", "建宏", "怡萱", "俊宏", "淑華",
];

// ─── Buckets ──────────────────────────────────────────────────────────────────

/// Per-position fragment pools for one name length: a surname pool and a
/// given-name pool whose fragment lengths sum to the bucket length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub surnames: Vec<String>,
    pub givens: Vec<String>,
}

impl Bucket {
    fn is_empty(&self) -> bool {
        self.surnames.is_empty() || self.givens.is_empty()
    }
}

/// Statistical pool of name fragments bucketed by logical character length.
///
/// Built once from a reference column (or compiled-in defaults), then
/// read-only for the remainder of the run. Always passed explicitly into the
/// anonymization engine — there is no module-level singleton, so tests and
/// concurrent jobs can hold isolated corpora.
///
/// Lengths are counted in Unicode scalar values (`str::chars`), never bytes:
/// the domain is predominantly double-byte script and a byte count would put
/// every name in the wrong bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameCorpus {
    pub provenance: Provenance,
    buckets: BTreeMap<usize, Bucket>,
}

impl NameCorpus {
    /// The compiled-in fallback corpus.
    ///
    /// Splitting mirrors [`build`](Self::build): length-2 names are one
    /// surname char plus one given char, length-3 are 1+2, length-4 are 2+2
    /// (compound surnames).
    pub fn builtin() -> Self {
        let given_singles: Vec<String> = DEFAULT_GIVEN_NAMES
            .iter()
            .filter_map(|g| g.chars().next())
            .map(String::from)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let surnames: Vec<String> = DEFAULT_SURNAMES.iter().map(|s| s.to_string()).collect();
        let givens: Vec<String> = DEFAULT_GIVEN_NAMES.iter().map(|s| s.to_string()).collect();

        let mut buckets = BTreeMap::new();
        buckets.insert(
            2,
            Bucket {
                surnames: surnames.clone(),
                givens: given_singles,
            },
        );
        buckets.insert(
            3,
            Bucket {
                surnames,
                givens: givens.clone(),
            },
        );
        buckets.insert(
            4,
            Bucket {
                surnames: DEFAULT_COMPOUND_SURNAMES
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                givens,
            },
        );

        NameCorpus {
            provenance: Provenance(BUILTIN_PROVENANCE.to_string()),
            buckets,
        }
    }

    /// Build a corpus from the distinct values of a reference name column.
    ///
    /// Names of 2, 3 and 4 logical characters are split into surname and
    /// given fragments; other lengths are ignored. Pools are deduplicated and
    /// sorted so two builds over the same reference data are identical.
    pub fn build<I, S>(names: I, provenance: Provenance) -> Result<Self, CorpusError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut pools: BTreeMap<usize, (BTreeSet<String>, BTreeSet<String>)> = BTreeMap::new();

        for name in names {
            let name = name.as_ref().trim();
            let chars: Vec<char> = name.chars().collect();
            let (surname_len, bucket) = match chars.len() {
                2 => (1, 2),
                3 => (1, 3),
                4 => (2, 4),
                _ => continue,
            };
            let (surnames, givens) = pools.entry(bucket).or_default();
            surnames.insert(chars[..surname_len].iter().collect());
            givens.insert(chars[surname_len..].iter().collect());
        }

        if pools.is_empty() {
            return Err(CorpusError::EmptySource(provenance.to_string()));
        }

        let buckets = pools
            .into_iter()
            .map(|(len, (surnames, givens))| {
                (
                    len,
                    Bucket {
                        surnames: surnames.into_iter().collect(),
                        givens: givens.into_iter().collect(),
                    },
                )
            })
            .collect();

        Ok(NameCorpus {
            provenance,
            buckets,
        })
    }

    pub fn is_builtin(&self) -> bool {
        self.provenance.0 == BUILTIN_PROVENANCE
    }

    /// Clamp an arbitrary character count to the nearest supported bucket.
    pub fn clamp_length(len: usize) -> usize {
        len.clamp(2, 4)
    }

    /// Deterministically compose one full substitute name of `len` logical
    /// characters from the matching bucket, or fail with
    /// [`TransformError::EmptyBucket`] — never an empty string.
    pub fn sample_name(&self, len: usize, rng: &mut StdRng) -> Result<String, TransformError> {
        self.sample_name_offset(len, rng, 0)
    }

    /// Like [`sample_name`](Self::sample_name), but advances the given-name
    /// index by `offset` (wrapping). Used for the bounded-retry fallback in
    /// spouse-name generation: offset 1 yields the minimally-perturbed
    /// variant of the colliding name.
    pub fn sample_name_offset(
        &self,
        len: usize,
        rng: &mut StdRng,
        offset: usize,
    ) -> Result<String, TransformError> {
        let bucket_len = Self::clamp_length(len);
        let bucket = self
            .buckets
            .get(&bucket_len)
            .filter(|b| !b.is_empty())
            .ok_or(TransformError::EmptyBucket { bucket: bucket_len })?;

        let surname = &bucket.surnames[rng.random_range(0..bucket.surnames.len())];
        let given_idx = (rng.random_range(0..bucket.givens.len()) + offset) % bucket.givens.len();
        Ok(format!("{}{}", surname, bucket.givens[given_idx]))
    }

    /// Total fragment count per bucket, for logging.
    pub fn bucket_sizes(&self) -> BTreeMap<usize, (usize, usize)> {
        self.buckets
            .iter()
            .map(|(len, b)| (*len, (b.surnames.len(), b.givens.len())))
            .collect()
    }
}
