use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

use crate::domain::corpus::NameCorpus;
use crate::domain::ports::CorpusStore;
use crate::domain::value_objects::Provenance;

/// JSON-file corpus cache. One file per provenance so a job that samples
/// several reference columns never clobbers another's cache.
pub struct FileCorpusStore {
    dir: PathBuf,
}

impl FileCorpusStore {
    pub fn new(dir: PathBuf) -> Self {
        FileCorpusStore { dir }
    }

    /// Default location under the platform cache directory
    /// (`~/.cache/masquerade` on Linux).
    pub fn default_location() -> Self {
        let dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("masquerade");
        FileCorpusStore { dir }
    }

    fn path_for(&self, provenance: &Provenance) -> PathBuf {
        // Provenance is "schema.table.column"; keep it readable but
        // filesystem-safe.
        let name: String = provenance
            .0
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(format!("corpus_{name}.json"))
    }
}

#[async_trait]
impl CorpusStore for FileCorpusStore {
    async fn load(&self, provenance: &Provenance) -> Result<Option<NameCorpus>> {
        let path = self.path_for(provenance);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read corpus cache: {}", path.display()))?;
        let corpus: NameCorpus = serde_json::from_str(&content)
            .with_context(|| format!("Corpus cache is corrupt: {}", path.display()))?;
        debug!(provenance = %provenance, path = %path.display(), "corpus cache hit");
        Ok(Some(corpus))
    }

    async fn save(&self, corpus: &NameCorpus) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache dir: {}", self.dir.display()))?;
        let path = self.path_for(&corpus.provenance);
        let content = serde_json::to_string_pretty(corpus)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write corpus cache: {}", path.display()))?;
        debug!(provenance = %corpus.provenance, path = %path.display(), "corpus cached");
        Ok(())
    }
}

/// Process-local store, mostly for tests and one-shot runs where a disk
/// cache buys nothing.
#[derive(Default)]
pub struct MemoryCorpusStore {
    entries: Mutex<BTreeMap<String, NameCorpus>>,
}

impl MemoryCorpusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CorpusStore for MemoryCorpusStore {
    async fn load(&self, provenance: &Provenance) -> Result<Option<NameCorpus>> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("corpus store poisoned"))?
            .get(&provenance.0)
            .cloned())
    }

    async fn save(&self, corpus: &NameCorpus) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("corpus store poisoned"))?
            .insert(corpus.provenance.0.clone(), corpus.clone());
        Ok(())
    }
}
