use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::domain::corpus::NameCorpus;
use crate::domain::errors::CorpusError;
use crate::domain::ports::{CorpusStore, RowSource};
use crate::domain::value_objects::{Provenance, Schema, TableName};
use crate::infrastructure::config::{CorpusConfig, CorpusSource};

/// Resolves the name corpus for a run: compiled-in pools, a previously
/// persisted artifact, or a fresh build from a reference column — cached by
/// provenance so later runs skip the rebuild. Rebuilding requires deleting
/// the cache entry; a cached corpus is never silently refreshed mid-run.
pub struct CorpusService {
    store: Arc<dyn CorpusStore>,
}

impl CorpusService {
    pub fn new(store: Arc<dyn CorpusStore>) -> Self {
        CorpusService { store }
    }

    #[instrument(skip(self, cfg, source), fields(mode = ?cfg.source))]
    pub async fn resolve(
        &self,
        cfg: &CorpusConfig,
        source: &dyn RowSource,
        schema: &Schema,
    ) -> Result<NameCorpus> {
        match cfg.source {
            CorpusSource::Builtin => Ok(NameCorpus::builtin()),
            CorpusSource::File => self.load_file(cfg),
            CorpusSource::Database => self.build_from_database(cfg, source, schema).await,
        }
    }

    fn load_file(&self, cfg: &CorpusConfig) -> Result<NameCorpus> {
        let Some(path) = &cfg.path else {
            bail!("corpus.source = \"file\" requires corpus.path");
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read corpus file: {}", path.display()))?;
        let corpus: NameCorpus =
            serde_json::from_str(&content).with_context(|| "Failed to parse corpus JSON")?;
        info!(provenance = %corpus.provenance, "loaded corpus from file");
        Ok(corpus)
    }

    async fn build_from_database(
        &self,
        cfg: &CorpusConfig,
        source: &dyn RowSource,
        schema: &Schema,
    ) -> Result<NameCorpus> {
        let (Some(table), Some(column)) = (&cfg.reference_table, &cfg.reference_column) else {
            bail!("corpus.source = \"database\" requires corpus.reference_table and corpus.reference_column");
        };

        let provenance = Provenance(format!("{}.{}.{}", schema.0, table, column));

        if let Some(cached) = self.store.load(&provenance).await? {
            info!(provenance = %provenance, "corpus loaded from cache");
            return Ok(cached);
        }

        let table_name = TableName(table.clone());
        let values = source
            .fetch_reference_values(schema, &table_name, column)
            .await
            .map_err(|e| CorpusError::Unreachable(e.to_string()))?;

        let corpus = NameCorpus::build(values, provenance.clone())?;
        let sizes = corpus.bucket_sizes();
        info!(provenance = %provenance, ?sizes, "corpus built from reference column");

        self.store
            .save(&corpus)
            .await
            .with_context(|| "Failed to persist corpus cache")?;
        Ok(corpus)
    }
}
