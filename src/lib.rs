use anyhow::Result;
use chrono::{Local, NaiveDate};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

// ─── Log level ────────────────────────────────────────────────────────────────

/// Controls the verbosity of masquerade's internal tracing output.
///
/// Pass to [`init_tracing`] before calling any async entry point.
///
/// | Variant | `tracing` level | When to use                              |
/// |---------|-----------------|------------------------------------------|
/// | `Error` | `error`         | `--quiet` / CI scripting                 |
/// | `Info`  | `info`          | Default — per-table and per-batch status |
/// | `Debug` | `debug`         | `--verbose` — shows SQL queries too      |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Info,
    Debug,
}

/// Initialise the global `tracing` subscriber for masquerade.
///
/// This is a convenience wrapper around `tracing_subscriber`. It respects
/// `RUST_LOG` when set, falling back to `level` otherwise.
///
/// Call this **once** at application startup, before any masquerade async
/// function. Library consumers who manage their own subscriber should skip
/// this and configure tracing themselves.
///
/// Only available when the `cli` feature is enabled (pulls in
/// `tracing-subscriber`).
#[cfg(feature = "cli")]
pub fn init_tracing(level: LogLevel) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let default_filter = match level {
        LogLevel::Error => "masquerade=error",
        LogLevel::Info => "masquerade=info",
        LogLevel::Debug => "masquerade=debug",
    };

    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

// ─── Public API Facade ───

pub use application::anonymizer::Anonymizer;
pub use application::audit::{MemoryAuditSink, NullProgress, TracingAuditSink, TracingProgress};
pub use application::corpus::CorpusService;
pub use application::transfer::{TransferEngine, TransferOptions, DEFAULT_BATCH_SIZE};
pub use domain::audit::AuditRecord;
pub use domain::corpus::NameCorpus;
pub use domain::job::{ColumnRule, ReplicationJob, RuleKind, TableSpec, ValueErrorPolicy};
pub use domain::ports::{AuditSink, CorpusStore, ProgressSink, RowSink, RowSource};
pub use domain::salt::RunSalt;
pub use domain::summary::{RunSummary, TableOutcome, TableReport};
pub use domain::value_objects::{ColumnSchema, Provenance, RowMap, Schema, TableName};
pub use infrastructure::config::{
    AppConfig, CorpusConfig, CorpusSource, DbConfig, JobConfig, RuleConfig, TableConfig,
};
pub use infrastructure::corpus_cache::{FileCorpusStore, MemoryCorpusStore};

use crate::infrastructure::db::client::{connect_source, connect_target};

// ─── Public entry points ───

/// Replicate and de-identify with today's salt.
///
/// Same-day re-runs substitute identically; use [`run_on_date`] to reproduce
/// an earlier day's output.
pub async fn run(cfg: &AppConfig) -> Result<RunSummary> {
    run_on_date(cfg, Local::now().date_naive()).await
}

/// Replicate and de-identify with the salt derived from `date`.
pub async fn run_on_date(cfg: &AppConfig, date: NaiveDate) -> Result<RunSummary> {
    run_with_sinks(
        cfg,
        date,
        Arc::new(TracingAuditSink),
        Arc::new(TracingProgress),
        Arc::new(AtomicBool::new(false)),
    )
    .await
}

/// Full-control entry point: caller-supplied audit sink, progress sink and
/// cancellation flag. Setting `cancel` to `true` stops the run at the next
/// table boundary; the table in flight always finishes or aborts on its own.
pub async fn run_with_sinks(
    cfg: &AppConfig,
    date: NaiveDate,
    audit: Arc<dyn AuditSink>,
    progress: Arc<dyn ProgressSink>,
    cancel: Arc<AtomicBool>,
) -> Result<RunSummary> {
    let job = cfg.job.to_replication_job()?;
    // A zero batch size would stream nothing; treat it as 1.
    let batch_size = cfg.job.batch_size.max(1);

    let source = Arc::new(connect_source(&cfg.source, batch_size).await?);
    let sink = Arc::new(connect_target(&cfg.target).await?);

    let source_schema = Schema(cfg.source.schema.clone());
    let target_schema = Schema(cfg.target.schema.clone());

    // The corpus is only resolved (and possibly built from the reference
    // column) when some rule actually substitutes names.
    let corpus = if job.needs_corpus() {
        let store: Arc<dyn CorpusStore> = match &cfg.corpus.cache_dir {
            Some(dir) => Arc::new(FileCorpusStore::new(dir.clone())),
            None => Arc::new(FileCorpusStore::default_location()),
        };
        CorpusService::new(store)
            .resolve(&cfg.corpus, source.as_ref(), &source_schema)
            .await?
    } else {
        NameCorpus::builtin()
    };

    let salt = RunSalt::derive(date);
    let anonymizer = Arc::new(Anonymizer::new(Arc::new(corpus), salt));

    let engine = TransferEngine::new(
        source,
        sink,
        anonymizer,
        audit,
        progress,
        TransferOptions {
            batch_size,
            on_value_error: cfg.job.on_value_error,
        },
        cancel,
    );

    Ok(engine.run(&source_schema, &target_schema, &job, date).await)
}
