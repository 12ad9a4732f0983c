use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::Parser;
use masquerade::presentation::cli_summary::{print_audit_samples, print_summary};
use masquerade::{AppConfig, AuditSink, LogLevel, MemoryAuditSink, TracingProgress};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "masquerade",
    about = "Masquerade — Clone your SQL data into a de-identified, development-safe replica."
)]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Salt date as YYYYMMDD. Defaults to today; pass an earlier date to
    /// reproduce that day's substitutions exactly.
    #[arg(short, long)]
    date: Option<String>,

    /// Validate the configuration and exit without touching either database.
    #[arg(long)]
    validate: bool,

    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        LogLevel::Error
    } else if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    masquerade::init_tracing(level);

    let cfg = AppConfig::load(&cli.config)?;

    let date = match &cli.date {
        Some(s) => NaiveDate::parse_from_str(s, "%Y%m%d")
            .map_err(|_| anyhow::anyhow!("Invalid --date '{}': expected YYYYMMDD", s))?,
        None => Local::now().date_naive(),
    };

    if cli.validate {
        let job = cfg.job.to_replication_job()?;
        println!(
            "Configuration OK: {} table(s), batch size {}.",
            job.tables.len(),
            cfg.job.batch_size
        );
        return Ok(());
    }

    // --verbose collects the before/after audit samples in memory so they
    // can be printed as a table after the run; otherwise they go to tracing.
    let summary = if cli.verbose {
        let audit = Arc::new(MemoryAuditSink::new());
        let summary = masquerade::run_with_sinks(
            &cfg,
            date,
            Arc::clone(&audit) as Arc<dyn AuditSink>,
            Arc::new(TracingProgress),
            Arc::new(AtomicBool::new(false)),
        )
        .await?;
        print_audit_samples(&audit.records());
        summary
    } else {
        masquerade::run_on_date(&cfg, date).await?
    };

    let has_failures = print_summary(&summary);
    if has_failures {
        std::process::exit(1);
    }
    Ok(())
}
