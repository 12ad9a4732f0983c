use crate::domain::audit::AuditRecord;
use crate::domain::summary::{RunSummary, TableOutcome};
use colored::*;
use tabled::settings::{object::Columns, Alignment, Modify, Style};
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct TableRow {
    table: String,
    status: String,
    rows: String,
    batches: String,
    detail: String,
}

/// Print the coloured per-table run summary to stdout.
///
/// Returns `true` if any table failed (so the caller can exit non-zero).
pub fn print_summary(summary: &RunSummary) -> bool {
    println!();
    println!("{}", "MASQUERADE RUN SUMMARY".bold().cyan());
    println!("Run: {}", summary.run_id.bright_yellow());
    println!("Salt date: {}", summary.salt_date);
    println!();

    let rows: Vec<TableRow> = summary
        .tables
        .iter()
        .map(|t| match &t.outcome {
            TableOutcome::Completed {
                rows_copied,
                batches,
            } => TableRow {
                table: t.table.bold().to_string(),
                status: "completed".green().to_string(),
                rows: rows_copied.to_string(),
                batches: batches.to_string(),
                detail: String::new(),
            },
            TableOutcome::Aborted {
                rows_copied,
                error,
                ..
            } => TableRow {
                table: t.table.bold().to_string(),
                status: "aborted".red().to_string(),
                rows: rows_copied.to_string(),
                batches: String::new(),
                detail: truncate(error, 60).dimmed().to_string(),
            },
            TableOutcome::Skipped => TableRow {
                table: t.table.bold().to_string(),
                status: "skipped".yellow().to_string(),
                rows: "0".to_string(),
                batches: String::new(),
                detail: "cancelled before start".dimmed().to_string(),
            },
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..=3)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    let failed = summary.failed_tables();
    println!(
        "  Total: {} row(s) copied across {} table(s)",
        summary.total_rows_copied().to_string().bold(),
        summary.tables.len().to_string().bold(),
    );
    if failed > 0 {
        println!(
            "  {}",
            format!("{failed} table(s) did not complete.").bold().red()
        );
    } else {
        println!("  {}", "All tables completed.".bold().green());
    }
    println!();

    failed > 0
}

// ─── Audit samples ────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct AuditRow {
    table: String,
    column: String,
    batch: String,
    before: String,
    after: String,
}

/// Print the before/after sample table collected by the audit logger.
pub fn print_audit_samples(records: &[AuditRecord]) {
    if records.is_empty() {
        return;
    }

    println!("{}", "AUDIT SAMPLES".bold().cyan());

    let rows: Vec<AuditRow> = records
        .iter()
        .map(|r| AuditRow {
            table: r.table.bold().to_string(),
            column: r.column.yellow().to_string(),
            batch: r.batch_index.to_string(),
            before: truncate(&r.before, 24).dimmed().to_string(),
            after: truncate(&r.after, 24).cyan().to_string(),
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..=2)).with(Alignment::right()))
        .to_string();

    println!("{table}");
    println!();
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}
