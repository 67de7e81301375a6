use std::{
    io::{self, BufRead, Write},
    sync::Arc,
};

use metrics_exporter_prometheus::PrometheusHandle;
use spendlog_core::{format_date, parse_date};

use crate::{
    analytics::{AnalyticsService, Breakdown},
    config::{BackendKind, CliArgs, Command, Config},
    editor::{parse_entry, DayForm},
    error::AppError,
    expenses::ExpenseService,
    migrate::{copy_records, verify},
    report::{render_breakdown, render_day},
    rest::{self, AppState},
    storage::{open_backend, ExpenseStore},
};

pub fn run(cli: &CliArgs, config: &Config, metrics: Option<PrometheusHandle>) -> Result<(), AppError> {
    match &cli.command {
        Command::Serve { port } => serve(config, *port, metrics),
        Command::Show { date } => {
            let service = ExpenseService::new(local_store(config)?);
            show_day(&service, date, &mut io::stdout())
        }
        Command::Edit { date } => edit(config, date),
        Command::Set { date, entries } => {
            let service = ExpenseService::new(local_store(config)?);
            set_day(&service, date, entries, &mut io::stdout())
        }
        Command::Analytics { start, end, api } => {
            let breakdown = match api {
                Some(url) => remote_analytics(url, start, end)?,
                None => AnalyticsService::new(local_store(config)?).analyze(start, end)?,
            };
            println!("{}", render_breakdown(&breakdown));
            Ok(())
        }
        Command::Migrate { from, to, yes } => {
            let stdin = io::stdin();
            migrate(config, *from, *to, *yes, &mut stdin.lock(), &mut io::stdout())
        }
    }
}

fn local_store(config: &Config) -> Result<Arc<dyn ExpenseStore>, AppError> {
    Ok(open_backend(config.database.backend, &config.database)?)
}

fn serve(config: &Config, port: Option<u16>, metrics: Option<PrometheusHandle>) -> Result<(), AppError> {
    let mut addr = config.listen_addr()?;
    if let Some(port) = port {
        addr.set_port(port);
    }
    let state = AppState::new(local_store(config)?, metrics);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(rest::serve(addr, state))
}

pub fn show_day<W: Write>(service: &ExpenseService, date: &str, output: &mut W) -> Result<(), AppError> {
    let day = parse_date(date)?;
    let records = service.fetch_day(day)?;
    writeln!(output, "Expenses for {}", format_date(day))?;
    writeln!(output, "{}", render_day(&records))?;
    Ok(())
}

/// Replaces the day with `AMOUNT:CATEGORY[:NOTES]` entries. Nothing is written
/// unless every entry parses.
pub fn set_day<W: Write>(
    service: &ExpenseService,
    date: &str,
    entries: &[String],
    output: &mut W,
) -> Result<(), AppError> {
    let day = parse_date(date)?;
    let entries = entries
        .iter()
        .map(|e| parse_entry(e))
        .collect::<Result<Vec<_>, _>>()?;
    let kept = service.replace_day(day, entries)?;
    writeln!(output, "Expenses updated successfully ({} saved for {})", kept, format_date(day))?;
    Ok(())
}

fn edit(config: &Config, date: &str) -> Result<(), AppError> {
    let day = parse_date(date)?;
    let service = ExpenseService::new(local_store(config)?);
    let records = service.fetch_day(day)?;
    let mut form = DayForm::prefill(&records);

    println!("Editing expenses for {} (leave blank to keep the current value)", format_date(day));
    let stdin = io::stdin();
    let submitted = form.run(&mut stdin.lock(), &mut io::stdout())?;
    if !submitted {
        println!("Nothing saved.");
        return Ok(());
    }

    let kept = form.submit(&service, day)?;
    println!("Expenses updated successfully ({} saved)", kept);
    Ok(())
}

#[cfg(feature = "remote")]
fn remote_analytics(url: &str, start: &str, end: &str) -> Result<Breakdown, AppError> {
    tracing::info!(%url, "Requesting analytics from remote API");
    crate::client::ApiClient::new(url)?.analytics(start, end)
}

#[cfg(not(feature = "remote"))]
fn remote_analytics(_url: &str, _start: &str, _end: &str) -> Result<Breakdown, AppError> {
    Err(AppError::Config(
        "remote API support is not compiled in; rebuild with `--features remote`".to_string(),
    ))
}

/// Runs the whole migration, prompting on `input` unless `yes` is set.
pub fn migrate<R: BufRead, W: Write>(
    config: &Config,
    from: BackendKind,
    to: BackendKind,
    yes: bool,
    input: &mut R,
    output: &mut W,
) -> Result<(), AppError> {
    if from == to {
        return Err(AppError::InvalidInput("source and target backend are the same".to_string()));
    }
    let source = open_backend(from, &config.database)?;
    let target = open_backend(to, &config.database)?;
    migrate_between(source.as_ref(), target.as_ref(), yes, input, output)
}

pub fn migrate_between<R: BufRead, W: Write>(
    source: &dyn ExpenseStore,
    target: &dyn ExpenseStore,
    yes: bool,
    input: &mut R,
    output: &mut W,
) -> Result<(), AppError> {
    writeln!(output, "{} -> {} migration", source.backend_name(), target.backend_name())?;

    let records = source.fetch_all()?;
    writeln!(output, "Read {} expenses from {}", records.len(), source.backend_name())?;
    if records.is_empty() {
        writeln!(output, "No expenses to migrate.")?;
        return Ok(());
    }

    if !yes {
        write!(
            output,
            "Ready to migrate {} expenses to {}. Continue? (yes/no): ",
            records.len(),
            target.backend_name()
        )?;
        output.flush()?;
        let mut answer = String::new();
        input.read_line(&mut answer)?;
        if answer.trim().to_ascii_lowercase() != "yes" {
            writeln!(output, "Migration cancelled.")?;
            return Ok(());
        }
    }

    let report = copy_records(&records, target)?;
    writeln!(output, "Migrated {} expenses", report.inserted)?;
    if report.skipped > 0 {
        writeln!(output, "Skipped {} expenses due to errors", report.skipped)?;
    }

    let check = verify(source, target)?;
    writeln!(output, "{} expenses: {}", source.backend_name(), check.source_count)?;
    writeln!(output, "{} expenses: {}", target.backend_name(), check.target_count)?;
    if !check.counts_match() {
        writeln!(output, "Count mismatch!")?;
        return Ok(());
    }
    writeln!(output, "Counts match.")?;
    for (i, record) in check.sample.iter().enumerate() {
        writeln!(
            output,
            "  {}. Date: {}, Amount: {:.2}, Category: {}",
            i + 1,
            format_date(record.expense_date),
            record.amount,
            record.category
        )?;
    }
    Ok(())
}
