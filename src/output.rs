use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::app::{BatchReport, ProgressEvent, ProgressSink, SnapshotResult};
use crate::frontend::GenerateResponse;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_batch(result: &BatchReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_snapshot(result: &SnapshotResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_generate(result: &GenerateResponse) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress to the log.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

pub fn print_batch_summary(report: &BatchReport) {
    println!(
        "Run {}: {}/{} combinations, {} files, {} records",
        report.run_timestamp,
        report.processed,
        report.total,
        report.artifacts.len(),
        report.records_written()
    );
    for artifact in &report.artifacts {
        println!("  saved {} ({} records)", artifact.path, artifact.record_count);
    }
    if report.empty > 0 {
        println!("  {} combinations returned no funds", report.empty);
    }
    for failure in &report.auth_failures {
        println!("  AUTH  {}: {}", failure.combination, failure.reason);
    }
    for failure in &report.transient_failures {
        println!("  FAIL  {}: {}", failure.combination, failure.reason);
    }
    for failure in &report.persist_failures {
        println!("  SAVE  {}: {}", failure.combination, failure.reason);
    }
}
