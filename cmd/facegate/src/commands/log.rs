//! Audit log command.

use clap::Args;
use facegate_audit::LogRecord;
use serde::Serialize;

use super::{open_gate, output_result, print_info};
use crate::Cli;

/// Show the check-in log, newest first.
#[derive(Args)]
pub struct LogCommand {
    /// Show at most this many records
    #[arg(short = 'n', long)]
    limit: Option<usize>,
}

#[derive(Serialize)]
struct LogRow {
    timestamp: String,
    name: String,
    status: &'static str,
    distance: String,
}

impl From<&LogRecord> for LogRow {
    fn from(r: &LogRecord) -> Self {
        Self {
            timestamp: r.timestamp_str(),
            name: r.name.clone(),
            status: r.status.label(),
            distance: r.distance_str(),
        }
    }
}

impl LogCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<u8> {
        let gate = open_gate(cli)?;
        let records = gate.records()?;

        if records.is_empty() {
            print_info("No check-ins recorded yet");
        }
        let rows: Vec<LogRow> = records
            .iter()
            .rev()
            .take(self.limit.unwrap_or(usize::MAX))
            .map(LogRow::from)
            .collect();
        output_result(&rows, cli.json)?;
        Ok(0)
    }
}
