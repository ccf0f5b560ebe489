//! Cache rebuild command.

use clap::Args;
use serde::Serialize;

use super::{open_gate, output_result, print_success, print_warning};
use crate::Cli;

/// Rebuild the embedding cache now.
///
/// Only new or changed images are embedded unless --full is given.
#[derive(Args)]
pub struct RebuildCommand {
    /// Drop every cached vector and embed the whole gallery again
    #[arg(long)]
    full: bool,
}

#[derive(Serialize)]
struct SkippedOutput {
    identity: String,
    image: String,
    reason: String,
}

#[derive(Serialize)]
struct RebuildOutput {
    images: usize,
    entries: usize,
    embedded: usize,
    reused: usize,
    attempts: usize,
    skipped: Vec<SkippedOutput>,
}

impl RebuildCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<u8> {
        let gate = open_gate(cli)?;
        let report = gate.rebuild(self.full).await?;

        for s in &report.skipped {
            print_warning(&format!(
                "Skipped {}/{}: {}",
                s.image.identity, s.image.name, s.reason
            ));
        }
        print_success(&format!(
            "Embedding cache rebuilt: {} entries from {} images ({} embedded, {} reused)",
            report.entries, report.images, report.embedded, report.reused
        ));

        output_result(
            &RebuildOutput {
                images: report.images,
                entries: report.entries,
                embedded: report.embedded,
                reused: report.reused,
                attempts: report.attempts,
                skipped: report
                    .skipped
                    .iter()
                    .map(|s| SkippedOutput {
                        identity: s.image.identity.clone(),
                        image: s.image.name.clone(),
                        reason: s.reason.to_string(),
                    })
                    .collect(),
            },
            cli.json,
        )?;
        Ok(0)
    }
}
