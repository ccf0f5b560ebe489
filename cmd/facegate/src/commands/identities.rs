//! Identity listing command.

use clap::Args;
use serde::Serialize;

use super::{open_gate, output_result, print_info};
use crate::Cli;

/// List enrolled identities and their image counts.
#[derive(Args)]
pub struct IdentitiesCommand {}

#[derive(Serialize)]
struct IdentityOutput {
    identity: String,
    images: usize,
}

impl IdentitiesCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<u8> {
        let gate = open_gate(cli)?;
        let identities = gate.identities()?;

        if identities.is_empty() {
            print_info("No one is enrolled yet");
        }
        let out: Vec<IdentityOutput> = identities
            .into_iter()
            .map(|(identity, images)| IdentityOutput { identity, images })
            .collect();
        output_result(&out, cli.json)?;
        Ok(0)
    }
}
