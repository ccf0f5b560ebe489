//! Enrollment command.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use super::{open_gate, output_result, print_success, read_image};
use crate::Cli;

/// Enroll reference images for a person.
///
/// Images are copied into the gallery under generated names. The embedding
/// cache is cleared and rebuilt on the next check-in.
#[derive(Args)]
pub struct EnrollCommand {
    /// Person's name
    identity: String,

    /// Image files (JPEG or PNG)
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

#[derive(Serialize)]
struct EnrollOutput<'a> {
    identity: &'a str,
    stored: Vec<&'a str>,
}

impl EnrollCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<u8> {
        let images = self
            .images
            .iter()
            .map(|p| read_image(p))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let gate = open_gate(cli)?;
        let enrolled = gate.enroll(&self.identity, &images)?;

        print_success(&format!(
            "Stored {} image(s) for {}; embedding cache cleared",
            enrolled.images.len(),
            enrolled.identity
        ));
        output_result(
            &EnrollOutput {
                identity: &enrolled.identity,
                stored: enrolled.images.iter().map(|i| i.name.as_str()).collect(),
            },
            cli.json,
        )?;
        Ok(0)
    }
}
