//! Check-in command.

use std::path::PathBuf;

use clap::Args;
use facegate_gate::Outcome;
use facegate_matcher::MatchDecision;
use serde::Serialize;

use super::{
    EXIT_NO_FACE, EXIT_NO_GALLERY_DATA, open_gate, output_result, print_error, print_info,
    print_success, print_warning, read_image,
};
use crate::Cli;

/// Check a camera frame against the gallery.
///
/// Exits 0 when access is granted, 1 when the closest person is not a
/// confident match, 3 when nobody is enrolled and 4 when the frame holds no
/// face.
#[derive(Args)]
pub struct CheckInCommand {
    /// Image file (JPEG or PNG)
    image: PathBuf,
}

#[derive(Serialize)]
struct CheckInOutput<'a> {
    timestamp: String,
    name: &'a str,
    status: &'static str,
    distance: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    decision: Option<&'a MatchDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audit_error: Option<String>,
}

impl CheckInCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<u8> {
        let image = read_image(&self.image)?;
        let gate = open_gate(cli)?;

        let check_in = gate.check_in(&image).await?;

        if let Some(report) = &check_in.rebuilt {
            print_info(&format!(
                "Embedding cache rebuilt: {} entries ({} embedded, {} reused)",
                report.entries, report.embedded, report.reused
            ));
            for s in &report.skipped {
                print_warning(&format!(
                    "Skipped {}/{}: {}",
                    s.image.identity, s.image.name, s.reason
                ));
            }
        }

        let code = match &check_in.outcome {
            Outcome::Decided(MatchDecision::Granted { identity, distance }) => {
                print_success(&format!(
                    "Access Granted: Welcome, {identity}! (Distance: {distance:.4})"
                ));
                0
            }
            Outcome::Decided(MatchDecision::Denied { identity, distance }) => {
                print_warning(&format!(
                    "Access Denied: match found for {identity}, but confidence is too low. (Distance: {distance:.4})"
                ));
                1
            }
            Outcome::Decided(MatchDecision::NoCandidates) => {
                print_error("Access Denied: no match found in the gallery.");
                EXIT_NO_GALLERY_DATA
            }
            Outcome::NoFaceDetected => {
                print_error("No face detected in the image.");
                EXIT_NO_FACE
            }
        };

        if let Some(e) = &check_in.audit_error {
            print_warning(&format!("Check-in not recorded: {e}"));
        }

        let decision = match &check_in.outcome {
            Outcome::Decided(d) => Some(d),
            Outcome::NoFaceDetected => None,
        };
        output_result(
            &CheckInOutput {
                timestamp: check_in.record.timestamp_str(),
                name: &check_in.record.name,
                status: check_in.record.status.label(),
                distance: check_in.record.distance_str(),
                decision,
                audit_error: check_in.audit_error.as_ref().map(|e| e.to_string()),
            },
            cli.json,
        )?;
        Ok(code)
    }
}
