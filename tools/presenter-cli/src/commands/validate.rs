//! Validate a recorded session directory.

use std::path::PathBuf;

use anyhow::Context;

use presenter_recording_model::validate::{validate_session, FileState};

pub fn run(path: PathBuf, json: bool) -> anyhow::Result<()> {
    let validation = validate_session(&path)
        .with_context(|| format!("Failed to read session at {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&validation)?);
    } else {
        println!("Validating session at: {}", path.display());
        println!("  Name: {}", validation.name);
        for (kind, state) in &validation.files {
            let state = match state {
                FileState::Absent => "absent".to_string(),
                FileState::Empty => "empty".to_string(),
                FileState::Present { bytes } => format!("{bytes} bytes"),
            };
            println!("  {:<12} {state}", kind.file_name());
        }
        if let Some(input) = &validation.input {
            println!(
                "  Input events: {} ({} keys, {} pointer)",
                input.records, input.key_events, input.pointer_events
            );
        }

        if validation.is_valid() {
            println!("\nSession is valid.");
        } else {
            println!("\nValidation issues:");
            for issue in &validation.issues {
                println!("  - {issue}");
            }
        }
    }

    if !validation.is_valid() {
        anyhow::bail!("{} issue(s) found", validation.issues.len());
    }
    Ok(())
}
