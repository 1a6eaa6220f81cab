//! Record a session until Ctrl+C or a fixed duration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::runtime::Handle;

use presenter_capture_engine::{default_backend, RecordingOrchestrator, TrackStatus};
use presenter_common::config::AppConfig;
use presenter_platform_core::PermissionBroker;

#[cfg(target_os = "linux")]
fn platform_permissions() -> Arc<dyn PermissionBroker> {
    Arc::new(presenter_platform_linux::LinuxPermissions::new())
}

// Other platforms prompt from the OS itself when a device is first opened.
#[cfg(not(target_os = "linux"))]
fn platform_permissions() -> Arc<dyn PermissionBroker> {
    Arc::new(presenter_platform_core::StaticPermissions::all_authorized())
}

pub async fn run(config: AppConfig, duration: Option<f64>) -> anyhow::Result<()> {
    let duration = duration
        .map(|secs| {
            Duration::try_from_secs_f64(secs)
                .with_context(|| format!("Invalid duration: {secs}"))
        })
        .transpose()?;

    let orchestrator = RecordingOrchestrator::new(
        config,
        default_backend(),
        platform_permissions(),
        Handle::current(),
    );

    let dir = orchestrator
        .start_recording()
        .context("Failed to start recording")?;
    println!("Recording to: {}", dir.display());
    match duration {
        Some(d) => println!("Stopping after {:.1}s (or Ctrl+C)...", d.as_secs_f64()),
        None => println!("Press Ctrl+C to stop recording..."),
    }
    println!();

    match duration {
        Some(d) => {
            tokio::select! {
                _ = tokio::time::sleep(d) => {}
                result = tokio::signal::ctrl_c() => result?,
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }

    let report = orchestrator
        .stop_recording()
        .context("Recording was not active")?;
    println!("Stopping; waiting for tracks to finalize...");

    let statuses = report.wait_finalized().await;

    println!();
    println!("Session {}", report.name());
    let mut failures = 0;
    for (kind, status) in &statuses {
        match status {
            TrackStatus::Finished(output) => match &output.path {
                Some(path) if kind.is_media() => println!(
                    "  [OK]   {kind:<7} {} ({} samples, {} dropped)",
                    path.display(),
                    output.samples_written,
                    output.samples_dropped
                ),
                Some(path) => println!(
                    "  [OK]   {kind:<7} {} ({} events)",
                    path.display(),
                    output.events_logged
                ),
                None => println!("  [--]   {kind:<7} nothing captured"),
            },
            TrackStatus::Failed(reason) => {
                failures += 1;
                println!("  [FAIL] {kind:<7} {:?}: {}", reason.kind, reason.message);
            }
            other => println!("  [??]   {kind:<7} {}", other.name()),
        }
    }

    if failures > 0 {
        println!();
        println!("{failures} track(s) failed. Run `presenter check` for details.");
    }
    Ok(())
}
