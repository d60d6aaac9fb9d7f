//! Application entry point: headless voice editing session.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime.
//! 4. Build the image editor and orchestrator, load the image given on the
//!    command line.
//! 5. Start voice mode and run until Ctrl-C or the server ends the session.
//! 6. Stop voice mode and export the current image.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use nano_edit::{
    config::{AppConfig, AppPaths},
    editor::GeminiImageEditor,
    pipeline::{new_shared_state, EditOrchestrator},
    voice::{VoiceController, VoiceDeps},
};

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("nano-edit starting up");

    let image_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: nano-edit <image-file>")?;

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime (session task + detached edits)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(run(config, image_path))
}

async fn run(config: AppConfig, image_path: PathBuf) -> anyhow::Result<()> {
    // 4. Editor + orchestrator
    let editor = Arc::new(GeminiImageEditor::from_config(&config.api, &config.edit));
    let orchestrator = EditOrchestrator::new(new_shared_state(), editor);
    orchestrator
        .upload_file(&image_path)
        .with_context(|| format!("cannot load {}", image_path.display()))?;

    // 5. Voice mode
    let mut voice = VoiceController::new(&config, VoiceDeps::from_config(&config), orchestrator.clone());
    voice.start().await.context("could not start voice mode")?;
    log::info!("voice mode on; describe an edit out loud, Ctrl-C to finish");

    let mut status = tokio::time::interval(Duration::from_millis(500));
    let mut last_transcript = String::new();
    let mut last_edits = 0usize;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                log::info!("Ctrl-C received, stopping voice mode");
                break;
            }
            _ = voice.wait_closed() => {
                log::info!("voice session ended");
                break;
            }
            _ = status.tick() => {
                let snap = orchestrator.snapshot();
                if snap.transcript != last_transcript && !snap.transcript.is_empty() {
                    log::info!("heard:{}", snap.transcript);
                }
                if snap.history.len() != last_edits {
                    if let Some(latest) = snap.history.first() {
                        log::info!("applied edit {:?}", latest.prompt);
                    }
                }
                if let Some(err) = &snap.error {
                    log::debug!("status: {} ({err})", snap.voice.label());
                }
                last_transcript = snap.transcript;
                last_edits = snap.history.len();
            }
        }
    }
    voice.stop().await;

    // 6. Export
    let snap = orchestrator.snapshot();
    if let Some(err) = snap.error {
        log::warn!("last error: {err}");
    }
    if snap.history.is_empty() {
        log::info!("no edits applied; nothing to export");
        return Ok(());
    }

    let export_dir = AppPaths::new().export_dir;
    match orchestrator
        .export_current(&export_dir)
        .with_context(|| format!("cannot export to {}", export_dir.display()))?
    {
        Some(path) => log::info!("exported {} edit(s) to {}", snap.history.len(), path.display()),
        None => log::warn!("no current image to export"),
    }
    Ok(())
}
