// SPDX-License-Identifier: MIT OR Apache-2.0
//! Atelier - AI-assisted 3D asset studio
//!
//! A console front end over the scene core:
//! - Text, image and segmentation driven generation
//! - Hierarchy editing with rename, group, reparent and merge
//! - Smart Organize, Auto-Rename and Auto-Group flows
//! - Full undo/redo support
//! - Scene documents and OBJ export
//!
//! ## Architecture
//!
//! `StudioApp` owns the scene store and every remote client. The main loop
//! reads one line, runs it to completion, then prints the transcript lines it
//! produced. Logs go to stderr so they never interleave with replies.

mod app;
mod chat;
mod commands;
mod config;

use app::{Control, StudioApp};
use chat::Role;
use config::{StudioSettings, SETTINGS_FILE_NAME};
use std::io::{BufRead, Write};
use std::path::Path;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("atelier_app=debug,atelier_ai=info,atelier_scene=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Atelier v{}", env!("CARGO_PKG_VERSION"));

    let settings_path = Path::new(SETTINGS_FILE_NAME);
    let mut settings = match StudioSettings::load_or_default(settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Could not read {SETTINGS_FILE_NAME}: {e}");
            std::process::exit(1);
        }
    };
    if !settings_path.exists() {
        match settings.save(settings_path) {
            Ok(()) => tracing::info!("Wrote default settings to {SETTINGS_FILE_NAME}"),
            Err(e) => tracing::warn!("Could not write default settings: {e}"),
        }
    }
    settings.apply_env();

    let mut app = match StudioApp::new(settings) {
        Ok(app) => app,
        Err(e) => {
            tracing::error!("Studio failed to start: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&mut app) {
        tracing::error!("Console closed: {e}");
        std::process::exit(1);
    }
}

fn run(app: &mut StudioApp) -> std::io::Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    writeln!(stdout, "Atelier ready. Type 'help' for commands.")?;

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }

        let mark = app.transcript().next_id();
        let control = app.handle_line(&line);
        for entry in app.transcript().since(mark) {
            if entry.role != Role::User {
                writeln!(stdout, "{entry}")?;
            }
        }
        if control == Control::Quit {
            return Ok(());
        }
    }
}
