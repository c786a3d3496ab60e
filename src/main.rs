//! citer command line.
//!
//! ```bash
//! # Citation keys available to a document
//! citer keys paper.md
//!
//! # Cross-reference labels of a document
//! citer refs paper.md --mode minimal
//!
//! # Keep the bibliographies of a document loaded and log re-parses
//! citer --workspace ~/thesis watch chapters/intro.md
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use citer::config::{CrossRefMode, Settings};
use citer::discovery::DiskReader;
use citer::engine::Citer;
use citer::notice::TracingSink;
use citer::watch::{event_channel, NotifyWatcher};

#[derive(Parser)]
#[command(name = "citer", version)]
#[command(about = "Citation and cross-reference lookup for Markdown documents")]
struct Cli {
    /// Workspace root; relative bibliography paths resolve against it
    #[arg(long, short, global = true)]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the citation keys available to a document
    Keys { document: PathBuf },
    /// List the cross-reference labels defined in a document
    Refs {
        document: PathBuf,
        /// Overrides `crossref_mode` from the settings
        #[arg(long, value_enum)]
        mode: Option<CrossRefMode>,
    },
    /// Track the bibliographies of a document until interrupted
    Watch { document: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;
    let workspace = match cli.workspace {
        Some(dir) => cwd.join(dir),
        None => cwd.clone(),
    };
    let settings = Settings::new(&workspace)?;

    let (sender, events) = event_channel();
    let mut citer = Citer::new(
        settings,
        Some(workspace.clone()),
        Box::new(DiskReader),
        Box::new(NotifyWatcher::new(sender)?),
        events,
        Arc::new(TracingSink),
    );

    match cli.command {
        Command::Keys { document } => {
            let document = cwd.join(document);
            let text = read_document(&document)?;
            citer.on_active_document_changed(&text, Some(&document));

            for entry in citer.citation_suggestions() {
                println!(
                    "{}\t{}",
                    entry.key,
                    display_path(&entry.source_path, &workspace)
                );
            }
        }
        Command::Refs { document, mode } => {
            let document = cwd.join(document);
            let text = read_document(&document)?;
            let mode = mode.unwrap_or(citer.settings().crossref_mode);

            for label in citer.cross_reference_labels(&text, Some(&document), mode) {
                println!("{}\t{}", label.reference(), label.detail);
            }
        }
        Command::Watch { document } => {
            let document = cwd.join(document);
            let text = read_document(&document)?;
            let sources = citer.on_active_document_changed(&text, Some(&document));
            for source in sources.iter() {
                info!(path = %display_path(source, &workspace), "Watching bibliography");
            }

            let shutdown = tokio::signal::ctrl_c();
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    event = citer.next_source_event() => {
                        let Some(event) = event else { break };
                        if citer.on_source_file_event(&event) {
                            info!(
                                path = %display_path(&event.path, &workspace),
                                kind = ?event.kind,
                                entries = citer.citation_suggestions().len(),
                                "Bibliography updated"
                            );
                        }
                    }
                    _ = &mut shutdown => break,
                }
            }
        }
    }

    Ok(())
}

fn read_document(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn display_path(path: &Path, workspace: &Path) -> String {
    pathdiff::diff_paths(path, workspace)
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}
