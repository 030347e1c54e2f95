//! # Media Crosspost - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Gestione credenziali e file di configurazione
//! - Pubblicazione tramite l'attore del composer, con progress bar o eventi JSON
//!
//! ## Flusso di `post`:
//! 1. Carica configurazione e credenziali
//! 2. Avvia il composer e seleziona il media (le upload partono subito)
//! 3. Imposta testo e toggle di Bluesky
//! 4. Richiede il post (in coda finché le upload non si concludono)
//! 5. Stampa l'esito: successo, successo parziale o fallimento
//!
//! ## Esempio di utilizzo:
//! ```bash
//! media-crosspost credentials set twitter_consumer_key=... bluesky_identifier=me.bsky.social
//! media-crosspost post --text "hello" --media photo.jpg --verbose
//! ```

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::EnvFilter;

use media_crosspost::credentials::ALL_KEYS;
use media_crosspost::crosspost::OutcomeKind;
use media_crosspost::json_output::JsonMessage;
use media_crosspost::progress::UploadProgress;
use media_crosspost::{
    build_coordinator, Composer, ComposerEvent, Config, CredentialStore, Credentials, FileCredentialStore,
    MediaAsset, PublishReport,
};

#[derive(Parser)]
#[command(name = "media-crosspost")]
#[command(about = "Post one message with optional media to Twitter and Bluesky")]
struct Args {
    /// Configuration file (JSON); defaults apply when missing
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a post
    Post {
        /// Post text
        #[arg(short, long, default_value = "")]
        text: String,

        /// Image or video to attach
        #[arg(short, long)]
        media: Option<PathBuf>,

        /// Post to Twitter only
        #[arg(long)]
        no_bluesky: bool,

        /// Emit JSON lines instead of progress bars
        #[arg(long)]
        json: bool,
    },
    /// Manage stored credentials
    Credentials {
        #[command(subcommand)]
        action: CredentialAction,
    },
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CredentialAction {
    /// Store one or more KEY=VALUE pairs
    Set { pairs: Vec<String> },
    /// Show which credentials are configured
    Show,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration
    Init {
        #[arg(default_value = "media-crosspost.json")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &args.config {
        Some(path) => Config::from_file(path).await?,
        None => Config::default(),
    };

    match args.command {
        Commands::Post {
            text,
            media,
            no_bluesky,
            json,
        } => post(config, text, media, no_bluesky, json).await,
        Commands::Credentials { action } => credentials(action).await,
        Commands::Config {
            action: ConfigAction::Init { path },
        } => {
            Config::default().save_to_file(&path).await?;
            info!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

async fn credentials(action: CredentialAction) -> Result<()> {
    let store = FileCredentialStore::open_default().await?;
    match action {
        CredentialAction::Set { pairs } => {
            let mut parsed = Vec::new();
            for pair in pairs {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow!("Expected KEY=VALUE, got '{}'", pair))?;
                if !ALL_KEYS.contains(&key) {
                    return Err(anyhow!("Unknown credential key '{}', expected one of: {}", key, ALL_KEYS.join(", ")));
                }
                parsed.push((key.to_string(), value.to_string()));
            }
            store.set(&parsed).await?;
            info!("Stored {} credential(s)", parsed.len());
        }
        CredentialAction::Show => {
            let values = store.get(ALL_KEYS).await?;
            for key in ALL_KEYS {
                let state = match values.get(*key).and_then(|v| v.as_deref()) {
                    Some(v) if !v.trim().is_empty() => "set",
                    _ => "missing",
                };
                println!("{:<26} {}", key, state);
            }
        }
    }
    Ok(())
}

async fn post(config: Config, text: String, media: Option<PathBuf>, no_bluesky: bool, json: bool) -> Result<()> {
    let store = FileCredentialStore::open_default().await?;
    let credentials = Credentials::load(&store).await?;
    if credentials.twitter.is_none() {
        return Err(anyhow!(
            "Twitter credentials are not configured, run `media-crosspost credentials set` first"
        ));
    }

    let asset = match &media {
        Some(path) => Some(MediaAsset::probe(path).await?),
        None => None,
    };

    if json {
        JsonMessage::Start {
            text_chars: text.chars().count(),
            media: media.clone(),
            bluesky: !no_bluesky,
        }
        .emit();
    }

    let coordinator = Arc::new(build_coordinator(config).await?);
    let (composer, events, task) = Composer::spawn(coordinator, credentials);
    let label = asset.as_ref().map(|a| a.file_name()).unwrap_or_default();
    let reporter = spawn_reporter(events, json, label, asset.is_some());

    composer.set_text(text)?;
    if no_bluesky {
        // disabling is always allowed
        let _ = composer.set_bluesky_enabled(false).await?;
    }
    if let Some(asset) = asset {
        composer.select_media(asset)?;
    }

    let report = composer.request_post().await?;
    composer.shutdown()?;
    task.await?;
    reporter.await?;

    match report {
        PublishReport::Completed(outcome) => {
            if json {
                JsonMessage::complete(&outcome).emit();
            } else {
                println!("{}", outcome.summary());
            }
            match outcome.kind() {
                OutcomeKind::Failure => Err(anyhow!(outcome.summary())),
                _ => Ok(()),
            }
        }
        PublishReport::Rejected(error) => {
            if json {
                JsonMessage::error(error.to_string()).emit();
            }
            Err(error.into())
        }
        PublishReport::Superseded | PublishReport::Busy => Err(anyhow!("Post was not performed")),
    }
}

/// Render composer events until the composer stops
fn spawn_reporter(
    mut events: UnboundedReceiver<ComposerEvent>,
    json: bool,
    label: String,
    with_media: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let bars = (!json && with_media).then(|| UploadProgress::new(&label));
        while let Some(event) = events.recv().await {
            if json {
                if let Some(message) = JsonMessage::from_event(&event) {
                    message.emit();
                }
                continue;
            }
            match (&event, &bars) {
                (ComposerEvent::UploadProgress { destination, fraction }, Some(bars)) => {
                    bars.update(*destination, *fraction)
                }
                (ComposerEvent::UploadSettled { destination, error: None }, Some(bars)) => {
                    bars.finish(*destination, "uploaded")
                }
                (ComposerEvent::UploadSettled { destination, error: Some(e) }, Some(bars)) => {
                    bars.abandon(*destination, &format!("failed: {}", e))
                }
                (ComposerEvent::OptimizerWarning { destination, message }, _) => {
                    eprintln!("⚠️  {}: {}", destination, message)
                }
                (ComposerEvent::BlueskyForcedOff { reason }, _) => eprintln!("Bluesky disabled: {}", reason),
                _ => {}
            }
        }
        if let Some(bars) = bars {
            bars.clear_unfinished();
        }
    })
}
