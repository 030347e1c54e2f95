//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON (una riga per evento)
//! per chi pilota la CLI da un altro processo.
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio pubblicazione (testo, media, destinazioni attive)
//! - `upload_progress`: Frazione caricata per destinazione
//! - `upload_settled`: Upload concluso (con eventuale errore)
//! - `warning`: Avviso dell'ottimizzatore o destinazione disattivata
//! - `complete`: Esito finale con il `PostOutcome`
//! - `error`: Errore che ha impedito la pubblicazione

use serde::Serialize;
use std::path::PathBuf;

use crate::crosspost::{ComposerEvent, OutcomeKind, PostOutcome};
use crate::upload::Destination;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    Start {
        text_chars: usize,
        media: Option<PathBuf>,
        bluesky: bool,
    },
    UploadProgress {
        destination: Destination,
        percentage: f64,
    },
    UploadSettled {
        destination: Destination,
        error: Option<String>,
    },
    Warning {
        message: String,
    },
    Complete {
        kind: OutcomeKind,
        summary: String,
        outcome: PostOutcome,
    },
    Error {
        message: String,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn complete(outcome: &PostOutcome) -> Self {
        Self::Complete {
            kind: outcome.kind(),
            summary: outcome.summary(),
            outcome: outcome.clone(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    /// Map a composer event; the final outcome is emitted via `complete`
    pub fn from_event(event: &ComposerEvent) -> Option<Self> {
        match event {
            ComposerEvent::UploadProgress { destination, fraction } => Some(Self::UploadProgress {
                destination: *destination,
                percentage: (fraction * 1000.0).round() / 10.0,
            }),
            ComposerEvent::UploadSettled { destination, error } => Some(Self::UploadSettled {
                destination: *destination,
                error: error.clone(),
            }),
            ComposerEvent::OptimizerWarning { destination, message } => Some(Self::Warning {
                message: format!("{}: {}", destination, message),
            }),
            ComposerEvent::BlueskyForcedOff { reason } => Some(Self::Warning {
                message: format!("Bluesky disabled: {}", reason),
            }),
            ComposerEvent::PostQueued | ComposerEvent::PublishFinished(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crosspost::DestinationResult;

    #[test]
    fn test_progress_message_shape() {
        let event = ComposerEvent::UploadProgress {
            destination: Destination::Twitter,
            fraction: 0.4567,
        };
        let message = JsonMessage::from_event(&event).unwrap();
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "upload_progress");
        assert_eq!(value["destination"], "twitter");
        assert_eq!(value["percentage"], 45.7);
    }

    #[test]
    fn test_complete_message_carries_outcome() {
        let outcome = PostOutcome {
            twitter: DestinationResult::Posted { id: "1".into() },
            bluesky: DestinationResult::Skipped { reason: "disabled".into() },
        };
        let value = serde_json::to_value(JsonMessage::complete(&outcome)).unwrap();
        assert_eq!(value["type"], "complete");
        assert_eq!(value["kind"], "partial_success");
        assert_eq!(value["outcome"]["bluesky"]["status"], "skipped");
        assert_eq!(value["outcome"]["bluesky"]["reason"], "disabled");
    }

    #[test]
    fn test_queued_event_is_not_emitted() {
        assert!(JsonMessage::from_event(&ComposerEvent::PostQueued).is_none());
    }
}
