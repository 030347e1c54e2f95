//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `CrossPostError` per upload, post e validazione del contenuto
//! - Definisce `OptimizeError` per le trasformazioni dei media
//! - Converte gli errori di `reqwest` e di I/O nella categoria corretta
//!
//! ## Categorie di errori (`CrossPostError`):
//! - `Transport`: Errori di rete (timeout, connessione rifiutata, etc.)
//! - `Protocol`: Risposta valida ma semanticamente errata (processing fallito, file mancante)
//! - `Validation`: Contenuto oltre un limite noto, rilevato prima di qualsiasi chiamata di rete
//! - `Credential`: Segreto richiesto non configurato
//! - `Canceled`: Operazione annullata tramite cancel token (mai mostrata all'utente)
//!
//! ## Esempio:
//! ```ignore
//! if text.trim().is_empty() && asset.is_none() {
//!     return Err(CrossPostError::Validation("nothing to post".to_string()));
//! }
//! ```

/// Errors raised by the upload clients and the cross-post coordinator.
///
/// Messages are captured as strings so results can be cloned into events.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CrossPostError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Missing credentials: {0}")]
    Credential(String),

    #[error("Operation canceled")]
    Canceled,
}

impl CrossPostError {
    /// True when the error only means "no handle obtained" and must not be surfaced.
    pub fn is_canceled(&self) -> bool {
        matches!(self, CrossPostError::Canceled)
    }

    /// Validation and credential errors are raised before any network call.
    pub fn is_rejection(&self) -> bool {
        matches!(self, CrossPostError::Validation(_) | CrossPostError::Credential(_))
    }
}

impl From<reqwest::Error> for CrossPostError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CrossPostError::Protocol(format!("undecodable response: {err}"))
        } else {
            CrossPostError::Transport(err.to_string())
        }
    }
}

impl From<std::io::Error> for CrossPostError {
    fn from(err: std::io::Error) -> Self {
        CrossPostError::Protocol(format!("media file unavailable: {err}"))
    }
}

/// Errors produced while transforming a media asset
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("FFmpeg error: {0}")]
    FFmpeg(String),

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("Transform task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(CrossPostError::Canceled.is_canceled());
        assert!(!CrossPostError::Transport("reset".into()).is_canceled());
        assert!(CrossPostError::Validation("too long".into()).is_rejection());
        assert!(CrossPostError::Credential("twitter".into()).is_rejection());
        assert!(!CrossPostError::Protocol("failed".into()).is_rejection());
    }

    #[test]
    fn test_io_error_is_protocol() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CrossPostError = io.into();
        assert!(matches!(err, CrossPostError::Protocol(_)));
    }
}
