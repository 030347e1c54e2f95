//! # Cross Post Module
//!
//! Orchestrazione della pubblicazione su due destinazioni:
//! - `coordinator`: `CrossPostCoordinator`, eleggibilità, upload per destinazione, `publish`
//! - `composer`: attore della sessione di composizione (upload anticipate, post in coda)

pub mod composer;
pub mod coordinator;

pub use composer::{Composer, ComposerEvent, ComposerHandle, ComposerSnapshot, PublishReport};
pub use coordinator::{
    CachedHandles, CrossPostCoordinator, DestinationResult, DestinationToggles, Ineligibility, OutcomeKind,
    PostOutcome, PreparedUpload, PublishRequest, PublishResult,
};
