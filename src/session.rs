//! # Upload Session Module
//!
//! Questo modulo gestisce il contatore di generazione e i cancel token delle
//! upload in volo.
//!
//! ## Responsabilità:
//! - `begin_attempt` è l'unico modo per conoscere la generazione corrente
//! - Ogni completamento asincrono confronta la generazione catturata con
//!   `is_current` prima di toccare lo stato condiviso
//! - Ciclo di vita di un tentativo: `Pending` (tracciato) → `Uploading` (task avviato) → esito
//! - Al massimo un `UploadAttempt` non concluso per (generazione, destinazione)
//! - `cancel_all` segnala ogni token tracciato e svuota l'insieme
//!
//! Tutti i metodi prendono `&mut self`: lo stato vive in un unico flusso
//! sequenziale (l'attore del composer), nessun lock necessario.

use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::CrossPostError;
use crate::upload::{Destination, UploadHandle};

/// Monotonic tag tying async work to the media selection that spawned it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptState {
    Pending,
    Uploading,
    Succeeded(UploadHandle),
    Failed(CrossPostError),
    Canceled,
}

impl AttemptState {
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            AttemptState::Succeeded(_) | AttemptState::Failed(_) | AttemptState::Canceled
        )
    }

    /// Settled state for an upload result
    pub fn from_result(result: &Result<UploadHandle, CrossPostError>) -> Self {
        match result {
            Ok(handle) => AttemptState::Succeeded(handle.clone()),
            Err(CrossPostError::Canceled) => AttemptState::Canceled,
            Err(e) => AttemptState::Failed(e.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadAttempt {
    pub generation: Generation,
    pub destination: Destination,
    pub state: AttemptState,
    pub cancel: CancellationToken,
}

#[derive(Debug, Default)]
pub struct UploadSessionCoordinator {
    current: Generation,
    attempts: Vec<UploadAttempt>,
}

impl UploadSessionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_attempt(&mut self) -> Generation {
        self.current = Generation(self.current.0 + 1);
        debug!("Upload generation {} started", self.current);
        self.current
    }

    pub fn current(&self) -> Generation {
        self.current
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        generation == self.current
    }

    /// Track `cancel` as a `Pending` upload for `(generation, destination)`.
    ///
    /// Returns false, without tracking, when the generation is stale or an
    /// upload for the same pair has not settled yet.
    pub fn track_cancelable(
        &mut self,
        generation: Generation,
        destination: Destination,
        cancel: CancellationToken,
    ) -> bool {
        if !self.is_current(generation) || self.is_running(generation, destination) {
            return false;
        }
        self.attempts.push(UploadAttempt {
            generation,
            destination,
            state: AttemptState::Pending,
            cancel,
        });
        true
    }

    /// The task behind a `Pending` attempt has started transferring
    pub fn mark_uploading(&mut self, generation: Generation, destination: Destination) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        match self.running_mut(generation, destination) {
            Some(attempt) if attempt.state == AttemptState::Pending => {
                attempt.state = AttemptState::Uploading;
                true
            }
            _ => false,
        }
    }

    /// Record the final state of a running attempt. Stale results are ignored.
    pub fn settle(&mut self, generation: Generation, destination: Destination, state: AttemptState) -> bool {
        if !self.is_current(generation) {
            debug!("Dropping stale {} result from generation {}", destination, generation);
            return false;
        }
        match self.running_mut(generation, destination) {
            Some(attempt) => {
                attempt.state = state;
                true
            }
            None => false,
        }
    }

    pub fn attempt(&self, generation: Generation, destination: Destination) -> Option<&UploadAttempt> {
        self.attempts
            .iter()
            .rev()
            .find(|a| a.generation == generation && a.destination == destination)
    }

    fn running_mut(&mut self, generation: Generation, destination: Destination) -> Option<&mut UploadAttempt> {
        self.attempts
            .iter_mut()
            .find(|a| a.generation == generation && a.destination == destination && !a.state.is_settled())
    }

    fn is_running(&self, generation: Generation, destination: Destination) -> bool {
        self.attempts
            .iter()
            .any(|a| a.generation == generation && a.destination == destination && !a.state.is_settled())
    }

    /// Uploads still running for `generation`
    pub fn in_flight(&self, generation: Generation) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.generation == generation && !a.state.is_settled())
            .count()
    }

    pub fn is_anything_in_flight(&self) -> bool {
        self.attempts.iter().any(|a| !a.state.is_settled())
    }

    /// Signal every tracked token and forget them. Returns how many were still running.
    pub fn cancel_all(&mut self) -> usize {
        let mut canceled = 0;
        for attempt in self.attempts.drain(..) {
            if !attempt.state.is_settled() {
                canceled += 1;
            }
            attempt.cancel.cancel();
        }
        if canceled > 0 {
            debug!("Canceled {} in-flight upload(s)", canceled);
        }
        canceled
    }
}
