//! # Upload Progress Module
//!
//! Questo modulo gestisce le progress bar delle upload nella CLI.
//!
//! ## Responsabilità:
//! - Una barra `indicatif` per destinazione, in un `MultiProgress`
//! - Aggiornamento dalla frazione riportata dagli upload client (0.0 - 1.0)
//! - Le barre delle destinazioni mai caricate vengono rimosse alla fine
//!
//! ## Visual feedback:
//! ```text
//! ⠋ Twitter [████████████████████████░░░░░░░░░░░░░░░░]  61% photo.jpg
//! ⠋ Bluesky [████████████████████████████████████████] 100% uploaded
//! ```

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::upload::Destination;

const BAR_LENGTH: u64 = 1000;

/// One progress bar per destination
#[derive(Clone)]
pub struct UploadProgress {
    twitter: ProgressBar,
    bluesky: ProgressBar,
}

impl UploadProgress {
    pub fn new(label: &str) -> Self {
        let multi = MultiProgress::new();
        let twitter = multi.add(Self::bar(Destination::Twitter, label));
        let bluesky = multi.add(Self::bar(Destination::Bluesky, label));
        Self { twitter, bluesky }
    }

    fn bar(destination: Destination, label: &str) -> ProgressBar {
        let bar = ProgressBar::new(BAR_LENGTH);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {prefix:7} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        bar.set_prefix(destination.to_string());
        bar.set_message(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }

    fn bar_for(&self, destination: Destination) -> &ProgressBar {
        match destination {
            Destination::Twitter => &self.twitter,
            Destination::Bluesky => &self.bluesky,
        }
    }

    pub fn update(&self, destination: Destination, fraction: f64) {
        self.bar_for(destination).set_position(position(fraction));
    }

    pub fn finish(&self, destination: Destination, message: &str) {
        let bar = self.bar_for(destination);
        bar.set_position(BAR_LENGTH);
        bar.finish_with_message(message.to_string());
    }

    pub fn abandon(&self, destination: Destination, message: &str) {
        self.bar_for(destination).abandon_with_message(message.to_string());
    }

    /// Remove bars for destinations that never uploaded
    pub fn clear_unfinished(&self) {
        for bar in [&self.twitter, &self.bluesky] {
            if !bar.is_finished() {
                bar.finish_and_clear();
            }
        }
    }
}

fn position(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * BAR_LENGTH as f64).round() as u64
}
