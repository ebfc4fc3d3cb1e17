//! Progress display

use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use saturn_core::flash::{Phase, Progress};

use super::announce;

/// Progress reporter: protocol messages on stdout, indicatif bars on stderr
pub struct IndicatifProgress {
    multi: MultiProgress,
    current_bar: Option<ProgressBar>,
    /// Message printed when the erase phase starts
    action: &'static str,
}

impl IndicatifProgress {
    /// `action` is printed when erasing starts ("flashing chip..",
    /// "erasing chip..")
    pub fn new(action: &'static str) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::stderr()),
            current_bar: None,
            action,
        }
    }

    fn create_bar(&mut self, total: u64, phase: &'static str) {
        let pb = self.multi.add(ProgressBar::new(total));
        pb.set_style(
            ProgressStyle::default_bar()
                .template(&format!(
                    "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                    phase
                ))
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        self.current_bar = Some(pb);
    }

    fn create_spinner(&mut self, message: String) {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        self.current_bar = Some(pb);
    }

    fn clear(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish_and_clear();
        }
    }
}

impl Progress for IndicatifProgress {
    fn phase(&mut self, phase: Phase) {
        log::info!("Phase: {}", phase);
        match phase {
            Phase::Idle | Phase::Initializing => {}
            Phase::Erasing => {
                announce(self.action);
                self.create_spinner("Erasing...".to_string());
            }
            Phase::Programming => self.clear(),
            Phase::Validating => {
                self.clear();
                announce("\nvalidating..");
            }
            Phase::Done => {
                self.clear();
                println!("success!");
            }
            Phase::Aborting => {
                self.clear();
                println!("failed!");
            }
        }
    }

    fn sector_scanned(&mut self, sector: u8, erased: bool) {
        if let Some(pb) = &self.current_bar {
            let state = if erased { "erased" } else { "blank" };
            pb.set_message(format!("Sector {} {}", sector, state));
        }
    }

    fn program_progress(&mut self, bytes_done: usize, bytes_total: usize) {
        if self.current_bar.is_none() {
            self.create_bar(bytes_total as u64, "Writing");
        }
        if let Some(pb) = &self.current_bar {
            pb.set_position(bytes_done as u64);
        }
    }

    fn validate_progress(&mut self, bytes_done: usize, bytes_total: usize) {
        if self.current_bar.is_none() {
            self.create_bar(bytes_total as u64, "Verifying");
        }
        if let Some(pb) = &self.current_bar {
            pb.set_position(bytes_done as u64);
        }
    }
}
