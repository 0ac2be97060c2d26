// ============================================================================
// focus-cli/src/progress.rs
// ============================================================================
//
// PROGRESS REPORTING: indicatif rendering of core progress events
//
// One bar per optimization phase, replaced when the next phase starts.
// Iteration and calibration milestones are printed above the bar.

use console::style;
use focus_core::{OptimizationPhase, ProgressCallback, ProgressEvent};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// Formats a duration as `HH:MM:SS`.
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    format!("{:02}:{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60, seconds % 60)
}

fn phase_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░ ")
}

/// Renders progress events on the terminal.
pub struct CliProgress {
    bar: Mutex<Option<ProgressBar>>,
    hidden: bool,
}

impl CliProgress {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
            hidden: false,
        }
    }

    /// A reporter that tracks events without drawing anything.
    pub fn hidden() -> Self {
        Self {
            bar: Mutex::new(None),
            hidden: true,
        }
    }

    fn println(&self, line: String) {
        if self.hidden {
            return;
        }
        match self.bar.lock().ok().as_deref().and_then(Option::as_ref) {
            Some(bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }

    fn start_phase(&self, phase: OptimizationPhase, epochs: usize) {
        let bar = ProgressBar::new(epochs as u64);
        if self.hidden {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_style(phase_style());
        bar.set_message(phase.to_string());
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(previous) = slot.replace(bar) {
                previous.finish_and_clear();
            }
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                f(bar);
            }
        }
    }
}

impl Default for CliProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCallback for CliProgress {
    fn on_progress(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::IterationStart { iteration, total } => {
                self.println(format!(
                    "{} {}/{}",
                    style("Outer iteration").bold(),
                    iteration + 1,
                    total
                ));
            }
            ProgressEvent::CalibrationComplete { kind, realizations } => {
                self.println(format!("  {kind} bias calibrated over {realizations} realizations"));
            }
            ProgressEvent::PhaseStart { phase, epochs } => self.start_phase(phase, epochs),
            ProgressEvent::Epoch { epoch, loss, .. } => self.with_bar(|bar| {
                bar.set_position(epoch as u64);
                if epoch % 10 == 0 {
                    bar.set_message(format!("loss {loss:.3e}"));
                }
            }),
            ProgressEvent::PhaseComplete { phase, final_loss } => {
                self.with_bar(ProgressBar::finish_and_clear);
                let loss = final_loss.map_or_else(|| "-".to_string(), |l| format!("{l:.4e}"));
                self.println(format!("  {phase} finished, loss {loss}"));
            }
            ProgressEvent::IterationComplete { iteration, duration } => {
                self.println(format!(
                    "{} iteration {} in {}",
                    style("Completed").green(),
                    iteration + 1,
                    format_duration(duration)
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_duration(Duration::from_secs(3725)), "01:02:05");
    }

    #[test]
    fn test_phase_bar_follows_epochs() {
        let progress = CliProgress::hidden();
        progress.on_progress(ProgressEvent::PhaseStart {
            phase: OptimizationPhase::Production,
            epochs: 20,
        });
        progress.on_progress(ProgressEvent::Epoch {
            epoch: 7,
            epochs: 20,
            loss: 1.5,
        });
        let position = progress.bar.lock().unwrap().as_ref().map(ProgressBar::position);
        assert_eq!(position, Some(7));
    }
}
