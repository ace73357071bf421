// Per-unit progress reporting for extraction runs
use indicatif::{ProgressBar, ProgressStyle};

use crate::orchestrator::UnitOutcome;

const PAGE_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pages {msg}";

/// Receives one call per unit as a run settles it.
///
/// `start` gets the number of units the run will process, after
/// duplicates and already completed ids are filtered out. Units of a
/// document that could not be opened are still reported one by one.
pub trait RunProgress {
    fn start(&mut self, _pending: usize) {}
    fn unit_done(&mut self, _unit: &str, _outcome: UnitOutcome) {}
    fn finish(&mut self) {}
}

/// No progress output.
impl RunProgress for () {}

impl RunProgress for ProgressBar {
    fn start(&mut self, pending: usize) {
        self.set_length(pending as u64);
        self.set_position(0);
    }

    fn unit_done(&mut self, unit: &str, outcome: UnitOutcome) {
        self.set_message(format!("{unit} ({})", outcome.label()));
        self.inc(1);
    }

    fn finish(&mut self) {
        self.finish_and_clear();
    }
}

/// Page-count bar for interactive runs; hidden when `visible` is false.
pub fn page_progress_bar(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::with_template(PAGE_TEMPLATE)
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}
