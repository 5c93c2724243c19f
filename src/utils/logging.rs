use log::{Level, log_enabled, warn};
use std::time::{Duration, Instant};

/// Scoped timer that traces the start and end of a pipeline phase.
pub struct ScopedTimer<'a> {
    label: &'a str,
    start: Instant,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(label: &'a str) -> Self {
        if log_enabled!(Level::Trace) {
            log::trace!("start {label}");
        }
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        if log_enabled!(Level::Trace) {
            log::trace!("end {} ({} µs)", self.label, self.start.elapsed().as_micros());
        }
    }
}

/// Warns when a frame ran past its budget. Returns whether it did.
pub fn warn_if_frame_budget_exceeded(frame: u64, duration: Duration, budget_ms: f32) -> bool {
    let elapsed_ms = duration.as_secs_f32() * 1000.0;
    if elapsed_ms > budget_ms {
        warn!("Frame {frame} exceeded budget: {elapsed_ms:.2} ms > {budget_ms:.2} ms");
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_check_reports_overrun() {
        assert!(warn_if_frame_budget_exceeded(1, Duration::from_millis(20), 16.6));
        assert!(!warn_if_frame_budget_exceeded(2, Duration::from_millis(5), 16.6));
    }
}
