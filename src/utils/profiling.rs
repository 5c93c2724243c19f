use std::time::{Duration, Instant};

use log::debug;

use crate::config::TIMER_SMOOTHING;

/// Exponentially smoothed per-phase frame timings, in milliseconds.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FrameProfiler {
    /// Time blocked on the previous dispatch at map.
    pub wait_ms: f32,
    pub update_ms: f32,
    pub sync_ms: f32,
    pub dispatch_ms: f32,
    pub frame_ms: f32,

    pub frames: u64,
}

impl FrameProfiler {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Blends one frame's raw samples into the running averages.
    ///
    /// The first frame seeds the averages directly.
    pub fn record(&mut self, sample: &FrameSample) {
        let first = self.frames == 0;
        let blend = |avg: &mut f32, raw: Duration| {
            let raw_ms = raw.as_secs_f32() * 1000.0;
            if first {
                *avg = raw_ms;
            } else {
                *avg += (raw_ms - *avg) * TIMER_SMOOTHING;
            }
        };
        blend(&mut self.wait_ms, sample.wait);
        blend(&mut self.update_ms, sample.update);
        blend(&mut self.sync_ms, sample.sync);
        blend(&mut self.dispatch_ms, sample.dispatch);
        blend(&mut self.frame_ms, sample.total);
        self.frames += 1;
    }

    pub fn report(&self) {
        if self.frames == 0 {
            return;
        }
        debug!("--- Frame Profile ({} frames) ---", self.frames);
        debug!("  Wait:     {:.3} ms", self.wait_ms);
        debug!("  Update:   {:.3} ms", self.update_ms);
        debug!("  Sync:     {:.3} ms", self.sync_ms);
        debug!("  Dispatch: {:.3} ms", self.dispatch_ms);
        debug!("  Frame:    {:.3} ms", self.frame_ms);
    }
}

/// Raw timings gathered while one frame runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameSample {
    pub wait: Duration,
    pub update: Duration,
    pub sync: Duration,
    pub dispatch: Duration,
    pub total: Duration,
}

/// Adds the lifetime of the guard to `output`.
pub struct PhaseTimer<'a> {
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> PhaseTimer<'a> {
    pub fn new(output: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl Drop for PhaseTimer<'_> {
    fn drop(&mut self) {
        *self.output += self.start.elapsed();
    }
}
