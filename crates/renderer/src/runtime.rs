use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Kernel time and frame index handed to one dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Simulation time: frame index times the configured step.
    pub time: f32,
    pub frame_index: u64,
}

/// Frame counter plus wall-clock since the loop started.
///
/// Kernel time is derived from the frame index rather than the wall clock,
/// so a run is reproducible regardless of how fast frames are presented.
#[derive(Debug, Clone, Copy)]
pub struct FrameState {
    frame_index: u64,
    time_step: f32,
    started: Instant,
}

impl FrameState {
    pub fn start(time_step: f32) -> Self {
        Self {
            frame_index: 0,
            time_step,
            started: Instant::now(),
        }
    }

    pub fn sample(&self) -> TimeSample {
        TimeSample {
            time: self.frame_index as f32 * self.time_step,
            frame_index: self.frame_index,
        }
    }

    pub fn advance(&mut self) {
        self.frame_index += 1;
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverPhase {
    Initializing,
    Running,
    Terminating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationReason {
    /// The frame budget was reached.
    BudgetReached,
    /// The surface asked to close (window closed or Escape pressed).
    SurfaceClosed,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::BudgetReached => f.write_str("frame budget reached"),
            TerminationReason::SurfaceClosed => f.write_str("surface closed"),
        }
    }
}

/// What a completed run did, reported once at exit.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub frames: u64,
    pub frame_budget: u64,
    #[serde(rename = "elapsed_seconds", serialize_with = "serialize_seconds")]
    pub elapsed: Duration,
    pub reloads: u32,
    pub failed_reloads: u32,
    pub termination: TerminationReason,
}

impl RunSummary {
    pub fn average_frame_time(&self) -> Option<Duration> {
        u32::try_from(self.frames)
            .ok()
            .filter(|frames| *frames > 0)
            .map(|frames| self.elapsed / frames)
    }

    pub fn frames_per_second(&self) -> Option<f64> {
        let seconds = self.elapsed.as_secs_f64();
        (self.frames > 0 && seconds > 0.0).then(|| self.frames as f64 / seconds)
    }
}

fn serialize_seconds<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_is_frame_index_times_step() {
        let mut state = FrameState::start(0.01);
        assert_eq!(state.sample().time, 0.0);
        for _ in 0..100 {
            state.advance();
        }
        let sample = state.sample();
        assert_eq!(sample.frame_index, 100);
        assert!((sample.time - 1.0).abs() < 1e-6);
    }

    #[test]
    fn summary_averages() {
        let summary = RunSummary {
            frames: 4,
            frame_budget: 4,
            elapsed: Duration::from_millis(100),
            reloads: 0,
            failed_reloads: 0,
            termination: TerminationReason::BudgetReached,
        };
        assert_eq!(summary.average_frame_time(), Some(Duration::from_millis(25)));
        assert!((summary.frames_per_second().unwrap() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn empty_run_has_no_average() {
        let summary = RunSummary {
            frames: 0,
            frame_budget: 1024,
            elapsed: Duration::ZERO,
            reloads: 0,
            failed_reloads: 0,
            termination: TerminationReason::SurfaceClosed,
        };
        assert_eq!(summary.average_frame_time(), None);
        assert_eq!(summary.frames_per_second(), None);
    }
}
