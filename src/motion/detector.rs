//! Stretch detection by frame differencing.
//!
//! Scores are raw sums of absolute per-pixel intensity differences between
//! consecutive frames. They are not normalised by resolution, so
//! `sensitivity` is only meaningful for the camera resolution it was tuned
//! on; a frame whose size differs from its predecessor is a read failure.

use std::{
    thread,
    time::{Duration, Instant},
};

use image::GrayImage;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::camera::{Camera, CameraError, CameraLease, Frame};

// Set to false to silence this module's capture-loop logging
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const SETTLE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// How long the score must stay above `sensitivity` without a gap.
    pub min_duration: Duration,
    /// Leading frames used only as a baseline, never scored.
    pub warmup_frames: u32,
    pub sensitivity: u64,
    /// Pause after opening the device, for auto-exposure to settle.
    pub settle_time: Duration,
    pub camera_index: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_duration: Duration::from_millis(1500),
            warmup_frames: 20,
            sensitivity: 1_200_000,
            settle_time: Duration::from_secs(2),
            camera_index: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotDetectedReason {
    StreamEnded,
    ReadFailed,
    /// Operator abort.
    Cancelled,
    /// The ceiling above `min_duration` expired.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MotionOutcome {
    Confirmed,
    NotDetected(NotDetectedReason),
    CameraUnavailable,
}

/// What one frame contributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionSample {
    /// Baseline only; not scored.
    Warmup,
    Still { score: u64 },
    Moving { score: u64, held: Duration },
    Confirmed { score: u64, held: Duration },
}

/// Sum of absolute intensity differences, or `None` when the frame sizes
/// differ.
pub fn motion_score(previous: &GrayImage, current: &GrayImage) -> Option<u64> {
    if previous.dimensions() != current.dimensions() {
        return None;
    }
    Some(
        previous
            .as_raw()
            .iter()
            .zip(current.as_raw())
            .map(|(a, b)| u64::from(a.abs_diff(*b)))
            .sum(),
    )
}

/// Warmup, differencing and debounce state for one capture run.
#[derive(Debug)]
pub struct StretchTracker {
    min_duration: Duration,
    sensitivity: u64,
    warmup_left: u32,
    previous: Option<GrayImage>,
    motion_started: Option<Instant>,
}

impl StretchTracker {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            min_duration: config.min_duration,
            sensitivity: config.sensitivity,
            warmup_left: config.warmup_frames,
            previous: None,
            motion_started: None,
        }
    }

    pub fn observe(&mut self, frame: &Frame) -> Result<MotionSample, CameraError> {
        let current = frame.to_intensity();

        if self.warmup_left > 0 {
            self.warmup_left -= 1;
            self.previous = Some(current);
            return Ok(MotionSample::Warmup);
        }

        let score = match &self.previous {
            Some(previous) => motion_score(previous, &current).ok_or_else(|| {
                CameraError::Read(format!(
                    "frame size changed from {:?} to {:?}",
                    previous.dimensions(),
                    current.dimensions()
                ))
            })?,
            None => {
                self.previous = Some(current);
                return Ok(MotionSample::Warmup);
            }
        };
        self.previous = Some(current);

        if score <= self.sensitivity {
            self.motion_started = None;
            return Ok(MotionSample::Still { score });
        }

        let started = *self.motion_started.get_or_insert(frame.captured_at);
        let held = frame.captured_at.saturating_duration_since(started);
        if held >= self.min_duration {
            Ok(MotionSample::Confirmed { score, held })
        } else {
            Ok(MotionSample::Moving { score, held })
        }
    }
}

/// Blocking capture loop. Run it off the async executor.
pub fn detect_stretch(
    camera: &dyn Camera,
    config: &DetectorConfig,
    cancel: &CancellationToken,
) -> MotionOutcome {
    log_info!("stretch detection: opening camera {}", config.camera_index);
    let mut lease = match CameraLease::acquire(camera, config.camera_index) {
        Ok(lease) => lease,
        Err(err) => {
            log_warn!("stretch detection: {err}");
            return MotionOutcome::CameraUnavailable;
        }
    };

    if !settle(config.settle_time, cancel) {
        log_info!("stretch detection cancelled while camera settled");
        return MotionOutcome::NotDetected(NotDetectedReason::Cancelled);
    }

    let mut tracker = StretchTracker::new(config);
    loop {
        if cancel.is_cancelled() {
            log_info!("stretch detection cancelled");
            return MotionOutcome::NotDetected(NotDetectedReason::Cancelled);
        }

        let frame = match lease.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log_info!("stretch not detected: frame stream ended");
                return MotionOutcome::NotDetected(NotDetectedReason::StreamEnded);
            }
            Err(err) => {
                log_warn!("stretch not detected: {err}");
                return MotionOutcome::NotDetected(NotDetectedReason::ReadFailed);
            }
        };

        match tracker.observe(&frame) {
            Ok(MotionSample::Confirmed { score, held }) => {
                log_info!("stretch confirmed (score {score}, held {}ms)", held.as_millis());
                return MotionOutcome::Confirmed;
            }
            Ok(sample) => log_debug!("motion sample {sample:?}"),
            Err(err) => {
                log_warn!("stretch not detected: {err}");
                return MotionOutcome::NotDetected(NotDetectedReason::ReadFailed);
            }
        }
    }
}

/// Sleeps for `duration` unless cancelled first. Returns `false` on cancel.
fn settle(duration: Duration, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SETTLE_POLL.min(deadline - now));
    }
}
