use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{error, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use super::camera::Camera;
use super::detector::{detect_stretch, DetectorConfig, MotionOutcome, NotDetectedReason};

/// Async seam between the dismissal flow and the blocking detector.
#[async_trait]
pub trait StretchVerifier: Send + Sync {
    /// Runs one verification. Cancelling `cancel` ends it with
    /// `NotDetected(Cancelled)`.
    async fn verify(&self, cancel: CancellationToken) -> MotionOutcome;
}

/// Runs [`detect_stretch`] on the blocking pool under a hard ceiling, with at
/// most one run holding the camera at a time.
pub struct MotionVerifier {
    camera: Arc<dyn Camera>,
    config: DetectorConfig,
    max_wait: Duration,
    camera_lock: Arc<Mutex<()>>,
}

impl MotionVerifier {
    pub fn new(camera: Arc<dyn Camera>, config: DetectorConfig, max_wait: Duration) -> Self {
        // The ceiling must leave room for a full settle plus one debounce window.
        let floor = config.settle_time + config.min_duration;
        if max_wait < floor {
            warn!(
                "motion ceiling {}ms is shorter than settle + min duration; using {}ms",
                max_wait.as_millis(),
                floor.as_millis()
            );
        }

        Self {
            camera,
            config,
            max_wait: max_wait.max(floor),
            camera_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }
}

fn outcome_from_join(joined: Result<MotionOutcome, JoinError>) -> MotionOutcome {
    joined.unwrap_or_else(|err| {
        error!("stretch detection worker failed: {err}");
        MotionOutcome::NotDetected(NotDetectedReason::ReadFailed)
    })
}

#[async_trait]
impl StretchVerifier for MotionVerifier {
    async fn verify(&self, cancel: CancellationToken) -> MotionOutcome {
        let Ok(camera_guard) = self.camera_lock.clone().try_lock_owned() else {
            warn!("camera busy with another verification");
            return MotionOutcome::CameraUnavailable;
        };

        let token = cancel.child_token();
        let worker_token = token.clone();
        let camera = Arc::clone(&self.camera);
        let config = self.config.clone();

        let mut worker = tokio::task::spawn_blocking(move || {
            let _camera_guard = camera_guard;
            detect_stretch(camera.as_ref(), &config, &worker_token)
        });
        // A caller that drops this future mid-run must still stop the loop.
        let _cancel_on_drop = token.clone().drop_guard();

        tokio::select! {
            joined = &mut worker => outcome_from_join(joined),
            _ = tokio::time::sleep(self.max_wait) => {
                info!(
                    "stretch detection hit the {}ms ceiling; cancelling",
                    self.max_wait.as_millis()
                );
                token.cancel();
                // Wait for the loop to exit so the camera is released before returning.
                match outcome_from_join(worker.await) {
                    MotionOutcome::NotDetected(NotDetectedReason::Cancelled) => {
                        MotionOutcome::NotDetected(NotDetectedReason::TimedOut)
                    }
                    other => other,
                }
            }
        }
    }
}
