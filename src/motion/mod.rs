pub mod camera;
pub mod detector;
#[cfg(test)]
pub(crate) mod scripted;
pub mod verifier;

pub use camera::{Camera, CameraError, CameraHandle, CameraLease, Frame, ImageSequenceCamera};
pub use detector::{detect_stretch, DetectorConfig, MotionOutcome, MotionSample, NotDetectedReason};
pub use verifier::{MotionVerifier, StretchVerifier};
