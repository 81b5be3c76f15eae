//! Frame sources.
//!
//! A [`Camera`] opens device handles; a [`CameraLease`] owns one handle and
//! releases it when dropped, so every exit path of a capture loop (success,
//! cancellation, read errors, panics) gives the device back.

use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use image::{DynamicImage, GrayImage, ImageFormat};
use log::{debug, info};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera {index} unavailable: {reason}")]
    Unavailable { index: u32, reason: String },
    #[error("failed to read frame: {0}")]
    Read(String),
    #[error("failed to decode frame {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub image: DynamicImage,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(image: DynamicImage, captured_at: Instant) -> Self {
        Self { image, captured_at }
    }

    /// Single-channel intensity view of the frame.
    pub fn to_intensity(&self) -> GrayImage {
        self.image.to_luma8()
    }
}

pub trait Camera: Send + Sync {
    fn open_device(&self, index: u32) -> Result<Box<dyn CameraHandle>, CameraError>;
}

pub trait CameraHandle: Send {
    /// `Ok(None)` marks the end of the stream.
    fn read_frame(&mut self) -> Result<Option<Frame>, CameraError>;

    fn release(&mut self);
}

pub struct CameraLease {
    handle: Option<Box<dyn CameraHandle>>,
    index: u32,
}

impl CameraLease {
    pub fn acquire(camera: &dyn Camera, index: u32) -> Result<Self, CameraError> {
        let handle = camera.open_device(index)?;
        debug!("camera {index} acquired");
        Ok(Self {
            handle: Some(handle),
            index,
        })
    }

    pub fn read_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        match self.handle.as_mut() {
            Some(handle) => handle.read_frame(),
            None => Err(CameraError::Read("camera already released".into())),
        }
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.release();
            debug!("camera {} released", self.index);
        }
    }
}

/// Replays still images from disk. Device `n` is the directory
/// `<root>/video<n>`; its image files are read in name order, optionally
/// paced to a frame rate.
pub struct ImageSequenceCamera {
    root: PathBuf,
    frame_interval: Option<Duration>,
}

impl ImageSequenceCamera {
    pub fn new(root: impl Into<PathBuf>, frame_rate: Option<u32>) -> Self {
        Self {
            root: root.into(),
            frame_interval: frame_rate
                .filter(|fps| *fps > 0)
                .map(|fps| Duration::from_secs(1) / fps),
        }
    }

    pub fn device_dir(&self, index: u32) -> PathBuf {
        self.root.join(format!("video{index}"))
    }
}

fn list_frames(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut frames: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && ImageFormat::from_path(path).is_ok())
        .collect();
    frames.sort();
    Ok(frames)
}

impl Camera for ImageSequenceCamera {
    fn open_device(&self, index: u32) -> Result<Box<dyn CameraHandle>, CameraError> {
        let dir = self.device_dir(index);
        let frames = list_frames(&dir).map_err(|err| CameraError::Unavailable {
            index,
            reason: format!("{}: {err}", dir.display()),
        })?;

        if frames.is_empty() {
            return Err(CameraError::Unavailable {
                index,
                reason: format!("no frames in {}", dir.display()),
            });
        }

        info!("opened image sequence {} ({} frames)", dir.display(), frames.len());
        Ok(Box::new(ImageSequenceHandle {
            frames: frames.into(),
            frame_interval: self.frame_interval,
            last_read: None,
        }))
    }
}

struct ImageSequenceHandle {
    frames: VecDeque<PathBuf>,
    frame_interval: Option<Duration>,
    last_read: Option<Instant>,
}

impl CameraHandle for ImageSequenceHandle {
    fn read_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        let Some(path) = self.frames.pop_front() else {
            return Ok(None);
        };

        if let (Some(interval), Some(last)) = (self.frame_interval, self.last_read) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }

        let image = image::open(&path).map_err(|source| CameraError::Decode {
            path: path.clone(),
            source,
        })?;
        let captured_at = Instant::now();
        self.last_read = Some(captured_at);
        Ok(Some(Frame::new(image, captured_at)))
    }

    fn release(&mut self) {
        self.frames.clear();
    }
}
