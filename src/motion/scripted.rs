//! Deterministic camera for tests: uniform gray frames with synthetic,
//! evenly spaced capture times.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use image::{DynamicImage, GrayImage, Luma};

use super::camera::{Camera, CameraError, CameraHandle, Frame};

pub const WIDTH: u32 = 100;
pub const HEIGHT: u32 = 100;

/// Intensities whose consecutive differences produce `scores` (each score
/// must be a multiple of the pixel count and at most 255 per pixel).
pub fn intensities_for_scores(scores: &[u64]) -> Vec<u8> {
    let pixels = u64::from(WIDTH * HEIGHT);
    let mut current = 0u8;
    let mut out = vec![current];
    for score in scores {
        let step = (score / pixels) as u8;
        current = if u16::from(current) + u16::from(step) <= 255 {
            current + step
        } else {
            current - step
        };
        out.push(current);
    }
    out
}

#[derive(Clone, Default)]
pub struct CameraCounters {
    pub opened: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
    pub frames_read: Arc<AtomicUsize>,
}

impl CameraCounters {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn frames_read(&self) -> usize {
        self.frames_read.load(Ordering::SeqCst)
    }
}

pub struct ScriptedCamera {
    intensities: Vec<u8>,
    interval: Duration,
    available: bool,
    fail_at: Option<usize>,
    endless: bool,
    pace: Option<Duration>,
    pub counters: CameraCounters,
    in_use: Arc<AtomicBool>,
}

impl ScriptedCamera {
    pub fn new(intensities: Vec<u8>, interval: Duration) -> Self {
        Self {
            intensities,
            interval,
            available: true,
            fail_at: None,
            endless: false,
            pace: None,
            counters: CameraCounters::default(),
            in_use: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(Vec::new(), Duration::from_millis(100))
        }
    }

    /// Read error at frame `index` instead of a frame.
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Repeats the last intensity forever, sleeping `pace` per real read.
    pub fn endless(mut self, pace: Duration) -> Self {
        self.endless = true;
        self.pace = Some(pace);
        self
    }
}

impl Camera for ScriptedCamera {
    fn open_device(&self, index: u32) -> Result<Box<dyn CameraHandle>, CameraError> {
        if !self.available || self.in_use.swap(true, Ordering::SeqCst) {
            return Err(CameraError::Unavailable {
                index,
                reason: "scripted camera offline".into(),
            });
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedHandle {
            intensities: self.intensities.clone(),
            interval: self.interval,
            fail_at: self.fail_at,
            endless: self.endless,
            pace: self.pace,
            base: Instant::now(),
            next: 0,
            counters: self.counters.clone(),
            in_use: self.in_use.clone(),
        }))
    }
}

struct ScriptedHandle {
    intensities: Vec<u8>,
    interval: Duration,
    fail_at: Option<usize>,
    endless: bool,
    pace: Option<Duration>,
    base: Instant,
    next: usize,
    counters: CameraCounters,
    in_use: Arc<AtomicBool>,
}

impl CameraHandle for ScriptedHandle {
    fn read_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        if self.fail_at == Some(self.next) {
            return Err(CameraError::Read("scripted failure".into()));
        }
        let value = match self.intensities.get(self.next) {
            Some(value) => *value,
            None if self.endless => self.intensities.last().copied().unwrap_or(0),
            None => return Ok(None),
        };
        if let Some(pace) = self.pace {
            std::thread::sleep(pace);
        }

        let captured_at = self.base + self.interval * self.next as u32;
        self.next += 1;
        self.counters.frames_read.fetch_add(1, Ordering::SeqCst);

        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(WIDTH, HEIGHT, Luma([value])));
        Ok(Some(Frame::new(image, captured_at)))
    }

    fn release(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        self.in_use.store(false, Ordering::SeqCst);
    }
}
