use rodio::Source;
use std::f32::consts::PI;
use std::time::Duration;

const SAMPLE_RATE: u32 = 44_100;
const AMPLITUDE: f32 = 0.3;

/// Endless alarm beep: a sine tone gated on and off.
pub struct AlarmChime {
    freq: f32,
    on_samples: usize,
    period_samples: usize,
    num_sample: usize,
}

impl AlarmChime {
    pub fn new(freq: f32) -> Self {
        Self::with_pattern(freq, Duration::from_millis(400), Duration::from_millis(600))
    }

    pub fn with_pattern(freq: f32, on: Duration, off: Duration) -> Self {
        let to_samples = |d: Duration| (d.as_millis() * u128::from(SAMPLE_RATE) / 1000) as usize;
        let on_samples = to_samples(on).max(1);
        Self {
            freq,
            on_samples,
            period_samples: on_samples + to_samples(off),
            num_sample: 0,
        }
    }
}

impl Iterator for AlarmChime {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let position = self.num_sample % self.period_samples;
        self.num_sample = self.num_sample.wrapping_add(1);

        if position >= self.on_samples {
            return Some(0.0);
        }
        let t = position as f32 / SAMPLE_RATE as f32;
        Some((2.0 * PI * self.freq * t).sin() * AMPLITUDE)
    }
}

impl Source for AlarmChime {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
