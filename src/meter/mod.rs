//! Input level metering.
//!
//! Mirrors the analyser-style meter: magnitudes of the frequency bins of
//! a short analysis window are mapped onto a 0–255 byte range between
//! `MIN_DB` and `MAX_DB`, averaged across all bins, then rescaled to
//! 0–100 and clamped.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Analysis window length in samples (half as many frequency bins).
pub const WINDOW_SAMPLES: usize = 256;

/// Quietest magnitude representable on the byte scale.
const MIN_DB: f32 = -100.0;
/// Loudest magnitude representable on the byte scale.
const MAX_DB: f32 = -30.0;

/// Shared 0–100 level gauge; written by the meter loop, read anywhere.
#[derive(Debug, Default)]
pub struct LevelHandle(AtomicU8);

impl LevelHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(AtomicU8::new(0)))
    }

    /// Current level, 0–100.
    pub fn get(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn set(&self, value: u8) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        self.set(0);
    }
}

/// Compute the 0–100 activity level of one analysis window.
///
/// Uses the most recent `WINDOW_SAMPLES` samples when given more.
pub fn sample(window: &[f32]) -> u8 {
    if window.is_empty() {
        return 0;
    }
    let n = window.len().min(WINDOW_SAMPLES);
    let window = &window[window.len() - n..];
    let bins = n / 2;
    if bins == 0 {
        return 0;
    }
    let mut acc = 0.0f32;
    for k in 0..bins {
        acc += byte_magnitude(bin_magnitude(window, k));
    }
    let average = acc / bins as f32;
    (average / 255.0 * 100.0).min(100.0).round() as u8
}

/// Normalized magnitude of frequency bin `k` over the window.
fn bin_magnitude(window: &[f32], k: usize) -> f32 {
    let n = window.len();
    let step = -2.0 * std::f32::consts::PI * k as f32 / n as f32;
    let mut re = 0.0f32;
    let mut im = 0.0f32;
    for (i, &s) in window.iter().enumerate() {
        let (sin, cos) = (step * i as f32).sin_cos();
        re += s * cos;
        im += s * sin;
    }
    (re * re + im * im).sqrt() * 2.0 / n as f32
}

/// Map a linear magnitude onto the 0–255 byte range between the dB bounds.
fn byte_magnitude(magnitude: f32) -> f32 {
    if magnitude <= 0.0 {
        return 0.0;
    }
    let db = 20.0 * magnitude.log10();
    ((db - MIN_DB) / (MAX_DB - MIN_DB)).clamp(0.0, 1.0) * 255.0
}
