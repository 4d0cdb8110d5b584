use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::Serialize;

use crate::error::{EngineError, Result};

/// Magnitude spectrum of one analysis block, in linear and dBFS form.
///
/// `dbfs` is referenced to the block's own peak, so its maximum is 0 dB
/// whenever the block is not silent.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Spectrum {
    /// Raw FFT magnitudes (N/2 bins)
    pub linear: Vec<f64>,
    /// 20*log10(linear / peak_linear), floored
    pub dbfs: Vec<f64>,
    pub peak_linear: f64,
    pub mean_linear: f64,
    pub stddev_linear: f64,
    pub peak_dbfs: f64,
    pub mean_dbfs: f64,
    pub stddev_dbfs: f64,
}

impl Spectrum {
    /// Build a spectrum (dBFS and statistics) from linear magnitudes.
    pub fn from_linear(linear: Vec<f64>, dbfs_floor: f64) -> Self {
        let mut spectrum = Spectrum {
            dbfs: vec![0.0; linear.len()],
            linear,
            ..Default::default()
        };
        spectrum.refresh(dbfs_floor);
        spectrum
    }

    pub fn len(&self) -> usize {
        self.linear.len()
    }

    pub fn is_empty(&self) -> bool {
        self.linear.is_empty()
    }

    /// Recompute dBFS and statistics from `linear`.
    fn refresh(&mut self, dbfs_floor: f64) {
        let n = self.linear.len();
        if n == 0 {
            return;
        }

        self.peak_linear = self.linear.iter().copied().fold(0.0f64, f64::max);
        self.mean_linear = self.linear.iter().sum::<f64>() / n as f64;

        let peak = self.peak_linear;
        for (db, &mag) in self.dbfs.iter_mut().zip(self.linear.iter()) {
            *db = if peak > 0.0 {
                (20.0 * (mag.abs() / peak).log10()).max(dbfs_floor)
            } else {
                dbfs_floor
            };
        }

        self.mean_dbfs = self.dbfs.iter().sum::<f64>() / n as f64;
        self.peak_dbfs = self.dbfs.iter().copied().fold(dbfs_floor, f64::max);
        self.stddev_linear = sample_stddev(&self.linear, self.mean_linear);
        self.stddev_dbfs = sample_stddev(&self.dbfs, self.mean_dbfs);
    }
}

fn sample_stddev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Windowed FFT framing. Owns the plan, scratch buffers and the current spectrum.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f64>>,
    window: Option<Vec<f64>>,
    buffer: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    spectrum: Spectrum,
    dbfs_floor: f64,
}

impl SpectrumAnalyzer {
    pub fn new(transform_size: usize, apply_window: bool, dbfs_floor: f64) -> Result<Self> {
        if transform_size < 8 || transform_size % 2 != 0 {
            return Err(EngineError::TransformSize(transform_size));
        }

        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(transform_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        let half = transform_size / 2;
        Ok(Self {
            fft,
            window: apply_window.then(|| hann_window(transform_size)),
            buffer: vec![Complex::new(0.0, 0.0); transform_size],
            scratch,
            spectrum: Spectrum {
                linear: vec![0.0; half],
                dbfs: vec![dbfs_floor; half],
                peak_dbfs: dbfs_floor,
                mean_dbfs: dbfs_floor,
                ..Default::default()
            },
            dbfs_floor,
        })
    }

    pub fn transform_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn spectrum(&self) -> &Spectrum {
        &self.spectrum
    }

    /// Analyse one block of exactly `transform_size` samples, replacing the
    /// current spectrum.
    pub fn analyze(&mut self, samples: &[f64]) -> Result<&Spectrum> {
        let n = self.buffer.len();
        if samples.len() != n {
            return Err(EngineError::BlockSize {
                expected: n,
                got: samples.len(),
            });
        }

        match self.window {
            Some(ref window) => {
                for ((slot, &s), &w) in self.buffer.iter_mut().zip(samples).zip(window) {
                    *slot = Complex::new(s * w, 0.0);
                }
            }
            None => {
                for (slot, &s) in self.buffer.iter_mut().zip(samples) {
                    *slot = Complex::new(s, 0.0);
                }
            }
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        for (mag, c) in self.spectrum.linear.iter_mut().zip(&self.buffer[..n / 2]) {
            *mag = c.norm();
        }
        self.spectrum.refresh(self.dbfs_floor);

        Ok(&self.spectrum)
    }
}

fn hann_window(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (size - 1) as f64).cos()))
        .collect()
}
