use serde::Deserialize;

use crate::error::{EngineError, Result};

/// Tunable thresholds for peak picking, harmonic validation and note tracking.
///
/// Every field has a serde default so a partial `[detector]` table in a
/// config file only overrides what it names.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectorConfig {
    /// Apply a Hann window before the transform.
    #[serde(default = "default_apply_window")]
    pub apply_window: bool,
    /// dBFS value used for empty bins and silent blocks.
    #[serde(default = "default_dbfs_floor")]
    pub dbfs_floor: f64,
    /// Lowest fundamental searched for.
    #[serde(default = "default_search_min_hz")]
    pub search_min_hz: f64,
    /// Upper end (exclusive) of the fundamental search.
    #[serde(default = "default_search_max_hz")]
    pub search_max_hz: f64,
    /// Bins that must separate two peaks found in the same scan.
    #[serde(default = "default_min_peak_distance")]
    pub min_peak_distance: usize,
    /// Onset threshold, as a multiple of the linear standard deviation.
    #[serde(default = "default_onset_sd_multiple")]
    pub onset_sd_multiple: f64,
    /// The frame's linear peak must exceed this before any onset is accepted.
    #[serde(default = "default_min_power")]
    pub min_power: f64,
    /// Expected level of harmonics 2 to 5 relative to the fundamental, in dB.
    #[serde(default = "default_harmonic_offsets_db")]
    pub harmonic_offsets_db: [f64; 4],
    #[serde(default = "default_harmonic_search_radius")]
    pub harmonic_search_radius: usize,
    /// A fundamental is accepted when fewer harmonics than this are missing.
    #[serde(default = "default_max_missing_harmonics")]
    pub max_missing_harmonics: usize,
    #[serde(default)]
    pub reject_subharmonic: bool,
    #[serde(default = "default_subharmonic_ratio")]
    pub subharmonic_ratio: f64,
    #[serde(default)]
    pub release: ReleaseThreshold,
    /// Velocity given to every onset.
    #[serde(default = "default_velocity")]
    pub velocity: u8,
}

/// Level below which a sounding note's anchor bin releases the note.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ReleaseThreshold {
    /// `-k * stddev_dbfs` of the current frame.
    StdDevMultiple(f64),
    /// A fixed dBFS level.
    FixedDb(f64),
}

impl Default for ReleaseThreshold {
    fn default() -> Self {
        ReleaseThreshold::StdDevMultiple(2.0)
    }
}

impl ReleaseThreshold {
    pub fn level(&self, stddev_dbfs: f64) -> f64 {
        match *self {
            ReleaseThreshold::StdDevMultiple(k) => -k * stddev_dbfs,
            ReleaseThreshold::FixedDb(db) => db,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            apply_window: default_apply_window(),
            dbfs_floor: default_dbfs_floor(),
            search_min_hz: default_search_min_hz(),
            search_max_hz: default_search_max_hz(),
            min_peak_distance: default_min_peak_distance(),
            onset_sd_multiple: default_onset_sd_multiple(),
            min_power: default_min_power(),
            harmonic_offsets_db: default_harmonic_offsets_db(),
            harmonic_search_radius: default_harmonic_search_radius(),
            max_missing_harmonics: default_max_missing_harmonics(),
            reject_subharmonic: false,
            subharmonic_ratio: default_subharmonic_ratio(),
            release: ReleaseThreshold::default(),
            velocity: default_velocity(),
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.search_min_hz > 0.0 && self.search_min_hz < self.search_max_hz) {
            return Err(EngineError::Config(format!(
                "search range {}..{} Hz is empty",
                self.search_min_hz, self.search_max_hz
            )));
        }
        if !self.dbfs_floor.is_finite() || self.dbfs_floor >= 0.0 {
            return Err(EngineError::Config(format!(
                "dbfs_floor must be a finite negative level, got {}",
                self.dbfs_floor
            )));
        }
        if self.onset_sd_multiple < 0.0 || !self.onset_sd_multiple.is_finite() {
            return Err(EngineError::Config(format!(
                "onset_sd_multiple must be non-negative, got {}",
                self.onset_sd_multiple
            )));
        }
        if self.max_missing_harmonics == 0 {
            return Err(EngineError::Config(
                "max_missing_harmonics of 0 rejects every fundamental".into(),
            ));
        }
        if self.velocity == 0 || self.velocity > 127 {
            return Err(EngineError::Config(format!(
                "velocity must be in 1..=127, got {}",
                self.velocity
            )));
        }
        if let ReleaseThreshold::StdDevMultiple(k) = self.release {
            if k < 0.0 || !k.is_finite() {
                return Err(EngineError::Config(format!(
                    "release multiple must be non-negative, got {}",
                    k
                )));
            }
        }
        Ok(())
    }
}

fn default_apply_window() -> bool { true }
fn default_dbfs_floor() -> f64 { -200.0 }
fn default_search_min_hz() -> f64 { 55.0 }
fn default_search_max_hz() -> f64 { 1060.0 }
fn default_min_peak_distance() -> usize { 5 }
fn default_onset_sd_multiple() -> f64 { 3.5 }
fn default_min_power() -> f64 { 500.0 }
fn default_harmonic_offsets_db() -> [f64; 4] { [-28.0, -14.0, -34.0, -28.0] }
fn default_harmonic_search_radius() -> usize { 2 }
fn default_max_missing_harmonics() -> usize { 2 }
fn default_subharmonic_ratio() -> f64 { 0.5 }
fn default_velocity() -> u8 { 127 }
