//! Harmonic-series validation of candidate fundamentals.
//!
//! A genuine musical fundamental is followed by partials at integer
//! multiples of its frequency, each somewhat quieter than the last. Noise
//! spikes, leakage and harmonics of a lower note usually are not. The
//! check is a heuristic: the offset table, search radius and missing
//! count in [`DetectorConfig`] decide its false positive/negative rates.

use crate::audio::spectrum::Spectrum;

use super::config::DetectorConfig;

/// Harmonic numbers checked above the fundamental.
pub const HARMONICS: std::ops::RangeInclusive<usize> = 2..=5;

/// Outcome of checking one partial.
#[derive(Clone, Debug, PartialEq)]
pub struct HarmonicCheck {
    pub harmonic: usize,
    /// `fundamental * harmonic`
    pub expected_bin: usize,
    /// Loudest bin within the search radius, if any of it lies in the spectrum.
    pub bin: Option<usize>,
    /// Minimum dBFS the partial needs to count as present.
    pub required_db: f64,
    pub observed_db: Option<f64>,
    pub present: bool,
}

/// Check a single harmonic of `fundamental`.
pub fn check_harmonic(
    spectrum: &Spectrum,
    fundamental: usize,
    harmonic: usize,
    config: &DetectorConfig,
) -> HarmonicCheck {
    let dbfs = &spectrum.dbfs;
    let expected_bin = fundamental * harmonic;
    let required_db = dbfs[fundamental] + config.harmonic_offsets_db[harmonic - 2];

    let radius = config.harmonic_search_radius;
    // never reach back down to the fundamental itself
    let lo = expected_bin.saturating_sub(radius).max(fundamental + 1);
    let hi = (expected_bin + radius).min(dbfs.len().saturating_sub(1));

    // Snap to the loudest bin near the expected position; partials rarely
    // land on an exact bin multiple.
    let bin = (lo <= hi && lo < dbfs.len()).then(|| {
        (lo..=hi).fold(lo, |best, i| if dbfs[i] > dbfs[best] { i } else { best })
    });

    let observed_db = bin.map(|i| dbfs[i]);
    let present = observed_db.map_or(false, |db| db >= required_db);

    HarmonicCheck {
        harmonic,
        expected_bin,
        bin,
        required_db,
        observed_db,
        present,
    }
}

/// Per-harmonic decisions for `fundamental`, for diagnostics.
pub fn harmonic_report(
    spectrum: &Spectrum,
    fundamental: usize,
    config: &DetectorConfig,
) -> Vec<HarmonicCheck> {
    HARMONICS
        .map(|h| check_harmonic(spectrum, fundamental, h, config))
        .collect()
}

/// A strong component an octave below suggests `fundamental` is itself a
/// harmonic of a lower note.
fn has_strong_subharmonic(spectrum: &Spectrum, fundamental: usize, config: &DetectorConfig) -> bool {
    let dbfs = &spectrum.dbfs;
    dbfs[fundamental / 2] > dbfs[fundamental] * config.subharmonic_ratio
}

/// True when fewer than `max_missing_harmonics` of harmonics 2 to 5 are
/// missing.
pub fn has_harmonics(spectrum: &Spectrum, fundamental: usize, config: &DetectorConfig) -> bool {
    if config.reject_subharmonic && has_strong_subharmonic(spectrum, fundamental, config) {
        log::trace!("bin {}: rejected, strong subharmonic", fundamental);
        return false;
    }

    let mut missing = 0;
    for h in HARMONICS {
        let check = check_harmonic(spectrum, fundamental, h, config);
        log::trace!(
            "bin {} harmonic {} (bin {:?}): need {:.2} dB, got {:?} (present: {})",
            fundamental,
            h,
            check.bin,
            check.required_db,
            check.observed_db,
            check.present
        );
        if !check.present {
            missing += 1;
        }
    }

    missing < config.max_missing_harmonics
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOOR: f64 = -200.0;

    /// Linear spectrum with a fundamental at `bin` and partials at the given dB levels.
    fn harmonic_spectrum(len: usize, bin: usize, partial_db: &[f64]) -> Spectrum {
        let mut linear = vec![1e-6; len];
        linear[bin] = 1.0;
        for (k, db) in partial_db.iter().enumerate() {
            let h = k + 2;
            if bin * h < len {
                linear[bin * h] = 10f64.powf(db / 20.0);
            }
        }
        Spectrum::from_linear(linear, FLOOR)
    }

    #[test]
    fn accepts_natural_rolloff() {
        let s = harmonic_spectrum(512, 20, &[-6.0, -10.0, -20.0, -20.0]);
        assert!(has_harmonics(&s, 20, &DetectorConfig::default()));
    }

    #[test]
    fn accepts_partials_at_offsets() {
        let cfg = DetectorConfig::default();
        // a hair above each offset so log10 rounding cannot flip the verdict
        let levels: Vec<f64> = cfg.harmonic_offsets_db.iter().map(|db| db + 0.01).collect();
        let s = harmonic_spectrum(512, 20, &levels);
        assert!(has_harmonics(&s, 20, &cfg));
    }

    #[test]
    fn rejects_lone_peak() {
        let s = harmonic_spectrum(512, 20, &[]);
        assert!(!has_harmonics(&s, 20, &DetectorConfig::default()));
    }

    #[test]
    fn tolerates_one_missing_harmonic() {
        let s = harmonic_spectrum(512, 20, &[-6.0, -120.0, -20.0, -20.0]);
        assert!(has_harmonics(&s, 20, &DetectorConfig::default()));

        let s = harmonic_spectrum(512, 20, &[-6.0, -120.0, -120.0, -20.0]);
        assert!(!has_harmonics(&s, 20, &DetectorConfig::default()));
    }

    #[test]
    fn snaps_to_nearby_partial() {
        let mut linear = vec![1e-6; 512];
        linear[30] = 1.0;
        linear[61] = 0.5; // 2nd harmonic one bin sharp
        linear[89] = 0.3; // 3rd harmonic one bin flat
        linear[122] = 0.1;
        linear[148] = 0.1;
        let s = Spectrum::from_linear(linear, FLOOR);
        let report = harmonic_report(&s, 30, &DetectorConfig::default());
        assert_eq!(report.len(), 4);
        assert_eq!(report[0].bin, Some(61));
        assert_eq!(report[1].bin, Some(89));
        assert_eq!(report[2].bin, Some(122));
        assert_eq!(report[3].bin, Some(148));
        assert!(report.iter().all(|c| c.present));
    }

    #[test]
    fn harmonics_beyond_spectrum_are_missing() {
        let s = harmonic_spectrum(64, 20, &[-6.0, -10.0]);
        let report = harmonic_report(&s, 20, &DetectorConfig::default());
        assert!(report[0].present);
        assert!(report[1].present);
        assert_eq!(report[2].bin, None);
        assert!(!report[2].present);
        assert!(!report[3].present);
        assert!(!has_harmonics(&s, 20, &DetectorConfig::default()));
    }

    #[test]
    fn subharmonic_guard_is_opt_in() {
        let mut linear = vec![1e-6; 512];
        // an octave-below component louder than the candidate
        linear[20] = 1.0;
        linear[40] = 0.5;
        for h in 2..=5 {
            linear[40 * h] = 0.2;
        }
        let s = Spectrum::from_linear(linear, FLOOR);

        let mut cfg = DetectorConfig::default();
        assert!(has_harmonics(&s, 40, &cfg));

        cfg.reject_subharmonic = true;
        assert!(!has_harmonics(&s, 40, &cfg));
    }

    #[test]
    fn low_fundamental_cannot_be_its_own_partial() {
        let s = harmonic_spectrum(64, 2, &[]);
        let cfg = DetectorConfig::default();
        assert_eq!(cfg.harmonic_search_radius, 2);

        let second = check_harmonic(&s, 2, 2, &cfg);
        assert_eq!(second.expected_bin, 4);
        assert_ne!(second.bin, Some(2));
        assert!(!second.present);

        // bin 1: windows for both the 2nd and 3rd harmonic cover it
        let s = harmonic_spectrum(64, 1, &[]);
        let lenient = DetectorConfig {
            max_missing_harmonics: 3,
            ..Default::default()
        };
        assert!(harmonic_report(&s, 1, &lenient).iter().all(|c| c.bin != Some(1)));
        assert!(!has_harmonics(&s, 1, &lenient));
    }

    #[test]
    fn white_noise_rarely_passes() {
        // xorshift so the test stays deterministic
        let mut state = 0x2545_f491_4f6c_dd1du64;
        let mut noise = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        let linear: Vec<f64> = (0..2048).map(|_| noise()).collect();
        let s = Spectrum::from_linear(linear, FLOOR);
        // A flat noise floor satisfies the default rolloff table almost
        // everywhere; the false-positive rate is set by the table, so
        // demand partials as loud as the fundamental here.
        let cfg = DetectorConfig {
            harmonic_offsets_db: [0.0; 4],
            harmonic_search_radius: 0,
            ..Default::default()
        };

        let candidates: Vec<usize> = (10..200)
            .filter(|&i| crate::detect::peaks::is_peak(&s, i, 0.0, crate::detect::peaks::Domain::Linear))
            .collect();
        let passed = candidates.iter().filter(|&&i| has_harmonics(&s, i, &cfg)).count();
        assert!(!candidates.is_empty());
        assert!(
            (passed as f64) < 0.25 * candidates.len() as f64,
            "{} of {} noise peaks passed",
            passed,
            candidates.len()
        );
    }
}
