use std::ops::Range;

use crate::audio::spectrum::Spectrum;
use crate::error::{EngineError, Result};

use super::config::DetectorConfig;
use super::harmonics::has_harmonics;
use super::peaks::{is_peak, Domain};
use super::pitch::{bin_to_frequency, freq_to_note};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    NoteOn,
    NoteOff,
}

/// A note transition produced by the tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteEvent {
    pub kind: EventKind,
    pub pitch: u8,
    pub velocity: u8,
    /// Shared by a NoteOn and the NoteOff that ends it.
    pub id: u32,
}

/// A sounding note, anchored to the bin it was detected at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SustainedNote {
    pub bin: usize,
    pub pitch: u8,
    pub id: u32,
}

/// A bin that passed the peak and spacing tests of an onset scan.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub bin: usize,
    pub frequency: f64,
    pub dbfs: f64,
    pub is_fundamental: bool,
}

/// Per-pitch Silent/Sounding state machine driven once per spectral frame.
pub struct NoteTracker {
    config: DetectorConfig,
    sample_rate: u32,
    transform_size: usize,
    search: Range<usize>,
    /// Active velocity per MIDI note, 0 when silent.
    active: [u8; 128],
    sustained: Vec<SustainedNote>,
    next_id: u32,
}

impl NoteTracker {
    pub fn new(config: DetectorConfig, sample_rate: u32, transform_size: usize) -> Result<Self> {
        config.validate()?;
        let search = search_range(&config, sample_rate, transform_size)?;

        Ok(Self {
            config,
            sample_rate,
            transform_size,
            search,
            active: [0; 128],
            sustained: Vec::new(),
            next_id: 0,
        })
    }

    /// Bins scanned for fundamentals (end exclusive).
    pub fn search_range(&self) -> Range<usize> {
        self.search.clone()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn sustained(&self) -> &[SustainedNote] {
        &self.sustained
    }

    pub fn is_sounding(&self, pitch: u8) -> bool {
        self.active.get(pitch as usize).map_or(false, |&v| v != 0)
    }

    /// Run release and onset checks against one frame, returning the events
    /// produced, in emission order.
    ///
    /// `spectrum` must come from a transform of the size the tracker was
    /// built for.
    pub fn detect(&mut self, spectrum: &Spectrum) -> Vec<NoteEvent> {
        self.debug_check_len(spectrum);
        let mut events = Vec::new();
        self.release_faded(spectrum, &mut events);
        self.trigger_onsets(spectrum, &mut events);
        events
    }

    fn release_faded(&mut self, spectrum: &Spectrum, events: &mut Vec<NoteEvent>) {
        let level = self.config.release.level(spectrum.stddev_dbfs);
        let active = &mut self.active;

        self.sustained.retain(|note| {
            let db = spectrum.dbfs[note.bin];
            if db >= level {
                return true;
            }
            log::debug!(
                "note off: {} (bin {}, {:.1} dB below release level {:.1} dB)",
                note.pitch,
                note.bin,
                level - db,
                level
            );
            active[note.pitch as usize] = 0;
            events.push(NoteEvent {
                kind: EventKind::NoteOff,
                pitch: note.pitch,
                velocity: 0,
                id: note.id,
            });
            false
        });
    }

    fn trigger_onsets(&mut self, spectrum: &Spectrum, events: &mut Vec<NoteEvent>) {
        if spectrum.peak_linear <= self.config.min_power {
            return;
        }

        for bin in self.peak_bins(spectrum) {
            if !has_harmonics(spectrum, bin, &self.config) {
                continue;
            }

            let frequency = bin_to_frequency(bin, self.sample_rate, self.transform_size);
            let pitch = freq_to_note(frequency);
            if self.active[pitch as usize] != 0 {
                continue;
            }

            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            self.active[pitch as usize] = self.config.velocity;
            self.sustained.push(SustainedNote { bin, pitch, id });

            log::debug!("note on: {} (bin {}, {:.1} Hz)", pitch, bin, frequency);
            events.push(NoteEvent {
                kind: EventKind::NoteOn,
                pitch,
                velocity: self.config.velocity,
                id,
            });
        }
    }

    /// Bins in the search range that are linear-domain peaks and far enough
    /// from the previous peak of this scan.
    fn peak_bins(&self, spectrum: &Spectrum) -> Vec<usize> {
        let threshold = spectrum.stddev_linear * self.config.onset_sd_multiple;
        let mut peaks = Vec::new();
        let mut since_last_peak = usize::MAX;

        for bin in self.search.clone() {
            if since_last_peak > self.config.min_peak_distance
                && is_peak(spectrum, bin, threshold, Domain::Linear)
            {
                since_last_peak = 0;
                peaks.push(bin);
            } else {
                since_last_peak = since_last_peak.saturating_add(1);
            }
        }

        peaks
    }

    /// The onset scan's peaks with their fundamental verdicts. Does not
    /// change tracker state.
    pub fn candidates(&self, spectrum: &Spectrum) -> Vec<Candidate> {
        self.debug_check_len(spectrum);
        self.peak_bins(spectrum)
            .into_iter()
            .map(|bin| Candidate {
                bin,
                frequency: bin_to_frequency(bin, self.sample_rate, self.transform_size),
                dbfs: spectrum.dbfs[bin],
                is_fundamental: has_harmonics(spectrum, bin, &self.config),
            })
            .collect()
    }

    fn debug_check_len(&self, spectrum: &Spectrum) {
        debug_assert_eq!(
            spectrum.len(),
            self.transform_size / 2,
            "spectrum length does not match a {} point transform",
            self.transform_size
        );
    }

    /// Release every sounding note, e.g. at end of stream.
    pub fn flush(&mut self) -> Vec<NoteEvent> {
        let events = self
            .sustained
            .drain(..)
            .map(|note| NoteEvent {
                kind: EventKind::NoteOff,
                pitch: note.pitch,
                velocity: 0,
                id: note.id,
            })
            .collect();
        self.active = [0; 128];
        events
    }

    /// Forget all sounding notes without emitting events.
    pub fn reset(&mut self) {
        self.sustained.clear();
        self.active = [0; 128];
    }
}

/// Map the configured Hz bounds to bins, keeping one neighbour on each
/// side of every scanned bin.
fn search_range(config: &DetectorConfig, sample_rate: u32, transform_size: usize) -> Result<Range<usize>> {
    let bin_width = sample_rate as f64 / transform_size as f64;
    let last_with_neighbour = transform_size / 2 - 1;

    let start = ((config.search_min_hz / bin_width) as usize).max(1);
    let end = ((config.search_max_hz / bin_width) as usize).min(last_with_neighbour);

    if start >= end {
        return Err(EngineError::Config(format!(
            "search range {}..{} Hz covers no bins at {:.2} Hz per bin",
            config.search_min_hz, config.search_max_hz, bin_width
        )));
    }
    Ok(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::config::ReleaseThreshold;

    // 5.5 Hz per bin: bin 40 is 220 Hz
    const SAMPLE_RATE: u32 = 44000;
    const N: usize = 8000;

    fn frame(fundamentals: &[(usize, f64)]) -> Spectrum {
        let mut linear = vec![1e-3; N / 2];
        for &(bin, amplitude) in fundamentals {
            linear[bin] = amplitude;
            for (k, db) in [-6.0, -10.0, -20.0, -20.0].iter().enumerate() {
                let h = bin * (k + 2);
                if h < linear.len() {
                    linear[h] = linear[h].max(amplitude * 10f64.powf(db / 20.0));
                }
            }
        }
        Spectrum::from_linear(linear, -200.0)
    }

    fn silence() -> Spectrum {
        Spectrum::from_linear(vec![0.0; N / 2], -200.0)
    }

    fn tracker() -> NoteTracker {
        NoteTracker::new(DetectorConfig::default(), SAMPLE_RATE, N).unwrap()
    }

    fn assert_table_matches(t: &NoteTracker) {
        for pitch in 0..128u8 {
            let sustained = t.sustained().iter().any(|n| n.pitch == pitch);
            assert_eq!(t.is_sounding(pitch), sustained, "pitch {}", pitch);
        }
    }

    #[test]
    fn search_range_follows_bin_width() {
        let t = tracker();
        // 55 / 5.5 = 10, 1060 / 5.5 = 192.7
        assert_eq!(t.search_range(), 10..192);
    }

    #[test]
    fn search_range_is_clamped_to_neighbours() {
        let cfg = DetectorConfig {
            search_min_hz: 1.0,
            search_max_hz: 100_000.0,
            ..Default::default()
        };
        let t = NoteTracker::new(cfg, SAMPLE_RATE, N).unwrap();
        assert_eq!(t.search_range(), 1..N / 2 - 1);
    }

    #[test]
    fn narrow_search_range_is_a_config_error() {
        let cfg = DetectorConfig {
            search_min_hz: 100.0,
            search_max_hz: 101.0,
            ..Default::default()
        };
        assert!(matches!(
            NoteTracker::new(cfg, SAMPLE_RATE, N),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn onset_then_release() {
        let mut t = tracker();
        let events = t.detect(&frame(&[(40, 1000.0)]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::NoteOn);
        assert_eq!(events[0].pitch, 45);
        assert_eq!(events[0].velocity, 127);
        assert_table_matches(&t);

        let events = t.detect(&silence());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::NoteOff);
        assert_eq!(events[0].pitch, 45);
        assert_eq!(events[0].velocity, 0);
        assert!(t.sustained().is_empty());
        assert_table_matches(&t);
    }

    #[test]
    fn same_frame_twice_is_idempotent() {
        let mut t = tracker();
        let spectrum = frame(&[(40, 1000.0)]);
        assert_eq!(t.detect(&spectrum).len(), 1);
        assert!(t.detect(&spectrum).is_empty());
        assert!(t.detect(&spectrum).is_empty());
        assert_eq!(t.sustained().len(), 1);
    }

    #[test]
    fn release_and_onset_share_a_frame() {
        let mut t = tracker();
        t.detect(&frame(&[(40, 1000.0)]));

        // same pitch, drifted one bin up (225.5 Hz is still note 45)
        let events = t.detect(&frame(&[(41, 1000.0)]));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::NoteOff);
        assert_eq!(events[1].kind, EventKind::NoteOn);
        assert_eq!(events[0].pitch, 45);
        assert_eq!(events[1].pitch, 45);
        assert_ne!(events[0].id, events[1].id);
        assert_eq!(t.sustained(), &[SustainedNote { bin: 41, pitch: 45, id: events[1].id }]);
    }

    #[test]
    fn tracks_two_notes() {
        let mut t = tracker();
        // 220 Hz and 330 Hz
        let events = t.detect(&frame(&[(40, 1000.0), (60, 800.0)]));
        let pitches: Vec<u8> = events.iter().map(|e| e.pitch).collect();
        assert_eq!(pitches, vec![45, 52]);
        assert!(events.iter().all(|e| e.kind == EventKind::NoteOn));
        assert_table_matches(&t);

        // 330 Hz stops, 220 Hz keeps sounding
        let events = t.detect(&frame(&[(40, 1000.0)]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::NoteOff);
        assert_eq!(events[0].pitch, 52);
        assert!(t.is_sounding(45));
        assert_table_matches(&t);
    }

    #[test]
    fn note_off_carries_onset_id() {
        let mut t = tracker();
        let on = t.detect(&frame(&[(40, 1000.0)]))[0];
        let off = t.detect(&silence())[0];
        assert_eq!(on.id, off.id);
    }

    #[test]
    fn quiet_frames_never_trigger() {
        let mut t = tracker();
        assert!(t.detect(&frame(&[(40, 400.0)])).is_empty());
        assert!(t.detect(&silence()).is_empty());
    }

    #[test]
    fn lone_peak_is_not_a_note() {
        let mut linear = vec![1e-3; N / 2];
        linear[40] = 1000.0;
        let mut t = tracker();
        assert!(t.detect(&Spectrum::from_linear(linear, -200.0)).is_empty());
    }

    #[test]
    fn fixed_release_level() {
        let cfg = DetectorConfig {
            release: ReleaseThreshold::FixedDb(-16.0),
            ..Default::default()
        };
        let mut t = NoteTracker::new(cfg, SAMPLE_RATE, N).unwrap();
        t.detect(&frame(&[(40, 1000.0)]));

        // another note takes over the peak, ours sits at -20 dB
        let mut next = frame(&[(60, 1000.0)]);
        next.linear[40] = 100.0;
        let next = Spectrum::from_linear(next.linear, -200.0);
        let events = t.detect(&next);
        assert!(events
            .iter()
            .any(|e| e.kind == EventKind::NoteOff && e.pitch == 45));
    }

    #[test]
    fn flush_releases_everything() {
        let mut t = tracker();
        t.detect(&frame(&[(40, 1000.0), (60, 800.0)]));
        let events = t.flush();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == EventKind::NoteOff));
        assert!(t.sustained().is_empty());
        assert_table_matches(&t);
        assert!(t.flush().is_empty());
    }

    #[test]
    fn reset_is_silent() {
        let mut t = tracker();
        t.detect(&frame(&[(40, 1000.0)]));
        t.reset();
        assert!(!t.is_sounding(45));
        assert!(t.detect(&silence()).is_empty());
    }

    #[test]
    fn candidates_leave_state_alone() {
        let t = tracker();
        let candidates = t.candidates(&frame(&[(40, 1000.0)]));
        let fundamental = candidates.iter().find(|c| c.bin == 40).unwrap();
        assert!(fundamental.is_fundamental);
        assert_eq!(fundamental.frequency, 220.0);
        assert_eq!(fundamental.dbfs, 0.0);
        assert!(candidates.iter().filter(|c| c.bin != 40).all(|c| !c.is_fundamental));
        assert!(t.sustained().is_empty());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "does not match")]
    fn short_spectrum_is_caught() {
        let mut t = tracker();
        t.detect(&Spectrum::from_linear(vec![1.0; 100], -200.0));
    }

    #[test]
    fn loud_noise_is_held_back_by_onset_threshold() {
        let mut state = 0x853c_49e6_748f_ea9bu64;
        let mut uniform = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            ((state >> 11) + 1) as f64 / (1u64 << 53) as f64
        };

        let t = tracker();
        let cfg = t.config().clone();
        let frames = 20;
        let mut found = 0;
        let mut accepted = 0;

        for _ in 0..frames {
            // Rayleigh magnitudes, as from the transform of white noise
            let linear: Vec<f64> = (0..N / 2)
                .map(|_| 300.0 * (-2.0 * uniform().ln()).sqrt())
                .collect();
            let s = Spectrum::from_linear(linear, -200.0);
            assert!(s.peak_linear > cfg.min_power);

            let threshold = s.stddev_linear * cfg.onset_sd_multiple;
            let candidates = t.candidates(&s);
            for c in &candidates {
                assert!(s.linear[c.bin] - s.linear[c.bin - 1] > threshold);
                assert!(s.linear[c.bin] - s.linear[c.bin + 1] > threshold);
            }
            for pair in candidates.windows(2) {
                assert!(pair[1].bin - pair[0].bin > cfg.min_peak_distance);
            }
            found += candidates.len();
            accepted += candidates.iter().filter(|c| c.is_fundamental).count();
        }

        // The default rolloff table sits far below a flat floor, so noise
        // peaks that reach the harmonic check pass it. The rise-above-
        // neighbours threshold is what keeps them rare.
        assert!(found < frames, "{} noise candidates in {} frames", found, frames);
        assert!(accepted * 2 >= found, "{} of {} accepted", accepted, found);
    }
}
