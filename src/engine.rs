use crate::audio::blocks::BlockReader;
use crate::audio::spectrum::{Spectrum, SpectrumAnalyzer};
use crate::detect::config::DetectorConfig;
use crate::detect::tracker::{Candidate, NoteEvent, NoteTracker};
use crate::error::{EngineError, Result};

/// Totals from [`Engine::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub blocks: usize,
    /// Blocks whose detection was skipped by the noise gate.
    pub gated: usize,
    pub last_block: usize,
}

/// Frame-at-a-time note detector: one analyzer plus one tracker.
///
/// Call [`Engine::process_block`] with each block of samples, then
/// [`Engine::detect_notes`] to advance the note state machine and collect
/// the events that frame produced.
pub struct Engine {
    analyzer: SpectrumAnalyzer,
    tracker: NoteTracker,
    sample_rate: u32,
}

impl Engine {
    pub fn new(transform_size: usize, sample_rate: u32, config: DetectorConfig) -> Result<Self> {
        if sample_rate == 0 {
            return Err(EngineError::SampleRate(sample_rate));
        }

        let analyzer = SpectrumAnalyzer::new(transform_size, config.apply_window, config.dbfs_floor)?;
        let tracker = NoteTracker::new(config, sample_rate, transform_size)?;

        let search = tracker.search_range();
        log::info!(
            "Engine: {} point FFT @ {}Hz ({:.2} Hz/bin), scanning bins {}..{}",
            transform_size,
            sample_rate,
            sample_rate as f64 / transform_size as f64,
            search.start,
            search.end
        );

        Ok(Self {
            analyzer,
            tracker,
            sample_rate,
        })
    }

    /// Analyse one block of exactly `transform_size` samples.
    pub fn process_block(&mut self, samples: &[f64]) -> Result<&Spectrum> {
        self.analyzer.analyze(samples)
    }

    /// Run the tracker on the current spectrum.
    pub fn detect_notes(&mut self) -> Vec<NoteEvent> {
        self.tracker.detect(self.analyzer.spectrum())
    }

    /// Drive every block of `reader` through analysis and detection.
    ///
    /// `on_events` is called once per block with that block's index and
    /// events (possibly none). Blocks whose mean linear magnitude exceeds
    /// `noise_gate` are analysed but skip detection, so sounding notes hold
    /// through them. After the last block, notes still sounding are flushed
    /// and handed over with the last block's index.
    pub fn run<E, F>(
        &mut self,
        reader: &mut BlockReader<'_>,
        noise_gate: Option<f64>,
        mut on_events: F,
    ) -> std::result::Result<RunSummary, E>
    where
        E: From<EngineError>,
        F: FnMut(usize, &[NoteEvent]) -> std::result::Result<(), E>,
    {
        let mut summary = RunSummary::default();

        while let Some((index, block)) = reader.next_block() {
            summary.blocks += 1;
            summary.last_block = index;

            let spectrum = self.process_block(block)?;
            if let Some(gate) = noise_gate.filter(|&gate| spectrum.mean_linear > gate) {
                log::debug!(
                    "Skipping noisy block {} (mean magnitude {:.2} over gate {:.2})",
                    index,
                    spectrum.mean_linear,
                    gate
                );
                summary.gated += 1;
                on_events(index, &[])?;
                continue;
            }

            let events = self.detect_notes();
            on_events(index, &events)?;
        }

        let remaining = self.flush();
        if !remaining.is_empty() {
            log::debug!("Flushing {} sounding notes at end of stream", remaining.len());
            on_events(summary.last_block, &remaining)?;
        }

        Ok(summary)
    }

    /// Release every sounding note.
    pub fn flush(&mut self) -> Vec<NoteEvent> {
        self.tracker.flush()
    }

    pub fn reset(&mut self) {
        self.tracker.reset();
    }

    pub fn spectrum(&self) -> &Spectrum {
        self.analyzer.spectrum()
    }

    /// Peak candidates of the current spectrum, without touching note state.
    pub fn candidates(&self) -> Vec<Candidate> {
        self.tracker.candidates(self.analyzer.spectrum())
    }

    pub fn tracker(&self) -> &NoteTracker {
        &self.tracker
    }

    pub fn transform_size(&self) -> usize {
        self.analyzer.transform_size()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bin_width(&self) -> f64 {
        self.sample_rate as f64 / self.transform_size() as f64
    }
}
