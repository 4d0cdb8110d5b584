mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufWriter, Write};

use cli::Cli;
use gtm::audio::blocks::BlockReader;
use gtm::audio::decode::{decode_audio, AudioData};
use gtm::detect::harmonics::harmonic_report;
use gtm::encode::midi_csv::MidiCsvWriter;
use gtm::{DetectorConfig, Engine};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect gtm.toml / global config
    let mut cfg = config::Config::default();
    if let Some(path) = cli.config.clone().or_else(config::discover_config_path) {
        cfg = config::load_config(&path)?;
        log::info!("Loaded config from {}", path.display());
    }

    // Merge: config values apply only when CLI is at its default
    if cli.fft_size == 8192 { cli.fft_size = cfg.analysis.transform_size; }
    if cli.hop == 256 { cli.hop = cfg.analysis.hop_size; }
    if cli.transpose == 12 { cli.transpose = cfg.output.transpose; }
    if cli.time_multiplier == 1 { cli.time_multiplier = cfg.output.time_multiplier; }
    if cli.title == "gtm" { cli.title = cfg.output.title.clone(); }
    if cli.noise_gate.is_none() { cli.noise_gate = cfg.analysis.noise_gate; }

    let mut detector = cfg.detector;
    if cli.no_window {
        detector.apply_window = false;
    }

    if cli.hop == 0 {
        anyhow::bail!("Hop size must be at least one sample");
    }

    let input = cli.input.as_ref().context("Input audio file is required")?;
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    log::info!("gtm - spectral note transcription");
    log::info!("Input: {}", input.display());
    match cli.output {
        Some(ref path) => log::info!("Output: {}", path.display()),
        None => log::info!("Output: stdout"),
    }
    log::info!("FFT size: {}, hop: {}", cli.fft_size, cli.hop);

    log::info!("Decoding audio...");
    let audio = decode_audio(input)?;

    let out: Box<dyn Write> = match cli.output {
        Some(ref path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create output: {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };

    match cli.dump_spectrum {
        Some(block) => dump_spectrum(&cli, detector, &audio, block, out),
        None => transcribe(&cli, detector, &audio, out),
    }
}

fn transcribe(cli: &Cli, detector: DetectorConfig, audio: &AudioData, out: Box<dyn Write>) -> Result<()> {
    let mut engine = Engine::new(cli.fft_size, audio.sample_rate, detector)?;
    let mut reader = BlockReader::new(&audio.samples, cli.fft_size, cli.hop);
    let total_blocks = reader.block_count();

    let pb = if cli.no_progress {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(total_blocks as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} blocks ({eta} remaining)")?
            .progress_chars("=>-"),
    );

    let mut writer = MidiCsvWriter::new(out, cli.transpose, cli.time_multiplier);
    writer.write_header(&cli.title)?;

    let summary = engine.run(&mut reader, cli.noise_gate, |index, events| -> Result<()> {
        for event in events {
            writer.write_event(index as u64, event)?;
        }
        pb.set_position(index as u64 + 1);
        Ok(())
    })?;

    pb.finish_with_message("Transcription complete");

    if summary.gated > 0 {
        log::info!("Noise gate skipped {} of {} blocks", summary.gated, summary.blocks);
    }
    log::info!(
        "Wrote {} events ({} dropped out of range) over {} blocks",
        writer.written(),
        writer.dropped(),
        summary.blocks
    );
    writer.finish(summary.last_block as u64)?;
    Ok(())
}

/// Print one block's spectrum for plotting, and log what the onset scan sees in it.
fn dump_spectrum(
    cli: &Cli,
    detector: DetectorConfig,
    audio: &AudioData,
    block_index: usize,
    mut out: Box<dyn Write>,
) -> Result<()> {
    let mut engine = Engine::new(cli.fft_size, audio.sample_rate, detector.clone())?;
    let mut reader = BlockReader::new(&audio.samples, cli.fft_size, cli.hop);
    let block_count = reader.block_count();
    let block = reader.block(block_index).with_context(|| {
        format!("Block {} is past the end of the input ({} blocks)", block_index, block_count)
    })?;

    let spectrum = engine.process_block(block)?;

    if cli.json {
        serde_json::to_writer_pretty(&mut out, spectrum).context("Failed to write spectrum JSON")?;
        writeln!(out)?;
    } else {
        let values = if cli.dbfs { &spectrum.dbfs } else { &spectrum.linear };
        for v in values {
            writeln!(out, "{:.6}", v)?;
        }
    }
    out.flush().context("Failed to flush spectrum output")?;

    let (mean, stddev) = if cli.dbfs {
        (spectrum.mean_dbfs, spectrum.stddev_dbfs)
    } else {
        (spectrum.mean_linear, spectrum.stddev_linear)
    };

    let search = engine.tracker().search_range();
    log::info!("Search: bins {} to {}", search.start, search.end);

    for candidate in engine.candidates() {
        log::info!(
            "Peak at bin {} ({:.1} Hz, {:.2} dB): fundamental? {}",
            candidate.bin,
            candidate.frequency,
            candidate.dbfs,
            candidate.is_fundamental
        );
        for check in harmonic_report(engine.spectrum(), candidate.bin, &detector) {
            log::debug!(
                "  harmonic {} at bin {:?}: need {:.2} dB, got {:?} ({})",
                check.harmonic,
                check.bin,
                check.required_db,
                check.observed_db,
                if check.present { "present" } else { "missing" }
            );
        }
    }

    log::info!("Mean: {:.6}", mean);
    log::info!("Standard deviation: {:.6}", stddev);
    Ok(())
}
