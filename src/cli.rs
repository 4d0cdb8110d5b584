use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gtm", about = "Transcribe monophonic audio to MIDI-CSV note events")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: Option<PathBuf>,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file (defaults to ./gtm.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// FFT size in samples (must be even)
    #[arg(long, default_value_t = 8192)]
    pub fft_size: usize,

    /// Samples between successive analysis blocks
    #[arg(long, default_value_t = 256)]
    pub hop: usize,

    /// Semitones added to every detected pitch
    #[arg(long, default_value_t = 12, allow_negative_numbers = true)]
    pub transpose: i32,

    /// MIDI ticks per analysis block
    #[arg(long, default_value_t = 1)]
    pub time_multiplier: u64,

    /// Track title written to the CSV header
    #[arg(long, default_value = "gtm")]
    pub title: String,

    /// Skip blocks whose mean linear magnitude exceeds this value
    #[arg(long)]
    pub noise_gate: Option<f64>,

    /// Disable the Hann window
    #[arg(long)]
    pub no_window: bool,

    /// Print the spectrum of one block (by block index) instead of transcribing
    #[arg(long, value_name = "BLOCK")]
    pub dump_spectrum: Option<usize>,

    /// With --dump-spectrum: print dBFS values instead of linear magnitudes
    #[arg(long)]
    pub dbfs: bool,

    /// With --dump-spectrum: print the whole spectrum as JSON
    #[arg(long)]
    pub json: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}
