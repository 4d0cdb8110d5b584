use anyhow::{Context, Result};
use std::io::Write;

use crate::detect::tracker::{EventKind, NoteEvent};

const TRACK: u32 = 1;
const CHANNEL: u32 = 0;
const DIVISION: u32 = 96;

/// Streams note events as MIDI-CSV text (the `midicsv` line format).
pub struct MidiCsvWriter<W: Write> {
    out: W,
    transpose: i32,
    time_multiplier: u64,
    written: usize,
    dropped: usize,
}

impl<W: Write> MidiCsvWriter<W> {
    pub fn new(out: W, transpose: i32, time_multiplier: u64) -> Self {
        Self {
            out,
            transpose,
            time_multiplier,
            written: 0,
            dropped: 0,
        }
    }

    pub fn write_header(&mut self, title: &str) -> Result<()> {
        write!(
            self.out,
            "0, 0, Header, 0, 1, {division}\n\
             {track}, 0, Start_track\n\
             {track}, 0, Title_t, \"{title}\"\n\
             {track}, 0, Time_signature, 4, 2, 36, 8\n",
            division = DIVISION,
            track = TRACK,
            title = title.replace('"', "\"\""),
        )
        .context("Failed to write MIDI-CSV header")
    }

    /// Write one event stamped with `block_index`. Returns false when the
    /// transposed pitch is outside 0..=127 and the event was dropped.
    pub fn write_event(&mut self, block_index: u64, event: &NoteEvent) -> Result<bool> {
        let pitch = event.pitch as i32 + self.transpose;
        if !(0..=127).contains(&pitch) {
            log::debug!("Dropping {:?} for pitch {} (transposed {})", event.kind, event.pitch, pitch);
            self.dropped += 1;
            return Ok(false);
        }

        let (name, velocity) = match event.kind {
            EventKind::NoteOn => ("Note_on_c", event.velocity),
            EventKind::NoteOff => ("Note_off_c", 0),
        };
        writeln!(
            self.out,
            "{}, {}, {}, {}, {}, {}",
            TRACK,
            block_index * self.time_multiplier,
            name,
            CHANNEL,
            pitch,
            velocity
        )
        .context("Failed to write MIDI-CSV event")?;

        self.written += 1;
        Ok(true)
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Close the track after `last_block` and flush. Returns the sink.
    pub fn finish(mut self, last_block: u64) -> Result<W> {
        write!(
            self.out,
            "{}, {}, End_track\n0, 0, End_of_file\n",
            TRACK,
            last_block * self.time_multiplier + 1
        )
        .context("Failed to write MIDI-CSV footer")?;
        self.out.flush().context("Failed to flush MIDI-CSV output")?;
        Ok(self.out)
    }
}
