/// Tuning reference frequency.
pub const REFERENCE_HZ: f64 = 440.0;
/// Note number given to [`REFERENCE_HZ`].
///
/// This numbering puts A4 at 57, twelve below the General MIDI convention
/// (69). The CSV writer's default +12 transposition restores GM numbers.
pub const REFERENCE_NOTE: i32 = 57;

const SEMITONE: f64 = 1.059_463_094_359_295_3; // 2^(1/12)
const CENT: f64 = 1.000_577_789_506_554_9; // 2^(1/1200)

/// Nearest tempered note and the input's deviation from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteEstimate {
    pub note: i32,
    /// Signed offset from `note` in cents, -50..=50.
    pub cents: i32,
}

/// Quantize a frequency to the nearest semitone by stepping from the
/// reference, first in semitones and then in cents.
///
/// Returns `None` for non-finite input and for anything below the lower
/// edge of note 0, non-positive input included.
pub fn quantize(hz: f64) -> Option<NoteEstimate> {
    if !hz.is_finite() || hz < lowest_frequency() {
        return None;
    }

    let mut f = REFERENCE_HZ;
    let mut steps = 0i32;
    let mut cent_steps = 0i32;

    let cents = if hz >= f {
        while hz >= f * SEMITONE {
            f *= SEMITONE;
            steps += 1;
        }
        while hz > f * CENT {
            f *= CENT;
            cent_steps += 1;
        }
        if f * CENT - hz < hz - f {
            cent_steps += 1;
        }

        if cent_steps > 50 {
            steps += 1;
            -(100 - cent_steps)
        } else {
            cent_steps
        }
    } else {
        while hz <= f / SEMITONE {
            f /= SEMITONE;
            steps -= 1;
        }
        while hz < f / CENT {
            f /= CENT;
            cent_steps += 1;
        }
        if hz - f / CENT < f - hz {
            cent_steps += 1;
        }

        if cent_steps >= 50 {
            steps -= 1;
            100 - cent_steps
        } else {
            -cent_steps
        }
    };

    Some(NoteEstimate {
        note: REFERENCE_NOTE + steps,
        cents,
    })
}

/// Lower edge of note 0, half a semitone below it. Stepping down from the
/// reference stalls in the subnormal range, so nothing below this is walked.
fn lowest_frequency() -> f64 {
    REFERENCE_HZ * 2f64.powf(-(REFERENCE_NOTE as f64 + 0.5) / 12.0)
}

/// Nearest note number for `hz`, clamped to 0..=127. Cent detail is dropped.
pub fn freq_to_note(hz: f64) -> u8 {
    quantize(hz).map_or(0, |estimate| estimate.note.clamp(0, 127) as u8)
}

pub fn bin_to_frequency(bin: usize, sample_rate: u32, transform_size: usize) -> f64 {
    bin as f64 * sample_rate as f64 / transform_size as f64
}

pub fn frequency_to_bin(hz: f64, sample_rate: u32, transform_size: usize) -> usize {
    (hz * transform_size as f64 / sample_rate as f64).round().max(0.0) as usize
}
