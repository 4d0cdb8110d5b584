use crate::audio::spectrum::Spectrum;

/// Which of the two spectrum representations a comparison runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Domain {
    Linear,
    Dbfs,
}

impl Domain {
    fn values(self, spectrum: &Spectrum) -> &[f64] {
        match self {
            Domain::Linear => &spectrum.linear,
            Domain::Dbfs => &spectrum.dbfs,
        }
    }
}

/// True when `index` is a strict local maximum that rises more than
/// `threshold` above both immediate neighbours.
///
/// `index` must lie in `1..=len - 2`.
pub fn is_peak(spectrum: &Spectrum, index: usize, threshold: f64, domain: Domain) -> bool {
    let values = domain.values(spectrum);
    debug_assert!(
        index >= 1 && index + 1 < values.len(),
        "peak index {} has no neighbour on one side (len {})",
        index,
        values.len()
    );

    let current = values[index];
    let prev = values[index - 1];
    let next = values[index + 1];

    current > prev && current > next && current - prev > threshold && current - next > threshold
}
