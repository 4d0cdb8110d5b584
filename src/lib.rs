//! Spectral pitch tracking: turns a mono sample stream into note-on/note-off
//! events, one FFT frame at a time.

pub mod audio;
pub mod detect;
pub mod encode;
pub mod engine;
pub mod error;

pub use detect::config::{DetectorConfig, ReleaseThreshold};
pub use detect::tracker::{EventKind, NoteEvent};
pub use engine::{Engine, RunSummary};
pub use error::EngineError;
