pub mod config;
pub mod harmonics;
pub mod peaks;
pub mod pitch;
pub mod tracker;
