//! Core domain types for the narration generation service.
//!
//! This crate defines the data model shared by all other crates:
//! - Content hashes and cache fingerprints
//! - Voice styles, intensity levels and provider voice settings
//! - Generation request records and their status state machine
//! - Configuration and the clock abstraction

pub mod clock;
pub mod config;
pub mod error;
pub mod hash;
pub mod request;
pub mod voice;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use hash::{ContentHash, Fingerprint};
pub use request::{
    AudioRef, FailureSummary, GenerationRequest, GenerationStatus, Priority, RequestId,
};
pub use voice::{Intensity, VoiceProfile, VoiceSettings, VoiceStyle};

/// Assumed audio bitrate for duration estimates: 128 kbps MP3 is 16 KiB per second.
pub const AUDIO_BYTES_PER_SECOND: u64 = 16 * 1024;

/// Estimate playback duration from an MP3 payload size.
pub fn estimate_duration_seconds(size_bytes: u64) -> f64 {
    size_bytes as f64 / AUDIO_BYTES_PER_SECOND as f64
}
