//! Provider trait definitions.

use crate::error::ProviderResult;
use async_trait::async_trait;
use bytes::Bytes;
use narrator_core::{Intensity, VoiceSettings, VoiceStyle};

/// Text plus the voice parameters it should be narrated with.
#[derive(Clone, Debug, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_style: VoiceStyle,
    pub intensity: Intensity,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, voice_style: VoiceStyle, intensity: Intensity) -> Self {
        Self {
            text: text.into(),
            voice_style,
            intensity,
        }
    }

    /// Provider settings for this request's style and intensity.
    pub fn settings(&self) -> VoiceSettings {
        self.voice_style.settings_for(self.intensity)
    }
}

/// Successful provider output.
#[derive(Clone, Debug, PartialEq)]
pub struct Synthesis {
    pub audio: Bytes,
    pub duration_seconds: f64,
}

/// A text-to-speech backend.
///
/// Implementations must be cancel-safe: the caller may drop the future at
/// any await point when a request is cancelled.
#[async_trait]
pub trait SpeechProvider: Send + Sync + 'static {
    /// Turn text into audio, or fail with a typed error.
    async fn generate(&self, request: &SynthesisRequest) -> ProviderResult<Synthesis>;

    /// Backend identifier for metrics and logging.
    fn provider_name(&self) -> &'static str;
}
