//! HTTP text-to-speech client.

use crate::error::{ProviderError, ProviderResult};
use crate::traits::{SpeechProvider, Synthesis, SynthesisRequest};
use async_trait::async_trait;
use narrator_core::config::ProviderConfig;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, RETRY_AFTER};
use serde::Serialize;
use tracing::instrument;

/// Header carrying the API key.
const API_KEY_HEADER: &str = "xi-api-key";

/// Longest slice of an error body kept in error messages.
const MAX_ERROR_BODY: usize = 200;

#[derive(Serialize)]
struct TtsBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: TtsVoiceSettings,
}

#[derive(Serialize)]
struct TtsVoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    speed: f32,
    use_speaker_boost: bool,
}

/// Client for an ElevenLabs-compatible `text-to-speech` endpoint.
#[derive(Clone)]
pub struct HttpSpeechProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model_id: String,
    output_format: String,
    default_retry_after_secs: u64,
}

impl HttpSpeechProvider {
    pub fn new(config: &ProviderConfig) -> ProviderResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ProviderError::ProviderUnavailable(format!("http client: {e}")))?;

        if config.api_key.as_deref().is_none_or(str::is_empty) {
            tracing::warn!("no provider API key configured; generation requests will fail");
        }

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model_id: config.model_id.clone(),
            output_format: config.output_format.clone(),
            default_retry_after_secs: config.default_retry_after_secs,
        })
    }

    fn retry_after_secs(&self, headers: &HeaderMap) -> u64 {
        headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(self.default_retry_after_secs)
    }

    fn classify_status(&self, status: StatusCode, headers: &HeaderMap, body: &str) -> ProviderError {
        let detail = format!("{status}: {}", truncate(body));
        match status {
            StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
                retry_after_secs: self.retry_after_secs(headers),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Unauthorized(detail),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                ProviderError::InvalidInput(detail)
            }
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ProviderError::Timeout,
            _ => ProviderError::ProviderUnavailable(detail),
        }
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::ProviderUnavailable(e.to_string())
    }
}

#[async_trait]
impl SpeechProvider for HttpSpeechProvider {
    #[instrument(
        skip(self, request),
        fields(provider = "http", voice_style = %request.voice_style, text_len = request.text.len())
    )]
    async fn generate(&self, request: &SynthesisRequest) -> ProviderResult<Synthesis> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::Unauthorized("no API key configured".to_string()));
        };

        let settings = request.settings();
        let body = TtsBody {
            text: &request.text,
            model_id: &self.model_id,
            voice_settings: TtsVoiceSettings {
                stability: settings.stability,
                similarity_boost: settings.similarity_boost,
                style: settings.style,
                speed: settings.speed,
                use_speaker_boost: true,
            },
        };
        let url = format!(
            "{}/v1/text-to-speech/{}",
            self.base_url,
            request.voice_style.voice_id()
        );

        let response = self
            .http
            .post(url)
            .query(&[("output_format", self.output_format.as_str())])
            .header(API_KEY_HEADER, api_key)
            .header(ACCEPT, "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            let err = self.classify_status(status, &headers, &text);
            tracing::warn!(%status, error = %err, "provider returned an error");
            return Err(err);
        }

        let audio = response.bytes().await.map_err(transport_error)?;
        if audio.is_empty() {
            return Err(ProviderError::ProviderUnavailable(
                "provider returned empty audio".to_string(),
            ));
        }

        let duration_seconds = narrator_core::estimate_duration_seconds(audio.len() as u64);
        tracing::debug!(bytes = audio.len(), duration_seconds, "provider returned audio");
        Ok(Synthesis {
            audio,
            duration_seconds,
        })
    }

    fn provider_name(&self) -> &'static str {
        "http"
    }
}
