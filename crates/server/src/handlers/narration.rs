//! Narration endpoints: submit, poll, cancel, acknowledge, download.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{AUDIO_BYTES_SERVED, record_submission};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use narrator_core::{
    Fingerprint, GenerationRequest, GenerationStatus, Intensity, Priority, RequestId, VoiceStyle,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Body of `POST /v1/narration/generate`.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub content: String,
    pub voice_style: String,
    pub intensity_level: i64,
    #[serde(default)]
    pub priority: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub request_id: RequestId,
    pub status: GenerationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    /// Estimated seconds until audio is ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<u64>,
}

/// Poll view of a generation request.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub request_id: RequestId,
    pub status: GenerationStatus,
    pub progress: u8,
    pub voice_style: VoiceStyle,
    pub intensity_level: Intensity,
    pub priority: Priority,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    /// Estimated playback length in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<OffsetDateTime>,
}

pub fn audio_url(fingerprint: &Fingerprint) -> String {
    format!("/v1/narration/audio/{fingerprint}")
}

impl From<GenerationRequest> for StatusResponse {
    fn from(record: GenerationRequest) -> Self {
        let (error, retry_after_secs) = match record.error {
            Some(failure) => (Some(failure.message), failure.retry_after_secs),
            None => (None, None),
        };
        Self {
            request_id: record.id,
            status: record.status,
            progress: record.progress,
            voice_style: record.voice_style,
            intensity_level: record.intensity,
            priority: record.priority,
            attempts: record.attempts,
            audio_url: record.audio.as_ref().map(|a| audio_url(&a.fingerprint)),
            duration: record.audio.as_ref().map(|a| a.duration_seconds),
            cached: record.audio.as_ref().map(|a| a.cached),
            error,
            retry_after_secs,
            queue_position: record.queue_position,
            created_at: record.created_at,
            completed_at: record.completed_at,
        }
    }
}

fn parse_request_id(raw: &str) -> ApiResult<RequestId> {
    Ok(RequestId::parse(raw)?)
}

fn parse_voice(body: &GenerateRequest) -> ApiResult<(VoiceStyle, Intensity, Priority)> {
    let voice_style: VoiceStyle = body.voice_style.parse()?;
    let intensity = Intensity::try_from(body.intensity_level)?;
    let priority = match body.priority.as_deref() {
        Some(raw) => raw.parse()?,
        None => Priority::default(),
    };
    Ok((voice_style, intensity, priority))
}

/// POST /v1/narration/generate - Submit narration text for generation.
///
/// Identical text, voice style and intensity are served from the cache and
/// complete immediately.
pub async fn generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateRequest>,
) -> ApiResult<(StatusCode, Json<GenerateResponse>)> {
    let (voice_style, intensity, priority) =
        parse_voice(&body).inspect_err(|_| record_submission("rejected"))?;

    let receipt = state
        .queue
        .submit(&body.content, voice_style, intensity, priority)
        .await
        .inspect_err(|_| record_submission("rejected"))?;

    let status = if receipt.status == GenerationStatus::Completed {
        record_submission("cached");
        StatusCode::OK
    } else {
        record_submission("queued");
        StatusCode::ACCEPTED
    };

    Ok((
        status,
        Json(GenerateResponse {
            request_id: receipt.request_id,
            status: receipt.status,
            queue_position: receipt.queue_position,
            estimated_time: receipt.estimated_wait_secs,
        }),
    ))
}

/// GET /v1/narration/status/{id} - Poll a generation request.
pub async fn get_status(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let id = parse_request_id(&request_id)?;
    let record = state.queue.status(&id)?;
    Ok(Json(record.into()))
}

/// DELETE /v1/narration/cancel/{id} - Cancel a queued or generating request.
///
/// Cancelling a request that already finished returns it unchanged.
pub async fn cancel(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let id = parse_request_id(&request_id)?;
    let record = state.queue.cancel(&id)?;
    Ok(Json(record.into()))
}

/// POST /v1/narration/acknowledge/{id} - Client has fetched the result.
///
/// The finished record is dropped from tracking at once and its final
/// state returned; later status polls answer 404. Unfinished requests
/// are refused with 409.
pub async fn acknowledge(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let id = parse_request_id(&request_id)?;
    let record = state.queue.acknowledge(&id)?;
    Ok(Json(record.into()))
}

/// GET /v1/narration/audio/{fingerprint} - Download cached audio.
pub async fn get_audio(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let fingerprint = Fingerprint::parse(&fingerprint)?;
    let (entry, audio) = state.cache.fetch(&fingerprint).await.map_err(|e| match e {
        narrator_engine::EngineError::NotFound(_) => {
            ApiError::NotFound(format!("no cached audio for {fingerprint}"))
        }
        other => other.into(),
    })?;

    AUDIO_BYTES_SERVED.inc_by(entry.size_bytes);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "audio/mpeg".to_string()),
            (header::CACHE_CONTROL, "private, max-age=3600".to_string()),
            (header::ETAG, format!("\"{fingerprint}\"")),
        ],
        audio,
    ))
}

#[derive(Debug, Serialize)]
pub struct VoiceInfo {
    pub id: VoiceStyle,
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Serialize)]
pub struct VoicesResponse {
    pub voices: Vec<VoiceInfo>,
    pub intensity_min: u8,
    pub intensity_max: u8,
    pub intensity_default: Intensity,
}

/// GET /v1/narration/voices - Voice style catalogue.
pub async fn list_voices() -> Json<VoicesResponse> {
    let voices = VoiceStyle::ALL
        .iter()
        .map(|style| {
            let profile = style.profile();
            VoiceInfo {
                id: *style,
                name: profile.name,
                description: profile.description,
            }
        })
        .collect();
    Json(VoicesResponse {
        voices,
        intensity_min: Intensity::MIN,
        intensity_max: Intensity::MAX,
        intensity_default: Intensity::default(),
    })
}
