//! Generation request records and their lifecycle.

use crate::hash::Fingerprint;
use crate::voice::{Intensity, VoiceStyle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Progress reported once a worker has picked the request up.
pub const PROGRESS_DISPATCHED: u8 = 10;
/// Progress reported once the provider returned audio and it is being cached.
pub const PROGRESS_AUDIO_RECEIVED: u8 = 90;
/// Progress of a completed request.
pub const PROGRESS_DONE: u8 = 100;

/// Unique identifier for a generation request.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a new random request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidRequestId(format!("{s}: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordering among waiting requests. `High` sorts first.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl FromStr for Priority {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown priority: {other}"
            ))),
        }
    }
}

/// Generation request state.
///
/// ```text
/// queued -> generating -> completed | failed
/// queued | generating -> cancelled
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    /// Waiting for a worker slot.
    Queued,
    /// A worker is calling the provider.
    Generating,
    /// Audio is cached and ready.
    Completed,
    /// Generation gave up; see the error summary.
    Failed,
    /// Cancelled by a caller or by the abandonment sweep.
    Cancelled,
}

impl GenerationStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [GenerationStatus; 5] = [
        Self::Queued,
        Self::Generating,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Check if the request is still tracked by a worker or waiting for one.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Generating)
    }

    /// Check if the request reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is an allowed edge.
    pub fn can_transition_to(&self, next: GenerationStatus) -> bool {
        use GenerationStatus::*;
        matches!(
            (self, next),
            (Queued, Generating)
                | (Queued, Cancelled)
                | (Generating, Completed)
                | (Generating, Failed)
                | (Generating, Cancelled)
        )
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the finished audio of a request lives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioRef {
    pub fingerprint: Fingerprint,
    /// Opaque blob handle in the cache store.
    pub blob_ref: String,
    pub size_bytes: u64,
    pub duration_seconds: f64,
    /// True when the request was satisfied from cache without a provider call.
    pub cached: bool,
}

/// Human-readable failure attached to a failed request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSummary {
    pub message: String,
    /// Suggested wait before retrying, for rate-limit failures.
    pub retry_after_secs: Option<u64>,
}

/// A generation request as tracked by the queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub id: RequestId,
    pub fingerprint: Fingerprint,
    pub voice_style: VoiceStyle,
    pub intensity: Intensity,
    pub priority: Priority,
    pub status: GenerationStatus,
    /// 0..=100, never decreasing while generating.
    pub progress: u8,
    /// Provider attempts made so far.
    pub attempts: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    pub audio: Option<AudioRef>,
    /// Present only when `status` is `failed`.
    pub error: Option<FailureSummary>,
    /// 0-based position among waiting requests; only set while queued.
    pub queue_position: Option<usize>,
}

impl GenerationRequest {
    /// A fresh `queued` record.
    pub fn queued(
        fingerprint: Fingerprint,
        voice_style: VoiceStyle,
        intensity: Intensity,
        priority: Priority,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: RequestId::new(),
            fingerprint,
            voice_style,
            intensity,
            priority,
            status: GenerationStatus::Queued,
            progress: 0,
            attempts: 0,
            created_at: now,
            started_at: None,
            completed_at: None,
            audio: None,
            error: None,
            queue_position: None,
        }
    }

    /// A record that is already `completed` from a cache hit.
    pub fn cached(
        fingerprint: Fingerprint,
        voice_style: VoiceStyle,
        intensity: Intensity,
        priority: Priority,
        audio: AudioRef,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            status: GenerationStatus::Completed,
            progress: PROGRESS_DONE,
            completed_at: Some(now),
            audio: Some(audio),
            ..Self::queued(fingerprint, voice_style, intensity, priority, now)
        }
    }

    /// Move to `next`, stamping timestamps and progress.
    ///
    /// Fails with [`crate::Error::InvalidTransition`] for edges outside the state machine,
    /// including any transition out of a terminal state.
    pub fn transition(&mut self, next: GenerationStatus, now: OffsetDateTime) -> crate::Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(crate::Error::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        match next {
            GenerationStatus::Generating => {
                self.started_at = Some(now);
                self.advance_progress(PROGRESS_DISPATCHED);
            }
            GenerationStatus::Completed => {
                self.advance_progress(PROGRESS_DONE);
                self.completed_at = Some(now);
            }
            GenerationStatus::Failed | GenerationStatus::Cancelled => {
                self.completed_at = Some(now);
            }
            GenerationStatus::Queued => {}
        }
        self.queue_position = None;
        self.status = next;
        Ok(())
    }

    /// Raise progress to `value`; lower values are ignored.
    pub fn advance_progress(&mut self, value: u8) {
        self.progress = self.progress.max(value.min(PROGRESS_DONE));
    }

    /// Age of the request relative to `now`.
    pub fn age(&self, now: OffsetDateTime) -> time::Duration {
        now - self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest::queued(
            Fingerprint::derive("text", VoiceStyle::EerieNarrator, Intensity::default()),
            VoiceStyle::EerieNarrator,
            Intensity::default(),
            Priority::Normal,
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    #[test]
    fn test_request_id_parse() {
        let id = RequestId::new();
        assert_eq!(RequestId::parse(&id.to_string()).unwrap(), id);
        assert!(matches!(
            RequestId::parse("nope"),
            Err(crate::Error::InvalidRequestId(_))
        ));
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High < Priority::Normal);
        assert!(Priority::Normal < Priority::Low);
        assert_eq!("low".parse::<Priority>().unwrap(), Priority::Low);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_allowed_edges() {
        use GenerationStatus::*;
        let allowed = [
            (Queued, Generating),
            (Queued, Cancelled),
            (Generating, Completed),
            (Generating, Failed),
            (Generating, Cancelled),
        ];
        for from in GenerationStatus::ALL {
            for to in GenerationStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for status in GenerationStatus::ALL {
            if status.is_terminal() {
                assert!(!status.is_active());
                assert!(
                    GenerationStatus::ALL
                        .iter()
                        .all(|next| !status.can_transition_to(*next))
                );
            }
        }
    }

    #[test]
    fn test_transition_stamps_timestamps_and_progress() {
        let mut req = request();
        let later = OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(5);
        req.queue_position = Some(2);

        req.transition(GenerationStatus::Generating, later).unwrap();
        assert_eq!(req.started_at, Some(later));
        assert_eq!(req.progress, PROGRESS_DISPATCHED);
        assert_eq!(req.queue_position, None);

        req.transition(GenerationStatus::Completed, later).unwrap();
        assert_eq!(req.progress, PROGRESS_DONE);
        assert_eq!(req.completed_at, Some(later));

        let err = req
            .transition(GenerationStatus::Cancelled, later)
            .unwrap_err();
        assert!(matches!(err, crate::Error::InvalidTransition { .. }));
        assert_eq!(req.status, GenerationStatus::Completed);
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut req = request();
        req.advance_progress(40);
        req.advance_progress(20);
        assert_eq!(req.progress, 40);
        req.advance_progress(250);
        assert_eq!(req.progress, PROGRESS_DONE);
    }

    #[test]
    fn test_cached_record_is_completed() {
        let fp = Fingerprint::derive("text", VoiceStyle::AncientEntity, Intensity::default());
        let req = GenerationRequest::cached(
            fp,
            VoiceStyle::AncientEntity,
            Intensity::default(),
            Priority::Low,
            AudioRef {
                fingerprint: fp,
                blob_ref: "audio/x/y".to_string(),
                size_bytes: 10,
                duration_seconds: 0.5,
                cached: true,
            },
            OffsetDateTime::UNIX_EPOCH,
        );
        assert_eq!(req.status, GenerationStatus::Completed);
        assert_eq!(req.progress, PROGRESS_DONE);
        assert!(req.completed_at.is_some());
        assert!(req.audio.unwrap().cached);
    }
}
