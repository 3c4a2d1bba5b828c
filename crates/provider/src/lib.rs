//! Text-to-speech provider boundary.
//!
//! The generation queue only sees [`SpeechProvider::generate`] and the closed
//! [`ProviderError`] set; request and response shapes of any concrete
//! backend stay inside this crate.

pub mod error;
pub mod guard;
pub mod http;
pub mod traits;

pub use error::{ProviderError, ProviderResult};
pub use guard::{OutageGuard, ProviderHealth};
pub use http::HttpSpeechProvider;
pub use traits::{SpeechProvider, Synthesis, SynthesisRequest};

use narrator_core::config::ProviderConfig;
use std::sync::Arc;

/// Build the configured provider behind an outage guard.
pub fn from_config(config: &ProviderConfig) -> ProviderResult<Arc<OutageGuard>> {
    config
        .validate()
        .map_err(ProviderError::ProviderUnavailable)?;
    let http = HttpSpeechProvider::new(config)?;
    Ok(Arc::new(OutageGuard::new(
        Arc::new(http),
        config.outage_threshold,
        config.outage_cooldown(),
    )))
}
