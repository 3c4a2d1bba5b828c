//! Content hashes and cache fingerprints.

use crate::voice::{Intensity, VoiceStyle};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Domain separator mixed into every fingerprint. Bump to invalidate all cached audio.
const FINGERPRINT_DOMAIN: &[u8] = b"narration-v1";

/// A SHA-256 content hash represented as 32 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Compute SHA-256 hash of data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        if s.len() != 64 {
            return Err(crate::Error::InvalidFingerprint(format!(
                "expected 64 hex chars, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex_str = std::str::from_utf8(chunk)
                .map_err(|e| crate::Error::InvalidFingerprint(e.to_string()))?;
            bytes[i] = u8::from_str_radix(hex_str, 16)
                .map_err(|e| crate::Error::InvalidFingerprint(e.to_string()))?;
        }
        Ok(Self(bytes))
    }

    /// Encode as lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Cache identity of a generation: derived from the source content hash,
/// the voice style and the intensity level, independent of any request id.
///
/// Two submissions with identical `(content, voice_style, intensity)` always
/// produce the same fingerprint, which is what makes the second one a cache hit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Derive the fingerprint for a piece of content narrated with the given voice parameters.
    pub fn derive(content: &str, voice_style: VoiceStyle, intensity: Intensity) -> Self {
        let content_hash = ContentHash::compute(content.as_bytes());
        Self::from_content_hash(&content_hash, voice_style, intensity)
    }

    /// Derive from an already computed content hash.
    pub fn from_content_hash(
        content_hash: &ContentHash,
        voice_style: VoiceStyle,
        intensity: Intensity,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_DOMAIN);
        hasher.update([0u8]);
        hasher.update(content_hash.as_bytes());
        hasher.update([0u8]);
        hasher.update(voice_style.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update([intensity.get()]);
        Self(hasher.finalize().into())
    }

    /// Parse a fingerprint from its 64-character hex form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        ContentHash::from_hex(s).map(|h| Self(*h.as_bytes()))
    }

    /// Encode as lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.to_hex()
    }
}
