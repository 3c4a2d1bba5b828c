//! Voice styles, intensity levels and the provider settings derived from them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Narration intensity, from 1 (subtle) to 5 (extreme).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Intensity(u8);

impl Intensity {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Validate and wrap an intensity level.
    pub fn new(level: u8) -> crate::Result<Self> {
        Self::try_from(i64::from(level))
    }

    /// The raw level.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Intensity {
    fn default() -> Self {
        Self(3)
    }
}

impl TryFrom<i64> for Intensity {
    type Error = crate::Error;

    fn try_from(value: i64) -> crate::Result<Self> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(crate::Error::InvalidIntensity(value))
        }
    }
}

impl From<Intensity> for u8 {
    fn from(value: Intensity) -> Self {
        value.0
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Available narration voice styles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceStyle {
    GhostlyWhisper,
    DemonicGrowl,
    EerieNarrator,
    PossessedChild,
    AncientEntity,
}

/// Provider-facing voice parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub speed: f32,
}

/// Per-intensity overrides applied on top of a style's base settings.
#[derive(Clone, Copy, Debug, PartialEq)]
struct IntensityModifier {
    stability: f32,
    speed: f32,
    style: f32,
}

const fn m(stability: f32, speed: f32, style: f32) -> IntensityModifier {
    IntensityModifier {
        stability,
        speed,
        style,
    }
}

/// Static description of a voice style.
#[derive(Clone, Copy, Debug)]
pub struct VoiceProfile {
    pub style: VoiceStyle,
    pub voice_id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub base: VoiceSettings,
    modifiers: [IntensityModifier; 5],
}

impl VoiceProfile {
    /// Settings adjusted for the given intensity.
    pub fn settings_for(&self, intensity: Intensity) -> VoiceSettings {
        let modifier = self.modifiers[usize::from(intensity.get() - Intensity::MIN)];
        VoiceSettings {
            stability: modifier.stability,
            similarity_boost: self.base.similarity_boost,
            style: modifier.style,
            speed: modifier.speed,
        }
    }
}

const PROFILES: [VoiceProfile; 5] = [
    VoiceProfile {
        style: VoiceStyle::GhostlyWhisper,
        voice_id: "21m00Tcm4TlvDq8ikWAM",
        name: "Ghostly Whisper",
        description: "Ethereal, breathy whispers from beyond the veil",
        base: VoiceSettings {
            stability: 0.3,
            similarity_boost: 0.8,
            style: 0.6,
            speed: 0.9,
        },
        modifiers: [
            m(0.5, 1.0, 0.3),
            m(0.4, 0.95, 0.4),
            m(0.3, 0.9, 0.6),
            m(0.2, 0.85, 0.7),
            m(0.1, 0.8, 0.9),
        ],
    },
    VoiceProfile {
        style: VoiceStyle::DemonicGrowl,
        voice_id: "EXAVITQu4vr4xnSDxMaL",
        name: "Demonic Growl",
        description: "Deep, menacing tones from the abyss",
        base: VoiceSettings {
            stability: 0.4,
            similarity_boost: 0.7,
            style: 0.8,
            speed: 0.85,
        },
        modifiers: [
            m(0.6, 0.95, 0.5),
            m(0.5, 0.9, 0.6),
            m(0.4, 0.85, 0.8),
            m(0.3, 0.8, 0.9),
            m(0.2, 0.75, 1.0),
        ],
    },
    VoiceProfile {
        style: VoiceStyle::EerieNarrator,
        voice_id: "pNInz6obpgDQGcFmaJgB",
        name: "Eerie Narrator",
        description: "Calm, unsettling storyteller voice",
        base: VoiceSettings {
            stability: 0.6,
            similarity_boost: 0.75,
            style: 0.5,
            speed: 0.95,
        },
        modifiers: [
            m(0.7, 1.0, 0.3),
            m(0.65, 0.98, 0.4),
            m(0.6, 0.95, 0.5),
            m(0.5, 0.9, 0.6),
            m(0.4, 0.85, 0.7),
        ],
    },
    VoiceProfile {
        style: VoiceStyle::PossessedChild,
        voice_id: "jBpfuIE2acCO8z3wKNLl",
        name: "Possessed Child",
        description: "Innocent voice with something deeply wrong",
        base: VoiceSettings {
            stability: 0.2,
            similarity_boost: 0.85,
            style: 0.7,
            speed: 1.0,
        },
        modifiers: [
            m(0.4, 1.05, 0.4),
            m(0.3, 1.02, 0.5),
            m(0.2, 1.0, 0.7),
            m(0.15, 0.95, 0.8),
            m(0.1, 0.9, 1.0),
        ],
    },
    VoiceProfile {
        style: VoiceStyle::AncientEntity,
        voice_id: "onwK4e9ZLuTAKqWW03F9",
        name: "Ancient Entity",
        description: "Timeless, cosmic horror resonance",
        base: VoiceSettings {
            stability: 0.65,
            similarity_boost: 0.75,
            style: 0.5,
            speed: 0.9,
        },
        modifiers: [
            m(0.6, 0.9, 0.6),
            m(0.55, 0.85, 0.7),
            m(0.5, 0.8, 0.9),
            m(0.4, 0.75, 1.0),
            m(0.3, 0.7, 1.0),
        ],
    },
];

impl VoiceStyle {
    /// Every style, in catalogue order.
    pub const ALL: [VoiceStyle; 5] = [
        Self::GhostlyWhisper,
        Self::DemonicGrowl,
        Self::EerieNarrator,
        Self::PossessedChild,
        Self::AncientEntity,
    ];

    /// Stable wire name, also mixed into the fingerprint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GhostlyWhisper => "ghostly_whisper",
            Self::DemonicGrowl => "demonic_growl",
            Self::EerieNarrator => "eerie_narrator",
            Self::PossessedChild => "possessed_child",
            Self::AncientEntity => "ancient_entity",
        }
    }

    /// Catalogue entry for this style.
    pub fn profile(&self) -> &'static VoiceProfile {
        match self {
            Self::GhostlyWhisper => &PROFILES[0],
            Self::DemonicGrowl => &PROFILES[1],
            Self::EerieNarrator => &PROFILES[2],
            Self::PossessedChild => &PROFILES[3],
            Self::AncientEntity => &PROFILES[4],
        }
    }

    /// Provider voice id.
    pub fn voice_id(&self) -> &'static str {
        self.profile().voice_id
    }

    /// Provider settings for this style at the given intensity.
    pub fn settings_for(&self, intensity: Intensity) -> VoiceSettings {
        self.profile().settings_for(intensity)
    }
}

impl fmt::Display for VoiceStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoiceStyle {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|style| style.as_str() == s)
            .ok_or_else(|| crate::Error::InvalidVoiceStyle(s.to_string()))
    }
}
