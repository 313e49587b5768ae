use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// --- EQ Parameters ---

/// Holds the gain values (in dB) for the 3-band EQ.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EqParams {
    pub bass_gain_db: f32,
    pub mid_gain_db: f32,
    pub treble_gain_db: f32,
}

impl EqParams {
    pub(crate) fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        (self.bass_gain_db - other.bass_gain_db).abs() < epsilon
            && (self.mid_gain_db - other.mid_gain_db).abs() < epsilon
            && (self.treble_gain_db - other.treble_gain_db).abs() < epsilon
    }

    pub fn gain_db(&self, band: EqBand) -> f32 {
        match band {
            EqBand::Bass => self.bass_gain_db,
            EqBand::Mid => self.mid_gain_db,
            EqBand::Treble => self.treble_gain_db,
        }
    }
}

/// One of the three fixed EQ bands.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EqBand {
    Bass,
    Mid,
    Treble,
}

impl EqBand {
    pub const ALL: [EqBand; 3] = [EqBand::Bass, EqBand::Mid, EqBand::Treble];

    pub fn as_str(&self) -> &'static str {
        match self {
            EqBand::Bass => "bass",
            EqBand::Mid => "mid",
            EqBand::Treble => "treble",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBand(pub String);

impl fmt::Display for UnknownBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown EQ band '{}'", self.0)
    }
}

impl std::error::Error for UnknownBand {}

impl FromStr for EqBand {
    type Err = UnknownBand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bass" => Ok(EqBand::Bass),
            "mid" => Ok(EqBand::Mid),
            "treble" => Ok(EqBand::Treble),
            other => Err(UnknownBand(other.to_string())),
        }
    }
}

// --- Deck Identity & State ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeckId {
    A,
    B,
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeckId::A => write!(f, "A"),
            DeckId::B => write!(f, "B"),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum DeckState {
    #[default]
    Empty,
    Loading,
    Ready,
    Playing,
    Paused,
    Errored,
}

impl DeckState {
    /// States in which a track is loaded and transport controls apply.
    pub fn has_track(&self) -> bool {
        matches!(self, DeckState::Ready | DeckState::Playing | DeckState::Paused)
    }
}

/// Where to move the play head.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum SeekTarget {
    Seconds(f64),
    /// Fraction of the track duration, 0.0 to 1.0.
    Fraction(f64),
}

impl SeekTarget {
    /// Resolves to seconds, clamped to `[0, duration]`. `None` for NaN input.
    pub fn resolve(&self, duration_seconds: f64) -> Option<f64> {
        let raw = match *self {
            SeekTarget::Seconds(s) => s,
            SeekTarget::Fraction(f) => f * duration_seconds,
        };
        if raw.is_nan() {
            return None;
        }
        Some(raw.clamp(0.0, duration_seconds.max(0.0)))
    }
}

// --- UI Sampling Snapshots ---

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeckSnapshot {
    pub deck_id: DeckId,
    pub state: DeckState,
    pub position: f64,
    pub duration: f64,
    pub progress: f64,
    pub volume: f32,
    pub muted: bool,
    pub eq: EqParams,
    pub controls_enabled: bool,
    pub error: Option<String>,
}

impl DeckSnapshot {
    /// What a freshly created deck looks like.
    pub fn empty(deck_id: DeckId) -> Self {
        DeckSnapshot {
            deck_id,
            state: DeckState::Empty,
            position: 0.0,
            duration: 0.0,
            progress: 0.0,
            volume: 1.0,
            muted: false,
            eq: EqParams::default(),
            controls_enabled: false,
            error: None,
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MixerSnapshot {
    pub deck_a: DeckSnapshot,
    pub deck_b: DeckSnapshot,
    pub crossfade: f32,
}

impl MixerSnapshot {
    pub fn idle() -> Self {
        MixerSnapshot {
            deck_a: DeckSnapshot::empty(DeckId::A),
            deck_b: DeckSnapshot::empty(DeckId::B),
            crossfade: 0.5,
        }
    }
}
