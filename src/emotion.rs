//! # Emotion Labels and Samples
//!
//! The classifier speaks in a small closed vocabulary of ten emotion tags.
//! This module owns that vocabulary, the display lookups shown to the user,
//! and the [`DetectionSample`] produced once per session tick.
//!
//! ## Unknown Labels
//!
//! A remote classifier may answer with a tag outside the known ten. Those are
//! kept verbatim as [`EmotionLabel::Other`] so nothing is lost: the display
//! name falls back to the raw tag itself and the description to a generic line.
//!
//! ## Synthetic Samples
//!
//! When no real classification can be obtained, the session substitutes a
//! synthetic sample: a uniformly chosen known label with a confidence drawn
//! from `[0.6, 1.0)`.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// Lower bound for synthetic sample confidence.
pub const SYNTHETIC_CONFIDENCE_MIN: f64 = 0.6;
/// Exclusive upper bound for synthetic sample confidence.
pub const SYNTHETIC_CONFIDENCE_MAX: f64 = 1.0;

/// Categorical emotion tag reported by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EmotionLabel {
    Happy,
    Sad,
    Angry,
    Neutral,
    Surprise,
    Fear,
    Disgust,
    Anxiety,
    Excited,
    Calm,
    /// Tag outside the known vocabulary, lowercased
    Other(String),
}

impl EmotionLabel {
    /// The ten known labels, in the order the classifier documents them.
    pub const ALL: [EmotionLabel; 10] = [
        EmotionLabel::Happy,
        EmotionLabel::Sad,
        EmotionLabel::Angry,
        EmotionLabel::Neutral,
        EmotionLabel::Surprise,
        EmotionLabel::Fear,
        EmotionLabel::Disgust,
        EmotionLabel::Anxiety,
        EmotionLabel::Excited,
        EmotionLabel::Calm,
    ];

    /// Wire tag, e.g. `"happy"`.
    pub fn as_str(&self) -> &str {
        match self {
            EmotionLabel::Happy => "happy",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Angry => "angry",
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Anxiety => "anxiety",
            EmotionLabel::Excited => "excited",
            EmotionLabel::Calm => "calm",
            EmotionLabel::Other(raw) => raw,
        }
    }

    /// Human readable name. Unknown tags display as themselves.
    pub fn display_name(&self) -> &str {
        match self {
            EmotionLabel::Happy => "Happy",
            EmotionLabel::Sad => "Sad",
            EmotionLabel::Angry => "Angry",
            EmotionLabel::Neutral => "Neutral",
            EmotionLabel::Surprise => "Surprised",
            EmotionLabel::Fear => "Afraid",
            EmotionLabel::Disgust => "Disgusted",
            EmotionLabel::Anxiety => "Anxious",
            EmotionLabel::Excited => "Excited",
            EmotionLabel::Calm => "Calm",
            EmotionLabel::Other(raw) => raw,
        }
    }

    /// One-line description shown next to the recommendations.
    pub fn description(&self) -> &'static str {
        match self {
            EmotionLabel::Happy => "You look cheerful, here is some light and upbeat music",
            EmotionLabel::Sad => "You seem a little down, here is some warm and soothing music",
            EmotionLabel::Angry => "You look a bit upset, here is some music to help you unwind",
            EmotionLabel::Neutral => "You look composed, here is some balanced and comfortable music",
            EmotionLabel::Surprise => "You look surprised, here is something fresh and playful",
            EmotionLabel::Fear => "You seem tense, here is some safe and gentle music",
            EmotionLabel::Disgust => "You look uneasy, here is some clean and refreshing music",
            EmotionLabel::Anxiety => "You seem anxious, here is some relaxing and quiet music",
            EmotionLabel::Excited => "You look excited, here is some energetic music",
            EmotionLabel::Calm => "You look calm, here is some peaceful and harmonious music",
            EmotionLabel::Other(_) => "Here is some music picked for how you feel",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EmotionLabel::Other(_))
    }
}

impl FromStr for EmotionLabel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        let known = EmotionLabel::ALL.iter().find(|label| label.as_str() == tag).cloned();
        Ok(known.unwrap_or(EmotionLabel::Other(tag)))
    }
}

impl From<String> for EmotionLabel {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(label) => label,
            Err(never) => match never {},
        }
    }
}

impl From<&str> for EmotionLabel {
    fn from(s: &str) -> Self {
        EmotionLabel::from(s.to_string())
    }
}

impl From<EmotionLabel> for String {
    fn from(label: EmotionLabel) -> Self {
        label.as_str().to_string()
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Playback policy requested by the user.
///
/// In `Auto` mode the first recommended song starts as soon as the list
/// arrives. In `Manual` mode the user picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PlayMode {
    #[default]
    Auto,
    Manual,
}

impl PlayMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PlayMode::Auto => "auto",
            PlayMode::Manual => "manual",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            PlayMode::Auto => PlayMode::Manual,
            PlayMode::Manual => PlayMode::Auto,
        }
    }
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified (or synthetic) observation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSample {
    pub emotion: EmotionLabel,
    /// Classifier confidence in `[0, 1]`
    pub confidence: f64,
    pub timestamp: SystemTime,
}

impl DetectionSample {
    /// Create a sample stamped with the current wall clock.
    /// Confidence is clamped into `[0, 1]`; NaN becomes 0.
    pub fn new(emotion: EmotionLabel, confidence: f64) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self {
            emotion,
            confidence,
            timestamp: SystemTime::now(),
        }
    }
}

/// Synthetic substitute sample using the thread-local RNG.
pub fn synthetic_sample() -> DetectionSample {
    synthetic_sample_with(&mut rand::thread_rng())
}

/// Synthetic substitute sample drawn from the given RNG.
///
/// Picks one of the ten known labels uniformly, with a confidence in
/// `[0.6, 1.0)`. Tests pass a seeded RNG for reproducible sessions.
pub fn synthetic_sample_with<R: Rng>(rng: &mut R) -> DetectionSample {
    let emotion = EmotionLabel::ALL
        .choose(rng)
        .cloned()
        .unwrap_or(EmotionLabel::Neutral);
    let confidence = rng.gen_range(SYNTHETIC_CONFIDENCE_MIN..SYNTHETIC_CONFIDENCE_MAX);
    DetectionSample::new(emotion, confidence)
}
