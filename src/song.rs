use crate::emotion::EmotionLabel;
use serde::{Deserialize, Serialize};

/// How many songs the placeholder list always contains.
pub const PLACEHOLDER_LEN: usize = 5;

/// A song as ranked by the recommendation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    /// Service-side identifier, used to address the audio asset.
    /// Numeric ids from the wire are kept in their decimal form.
    pub id: String,
    pub title: String,
    pub artist: String,
    /// Emotion the song was recommended for.
    pub emotion: EmotionLabel,
    /// Path of the asset on the service side. Informational only,
    /// playback always goes through the asset endpoint by `id`.
    pub source_path: String,
}

/// Ranked recommendations. Insertion order is ranking order;
/// duplicates are kept as the service sent them.
pub type RecommendationList = Vec<Song>;

/// Fixed placeholder list used when the recommendation service
/// cannot be reached. Every entry carries the requested `emotion`.
pub fn placeholder_list(emotion: &EmotionLabel) -> RecommendationList {
    const PLACEHOLDERS: [(&str, &str); PLACEHOLDER_LEN] = [
        ("Good Times", "The Happy Band"),
        ("Bright Sunshine", "Sunshine Duo"),
        ("Lifted Spirits", "Uplift Orchestra"),
        ("Easy Moment", "Easy Listening"),
        ("Better Days", "Better Days Band"),
    ];

    PLACEHOLDERS
        .iter()
        .enumerate()
        .map(|(i, (title, artist))| Song {
            id: (i + 1).to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            emotion: emotion.clone(),
            source_path: format!("{}{}.mp3", emotion.as_str(), i + 1),
        })
        .collect()
}
