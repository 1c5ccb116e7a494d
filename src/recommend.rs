//! # Recommendation Client
//!
//! Fetches the ranked song list for an emotion. When the service cannot be
//! reached or answers with something unusable, a fixed placeholder list takes
//! its place, so the caller always has something to play. Whether to start
//! playing is the caller's decision.

use crate::api::{RecommendationQuery, RecommendationSource};
use crate::emotion::{EmotionLabel, PlayMode};
use crate::song::{self, RecommendationList};
use log::{info, warn};
use std::sync::Arc;

/// How many songs are requested by default.
pub const DEFAULT_LIMIT: usize = 10;

/// Songs for one emotion and where they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub songs: RecommendationList,
    /// True when `songs` is the placeholder list
    pub used_fallback: bool,
}

pub struct RecommendationClient {
    source: Arc<dyn RecommendationSource>,
    user_id: String,
    limit: usize,
}

impl RecommendationClient {
    pub fn new(source: Arc<dyn RecommendationSource>, user_id: String) -> Self {
        Self {
            source,
            user_id,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub async fn fetch(&self, emotion: &EmotionLabel, mode: PlayMode) -> Fetched {
        let query = RecommendationQuery {
            emotion: emotion.clone(),
            mode,
            limit: self.limit,
            user_id: self.user_id.clone(),
        };

        match self.source.recommendations(&query).await {
            Ok(songs) => {
                info!("Got {} recommendations for {emotion}", songs.len());
                Fetched {
                    songs,
                    used_fallback: false,
                }
            }
            Err(e) => {
                warn!("Recommendations for {emotion} unavailable, using placeholders: {e}");
                Fetched {
                    songs: song::placeholder_list(emotion),
                    used_fallback: true,
                }
            }
        }
    }
}
