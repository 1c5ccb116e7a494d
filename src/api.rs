//! # Remote Service Client
//!
//! Seams to the remote mood service and the HTTP implementation behind them.
//!
//! ## Collaborator Traits
//!
//! - [`Classifier`]: emotion classification of a captured frame, either as a
//!   multipart upload or as an inline base64 data URI
//! - [`RecommendationSource`]: ranked songs for an emotion
//! - [`InteractionRecorder`]: play and rating telemetry
//! - [`AssetFetcher`]: streaming URL and local download of a song's audio
//!
//! The session, recommendation and playback controllers only see these
//! traits, so tests swap in in-memory doubles.
//!
//! ## Endpoints
//!
//! | Operation        | Request                                   |
//! |------------------|-------------------------------------------|
//! | classify         | `POST /api/detect-emotion`                |
//! | recommendations  | `GET /api/recommendations`                |
//! | asset            | `GET /api/music/<song id>`                |
//! | interaction      | `POST /api/record-interaction`            |
//! | health           | `GET /api/health`                         |
//!
//! ## Wire Normalization
//!
//! The service is loose about response shapes: song lists come under either
//! `recommendations` or `songs`, ids are numbers or strings, and a response
//! body may arrive double-encoded as a JSON string. All of that is resolved
//! here by the `normalize_*` functions, so only [`Song`] values and
//! [`Classification`]s reach the rest of the crate.

use crate::capture::Frame;
use crate::emotion::{EmotionLabel, PlayMode};
use crate::error::{Result, ServiceError};
use crate::song::{RecommendationList, Song};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempPath;

const USER_AGENT: &str = concat!("moodtune/", env!("CARGO_PKG_VERSION"));

/// Result of a successful classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub emotion: EmotionLabel,
    pub confidence: f64,
    /// Songs the service ranked for this emotion alongside the answer, if any
    pub recommendations: Option<RecommendationList>,
}

/// Query for [`RecommendationSource::recommendations`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationQuery {
    pub emotion: EmotionLabel,
    pub mode: PlayMode,
    pub limit: usize,
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionAction {
    Play,
    Rating,
}

/// User interaction reported to the service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interaction {
    pub user_id: String,
    pub song_id: String,
    pub emotion: Option<EmotionLabel>,
    pub action: InteractionAction,
    pub rating: Option<u8>,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Upload the frame as a multipart file. Succeeds only when the service
    /// reports `success` and names an emotion.
    async fn classify_upload(&self, frame: &Frame, user_id: &str, mode: PlayMode)
        -> Result<Classification>;

    /// Send the frame as an inline data URI in a JSON body. Succeeds only on
    /// HTTP 200 with an emotion present.
    async fn classify_inline(&self, data_uri: &str, user_id: &str, mode: PlayMode)
        -> Result<Classification>;
}

#[async_trait]
pub trait RecommendationSource: Send + Sync {
    async fn recommendations(&self, query: &RecommendationQuery) -> Result<RecommendationList>;
}

#[async_trait]
pub trait InteractionRecorder: Send + Sync {
    async fn record(&self, interaction: &Interaction) -> Result<()>;
}

#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// URL the audio engine can stream directly.
    fn stream_url(&self, song_id: &str) -> String;

    /// Download the whole asset into a temporary file.
    /// The file is removed when the returned path is dropped.
    async fn download(&self, song_id: &str) -> Result<TempPath>;
}

/// reqwest-backed client for the mood service.
#[derive(Debug, Clone)]
pub struct HttpService {
    client: reqwest::Client,
    base_url: String,
    classify_timeout: Duration,
    request_timeout: Duration,
}

impl HttpService {
    pub fn new(base_url: &str, classify_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            classify_timeout,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check that the service answers its health probe.
    pub async fn health(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url("/api/health"))
            .timeout(self.request_timeout)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(ServiceError::Transport(format!(
                "health check returned {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        match body.get("status").and_then(Value::as_str) {
            Some("ok") => Ok(()),
            other => Err(ServiceError::Structural(format!(
                "unexpected health status: {other:?}"
            ))),
        }
    }
}

#[async_trait]
impl Classifier for HttpService {
    async fn classify_upload(
        &self,
        frame: &Frame,
        user_id: &str,
        mode: PlayMode,
    ) -> Result<Classification> {
        let part = Part::bytes(frame.bytes.clone())
            .file_name("frame.jpg")
            .mime_str(frame.mime)
            .map_err(|e| ServiceError::Structural(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("user_id", user_id.to_string())
            .text("mode", mode.as_str());

        let response = self
            .client
            .post(self.url("/api/detect-emotion"))
            .timeout(self.classify_timeout)
            .multipart(form)
            .send()
            .await?;

        // The upload path trusts the `success` flag rather than the status code
        let text = response.text().await?;
        let body = parse_body(&text)?;
        if body.get("success").and_then(Value::as_bool) != Some(true) {
            let reason = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("success flag not set");
            return Err(ServiceError::Structural(format!("classification rejected: {reason}")));
        }

        normalize_classification(&body)
    }

    async fn classify_inline(
        &self,
        data_uri: &str,
        user_id: &str,
        mode: PlayMode,
    ) -> Result<Classification> {
        let response = self
            .client
            .post(self.url("/api/detect-emotion"))
            .timeout(self.classify_timeout)
            .json(&json!({
                "image": data_uri,
                "user_id": user_id,
                "mode": mode.as_str(),
            }))
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(ServiceError::Transport(format!(
                "classification returned {}",
                response.status()
            )));
        }

        let text = response.text().await?;
        normalize_classification(&parse_body(&text)?)
    }
}

#[async_trait]
impl RecommendationSource for HttpService {
    async fn recommendations(&self, query: &RecommendationQuery) -> Result<RecommendationList> {
        let limit = query.limit.to_string();
        let response = self
            .client
            .get(self.url("/api/recommendations"))
            .timeout(self.request_timeout)
            .query(&[
                ("emotion", query.emotion.as_str()),
                ("mode", query.mode.as_str()),
                ("limit", limit.as_str()),
                ("user_id", query.user_id.as_str()),
            ])
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(ServiceError::Transport(format!(
                "recommendations returned {}",
                response.status()
            )));
        }

        let text = response.text().await?;
        normalize_recommendations(&parse_body(&text)?, &query.emotion)
    }
}

#[async_trait]
impl InteractionRecorder for HttpService {
    async fn record(&self, interaction: &Interaction) -> Result<()> {
        let response = self
            .client
            .post(self.url("/api/record-interaction"))
            .timeout(self.request_timeout)
            .json(interaction)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(ServiceError::Transport(format!(
                "record-interaction returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AssetFetcher for HttpService {
    fn stream_url(&self, song_id: &str) -> String {
        self.url(&format!("/api/music/{song_id}"))
    }

    async fn download(&self, song_id: &str) -> Result<TempPath> {
        let url = self.stream_url(song_id);
        debug!("Downloading asset {url}");

        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ServiceError::Empty(format!("asset {song_id} has no content")));
        }

        let file = tempfile::Builder::new()
            .prefix("moodtune-")
            .suffix(".audio")
            .tempfile()
            .map_err(|e| ServiceError::DeviceUnavailable(format!("temp file: {e}")))?;
        let path = file.into_temp_path();
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| ServiceError::DeviceUnavailable(format!("writing {}: {e}", path.display())))?;

        debug!("Downloaded {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }
}

/// Parse a response body, unwrapping a JSON document that was sent as a
/// JSON string.
pub fn parse_body(text: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(text)?;
    match value {
        Value::String(inner) => Ok(serde_json::from_str(&inner)?),
        other => Ok(other),
    }
}

/// Extract a [`Classification`] from a classifier response body.
///
/// Requires a non-empty `emotion`. A missing `confidence` counts as 0.
pub fn normalize_classification(body: &Value) -> Result<Classification> {
    let emotion = body
        .get("emotion")
        .and_then(Value::as_str)
        .filter(|tag| !tag.trim().is_empty())
        .map(EmotionLabel::from)
        .ok_or_else(|| ServiceError::Structural("response has no emotion".to_string()))?;

    let confidence = body
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);

    let recommendations = body
        .get("recommendations")
        .and_then(Value::as_array)
        .map(|items| normalize_song_items(items, &emotion));

    Ok(Classification {
        emotion,
        confidence,
        recommendations,
    })
}

/// Extract the song list from a recommendation response body.
///
/// Accepts the list under `recommendations` or, failing that, `songs`.
/// A body carrying neither is a structural failure; an empty list is not.
pub fn normalize_recommendations(body: &Value, requested: &EmotionLabel) -> Result<RecommendationList> {
    let items = body
        .get("recommendations")
        .and_then(Value::as_array)
        .or_else(|| body.get("songs").and_then(Value::as_array))
        .ok_or_else(|| {
            ServiceError::Structural("response has neither `recommendations` nor `songs`".to_string())
        })?;

    Ok(normalize_song_items(items, requested))
}

fn normalize_song_items(items: &[Value], fallback_emotion: &EmotionLabel) -> RecommendationList {
    items
        .iter()
        .filter_map(|item| {
            let song = normalize_song(item, fallback_emotion);
            if song.is_none() {
                warn!("Dropping recommendation without an id: {item}");
            }
            song
        })
        .collect()
}

/// Map one wire song object into a [`Song`]. Returns `None` without an id.
pub fn normalize_song(value: &Value, fallback_emotion: &EmotionLabel) -> Option<Song> {
    let id = match value.get("id").or_else(|| value.get("song_id"))? {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    let text = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Some(Song {
        id,
        title: text("title").unwrap_or_else(|| "Unknown".to_string()),
        artist: text("artist").unwrap_or_else(|| "Unknown".to_string()),
        emotion: text("emotion")
            .map(EmotionLabel::from)
            .unwrap_or_else(|| fallback_emotion.clone()),
        source_path: text("file_path").or_else(|| text("path")).unwrap_or_default(),
    })
}
