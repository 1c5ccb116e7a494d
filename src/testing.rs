//! In-memory collaborators for unit tests.

use crate::api::{
    AssetFetcher, Classification, Classifier, Interaction, InteractionRecorder, RecommendationQuery,
    RecommendationSource,
};
use crate::capture::{Frame, FrameCompressor, FrameSource};
use crate::emotion::{EmotionLabel, PlayMode};
use crate::error::{Result, ServiceError};
use crate::playback::{AudioEngine, AudioSource, EngineEvent, EngineFactory, EngineOptions};
use crate::song::{RecommendationList, Song};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempPath;
use tokio::sync::mpsc::UnboundedSender;

pub fn song(id: &str, emotion: EmotionLabel) -> Song {
    Song {
        id: id.to_string(),
        title: format!("Title {id}"),
        artist: format!("Artist {id}"),
        emotion,
        source_path: format!("{id}.mp3"),
    }
}

pub fn songs(ids: &[&str], emotion: EmotionLabel) -> RecommendationList {
    ids.iter().map(|id| song(id, emotion.clone())).collect()
}

/// Let detached tasks run to completion.
pub async fn drain_tasks() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

pub struct TestCamera {
    available: bool,
    captures: AtomicUsize,
}

impl TestCamera {
    pub const FRAME: &'static [u8] = b"\xff\xd8raw-frame";

    pub fn working() -> Self {
        Self {
            available: true,
            captures: AtomicUsize::new(0),
        }
    }

    pub fn broken() -> Self {
        Self {
            available: false,
            captures: AtomicUsize::new(0),
        }
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameSource for TestCamera {
    async fn capture(&self) -> Result<Frame> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if self.available {
            Ok(Frame::jpeg(Self::FRAME.to_vec()))
        } else {
            Err(ServiceError::DeviceUnavailable("no camera".to_string()))
        }
    }
}

pub struct FailingCompressor;

#[async_trait]
impl FrameCompressor for FailingCompressor {
    async fn compress(&self, _frame: &Frame) -> Result<Frame> {
        Err(ServiceError::DeviceUnavailable("encoder missing".to_string()))
    }
}

/// How a scripted classifier answers one call.
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed(EmotionLabel, f64),
    SucceedWithSongs(EmotionLabel, f64, usize),
    Structural,
    Transport,
}

impl Behavior {
    fn answer(&self) -> Result<Classification> {
        match self {
            Behavior::Succeed(emotion, confidence) => Ok(Classification {
                emotion: emotion.clone(),
                confidence: *confidence,
                recommendations: None,
            }),
            Behavior::SucceedWithSongs(emotion, confidence, count) => {
                let ids: Vec<String> = (1..=*count).map(|n| format!("e{n}")).collect();
                let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
                Ok(Classification {
                    emotion: emotion.clone(),
                    confidence: *confidence,
                    recommendations: Some(songs(&ids, emotion.clone())),
                })
            }
            Behavior::Structural => Err(ServiceError::Structural("no emotion".to_string())),
            Behavior::Transport => Err(ServiceError::Transport("connection refused".to_string())),
        }
    }
}

#[derive(Default)]
struct ClassifierLog {
    upload_calls: usize,
    inline_calls: usize,
    last_upload: Option<Vec<u8>>,
    last_data_uri: Option<String>,
    last_mode: Option<PlayMode>,
}

/// Classifier answering from a script.
///
/// Upload calls consume `upload_script` first and then repeat `upload`.
pub struct ScriptedClassifier {
    upload: Behavior,
    inline: Behavior,
    upload_script: Mutex<VecDeque<Behavior>>,
    delay: Duration,
    log: Mutex<ClassifierLog>,
}

impl ScriptedClassifier {
    pub fn new(upload: Behavior, inline: Behavior) -> Self {
        Self {
            upload,
            inline,
            upload_script: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            log: Mutex::new(ClassifierLog::default()),
        }
    }

    pub fn always(behavior: Behavior) -> Self {
        Self::new(behavior.clone(), behavior)
    }

    pub fn with_upload_script(self, script: Vec<Behavior>) -> Self {
        *self.upload_script.lock().unwrap() = script.into();
        self
    }

    /// Every answer takes `delay` of (tokio) time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn upload_calls(&self) -> usize {
        self.log.lock().unwrap().upload_calls
    }

    pub fn inline_calls(&self) -> usize {
        self.log.lock().unwrap().inline_calls
    }

    pub fn last_upload(&self) -> Option<Vec<u8>> {
        self.log.lock().unwrap().last_upload.clone()
    }

    pub fn last_data_uri(&self) -> Option<String> {
        self.log.lock().unwrap().last_data_uri.clone()
    }

    pub fn last_mode(&self) -> Option<PlayMode> {
        self.log.lock().unwrap().last_mode
    }

    async fn wait(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify_upload(&self, frame: &Frame, _user_id: &str, mode: PlayMode) -> Result<Classification> {
        let behavior = {
            let mut log = self.log.lock().unwrap();
            log.upload_calls += 1;
            log.last_upload = Some(frame.bytes.clone());
            log.last_mode = Some(mode);
            self.upload_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.upload.clone())
        };
        self.wait().await;
        behavior.answer()
    }

    async fn classify_inline(&self, data_uri: &str, _user_id: &str, mode: PlayMode) -> Result<Classification> {
        {
            let mut log = self.log.lock().unwrap();
            log.inline_calls += 1;
            log.last_data_uri = Some(data_uri.to_string());
            log.last_mode = Some(mode);
        }
        self.wait().await;
        self.inline.answer()
    }
}

enum Answer {
    Songs(RecommendationList),
    Transport,
    Structural,
}

/// Recommendation source returning a fixed answer.
pub struct StaticRecommendations {
    answer: Answer,
    delay: Duration,
    queries: Mutex<Vec<RecommendationQuery>>,
}

impl StaticRecommendations {
    fn with(answer: Answer) -> Self {
        Self {
            answer,
            delay: Duration::ZERO,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Every answer takes `delay` of (tokio) time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn ok(songs: RecommendationList) -> Self {
        Self::with(Answer::Songs(songs))
    }

    pub fn transport_failure() -> Self {
        Self::with(Answer::Transport)
    }

    pub fn structural_failure() -> Self {
        Self::with(Answer::Structural)
    }

    pub fn queries(&self) -> Vec<RecommendationQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecommendationSource for StaticRecommendations {
    async fn recommendations(&self, query: &RecommendationQuery) -> Result<RecommendationList> {
        self.queries.lock().unwrap().push(query.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.answer {
            Answer::Songs(songs) => Ok(songs.clone()),
            Answer::Transport => Err(ServiceError::Transport("timed out".to_string())),
            Answer::Structural => Err(ServiceError::Structural("neither key present".to_string())),
        }
    }
}

#[derive(Default)]
pub struct RecordingRecorder {
    fail: bool,
    interactions: Mutex<Vec<Interaction>>,
}

impl RecordingRecorder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            interactions: Mutex::new(Vec::new()),
        }
    }

    pub fn interactions(&self) -> Vec<Interaction> {
        self.interactions.lock().unwrap().clone()
    }
}

#[async_trait]
impl InteractionRecorder for RecordingRecorder {
    async fn record(&self, interaction: &Interaction) -> Result<()> {
        self.interactions.lock().unwrap().push(interaction.clone());
        if self.fail {
            Err(ServiceError::Transport("telemetry down".to_string()))
        } else {
            Ok(())
        }
    }
}

pub struct TestFetcher {
    available: bool,
    downloads: AtomicUsize,
}

impl TestFetcher {
    pub fn working() -> Self {
        Self {
            available: true,
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn broken() -> Self {
        Self {
            available: false,
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetFetcher for TestFetcher {
    fn stream_url(&self, song_id: &str) -> String {
        format!("http://music.test/api/music/{song_id}")
    }

    async fn download(&self, song_id: &str) -> Result<TempPath> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if !self.available {
            return Err(ServiceError::Transport(format!("asset {song_id} unreachable")));
        }
        let file = tempfile::NamedTempFile::new()
            .map_err(|e| ServiceError::DeviceUnavailable(e.to_string()))?;
        Ok(file.into_temp_path())
    }
}

/// Everything the test engines were asked to do.
#[derive(Debug, Default)]
pub struct EngineLog {
    pub created: usize,
    pub options: Vec<EngineOptions>,
    pub loaded: Vec<AudioSource>,
    pub pauses: usize,
    pub resumes: usize,
    pub stops: usize,
    pub events: Option<UnboundedSender<EngineEvent>>,
}

/// Engine factory whose engines only record calls.
///
/// Loads of sources matching `reject` fail synchronously.
#[derive(Default)]
pub struct TestEngineFactory {
    log: Arc<Mutex<EngineLog>>,
    reject: Option<fn(&AudioSource) -> bool>,
}

impl TestEngineFactory {
    pub fn rejecting(reject: fn(&AudioSource) -> bool) -> Self {
        Self {
            log: Arc::default(),
            reject: Some(reject),
        }
    }

    pub fn log(&self) -> Arc<Mutex<EngineLog>> {
        Arc::clone(&self.log)
    }

    /// Emit an event as the most recently created engine would.
    pub fn emit(&self, event: EngineEvent) {
        let log = self.log.lock().unwrap();
        if let Some(events) = &log.events {
            let _ = events.send(event);
        }
    }
}

impl EngineFactory for TestEngineFactory {
    fn create(
        &self,
        options: EngineOptions,
        events: UnboundedSender<EngineEvent>,
    ) -> Result<Box<dyn AudioEngine>> {
        let mut log = self.log.lock().unwrap();
        log.created += 1;
        log.options.push(options);
        log.events = Some(events);
        Ok(Box::new(TestEngine {
            log: Arc::clone(&self.log),
            reject: self.reject,
        }))
    }
}

struct TestEngine {
    log: Arc<Mutex<EngineLog>>,
    reject: Option<fn(&AudioSource) -> bool>,
}

impl AudioEngine for TestEngine {
    fn load(&mut self, source: &AudioSource) -> Result<()> {
        self.log.lock().unwrap().loaded.push(source.clone());
        match self.reject {
            Some(reject) if reject(source) => {
                Err(ServiceError::DeviceUnavailable("unsupported source".to_string()))
            }
            _ => Ok(()),
        }
    }

    fn pause(&mut self) -> Result<()> {
        self.log.lock().unwrap().pauses += 1;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.log.lock().unwrap().resumes += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.log.lock().unwrap().stops += 1;
    }
}
