//! # Playback Controller
//!
//! Plays a recommendation list as continuous audio.
//!
//! ## Engine
//!
//! Audio goes through an [`AudioEngine`] built by an [`EngineFactory`]. The
//! controller holds at most one engine. It is created on the first `play` and
//! reused for every later song until [`PlaybackController::destroy`]. Engines
//! report back through an event channel that lives as long as the engine:
//!
//! - [`EngineEvent::Ended`] advances to the next song in the queue
//! - [`EngineEvent::Error`] triggers the transport fallback
//!
//! ## Transport Fallback
//!
//! Songs start on the primary transport, streaming from the asset URL. When
//! the engine reports an error, the asset is downloaded to a temporary file
//! and played locally, once. If that fails too, or an error arrives while
//! already on the fallback, playback stops and a [`Notice`] is queued for the
//! user. A playback failure is never fatal.
//!
//! ## Telemetry
//!
//! Every `play` reports a play interaction on a detached task. Its outcome is
//! ignored. Ratings go through [`PlaybackController::rate`], which does wait
//! for the service.

use crate::api::{AssetFetcher, Interaction, InteractionAction, InteractionRecorder};
use crate::emotion::{EmotionLabel, PlayMode};
use crate::error::{Result, ServiceError};
use crate::queue::PlayQueue;
use crate::song::{RecommendationList, Song};
use log::{debug, info, warn};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempPath;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Streaming from the asset URL
    Primary,
    /// Playing a downloaded copy
    Fallback,
}

/// What the engine is asked to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    Stream(String),
    Local(PathBuf),
}

impl fmt::Display for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSource::Stream(url) => write!(f, "{url}"),
            AudioSource::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The current source played to its end
    Ended,
    /// The current source could not be played
    Error(String),
}

/// Options every engine is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Play even when the device is muted
    pub obey_mute_switch: bool,
    /// Start playing as soon as a source is loaded
    pub autoplay: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            obey_mute_switch: false,
            autoplay: true,
        }
    }
}

/// A single audio output.
pub trait AudioEngine: Send {
    /// Replace whatever is playing with `source` and start it.
    fn load(&mut self, source: &AudioSource) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn resume(&mut self) -> Result<()>;
    /// Stop without emitting an event. Safe to call repeatedly.
    fn stop(&mut self);
}

pub trait EngineFactory: Send + Sync {
    fn create(
        &self,
        options: EngineOptions,
        events: UnboundedSender<EngineEvent>,
    ) -> Result<Box<dyn AudioEngine>>;
}

/// Non-fatal message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A song could not be played on either transport
    PlaybackFailed { title: String, reason: String },
    /// The recommendation service was unavailable
    PlaceholderMusic { emotion: EmotionLabel },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::PlaybackFailed { title, reason } => {
                write!(f, "Could not play \"{title}\": {reason}")
            }
            Notice::PlaceholderMusic { emotion } => write!(
                f,
                "Recommendations are unavailable, playing placeholder music for {}",
                emotion.display_name()
            ),
        }
    }
}

pub struct PlaybackController {
    factory: Arc<dyn EngineFactory>,
    assets: Arc<dyn AssetFetcher>,
    recorder: Arc<dyn InteractionRecorder>,
    user_id: String,

    engine: Option<Box<dyn AudioEngine>>,
    events: Option<UnboundedReceiver<EngineEvent>>,
    /// Downloaded copy of the current song while on the fallback transport
    local_asset: Option<TempPath>,

    queue: PlayQueue,
    current: Option<Song>,
    current_index: Option<usize>,
    state: PlaybackState,
    transport: Transport,
    mode: PlayMode,
    emotion: Option<EmotionLabel>,
    notices: Vec<Notice>,
}

impl PlaybackController {
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        assets: Arc<dyn AssetFetcher>,
        recorder: Arc<dyn InteractionRecorder>,
        user_id: String,
        mode: PlayMode,
    ) -> Self {
        Self {
            factory,
            assets,
            recorder,
            user_id,
            engine: None,
            events: None,
            local_asset: None,
            queue: PlayQueue::default(),
            current: None,
            current_index: None,
            state: PlaybackState::Stopped,
            transport: Transport::Primary,
            mode,
            emotion: None,
            notices: Vec::new(),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn current_song(&self) -> Option<&Song> {
        self.current.as_ref()
    }

    pub fn queue(&self) -> &PlayQueue {
        &self.queue
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Replace the queue. The current song keeps playing.
    pub fn set_queue(&mut self, songs: RecommendationList) {
        self.queue = PlayQueue::new(songs);
        self.current_index = self
            .current
            .as_ref()
            .and_then(|song| self.queue.position_of(&song.id));
        debug!("Queue replaced with {} songs", self.queue.len());
    }

    /// Emotion attached to interaction records.
    pub fn set_emotion(&mut self, emotion: EmotionLabel) {
        self.emotion = Some(emotion);
    }

    /// Flip between auto and manual mode. Playback is left alone.
    pub fn switch_mode(&mut self) -> PlayMode {
        self.mode = self.mode.toggled();
        info!("Play mode is now {}", self.mode);
        self.mode
    }

    /// Messages produced since the last call.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Start `song` on the primary transport.
    pub async fn play(&mut self, song: Song) {
        self.discard_stale_events();

        info!("Playing \"{}\" by {}", song.title, song.artist);
        self.current_index = self.queue.position_of(&song.id);
        self.transport = Transport::Primary;
        self.record_play(&song);
        self.current = Some(song.clone());

        let source = AudioSource::Stream(self.assets.stream_url(&song.id));
        match self.load(&source) {
            Ok(()) => {
                self.state = PlaybackState::Playing;
                self.local_asset = None;
            }
            Err(e) => self.fall_back(&e.to_string()).await,
        }
    }

    /// Play the song after the current one, wrapping around the queue.
    ///
    /// Returns the index played, or `None` when the queue is empty.
    pub async fn play_next(&mut self) -> Option<usize> {
        let index = self.queue.next_index(self.current_index)?;
        let song = self.queue.get(index)?.clone();
        self.play(song).await;
        self.current_index = Some(index);
        Some(index)
    }

    /// Pause or resume. When stopped or without an engine, replays the last
    /// known song, if any.
    pub async fn toggle(&mut self) -> Result<PlaybackState> {
        if let Some(engine) = self.engine.as_mut() {
            match self.state {
                PlaybackState::Playing => {
                    engine.pause()?;
                    self.state = PlaybackState::Paused;
                    return Ok(self.state);
                }
                PlaybackState::Paused => {
                    engine.resume()?;
                    self.state = PlaybackState::Playing;
                    return Ok(self.state);
                }
                PlaybackState::Stopped => {}
            }
        }

        if let Some(song) = self.current.clone() {
            self.play(song).await;
        }
        Ok(self.state)
    }

    /// Stop playback, keeping the engine for the next song.
    pub fn stop(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.stop();
        }
        self.state = PlaybackState::Stopped;
    }

    /// Stop and release the engine, its event channel and any downloaded asset.
    pub fn destroy(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.stop();
            debug!("Audio engine released");
        }
        self.events = None;
        self.local_asset = None;
        self.state = PlaybackState::Stopped;
    }

    /// Submit a 1 to 5 rating for the current song.
    pub async fn rate(&self, rating: u8) -> Result<()> {
        if !(1..=5).contains(&rating) {
            return Err(ServiceError::Structural(format!(
                "rating must be between 1 and 5, got {rating}"
            )));
        }
        let song = self
            .current
            .as_ref()
            .ok_or_else(|| ServiceError::Empty("no song to rate".to_string()))?;

        let interaction = Interaction {
            user_id: self.user_id.clone(),
            song_id: song.id.clone(),
            emotion: self.emotion.clone(),
            action: InteractionAction::Rating,
            rating: Some(rating),
        };
        self.recorder.record(&interaction).await
    }

    /// Wait for the next engine event. `None` once there is no live engine.
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        match self.events.as_mut() {
            Some(events) => events.recv().await,
            None => None,
        }
    }

    pub async fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Ended => {
                debug!("Song ended");
                self.state = PlaybackState::Stopped;
                self.local_asset = None;
                self.play_next().await;
            }
            EngineEvent::Error(reason) => self.fall_back(&reason).await,
        }
    }

    fn load(&mut self, source: &AudioSource) -> Result<()> {
        if self.engine.is_none() {
            let (tx, rx) = mpsc::unbounded_channel();
            let engine = self.factory.create(EngineOptions::default(), tx)?;
            debug!("Audio engine created");
            self.engine = Some(engine);
            self.events = Some(rx);
        }
        match self.engine.as_mut() {
            Some(engine) => engine.load(source),
            None => Err(ServiceError::DeviceUnavailable("no audio engine".to_string())),
        }
    }

    /// Retry the current song from a downloaded copy, at most once.
    async fn fall_back(&mut self, reason: &str) {
        let Some(song) = self.current.clone() else {
            return;
        };
        if self.transport == Transport::Fallback {
            self.give_up(&song, reason);
            return;
        }

        warn!("Streaming \"{}\" failed ({reason}), downloading instead", song.title);
        self.transport = Transport::Fallback;

        let path = match self.assets.download(&song.id).await {
            Ok(path) => path,
            Err(e) => {
                self.give_up(&song, &e.to_string());
                return;
            }
        };

        let source = AudioSource::Local(path.to_path_buf());
        match self.load(&source) {
            Ok(()) => {
                self.state = PlaybackState::Playing;
                self.local_asset = Some(path);
            }
            Err(e) => self.give_up(&song, &e.to_string()),
        }
    }

    fn give_up(&mut self, song: &Song, reason: &str) {
        warn!("Giving up on \"{}\": {reason}", song.title);
        self.stop();
        self.local_asset = None;
        self.notices.push(Notice::PlaybackFailed {
            title: song.title.clone(),
            reason: reason.to_string(),
        });
    }

    /// Drop events the engine sent for the previous source.
    fn discard_stale_events(&mut self) {
        if let Some(events) = self.events.as_mut() {
            while events.try_recv().is_ok() {}
        }
    }

    fn record_play(&self, song: &Song) {
        let interaction = Interaction {
            user_id: self.user_id.clone(),
            song_id: song.id.clone(),
            emotion: self.emotion.clone(),
            action: InteractionAction::Play,
            rating: None,
        };
        let recorder = Arc::clone(&self.recorder);
        tokio::spawn(async move {
            if let Err(e) = recorder.record(&interaction).await {
                debug!("Play interaction for {} not recorded: {e}", interaction.song_id);
            }
        });
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.destroy();
    }
}
