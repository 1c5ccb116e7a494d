//! # Integration Tests for Moodtune
//!
//! End-to-end tests through the public API: a whole experience with
//! in-memory service doubles, the history store on disk, and the binary's
//! command-line surface.

use anyhow::Result;
use async_trait::async_trait;
use moodtune::api::{
    AssetFetcher, Classification, Classifier, Interaction, InteractionRecorder, RecommendationQuery,
    RecommendationSource,
};
use moodtune::capture::{CapturePipeline, Frame, FrameSource, PassthroughCompressor};
use moodtune::db::Store;
use moodtune::emotion::{DetectionSample, EmotionLabel, PlayMode};
use moodtune::error::ServiceError;
use moodtune::experience::Experience;
use moodtune::playback::{
    AudioEngine, AudioSource, EngineEvent, EngineFactory, EngineOptions, Notice, PlaybackController,
    PlaybackState,
};
use moodtune::recommend::RecommendationClient;
use moodtune::session::{SessionConfig, SessionController};
use moodtune::song::{RecommendationList, Song, PLACEHOLDER_LEN};
use moodtune::stats::{compute_stats, select_top};
use std::process::Command;
use std::sync::{Arc, Mutex};
use tempfile::{NamedTempFile, TempDir, TempPath};
use tokio::sync::mpsc::UnboundedSender;

type ServiceResult<T> = std::result::Result<T, ServiceError>;

struct Camera;

#[async_trait]
impl FrameSource for Camera {
    async fn capture(&self) -> ServiceResult<Frame> {
        Ok(Frame::jpeg(vec![0xff, 0xd8, 0xff, 0xd9]))
    }
}

/// Mood service double. `None` answers behave like an unreachable host.
struct MoodService {
    emotion: Option<(EmotionLabel, f64)>,
    songs: Option<RecommendationList>,
    downloads_work: bool,
}

impl MoodService {
    fn up(emotion: EmotionLabel, songs: RecommendationList) -> Self {
        Self {
            emotion: Some((emotion, 0.9)),
            songs: Some(songs),
            downloads_work: true,
        }
    }

    fn down() -> Self {
        Self {
            emotion: None,
            songs: None,
            downloads_work: false,
        }
    }

    fn classification(&self) -> ServiceResult<Classification> {
        match &self.emotion {
            Some((emotion, confidence)) => Ok(Classification {
                emotion: emotion.clone(),
                confidence: *confidence,
                recommendations: None,
            }),
            None => Err(ServiceError::Transport("connection refused".to_string())),
        }
    }
}

#[async_trait]
impl Classifier for MoodService {
    async fn classify_upload(&self, _: &Frame, _: &str, _: PlayMode) -> ServiceResult<Classification> {
        self.classification()
    }

    async fn classify_inline(&self, _: &str, _: &str, _: PlayMode) -> ServiceResult<Classification> {
        self.classification()
    }
}

#[async_trait]
impl RecommendationSource for MoodService {
    async fn recommendations(&self, _: &RecommendationQuery) -> ServiceResult<RecommendationList> {
        self.songs
            .clone()
            .ok_or_else(|| ServiceError::Transport("connection refused".to_string()))
    }
}

#[async_trait]
impl InteractionRecorder for MoodService {
    async fn record(&self, _: &Interaction) -> ServiceResult<()> {
        Ok(())
    }
}

#[async_trait]
impl AssetFetcher for MoodService {
    fn stream_url(&self, song_id: &str) -> String {
        format!("http://mood.test/api/music/{song_id}")
    }

    async fn download(&self, _: &str) -> ServiceResult<TempPath> {
        if !self.downloads_work {
            return Err(ServiceError::Transport("connection refused".to_string()));
        }
        let file = NamedTempFile::new().map_err(|e| ServiceError::Transport(e.to_string()))?;
        Ok(file.into_temp_path())
    }
}

/// Engine factory that logs every source it is asked to play.
#[derive(Default)]
struct Speakers {
    loaded: Arc<Mutex<Vec<AudioSource>>>,
    reject_all: bool,
}

struct Speaker {
    loaded: Arc<Mutex<Vec<AudioSource>>>,
    reject_all: bool,
}

impl EngineFactory for Speakers {
    fn create(
        &self,
        _options: EngineOptions,
        _events: UnboundedSender<EngineEvent>,
    ) -> ServiceResult<Box<dyn AudioEngine>> {
        Ok(Box::new(Speaker {
            loaded: self.loaded.clone(),
            reject_all: self.reject_all,
        }))
    }
}

impl AudioEngine for Speaker {
    fn load(&mut self, source: &AudioSource) -> ServiceResult<()> {
        self.loaded.lock().unwrap().push(source.clone());
        if self.reject_all {
            return Err(ServiceError::Transport("no audio device".to_string()));
        }
        Ok(())
    }

    fn pause(&mut self) -> ServiceResult<()> {
        Ok(())
    }

    fn resume(&mut self) -> ServiceResult<()> {
        Ok(())
    }

    fn stop(&mut self) {}
}

fn catalog(emotion: EmotionLabel, n: usize) -> RecommendationList {
    (1..=n)
        .map(|i| Song {
            id: i.to_string(),
            title: format!("Song {i}"),
            artist: "Test Artist".to_string(),
            emotion: emotion.clone(),
            source_path: format!("/music/{i}.mp3"),
        })
        .collect()
}

fn experience(service: MoodService, speakers: Speakers, store: Option<Store>) -> Experience {
    let service = Arc::new(service);
    let pipeline = CapturePipeline::new(
        Arc::new(Camera),
        Arc::new(PassthroughCompressor),
        service.clone(),
        "u-test".to_string(),
    );
    let session = SessionController::new(Arc::new(pipeline), SessionConfig::default());
    let recommendations = RecommendationClient::new(service.clone(), "u-test".to_string());
    let player = PlaybackController::new(
        Arc::new(speakers),
        service.clone(),
        service,
        "u-test".to_string(),
        PlayMode::Auto,
    );
    Experience::new(session, recommendations, player, store)
}

#[tokio::test(start_paused = true)]
async fn test_full_experience_plays_recommendations() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("moodtune.db");
    let speakers = Speakers::default();
    let loaded = speakers.loaded.clone();

    let mut experience = experience(
        MoodService::up(EmotionLabel::Calm, catalog(EmotionLabel::Calm, 3)),
        speakers,
        Some(Store::open(&db_path)?),
    );

    let report = experience.run().await?.expect("session should complete");

    assert_eq!(report.summary.samples.len(), 5);
    assert_eq!(report.summary.main_emotion, EmotionLabel::Calm);
    assert_eq!(report.summary.synthetic_count, 0);
    assert_eq!(report.songs.len(), 3);
    assert!(!report.used_fallback);
    assert!(report.notices.is_empty());

    assert_eq!(experience.player().state(), PlaybackState::Playing);
    assert_eq!(experience.player().current_song().map(|s| s.id.as_str()), Some("1"));
    assert_eq!(
        loaded.lock().unwrap().as_slice(),
        &[AudioSource::Stream("http://mood.test/api/music/1".to_string())]
    );

    drop(experience);
    let history = Store::open(&db_path)?.recent_history(10)?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].main_emotion, EmotionLabel::Calm);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_service_still_plays_placeholders() -> Result<()> {
    let mut experience = experience(MoodService::down(), Speakers::default(), None);

    let report = experience.run().await?.expect("session should complete");

    assert_eq!(report.summary.samples.len(), 5);
    assert_eq!(report.summary.synthetic_count, 5);
    assert!(report.used_fallback);
    assert_eq!(report.songs.len(), PLACEHOLDER_LEN);
    assert!(report
        .songs
        .iter()
        .all(|song| song.emotion == report.summary.main_emotion));
    assert!(report.notices.contains(&Notice::PlaceholderMusic {
        emotion: report.summary.main_emotion.clone(),
    }));
    assert!(experience.player().is_playing());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_broken_audio_gives_up_after_one_retry() -> Result<()> {
    let speakers = Speakers {
        reject_all: true,
        ..Speakers::default()
    };
    let loaded = speakers.loaded.clone();
    let mut experience = experience(
        MoodService::up(EmotionLabel::Happy, catalog(EmotionLabel::Happy, 2)),
        speakers,
        None,
    );

    let report = experience.run().await?.expect("session should complete");

    assert!(report
        .notices
        .iter()
        .any(|notice| matches!(notice, Notice::PlaybackFailed { title, .. } if title == "Song 1")));
    assert_eq!(experience.player().state(), PlaybackState::Stopped);

    let loaded = loaded.lock().unwrap();
    assert_eq!(loaded.len(), 2);
    assert!(matches!(loaded[0], AudioSource::Stream(_)));
    assert!(matches!(loaded[1], AudioSource::Local(_)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_session_leaves_player_idle() -> Result<()> {
    let mut experience = experience(
        MoodService::up(EmotionLabel::Sad, catalog(EmotionLabel::Sad, 2)),
        Speakers::default(),
        None,
    );
    let handle = experience.session().cancel_handle();

    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        handle.cancel();
    });

    assert!(experience.run().await?.is_none());
    assert!(!experience.player().has_engine());
    assert_eq!(experience.player().state(), PlaybackState::Stopped);
    Ok(())
}

#[test]
fn test_statistics_cover_every_sample() {
    let labels = ["happy", "sad", "happy", "calm", "happy", "angry", "calm", "fear"];
    let samples: Vec<DetectionSample> = labels
        .iter()
        .enumerate()
        .map(|(i, label)| DetectionSample::new(EmotionLabel::from(*label), 0.5 + i as f64 * 0.05))
        .collect();

    let stats = compute_stats(&samples);
    assert_eq!(stats.total_count(), samples.len());
    assert!((stats.percentage_sum() - 100.0).abs() < 1e-9);

    let top = select_top(&stats, 3);
    let order: Vec<&EmotionLabel> = top.labels().collect();
    assert_eq!(
        order,
        vec![&EmotionLabel::Happy, &EmotionLabel::Calm, &EmotionLabel::Sad]
    );
    assert_eq!(top.main_emotion(), EmotionLabel::Happy);
}

#[test]
fn test_history_keeps_user_id_across_opens() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("moodtune.db");

    let first = Store::open(&db_path)?.user_id()?;
    let second = Store::open(&db_path)?.user_id()?;
    assert_eq!(first, second);
    assert!(first.starts_with("u-"));
    Ok(())
}

fn moodtune(args: &[&str]) -> std::process::Output {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    Command::new(env!("CARGO_BIN_EXE_moodtune"))
        .args(args)
        .env("MOODTUNE_CONFIG", temp_dir.path().join("config.json"))
        .output()
        .expect("Failed to run moodtune")
}

#[test]
fn test_cli_help() {
    let output = moodtune(&["--help"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("start"));
    assert!(stdout.contains("recommend"));
    assert!(stdout.contains("history"));
}

#[test]
fn test_cli_lists_emotions() {
    let output = moodtune(&["emotions"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), EmotionLabel::ALL.len());
    assert!(stdout.contains("anxiety"));
    assert!(stdout.contains("calm"));
}

#[test]
fn test_cli_rejects_bad_rating() {
    let output = moodtune(&["rate", "42", "happy", "9"]);
    assert!(!output.status.success());
}

#[test]
fn test_cli_generates_completions() {
    let output = moodtune(&["completion", "bash"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("moodtune"));
}
