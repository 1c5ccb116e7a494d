//! # Moodtune - Music for the Mood You Are In
//!
//! Samples the user's emotion with the camera for a few seconds, asks the
//! mood service for matching songs and plays them.
//!
//! ## Usage
//!
//! ```bash
//! # Full experience: countdown, detection, statistics, playback
//! moodtune start
//!
//! # Same, from a still image and without playback
//! moodtune start --frame face.jpg --no-play
//!
//! # Skip the session
//! moodtune recommend calm
//! moodtune play excited
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{debug, info};
use moodtune::api::{HttpService, Interaction, InteractionAction, InteractionRecorder};
use moodtune::capture::{
    CapturePipeline, CommandCompressor, CommandFrameSource, FrameSource, StillFrameSource,
};
use moodtune::cli::{self, Command};
use moodtune::completion;
use moodtune::config::{self, Settings};
use moodtune::db::{Store, MAX_HISTORY};
use moodtune::emotion::{EmotionLabel, PlayMode};
use moodtune::experience::{Experience, ExperienceReport};
use moodtune::playback::{Notice, PlaybackController};
use moodtune::player::CommandEngineFactory;
use moodtune::recommend::{Fetched, RecommendationClient};
use moodtune::controls::HELP;
use moodtune::session::{SessionController, SessionEvent, SessionPhase};
use moodtune::stats::round1;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::broadcast::{self, error::RecvError};

/// Main entry point for the Moodtune application.
///
/// Initializes logging, loads settings and routes commands. Logging is
/// controlled via `RUST_LOG`:
/// - `RUST_LOG=debug moodtune start` - Enable debug logging
/// - `RUST_LOG=moodtune::session=debug moodtune start` - Module-specific logging
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();
    let settings = load_settings(&args)?;
    debug!("Using mood service at {}", settings.server_url);

    match args.command {
        Command::Start { mode, frame, no_play } => {
            let store = open_store()?;
            let mode = mode.unwrap_or(settings.play_mode);
            let experience =
                build_experience(&settings, store, mode, frame)?.with_autoplay(!no_play);

            run_session(experience, no_play).await?;
        }
        Command::Recommend { emotion, mode } => {
            let store = open_store()?;
            let service = Arc::new(http_service(&settings)?);
            let client = RecommendationClient::new(service, store.user_id()?)
                .with_limit(settings.recommendation_limit);

            let fetched = client.fetch(&emotion, mode.unwrap_or(settings.play_mode)).await;
            print_songs(&emotion, &fetched);
        }
        Command::Play { emotion, mode } => {
            let store = open_store()?;
            let mode = mode.unwrap_or(settings.play_mode);
            let mut experience = build_experience(&settings, store, mode, None)?;

            let (fetched, notices) = experience.play_emotion(&emotion).await;
            print_songs(&emotion, &fetched);
            print_notices(&notices);
            listen(&mut experience).await;
        }
        Command::Rate { song_id, emotion, rating } => {
            let store = open_store()?;
            let service = http_service(&settings)?;
            let interaction = Interaction {
                user_id: store.user_id()?,
                song_id: song_id.clone(),
                emotion: Some(emotion),
                action: InteractionAction::Rating,
                rating: Some(rating),
            };
            service
                .record(&interaction)
                .await
                .with_context(|| format!("Failed to rate song {song_id}"))?;
            println!("Rated song {song_id} with {rating}/5");
        }
        Command::History { limit } => {
            let store = open_store()?;
            let records = store.recent_history(usize::from(limit).min(MAX_HISTORY))?;
            if records.is_empty() {
                println!("No sessions yet. Run `moodtune start` to record one.");
            }
            for record in records {
                let top: Vec<String> = record
                    .stats
                    .iter()
                    .map(|stat| format!("{} {:.1}%", stat.emotion, round1(stat.percentage)))
                    .collect();
                println!(
                    "{}  {:<10} {}",
                    record.date,
                    record.main_emotion.display_name(),
                    top.join(", ")
                );
            }
        }
        Command::Emotions => {
            for label in EmotionLabel::ALL.iter() {
                println!("{:<10} {}", label.as_str(), label.description());
            }
        }
        Command::Whoami => {
            println!("{}", open_store()?.user_id()?);
        }
        Command::Health => {
            let service = http_service(&settings)?;
            service
                .health()
                .await
                .with_context(|| format!("Mood service at {} is not healthy", service.base_url()))?;
            println!("Mood service at {} is up", service.base_url());
        }
        Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(&shell), &mut cmd);
        }
    }

    Ok(())
}

fn load_settings(args: &cli::Args) -> Result<Settings> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => config::get_config_path()?,
    };
    let mut settings = Settings::load(&path)?;
    if let Some(server) = &args.server {
        settings.server_url = server.clone();
    }
    Ok(settings)
}

fn open_store() -> Result<Store> {
    Store::open(&config::get_db_path()?)
}

fn http_service(settings: &Settings) -> Result<HttpService> {
    HttpService::new(
        &settings.server_url,
        settings.classify_timeout(),
        settings.request_timeout(),
    )
    .with_context(|| format!("Failed to set up client for {}", settings.server_url))
}

/// Wire the real collaborators together. The store is kept for history.
fn build_experience(
    settings: &Settings,
    store: Store,
    mode: PlayMode,
    frame: Option<PathBuf>,
) -> Result<Experience> {
    let user_id = store.user_id()?;
    let service = Arc::new(http_service(settings)?);

    let camera: Arc<dyn FrameSource> = match frame {
        Some(path) => {
            info!("Sampling from still image {}", path.display());
            Arc::new(StillFrameSource::new(path))
        }
        None => Arc::new(CommandFrameSource::new(settings.camera_command.clone())),
    };
    let pipeline = CapturePipeline::new(
        camera,
        Arc::new(CommandCompressor::new(settings.compress_command.clone())),
        service.clone(),
        user_id.clone(),
    );

    let mut session_config = settings.session_config();
    session_config.mode = mode;
    let session = SessionController::new(Arc::new(pipeline), session_config);

    let recommendations = RecommendationClient::new(service.clone(), user_id.clone())
        .with_limit(settings.recommendation_limit);

    let player = PlaybackController::new(
        Arc::new(CommandEngineFactory::new(settings.player_command.clone())),
        service.clone(),
        service,
        user_id,
        mode,
    );

    Ok(Experience::new(session, recommendations, player, Some(store)))
}

async fn run_session(mut experience: Experience, no_play: bool) -> Result<()> {
    let progress = tokio::spawn(show_progress(experience.session().events()));

    let handle = experience.session().cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let report = match experience.run().await {
        Ok(report) => {
            let _ = progress.await;
            report
        }
        Err(e) => {
            progress.abort();
            return Err(e);
        }
    };

    let Some(report) = report else {
        println!("Session cancelled.");
        return Ok(());
    };

    print_report(&report);
    if !no_play {
        listen(&mut experience).await;
    }
    Ok(())
}

/// Take playback commands from stdin until the user quits or presses Ctrl-C.
async fn listen(experience: &mut Experience) {
    if experience.player().queue().is_empty() {
        return;
    }
    println!();
    if experience.player().is_playing() {
        println!("Playing. Type a command, or press Ctrl-C to stop.");
    } else {
        println!("Pick a song number to start. Ctrl-C stops.");
    }
    println!("{HELP}");

    let mut input = BufReader::new(tokio::io::stdin());
    let notices = experience
        .listen_until(
            async {
                let _ = tokio::signal::ctrl_c().await;
            },
            &mut input,
            |feedback| eprintln!("{feedback}"),
        )
        .await;
    print_notices(&notices);

    if std::io::stdin().is_terminal() {
        offer_rating(experience, &mut input).await;
    }
}

/// Ask once for a rating of the song that was playing last.
async fn offer_rating(experience: &Experience, input: &mut BufReader<Stdin>) {
    let Some(song) = experience.player().current_song() else {
        return;
    };
    println!("Rate \"{}\" by {} (1-5, Enter to skip):", song.title, song.artist);

    let mut line = String::new();
    if let Err(e) = input.read_line(&mut line).await {
        debug!("No rating read: {e}");
        return;
    }
    let answer = line.trim();
    if answer.is_empty() {
        return;
    }
    match answer.parse::<u8>() {
        Ok(rating) if (1..=5).contains(&rating) => match experience.player().rate(rating).await {
            Ok(()) => println!("Thanks, rated {rating}/5"),
            Err(e) => eprintln!("! Rating not saved: {e}"),
        },
        _ => eprintln!("! Ratings go from 1 to 5, skipped"),
    }
}

async fn show_progress(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(missed)) => {
                debug!("Progress display missed {missed} session events");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match event {
            SessionEvent::Countdown(remaining) if remaining > 0 => {
                eprintln!("Starting in {remaining}...");
            }
            SessionEvent::Tick {
                elapsed,
                budget,
                progress,
            } => eprintln!("[{progress:>3.0}%] {elapsed}/{budget}"),
            SessionEvent::Sample {
                emotion,
                confidence,
                network,
            } => {
                let origin = if network { "" } else { " (estimated)" };
                eprintln!(
                    "      {} {:.0}%{origin}",
                    emotion.display_name(),
                    confidence * 100.0
                );
            }
            SessionEvent::Phase(SessionPhase::Aggregating) => eprintln!("Analyzing..."),
            SessionEvent::Phase(SessionPhase::Completed | SessionPhase::Idle) => break,
            _ => {}
        }
    }
}

fn print_report(report: &ExperienceReport) {
    let summary = &report.summary;
    println!();
    println!(
        "You seem {}: {}",
        summary.main_emotion.display_name(),
        summary.main_emotion.description()
    );
    for stat in &summary.top {
        println!("  {stat}");
    }
    if summary.synthetic_count > 0 {
        println!(
            "  ({} of {} samples were estimated without the mood service)",
            summary.synthetic_count,
            summary.samples.len()
        );
    }

    let fetched = Fetched {
        songs: report.songs.clone(),
        used_fallback: report.used_fallback,
    };
    print_songs(&summary.main_emotion, &fetched);
    print_notices(&report.notices);
}

fn print_songs(emotion: &EmotionLabel, fetched: &Fetched) {
    println!();
    if fetched.songs.is_empty() {
        println!("No songs found for {}.", emotion.display_name());
        return;
    }
    let origin = if fetched.used_fallback { " (placeholders)" } else { "" };
    println!("Songs for {}{origin}:", emotion.display_name());
    for (i, song) in fetched.songs.iter().enumerate() {
        println!("{:>3}. [{}] {} - {}", i + 1, song.id, song.artist, song.title);
    }
}

fn print_notices(notices: &[Notice]) {
    for notice in notices {
        eprintln!("! {notice}");
    }
}
