//! # Experience
//!
//! The context object behind one run of the app: it owns the session
//! controller, the recommendation client, the playback controller and the
//! optional history store, and runs them in order.
//!
//! ```text
//! session -> history record -> song list -> queue -> auto-play -> events
//! ```
//!
//! ## Song List
//!
//! A classifier may already have sent songs with its answer. Those are used
//! as they are when they were ranked for the session's main emotion and are
//! not empty. Otherwise the list is fetched for the main emotion, falling
//! back to placeholder songs when the service is down.

use crate::controls::{Control, Feedback};
use crate::db::Store;
use crate::emotion::{EmotionLabel, PlayMode};
use crate::playback::{Notice, PlaybackController};
use crate::recommend::{Fetched, RecommendationClient};
use crate::session::{SessionController, SessionOutcome, SessionSummary};
use crate::song::RecommendationList;
use anyhow::Result;
use log::{debug, info, warn};
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperienceReport {
    pub summary: SessionSummary,
    pub songs: RecommendationList,
    pub used_fallback: bool,
    /// True when the songs came with a classification instead of a fetch
    pub used_embedded: bool,
    pub notices: Vec<Notice>,
}

pub struct Experience {
    session: SessionController,
    recommendations: RecommendationClient,
    player: PlaybackController,
    history: Option<Store>,
    autoplay: bool,
}

impl Experience {
    pub fn new(
        session: SessionController,
        recommendations: RecommendationClient,
        player: PlaybackController,
        history: Option<Store>,
    ) -> Self {
        Self {
            session,
            recommendations,
            player,
            history,
            autoplay: true,
        }
    }

    /// Whether a run may start playback at all. Auto mode is still required.
    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn player(&self) -> &PlaybackController {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut PlaybackController {
        &mut self.player
    }

    /// Run a session and turn its result into a playing queue.
    ///
    /// Returns `None` when the session was cancelled.
    pub async fn run(&mut self) -> Result<Option<ExperienceReport>> {
        self.session.reset();
        let summary = match self.session.start_experience().await? {
            SessionOutcome::Completed(summary) => summary,
            SessionOutcome::Cancelled => {
                self.player.stop();
                return Ok(None);
            }
        };

        if let Some(store) = &self.history {
            if let Err(e) = store.append_history(&summary) {
                warn!("Session not saved to history: {e:#}");
            }
        }

        // The user may still cancel while songs are fetched and queued
        let handle = self.session.cancel_handle();
        let picked = tokio::select! {
            biased;
            _ = handle.cancelled() => None,
            picked = self.pick_and_queue(&summary) => Some(picked),
        };
        let Some((fetched, used_embedded, notices)) = picked else {
            info!("Session cancelled before playback");
            self.player.stop();
            self.player.take_notices();
            self.session.reset();
            return Ok(None);
        };

        Ok(Some(ExperienceReport {
            summary,
            songs: fetched.songs,
            used_fallback: fetched.used_fallback,
            used_embedded,
            notices,
        }))
    }

    async fn pick_and_queue(&mut self, summary: &SessionSummary) -> (Fetched, bool, Vec<Notice>) {
        let emotion = summary.main_emotion.clone();
        let (fetched, used_embedded) = match summary.embedded_for(&emotion) {
            Some(songs) => {
                debug!("Using {} songs sent with the classification", songs.len());
                let fetched = Fetched {
                    songs: songs.clone(),
                    used_fallback: false,
                };
                (fetched, true)
            }
            None => (self.recommendations.fetch(&emotion, self.player.mode()).await, false),
        };

        let notices = self.queue(&emotion, &fetched).await;
        (fetched, used_embedded, notices)
    }

    /// Fetch songs for `emotion` and queue them, without a session.
    pub async fn play_emotion(&mut self, emotion: &EmotionLabel) -> (Fetched, Vec<Notice>) {
        let fetched = self.recommendations.fetch(emotion, self.player.mode()).await;
        let notices = self.queue(emotion, &fetched).await;
        (fetched, notices)
    }

    /// Hand the songs to the player and start the first one in auto mode.
    async fn queue(&mut self, emotion: &EmotionLabel, fetched: &Fetched) -> Vec<Notice> {
        let mut notices = Vec::new();
        if fetched.used_fallback {
            notices.push(Notice::PlaceholderMusic {
                emotion: emotion.clone(),
            });
        }

        self.player.set_emotion(emotion.clone());
        self.player.set_queue(fetched.songs.clone());

        let first = fetched.songs.first().cloned();
        match first {
            Some(song) if self.autoplay && self.player.mode() == PlayMode::Auto => {
                self.player.play(song).await;
            }
            Some(_) => info!("{} songs queued, waiting for the user", fetched.songs.len()),
            None => info!("No songs for {emotion}"),
        }

        notices.extend(self.player.take_notices());
        notices
    }

    /// Pump playback events and the user's line commands from `input` until
    /// `shutdown` resolves or the user quits, then release the player.
    ///
    /// Every piece of feedback goes to `on_feedback` as it happens. Returns
    /// the notices raised along the way. Input ending early only stops the
    /// commands; events are pumped until shutdown.
    pub async fn listen_until<F, R>(
        &mut self,
        shutdown: F,
        input: R,
        mut on_feedback: impl FnMut(&Feedback),
    ) -> Vec<Notice>
    where
        F: Future<Output = ()>,
        R: AsyncBufRead + Unpin,
    {
        tokio::pin!(shutdown);
        let mut lines = Some(input.lines());
        let mut notices = Vec::new();

        loop {
            let playing = self.player.current_song().map(|song| song.id.clone());
            let mut feedback = Vec::new();

            tokio::select! {
                _ = &mut shutdown => break,
                Some(event) = self.player.next_event() => {
                    self.player.handle_event(event).await;
                }
                line = next_line(&mut lines) => match line {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match line.parse::<Control>() {
                        Ok(Control::Quit) => break,
                        Ok(control) => feedback.extend(self.apply(control).await),
                        Err(reason) => feedback.push(Feedback::Rejected(reason)),
                    },
                    None => {
                        debug!("Command input closed");
                        lines = None;
                    }
                },
            }

            for notice in self.player.take_notices() {
                feedback.push(Feedback::Notice(notice.clone()));
                notices.push(notice);
            }
            if let Some(song) = self.player.current_song() {
                if playing.as_deref() != Some(song.id.as_str()) && self.player.is_playing() {
                    feedback.push(Feedback::NowPlaying {
                        title: song.title.clone(),
                        artist: song.artist.clone(),
                    });
                }
            }
            feedback.iter().for_each(&mut on_feedback);
        }

        self.player.destroy();
        notices.extend(self.player.take_notices());
        notices
    }

    /// Apply one user command to the player.
    pub async fn apply(&mut self, control: Control) -> Option<Feedback> {
        match control {
            Control::Select(index) => match self.player.queue().get(index).cloned() {
                Some(song) => {
                    self.player.play(song).await;
                    None
                }
                None => Some(Feedback::Rejected(format!(
                    "no song number {}, the list has {}",
                    index + 1,
                    self.player.queue().len()
                ))),
            },
            Control::Toggle => match self.player.toggle().await {
                Ok(state) => Some(Feedback::State(state)),
                Err(e) => Some(Feedback::Rejected(e.to_string())),
            },
            Control::Next => match self.player.play_next().await {
                Some(_) => None,
                None => Some(Feedback::Rejected("nothing queued".to_string())),
            },
            Control::SwitchMode => {
                let mode = self.player.switch_mode();
                self.session.set_mode(mode);
                Some(Feedback::Mode(mode))
            }
            Control::Rate(rating) => {
                let title = self.player.current_song().map(|song| song.title.clone());
                match (self.player.rate(rating).await, title) {
                    (Ok(()), Some(title)) => Some(Feedback::Rated { title, rating }),
                    (Ok(()), None) => None,
                    (Err(e), _) => Some(Feedback::Rejected(format!("rating not saved: {e}"))),
                }
            }
            Control::Help => Some(Feedback::Help),
            Control::Quit => None,
        }
    }
}

async fn next_line<R: AsyncBufRead + Unpin>(lines: &mut Option<Lines<R>>) -> Option<String> {
    match lines {
        Some(lines) => match lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read command: {e}");
                None
            }
        },
        None => std::future::pending().await,
    }
}
