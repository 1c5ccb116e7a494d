//! # Detection Session Controller
//!
//! A timed state machine that samples the user's emotion once per tick and
//! aggregates the samples into a summary.
//!
//! ## Phases
//!
//! ```text
//! Idle -> CountingDown -> Detecting -> Aggregating -> Completed
//!   ^          |              |                          |
//!   +----------+---- cancel --+------- reset ------------+
//! ```
//!
//! - **CountingDown**: the counter starts at `countdown` and drops by one per
//!   tick. At zero the countdown timer is dropped.
//! - **Detecting**: after the warm-up delay, every tick launches exactly one
//!   capture through the [`CapturePipeline`] and moves on without waiting for
//!   it. Once `tick_budget` ticks have fired the tick timer is dropped and the
//!   captures still in flight get one settle window to report.
//! - **Aggregating**: whatever has not reported is dropped, and the samples are
//!   turned into full stats and a top-N view.
//!
//! ## Concurrency
//!
//! The controller runs on the caller's task. In-flight captures live in a
//! `FuturesUnordered` polled by the same loop that drives the timers, so the
//! sample list has a single writer and needs no lock. Cancelling drops that
//! loop, and with it every timer and every in-flight capture.
//!
//! ## Observing
//!
//! Two views of the same progress:
//! - [`SessionController::events`]: every [`SessionEvent`] in order, on a
//!   `broadcast` channel. Use it to render each step.
//! - [`SessionController::subscribe`]: the latest [`SessionSnapshot`] on a
//!   `watch` channel. Intermediate states may be skipped.

use crate::capture::{CaptureOutcome, CapturePipeline};
use crate::emotion::{DetectionSample, EmotionLabel, PlayMode};
use crate::song::RecommendationList;
use crate::stats::{self, EmotionStats, DEFAULT_TOP_N};
use anyhow::{bail, Result};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use log::{debug, info};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    CountingDown,
    Detecting,
    Aggregating,
    Completed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::CountingDown => "counting down",
            SessionPhase::Detecting => "detecting",
            SessionPhase::Aggregating => "aggregating",
            SessionPhase::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Timing and sizing of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Countdown start value, one tick per step
    pub countdown: u32,
    /// Number of detection ticks
    pub tick_budget: u32,
    pub tick: Duration,
    /// Pause between the countdown and the first detection tick
    pub warmup: Duration,
    /// How long captures may still report after the last tick
    pub settle: Duration,
    pub top_n: usize,
    pub mode: PlayMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            countdown: 3,
            tick_budget: 5,
            tick: Duration::from_secs(1),
            warmup: Duration::from_secs(1),
            settle: Duration::from_secs(1),
            top_n: DEFAULT_TOP_N,
            mode: PlayMode::Auto,
        }
    }
}

/// Room for one whole default session, so a subscriber that starts before
/// the session and reads after it still sees every event.
const EVENT_CAPACITY: usize = 64;

/// One step of a session, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Phase(SessionPhase),
    /// Visible countdown value, down to 0
    Countdown(u32),
    Tick {
        elapsed: u32,
        budget: u32,
        progress: f64,
    },
    Sample {
        emotion: EmotionLabel,
        confidence: f64,
        /// False for synthetic samples
        network: bool,
    },
}

/// Point-in-time view of a session for display.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    /// Visible countdown value
    pub countdown: u32,
    pub elapsed_ticks: u32,
    pub tick_budget: u32,
    /// `elapsed_ticks / tick_budget * 100`
    pub progress: f64,
    pub current_emotion: Option<EmotionLabel>,
    pub confidence: Option<f64>,
    /// True until a classifier has answered during detection
    pub reco_loading: bool,
    pub samples: usize,
}

/// Cancels the running session from anywhere.
///
/// Cloneable and usable from other tasks. Cancelling an idle controller has
/// no effect on the next session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    token: Arc<Mutex<CancellationToken>>,
}

impl SessionHandle {
    fn new() -> Self {
        Self {
            token: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.current().cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.current().is_cancelled()
    }

    /// Resolves once the current run is cancelled.
    pub async fn cancelled(&self) {
        let token = self.current();
        token.cancelled().await;
    }

    fn current(&self) -> CancellationToken {
        match self.token.lock() {
            Ok(token) => token.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Swap in a fresh token for the next run.
    fn rearm(&self) -> CancellationToken {
        let fresh = CancellationToken::new();
        match self.token.lock() {
            Ok(mut token) => *token = fresh.clone(),
            Err(poisoned) => *poisoned.into_inner() = fresh.clone(),
        }
        fresh
    }
}

/// Result of one completed session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub samples: Vec<DetectionSample>,
    /// Full-population stats, first-appearance order
    pub stats: EmotionStats,
    /// Renormalized top-N view, descending share
    pub top: EmotionStats,
    pub main_emotion: EmotionLabel,
    /// Samples substituted because no classifier answered
    pub synthetic_count: usize,
    /// Captures dropped because they reported after detection closed
    pub discarded: usize,
    /// Songs sent along with the last classification that had any,
    /// tagged with that classification's emotion
    pub embedded_recommendations: Option<(EmotionLabel, RecommendationList)>,
}

impl SessionSummary {
    /// Embedded recommendations, if they were made for `emotion` and are not empty.
    pub fn embedded_for(&self, emotion: &EmotionLabel) -> Option<&RecommendationList> {
        match &self.embedded_recommendations {
            Some((tag, songs)) if tag == emotion && !songs.is_empty() => Some(songs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed(SessionSummary),
    Cancelled,
}

#[derive(Default)]
struct Collected {
    samples: Vec<DetectionSample>,
    synthetic: usize,
    embedded: Option<(EmotionLabel, RecommendationList)>,
}

pub struct SessionController {
    pipeline: Arc<CapturePipeline>,
    config: SessionConfig,
    phase: SessionPhase,
    snapshot: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
    handle: SessionHandle,
}

impl SessionController {
    pub fn new(pipeline: Arc<CapturePipeline>, config: SessionConfig) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot {
            tick_budget: config.tick_budget,
            ..SessionSnapshot::default()
        });
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            pipeline,
            config,
            phase: SessionPhase::Idle,
            snapshot,
            events,
            handle: SessionHandle::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Mode sent with classification requests of the next session.
    pub fn set_mode(&mut self, mode: PlayMode) {
        self.config.mode = mode;
    }

    /// Latest [`SessionSnapshot`].
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    /// Every [`SessionEvent`] from now on.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn cancel_handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Cancel the running session. Idempotent.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Return to `Idle` after a completed session.
    pub fn reset(&mut self) {
        if self.phase != SessionPhase::Idle {
            debug!("Session reset from {}", self.phase);
            self.emit(SessionEvent::Phase(SessionPhase::Idle));
        }
        self.phase = SessionPhase::Idle;
        self.publish_idle();
    }

    /// Run one full session: countdown, detection, aggregation.
    ///
    /// Fails only when called outside `Idle`. Capture failures never end the
    /// session early; cancellation ends it with [`SessionOutcome::Cancelled`].
    pub async fn start_experience(&mut self) -> Result<SessionOutcome> {
        if self.phase != SessionPhase::Idle {
            bail!("Cannot start a session while {}", self.phase);
        }

        // A cancel issued while idle belongs to no session
        let token = if self.handle.is_cancelled() {
            self.handle.rearm()
        } else {
            self.handle.current()
        };

        info!(
            "Starting session: {} ticks of {:?}",
            self.config.tick_budget, self.config.tick
        );

        let summary = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            summary = self.run() => Some(summary),
        };

        match summary {
            Some(summary) => {
                self.enter(SessionPhase::Completed);
                info!(
                    "Session completed: {} samples, main emotion {}",
                    summary.samples.len(),
                    summary.main_emotion
                );
                Ok(SessionOutcome::Completed(summary))
            }
            None => {
                info!("Session cancelled during {}", self.phase);
                self.phase = SessionPhase::Idle;
                self.handle.rearm();
                self.publish_idle();
                self.emit(SessionEvent::Phase(SessionPhase::Idle));
                Ok(SessionOutcome::Cancelled)
            }
        }
    }

    async fn run(&mut self) -> SessionSummary {
        let tick = self.config.tick;
        let budget = self.config.tick_budget;

        self.enter(SessionPhase::CountingDown);
        let mut remaining = self.config.countdown;
        self.show_countdown(remaining);
        if remaining > 0 {
            let mut countdown = interval_at(Instant::now() + tick, tick);
            while remaining > 0 {
                countdown.tick().await;
                remaining -= 1;
                self.show_countdown(remaining);
            }
        }

        self.enter(SessionPhase::Detecting);
        self.publish(|s| {
            s.elapsed_ticks = 0;
            s.progress = 0.0;
            s.samples = 0;
            s.current_emotion = None;
            s.confidence = None;
            s.reco_loading = true;
        });
        if !self.config.warmup.is_zero() {
            sleep(self.config.warmup).await;
        }

        let mut collected = Collected::default();
        let mut in_flight: FuturesUnordered<BoxFuture<'static, CaptureOutcome>> =
            FuturesUnordered::new();
        let mut ticks = interval_at(Instant::now() + tick, tick);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut elapsed = 0;

        while elapsed < budget {
            tokio::select! {
                _ = ticks.tick() => {
                    elapsed += 1;
                    let progress = f64::from(elapsed) / f64::from(budget) * 100.0;
                    self.publish(|s| {
                        s.elapsed_ticks = elapsed;
                        s.progress = progress;
                    });
                    self.emit(SessionEvent::Tick { elapsed, budget, progress });
                    debug!("Tick {elapsed}/{budget}, {} captures in flight", in_flight.len());

                    let pipeline = Arc::clone(&self.pipeline);
                    let mode = self.config.mode;
                    in_flight.push(async move { pipeline.capture_and_classify(mode).await }.boxed());
                }
                Some(outcome) = in_flight.next(), if !in_flight.is_empty() => {
                    self.accept(outcome, &mut collected);
                }
            }
        }
        drop(ticks);

        if !in_flight.is_empty() {
            debug!("Waiting up to {:?} for {} captures", self.config.settle, in_flight.len());
            let settle = sleep(self.config.settle);
            tokio::pin!(settle);
            loop {
                tokio::select! {
                    _ = &mut settle => break,
                    next = in_flight.next() => match next {
                        Some(outcome) => self.accept(outcome, &mut collected),
                        None => break,
                    },
                }
            }
        }

        self.enter(SessionPhase::Aggregating);
        let discarded = in_flight.len();
        drop(in_flight);
        if discarded > 0 {
            info!("Discarded {discarded} late captures");
        }

        let stats = stats::compute_stats(&collected.samples);
        let top = stats::select_top(&stats, self.config.top_n);
        let main_emotion = top.main_emotion();

        SessionSummary {
            samples: collected.samples,
            stats,
            top,
            main_emotion,
            synthetic_count: collected.synthetic,
            discarded,
            embedded_recommendations: collected.embedded,
        }
    }

    fn accept(&self, outcome: CaptureOutcome, collected: &mut Collected) {
        let network = outcome.is_network();
        let sample = outcome.sample;
        debug!(
            "Sample {} ({:.2}) from {:?}",
            sample.emotion, sample.confidence, outcome.origin
        );

        if network {
            if let Some(songs) = outcome.recommendations {
                collected.embedded = Some((sample.emotion.clone(), songs));
            }
        } else {
            collected.synthetic += 1;
        }

        self.emit(SessionEvent::Sample {
            emotion: sample.emotion.clone(),
            confidence: sample.confidence,
            network,
        });
        let count = collected.samples.len() + 1;
        self.publish(|s| {
            s.current_emotion = Some(sample.emotion.clone());
            s.confidence = Some(sample.confidence);
            s.samples = count;
            if network {
                s.reco_loading = false;
            }
        });
        collected.samples.push(sample);
    }

    fn enter(&mut self, phase: SessionPhase) {
        debug!("Session {} -> {}", self.phase, phase);
        self.phase = phase;
        self.publish(|s| s.phase = phase);
        self.emit(SessionEvent::Phase(phase));
    }

    fn show_countdown(&self, remaining: u32) {
        self.publish(|s| s.countdown = remaining);
        self.emit(SessionEvent::Countdown(remaining));
    }

    fn emit(&self, event: SessionEvent) {
        // Err only means nobody is listening
        let _ = self.events.send(event);
    }

    fn publish(&self, update: impl FnOnce(&mut SessionSnapshot)) {
        self.snapshot.send_modify(update);
    }

    fn publish_idle(&self) {
        let budget = self.config.tick_budget;
        self.snapshot.send_replace(SessionSnapshot {
            tick_budget: budget,
            ..SessionSnapshot::default()
        });
    }
}
