//! Mood-driven music player: samples the user's emotion with the camera and
//! plays songs that match.
//!
//! Core modules:
//! - [`session`] - Countdown, timed sampling and aggregation of one session
//! - [`capture`] - Camera frame, compression and classification chain
//! - [`stats`] - Per-emotion statistics and the top-N view
//! - [`playback`] - Playback controller with transport fallback
//! - [`experience`] - Session, recommendations and playback wired together
//!
//! ### Supporting Modules
//!
//! - [`api`] - Mood service client and the traits the core depends on
//! - [`recommend`] - Recommendation fetching with placeholder fallback
//! - [`player`] - External-process audio engine
//! - [`queue`] - Play queue and next-song selection
//! - [`controls`] - Commands typed while listening
//! - [`db`] - User identity and session history
//! - [`config`] - Data directory and settings file
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//! - [`emotion`], [`song`], [`error`], [`tool`] - Shared types and helpers
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use moodtune::stats::{compute_stats, select_top};
//! use moodtune::emotion::{DetectionSample, EmotionLabel};
//!
//! let samples = vec![
//!     DetectionSample::new(EmotionLabel::Happy, 0.9),
//!     DetectionSample::new(EmotionLabel::Happy, 0.7),
//!     DetectionSample::new(EmotionLabel::Calm, 0.8),
//! ];
//!
//! let stats = compute_stats(&samples);
//! let top = select_top(&stats, 5);
//! assert_eq!(top.main_emotion(), EmotionLabel::Happy);
//! for stat in &top {
//!     println!("{stat}");
//! }
//! ```
//!
//! ## Error Handling
//!
//! Calls to the mood service return [`error::ServiceError`], which separates
//! transport failures from structural ones. Everything above the service
//! layer returns `anyhow::Result`.

pub mod api;
pub mod capture;
pub mod cli;
pub mod completion;
pub mod config;
pub mod controls;
pub mod db;
pub mod emotion;
pub mod error;
pub mod experience;
pub mod playback;
pub mod player;
pub mod queue;
pub mod recommend;
pub mod session;
pub mod song;
pub mod stats;
pub mod tool;

#[cfg(test)]
pub(crate) mod testing;
