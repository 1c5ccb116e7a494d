//! # Command-Line Interface Module
//!
//! This module defines the command-line interface for Moodtune using Clap derive macros.
//!
//! ## Commands
//!
//! - `start`: Run a detection session and play music for the detected mood
//! - `recommend`: Print recommendations for an emotion
//! - `play`: Play recommendations for an emotion without a session
//! - `rate`: Rate a song
//! - `history`: Show past sessions
//! - `emotions`: List the emotions Moodtune knows
//! - `whoami`: Print the local user id
//! - `health`: Check the mood service
//! - `completion`: Generate shell completions
//!
//! ## Examples
//!
//! ```bash
//! moodtune start
//! moodtune start --mode manual --frame face.jpg
//! moodtune recommend calm
//! moodtune rate 42 happy 5
//! ```

use crate::emotion::{EmotionLabel, PlayMode};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "moodtune")]
#[command(about = "Moodtune: sample your mood with the camera, get music to match")]
#[command(version)]
pub struct Args {
    /// Base URL of the mood service
    ///
    /// Overrides `server_url` from the settings file.
    #[arg(long, global = true, env = "MOODTUNE_SERVER_URL")]
    pub server: Option<String>,

    /// Settings file to use instead of the one in the data directory
    #[arg(long, global = true, env = "MOODTUNE_CONFIG", value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Enumeration of all available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a detection session and play music for the result
    ///
    /// Counts down, samples your emotion once per tick, prints the
    /// statistics and then plays the recommended songs until Ctrl-C.
    Start {
        /// Play mode: "auto" starts playing right away, "manual" only queues
        #[arg(long, value_enum)]
        mode: Option<PlayMode>,

        /// Use this image for every sample instead of the camera
        #[arg(long, value_hint = clap::ValueHint::FilePath)]
        frame: Option<PathBuf>,

        /// Print the results without playing anything
        #[arg(long)]
        no_play: bool,
    },

    /// Print recommendations for an emotion
    Recommend {
        /// Emotion label, e.g. happy, calm, anxiety
        emotion: EmotionLabel,

        #[arg(long, value_enum)]
        mode: Option<PlayMode>,
    },

    /// Play recommendations for an emotion until Ctrl-C
    Play {
        /// Emotion label, e.g. happy, calm, anxiety
        emotion: EmotionLabel,

        #[arg(long, value_enum)]
        mode: Option<PlayMode>,
    },

    /// Rate a song from 1 to 5
    Rate {
        /// Song id as listed by `recommend`
        song_id: String,

        /// Emotion the song was recommended for
        emotion: EmotionLabel,

        /// Rating from 1 (worst) to 5 (best)
        #[arg(value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: u8,
    },

    /// Show past sessions, oldest first
    History {
        /// Number of sessions to show
        #[arg(long, default_value = "10", value_parser = clap::value_parser!(u16).range(1..=30))]
        limit: u16,
    },

    /// List the emotions Moodtune knows
    Emotions,

    /// Print the local user id
    Whoami,

    /// Check that the mood service is reachable
    Health,

    /// Generate shell completions
    ///
    /// Usage: moodtune completion bash > ~/.local/share/bash-completion/completions/moodtune
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}
