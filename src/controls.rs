//! # Playback Controls
//!
//! Line commands typed while music plays, and the feedback shown for them.
//!
//! | input              | effect                            |
//! |--------------------|-----------------------------------|
//! | `3`                | play song number 3 of the list    |
//! | `p`, `pause`       | pause or resume                   |
//! | `n`, `next`, `skip`| next song                         |
//! | `m`, `mode`        | switch between auto and manual    |
//! | `r 4`, `rate 4`    | rate the current song from 1 to 5 |
//! | `q`, `quit`, `stop`| stop listening                    |
//! | `h`, `help`, `?`   | show this list                    |

use crate::emotion::PlayMode;
use crate::playback::{Notice, PlaybackState};
use std::fmt;
use std::str::FromStr;

pub const HELP: &str =
    "<number> play song, p pause/resume, n next, m switch mode, r <1-5> rate, q quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Zero-based position in the queue
    Select(usize),
    Toggle,
    Next,
    SwitchMode,
    Rate(u8),
    Quit,
    Help,
}

impl FromStr for Control {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim().to_ascii_lowercase();
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default();
        let argument = words.next();

        let control = match (command, argument) {
            ("p" | "pause" | "play", None) => Control::Toggle,
            ("n" | "next" | "skip", None) => Control::Next,
            ("m" | "mode", None) => Control::SwitchMode,
            ("q" | "quit" | "stop" | "exit", None) => Control::Quit,
            ("h" | "help" | "?", None) => Control::Help,
            ("r" | "rate", Some(value)) => match value.parse::<u8>() {
                Ok(rating) if (1..=5).contains(&rating) => Control::Rate(rating),
                _ => return Err(format!("rating must be 1 to 5, got {value}")),
            },
            ("r" | "rate", None) => return Err("rate needs a value from 1 to 5".to_string()),
            (number, None) => match number.parse::<usize>() {
                Ok(n) if n >= 1 => Control::Select(n - 1),
                _ => return Err(format!("unknown command `{}`", s.trim())),
            },
            _ => return Err(format!("unknown command `{}`", s.trim())),
        };
        Ok(control)
    }
}

/// What the user is told while listening.
#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    Notice(Notice),
    NowPlaying { title: String, artist: String },
    State(PlaybackState),
    Mode(PlayMode),
    Rated { title: String, rating: u8 },
    Rejected(String),
    Help,
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feedback::Notice(notice) => write!(f, "{notice}"),
            Feedback::NowPlaying { title, artist } => write!(f, "Now playing: {artist} - {title}"),
            Feedback::State(PlaybackState::Playing) => f.write_str("Playing"),
            Feedback::State(PlaybackState::Paused) => f.write_str("Paused"),
            Feedback::State(PlaybackState::Stopped) => f.write_str("Stopped"),
            Feedback::Mode(mode) => write!(f, "Play mode: {mode}"),
            Feedback::Rated { title, rating } => write!(f, "Rated \"{title}\" {rating}/5"),
            Feedback::Rejected(reason) => write!(f, "{reason}"),
            Feedback::Help => f.write_str(HELP),
        }
    }
}
