//! # External Player Engine
//!
//! [`AudioEngine`] backed by an external command-line player, `ffplay` by
//! default. Each loaded source runs as its own child process:
//!
//! - the `{source}` placeholder in the command is replaced with the stream
//!   URL or the local file path
//! - a watcher task waits for the child and reports `Ended` on a clean exit,
//!   `Error` otherwise
//! - pause and resume send `SIGSTOP` / `SIGCONT` to the child
//! - loading another source or stopping kills the child without an event
//!
//! The player has to exit on its own at the end of the file (`-autoexit`
//! for ffplay), otherwise the queue never advances.

use crate::error::{Result, ServiceError};
use crate::playback::{AudioEngine, AudioSource, EngineEvent, EngineFactory, EngineOptions};
use log::{debug, warn};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;

pub const SOURCE_PLACEHOLDER: &str = "{source}";

/// Default player command.
pub fn default_command() -> Vec<String> {
    ["ffplay", "-nodisp", "-autoexit", "-loglevel", "error", SOURCE_PLACEHOLDER]
        .iter()
        .map(|arg| arg.to_string())
        .collect()
}

/// Builds [`CommandEngine`]s around one command template.
#[derive(Debug, Clone)]
pub struct CommandEngineFactory {
    command: Vec<String>,
}

impl CommandEngineFactory {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Default for CommandEngineFactory {
    fn default() -> Self {
        Self::new(default_command())
    }
}

impl EngineFactory for CommandEngineFactory {
    fn create(
        &self,
        options: EngineOptions,
        events: UnboundedSender<EngineEvent>,
    ) -> Result<Box<dyn AudioEngine>> {
        if self.command.is_empty() {
            return Err(ServiceError::DeviceUnavailable("empty player command".to_string()));
        }
        // A terminal player has no mute switch and always starts on launch
        debug!("Creating player engine with {options:?}");
        Ok(Box::new(CommandEngine {
            command: self.command.clone(),
            events,
            running: None,
        }))
    }
}

struct Running {
    pid: Option<u32>,
    kill: oneshot::Sender<()>,
}

pub struct CommandEngine {
    command: Vec<String>,
    events: UnboundedSender<EngineEvent>,
    running: Option<Running>,
}

impl CommandEngine {
    fn args_for(&self, source: &AudioSource) -> Vec<String> {
        let source = source.to_string();
        self.command[1..]
            .iter()
            .map(|arg| arg.replace(SOURCE_PLACEHOLDER, &source))
            .collect()
    }

    fn signal(&self, signal: Signal) -> Result<()> {
        let pid = self
            .running
            .as_ref()
            .and_then(|running| running.pid)
            .ok_or_else(|| ServiceError::Empty("player is not running".to_string()))?;
        send_signal(pid, signal)
    }
}

impl AudioEngine for CommandEngine {
    fn load(&mut self, source: &AudioSource) -> Result<()> {
        self.stop();

        let program = &self.command[0];
        let args = self.args_for(source);
        debug!("Starting {program} {}", args.join(" "));

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ServiceError::DeviceUnavailable(format!("cannot start {program}: {e}")))?;

        let pid = child.id();
        let (kill, killed) = oneshot::channel();
        let events = self.events.clone();

        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let event = match status {
                        Ok(status) if status.success() => EngineEvent::Ended,
                        Ok(status) => EngineEvent::Error(format!("player exited with {status}")),
                        Err(e) => EngineEvent::Error(format!("lost track of player: {e}")),
                    };
                    // The controller may already be gone
                    let _ = events.send(event);
                }
                _ = killed => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill player: {e}");
                    }
                }
            }
        });

        self.running = Some(Running { pid, kill });
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.signal(Signal::Stop)
    }

    fn resume(&mut self) -> Result<()> {
        self.signal(Signal::Continue)
    }

    fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            // A stopped (SIGSTOP) child still has to die
            let _ = running.kill.send(());
        }
    }
}

impl Drop for CommandEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Stop,
    Continue,
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: Signal) -> Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| ServiceError::DeviceUnavailable(format!("invalid pid {pid}")))?;
    let signal = match signal {
        Signal::Stop => libc::SIGSTOP,
        Signal::Continue => libc::SIGCONT,
    };

    // SAFETY: kill(2) only takes plain integers
    let rc = unsafe { libc::kill(pid, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(ServiceError::DeviceUnavailable(format!(
            "signalling player: {}",
            std::io::Error::last_os_error()
        )))
    }
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _signal: Signal) -> Result<()> {
    Err(ServiceError::DeviceUnavailable(
        "pausing the player is only supported on unix".to_string(),
    ))
}
