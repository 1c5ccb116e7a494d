//! External capture and encoding tools.
//!
//! Frames are grabbed and re-encoded by external programs (`ffmpeg` by
//! default), the same way the player shells out to an audio program. A tool
//! is described by a command template whose arguments may contain the
//! placeholders `{input}` and `{output}`; each run gets a private scratch
//! directory, the input bytes are written to `{input}` and the result is read
//! back from `{output}`.

use crate::error::{Result, ServiceError};
use log::debug;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

pub const INPUT_PLACEHOLDER: &str = "{input}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Substitute placeholders in a command template.
pub fn expand_template(template: &[String], input: &Path, output: &Path) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            arg.replace(INPUT_PLACEHOLDER, &input.to_string_lossy())
                .replace(OUTPUT_PLACEHOLDER, &output.to_string_lossy())
        })
        .collect()
}

/// Run a tool and return the bytes it wrote to `{output}`.
///
/// Any failure (missing program, non-zero exit, empty output) is reported as
/// [`ServiceError::DeviceUnavailable`].
pub async fn run_tool(template: &[String], input: Option<&[u8]>, extension: &str) -> Result<Vec<u8>> {
    let (program, _) = template
        .split_first()
        .ok_or_else(|| ServiceError::DeviceUnavailable("empty tool command".to_string()))?;

    let scratch = tempfile::Builder::new()
        .prefix("moodtune-tool-")
        .tempdir()
        .map_err(|e| ServiceError::DeviceUnavailable(format!("scratch directory: {e}")))?;
    let input_path = scratch.path().join(format!("input.{extension}"));
    let output_path = scratch.path().join(format!("output.{extension}"));

    if let Some(bytes) = input {
        tokio::fs::write(&input_path, bytes)
            .await
            .map_err(|e| ServiceError::DeviceUnavailable(format!("writing tool input: {e}")))?;
    }

    let args = expand_template(&template[1..], &input_path, &output_path);
    debug!("Running {program} {}", args.join(" "));

    let output = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ServiceError::DeviceUnavailable(format!("cannot run {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ServiceError::DeviceUnavailable(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let bytes = tokio::fs::read(&output_path)
        .await
        .map_err(|e| ServiceError::DeviceUnavailable(format!("{program} produced no output: {e}")))?;
    if bytes.is_empty() {
        return Err(ServiceError::DeviceUnavailable(format!("{program} produced an empty file")));
    }

    Ok(bytes)
}
