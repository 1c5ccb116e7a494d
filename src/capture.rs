//! # Capture Fallback Pipeline
//!
//! Turns one camera frame into one [`DetectionSample`], whatever happens on the
//! way. Each stage is only tried when the previous one failed:
//!
//! 1. grab a low-quality still from the [`FrameSource`]
//! 2. compress it, keeping the raw frame if compression fails
//! 3. upload it as a multipart file to the classifier
//! 4. resend it inline as a base64 data URI in a JSON body
//! 5. substitute a synthetic sample
//!
//! A missing camera skips straight to step 5. The pipeline therefore never
//! returns an error, and a session driven by it never stalls.

use crate::api::{Classification, Classifier};
use crate::emotion::{self, DetectionSample, EmotionLabel, PlayMode};
use crate::error::{Result, ServiceError};
use crate::song::RecommendationList;
use crate::tool;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{debug, warn};
use std::path::PathBuf;
use std::sync::Arc;

/// An encoded still image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

impl Frame {
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime: "image/jpeg",
        }
    }

    /// `data:<mime>;base64,<payload>` form used by the inline classifier path.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }
}

/// A camera, or anything standing in for one.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Grab one latency-optimized still.
    async fn capture(&self) -> Result<Frame>;
}

#[async_trait]
pub trait FrameCompressor: Send + Sync {
    async fn compress(&self, frame: &Frame) -> Result<Frame>;
}

/// Camera driven by an external capture command writing to `{output}`.
#[derive(Debug, Clone)]
pub struct CommandFrameSource {
    command: Vec<String>,
}

impl CommandFrameSource {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl FrameSource for CommandFrameSource {
    async fn capture(&self) -> Result<Frame> {
        let bytes = tool::run_tool(&self.command, None, "jpg").await?;
        Ok(Frame::jpeg(bytes))
    }
}

/// Replays the same still image on every capture.
#[derive(Debug, Clone)]
pub struct StillFrameSource {
    path: PathBuf,
}

impl StillFrameSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl FrameSource for StillFrameSource {
    async fn capture(&self) -> Result<Frame> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            ServiceError::DeviceUnavailable(format!("cannot read {}: {e}", self.path.display()))
        })?;
        if bytes.is_empty() {
            return Err(ServiceError::DeviceUnavailable(format!(
                "{} is empty",
                self.path.display()
            )));
        }
        Ok(Frame::jpeg(bytes))
    }
}

/// Re-encodes frames through an external `{input}` -> `{output}` command.
#[derive(Debug, Clone)]
pub struct CommandCompressor {
    command: Vec<String>,
}

impl CommandCompressor {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl FrameCompressor for CommandCompressor {
    async fn compress(&self, frame: &Frame) -> Result<Frame> {
        let bytes = tool::run_tool(&self.command, Some(&frame.bytes), "jpg").await?;
        Ok(Frame {
            bytes,
            mime: frame.mime,
        })
    }
}

/// Leaves frames untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCompressor;

#[async_trait]
impl FrameCompressor for PassthroughCompressor {
    async fn compress(&self, frame: &Frame) -> Result<Frame> {
        Ok(frame.clone())
    }
}

/// Which stage of the chain produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOrigin {
    Upload,
    Inline,
    Synthetic,
}

/// What one pass through the pipeline yields.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub sample: DetectionSample,
    pub origin: SampleOrigin,
    /// Songs the classifier sent along with its answer
    pub recommendations: Option<RecommendationList>,
}

impl CaptureOutcome {
    fn classified(classification: Classification, origin: SampleOrigin) -> Self {
        Self {
            sample: DetectionSample::new(classification.emotion, classification.confidence),
            origin,
            recommendations: classification.recommendations,
        }
    }

    fn synthetic() -> Self {
        Self {
            sample: emotion::synthetic_sample(),
            origin: SampleOrigin::Synthetic,
            recommendations: None,
        }
    }

    /// True when a real classifier answered.
    pub fn is_network(&self) -> bool {
        self.origin != SampleOrigin::Synthetic
    }

    pub fn emotion(&self) -> &EmotionLabel {
        &self.sample.emotion
    }
}

/// The ordered capture and classification strategy chain.
pub struct CapturePipeline {
    camera: Arc<dyn FrameSource>,
    compressor: Arc<dyn FrameCompressor>,
    classifier: Arc<dyn Classifier>,
    user_id: String,
}

impl CapturePipeline {
    pub fn new(
        camera: Arc<dyn FrameSource>,
        compressor: Arc<dyn FrameCompressor>,
        classifier: Arc<dyn Classifier>,
        user_id: String,
    ) -> Self {
        Self {
            camera,
            compressor,
            classifier,
            user_id,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Run the chain once. Never fails; the worst case is a synthetic sample.
    pub async fn capture_and_classify(&self, mode: PlayMode) -> CaptureOutcome {
        let raw = match self.camera.capture().await {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Capture failed, using synthetic sample: {e}");
                return CaptureOutcome::synthetic();
            }
        };

        let compressed = self.compressor.compress(&raw).await;
        let frame = match compressed {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Compression failed, sending raw frame: {e}");
                raw
            }
        };

        match self.classifier.classify_upload(&frame, &self.user_id, mode).await {
            Ok(classification) => {
                debug!("Upload classified {}", classification.emotion);
                return CaptureOutcome::classified(classification, SampleOrigin::Upload);
            }
            Err(e) => debug!("Upload classification failed, retrying inline: {e}"),
        }

        let data_uri = frame.to_data_uri();
        match self.classifier.classify_inline(&data_uri, &self.user_id, mode).await {
            Ok(classification) => {
                debug!("Inline classified {}", classification.emotion);
                CaptureOutcome::classified(classification, SampleOrigin::Inline)
            }
            Err(e) => {
                warn!("Classification unavailable, using synthetic sample: {e}");
                CaptureOutcome::synthetic()
            }
        }
    }
}
