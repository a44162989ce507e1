//! Remote video generation API
//!
//! Provides the [`VideoProvider`] seam over the CogVideoX asynchronous job
//! API and its reqwest-backed implementation.

mod http_utils;
/// Zhipu open platform client
pub mod zhipu;

pub use zhipu::ZhipuVideoClient;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while handling a video command
#[derive(Debug, Error)]
pub enum VideoError {
    /// No API key is configured
    #[error("Zhipu API key is not configured")]
    MissingApiKey,
    /// A required command argument was not given
    #[error("Missing argument. Usage: {usage}")]
    MissingArgument {
        /// Usage line shown back to the user
        usage: &'static str,
    },
    /// Error returned by the provider's API
    #[error("API error: {0}")]
    ApiError(String),
    /// Error during network communication
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    JsonError(String),
}

impl VideoError {
    /// Whether the error came from the remote call rather than local validation.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::ApiError(_) | Self::NetworkError(_) | Self::JsonError(_)
        )
    }
}

/// Image to animate, as raw bytes plus the MIME type reported by the chat.
#[derive(Clone)]
pub struct ImageInput {
    /// Encoded image bytes (JPEG or PNG)
    pub bytes: Vec<u8>,
    /// MIME type, `image/jpeg` when the transport does not say
    pub mime_type: String,
}

impl ImageInput {
    /// Wrap image bytes with the given MIME type.
    #[must_use]
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Encode as a `data:` URL accepted by the `image_url` field.
    #[must_use]
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.bytes))
    }
}

impl fmt::Debug for ImageInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageInput")
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// A generation job to submit
#[derive(Debug, Clone)]
pub struct VideoRequest {
    /// Model identifier, e.g. `CogVideoX-Flash`
    pub model: String,
    /// Text prompt; optional when an image is given
    pub prompt: Option<String>,
    /// Source image for image-to-video
    pub image: Option<ImageInput>,
    /// Ask for an audio track
    pub with_audio: bool,
}

/// Status of an asynchronous generation task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    /// Still rendering
    Processing,
    /// Finished, results available
    Success,
    /// Generation failed
    Fail,
    /// Status string this client does not know
    Unknown(String),
}

impl From<String> for TaskStatus {
    fn from(value: String) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "PROCESSING" => Self::Processing,
            "SUCCESS" => Self::Success,
            "FAIL" | "FAILED" => Self::Fail,
            _ => Self::Unknown(value),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(value: TaskStatus) -> Self {
        match value {
            TaskStatus::Processing => "PROCESSING".to_string(),
            TaskStatus::Success => "SUCCESS".to_string(),
            TaskStatus::Fail => "FAIL".to_string(),
            TaskStatus::Unknown(other) => other,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processing => f.write_str("processing"),
            Self::Success => f.write_str("success"),
            Self::Fail => f.write_str("failed"),
            Self::Unknown(other) => f.write_str(other),
        }
    }
}

/// Response of the submit endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedJob {
    /// Job id used for polling
    pub id: String,
    /// Model that accepted the job
    #[serde(default)]
    pub model: Option<String>,
    /// Initial task status
    #[serde(default)]
    pub task_status: Option<TaskStatus>,
    /// Request id assigned by the platform
    #[serde(default)]
    pub request_id: Option<String>,
}

/// One rendered video
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct VideoResult {
    /// Download URL of the video
    pub url: String,
    /// Download URL of the cover frame
    #[serde(default)]
    pub cover_image_url: Option<String>,
}

/// Response of the async-result endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatus {
    /// Model that ran the job
    #[serde(default)]
    pub model: Option<String>,
    /// Current task status
    pub task_status: TaskStatus,
    /// Rendered videos, present once the task succeeded
    #[serde(default)]
    pub video_result: Vec<VideoResult>,
    /// Request id assigned by the platform
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Interface for remote video generation backends
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait VideoProvider: Send + Sync {
    /// Submit a generation job and return its id
    async fn submit(&self, request: VideoRequest) -> Result<SubmittedJob, VideoError>;

    /// Fetch the status or result of a previously submitted job
    async fn poll(&self, job_id: &str) -> Result<JobStatus, VideoError>;
}
