//! Chat replies
//!
//! A [`Reply`] is an ordered chain of segments, rendered by the transport as
//! plain text or Telegram HTML.

use crate::video::{JobStatus, SubmittedJob, VideoError};
use html_escape::encode_text;
use std::time::Duration;

/// Usage line of the text-to-video command
pub const GENERATE_USAGE: &str = "/aivd <prompt>";
/// Usage line of the query command
pub const QUERY_USAGE: &str = "/aivd_query <id>";
/// Usage line of the image-to-video command
pub const IMAGE_USAGE: &str = "/aivd_image";

/// One piece of a reply chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplySegment {
    /// Free text
    Plain(String),
    /// `label: value` line; the label is emphasized in rich renderings
    Field {
        /// Field name
        label: &'static str,
        /// Field value
        value: String,
    },
}

/// Ordered chain of reply segments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    segments: Vec<ReplySegment>,
}

impl Reply {
    /// Reply made of a single text segment
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            segments: vec![ReplySegment::Plain(text.into())],
        }
    }

    /// Append a `label: value` line
    #[must_use]
    pub fn field(mut self, label: &'static str, value: impl Into<String>) -> Self {
        self.segments.push(ReplySegment::Field {
            label,
            value: value.into(),
        });
        self
    }

    /// Append free text
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.segments.push(ReplySegment::Plain(text.into()));
        self
    }

    /// Segments in order
    #[must_use]
    pub fn segments(&self) -> &[ReplySegment] {
        &self.segments
    }

    /// Render as plain text, one segment per line
    #[must_use]
    pub fn to_plain_text(&self) -> String {
        self.render(|segment| match segment {
            ReplySegment::Plain(text) => text.clone(),
            ReplySegment::Field { label, value } => format!("{label}: {value}"),
        })
    }

    /// Render as Telegram HTML, escaping every dynamic value
    #[must_use]
    pub fn to_html(&self) -> String {
        self.render(|segment| match segment {
            ReplySegment::Plain(text) => encode_text(text).into_owned(),
            ReplySegment::Field { label, value } => {
                format!("<b>{label}:</b> {}", encode_text(value))
            }
        })
    }

    fn render(&self, line: impl Fn(&ReplySegment) -> String) -> String {
        self.segments.iter().map(line).collect::<Vec<_>>().join("\n")
    }
}

/// Invitation sent by the image-to-video command
#[must_use]
pub fn invitation(window: Duration) -> Reply {
    Reply::plain(format!(
        "🖼 Please send the image to animate within {} seconds. Add a caption to use it as the prompt.",
        window.as_secs()
    ))
}

/// Sent when the invitation window elapses without an image
#[must_use]
pub fn timed_out() -> Reply {
    Reply::plain(format!(
        "⌛ No image received in time. Send {IMAGE_USAGE} to try again."
    ))
}

/// Acknowledgement sent once an image has been claimed
#[must_use]
pub fn processing() -> Reply {
    Reply::plain("⏳ Image received, submitting it for video generation...")
}

/// Reply for an accepted generation job
#[must_use]
pub fn submitted(prompt: Option<&str>, job: &SubmittedJob) -> Reply {
    let mut reply = Reply::default();
    if let Some(prompt) = prompt {
        reply = reply.field("Prompt", prompt);
    }
    reply
        .field("ID", job.id.clone())
        .text(format!("Check progress with {QUERY_USAGE}"))
}

/// Reply for a polled job
#[must_use]
pub fn job_status(status: &JobStatus) -> Reply {
    let mut reply = Reply::default()
        .field("Model", status.model.as_deref().unwrap_or("unknown"))
        .field("Status", status.task_status.to_string());

    for video in &status.video_result {
        reply = reply.field("Video", video.url.clone());
        if let Some(cover) = &video.cover_image_url {
            reply = reply.field("Cover", cover.clone());
        }
    }
    reply
}

/// User-visible reply for a failed command.
///
/// `action` names what failed, e.g. "Video generation failed"; it is only
/// used for remote errors.
#[must_use]
pub fn error(err: &VideoError, action: &str) -> Reply {
    match err {
        VideoError::MissingApiKey => {
            Reply::plain("⚠️ Please set the Zhipu AI API key in the configuration first.")
        }
        VideoError::MissingArgument { usage } => {
            Reply::plain(format!("⚠️ Missing argument! Usage: {usage}"))
        }
        VideoError::ApiError(_) | VideoError::NetworkError(_) | VideoError::JsonError(_) => {
            Reply::plain(format!("❌ {action}: {err}"))
        }
    }
}

/// Command overview for `/start` and `/help`
#[must_use]
pub fn help() -> Reply {
    Reply::plain("🎬 Zhipu AI video generation")
        .text(format!("{GENERATE_USAGE} - generate a video from a text prompt"))
        .text(format!("{QUERY_USAGE} - check a generation job"))
        .text(format!("{IMAGE_USAGE} - animate the next image you send"))
}
