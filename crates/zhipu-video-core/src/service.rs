//! Video command service
//!
//! Implements the three video commands independently of any chat transport.
//! Every failure is turned into a [`Reply`] here; nothing propagates to the
//! caller as an error.

use crate::config::VideoSettings;
use crate::pending::{ConsumeOutcome, PendingImageRequests, PendingTicket, TimeoutOutcome};
use crate::reply::{self, Reply, GENERATE_USAGE, QUERY_USAGE};
use crate::utils::non_blank;
use crate::video::{
    ImageInput, JobStatus, SubmittedJob, VideoError, VideoProvider, VideoRequest,
    ZhipuVideoClient,
};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{info, warn};

const GENERATE_FAILED: &str = "Video generation failed";
const QUERY_FAILED: &str = "Query failed";

/// Transport-agnostic implementation of the video commands
pub struct VideoService<Id: Hash + Eq + Clone + Send + Sync + Debug + 'static> {
    settings: Arc<VideoSettings>,
    provider: Option<Arc<dyn VideoProvider>>,
    pending: PendingImageRequests<Id>,
}

impl<Id: Hash + Eq + Clone + Send + Sync + Debug + 'static> VideoService<Id> {
    /// Create a service around an explicit provider.
    ///
    /// `provider` is `None` when no API key is configured; every command then
    /// answers with the configuration error.
    #[must_use]
    pub fn new(settings: Arc<VideoSettings>, provider: Option<Arc<dyn VideoProvider>>) -> Self {
        Self {
            settings,
            provider,
            pending: PendingImageRequests::new(),
        }
    }

    /// Create a service backed by the Zhipu API client
    #[must_use]
    pub fn from_settings(settings: Arc<VideoSettings>) -> Self {
        let provider = ZhipuVideoClient::from_settings(&settings)
            .map(|client| Arc::new(client) as Arc<dyn VideoProvider>);
        if provider.is_none() {
            warn!("ZHIPU_API_KEY is not set, video commands will reply with a configuration error");
        }
        Self::new(settings, provider)
    }

    /// Whether an API key is configured
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Outstanding image invitations
    #[must_use]
    pub const fn pending(&self) -> &PendingImageRequests<Id> {
        &self.pending
    }

    fn provider(&self) -> Result<&dyn VideoProvider, VideoError> {
        self.provider.as_deref().ok_or(VideoError::MissingApiKey)
    }

    /// Submit a text-to-video job.
    ///
    /// # Errors
    ///
    /// `MissingApiKey` before anything else, `MissingArgument` for a blank
    /// prompt, or the remote error.
    pub async fn submit_prompt(&self, prompt: &str) -> Result<SubmittedJob, VideoError> {
        let provider = self.provider()?;
        let prompt = non_blank(prompt).ok_or(VideoError::MissingArgument {
            usage: GENERATE_USAGE,
        })?;
        provider
            .submit(VideoRequest {
                model: self.settings.zhipu_video_model.clone(),
                prompt: Some(prompt.to_string()),
                image: None,
                with_audio: self.settings.zhipu_with_audio,
            })
            .await
    }

    /// Fetch the status of a job.
    ///
    /// # Errors
    ///
    /// `MissingApiKey`, `MissingArgument` for a blank id, or the remote error.
    pub async fn poll_job(&self, job_id: &str) -> Result<JobStatus, VideoError> {
        let provider = self.provider()?;
        let job_id = non_blank(job_id).ok_or(VideoError::MissingArgument { usage: QUERY_USAGE })?;
        provider.poll(job_id).await
    }

    /// Submit an image-to-video job; a non-blank caption becomes the prompt.
    ///
    /// # Errors
    ///
    /// `MissingApiKey` or the remote error.
    pub async fn submit_image(
        &self,
        image: ImageInput,
        caption: Option<&str>,
    ) -> Result<SubmittedJob, VideoError> {
        let provider = self.provider()?;
        provider
            .submit(VideoRequest {
                model: self.settings.zhipu_video_model.clone(),
                prompt: caption.and_then(non_blank).map(ToString::to_string),
                image: Some(image),
                with_audio: self.settings.zhipu_with_audio,
            })
            .await
    }

    /// `/aivd <prompt>`
    pub async fn generate(&self, prompt: &str) -> Reply {
        match self.submit_prompt(prompt).await {
            Ok(job) => {
                info!(job_id = %job.id, "Video generation job submitted");
                reply::submitted(non_blank(prompt), &job)
            }
            Err(e) => {
                log_failure(&e, GENERATE_FAILED);
                reply::error(&e, GENERATE_FAILED)
            }
        }
    }

    /// `/aivd_query <id>`
    pub async fn query(&self, job_id: &str) -> Reply {
        match self.poll_job(job_id).await {
            Ok(status) => {
                info!(job_id = %job_id.trim(), status = %status.task_status, "Video job polled");
                reply::job_status(&status)
            }
            Err(e) => {
                log_failure(&e, QUERY_FAILED);
                reply::error(&e, QUERY_FAILED)
            }
        }
    }

    /// `/aivd_image`: open an invitation for `user`.
    ///
    /// Returns the ticket to hand to [`Self::await_image_timeout`] together
    /// with the invitation to send, or the configuration error reply.
    ///
    /// # Errors
    ///
    /// Returns the configuration error reply when no API key is set.
    pub async fn begin_image_request(&self, user: Id) -> Result<(PendingTicket, Reply), Reply> {
        if let Err(e) = self.provider() {
            log_failure(&e, GENERATE_FAILED);
            return Err(reply::error(&e, GENERATE_FAILED));
        }
        let window = self.settings.image_wait();
        info!(user = ?user, window_secs = window.as_secs(), "Waiting for image");
        let ticket = self.pending.begin(user, window).await;
        Ok((ticket, reply::invitation(window)))
    }

    /// Wait out the invitation behind `ticket`.
    ///
    /// Returns the "timed out" reply only when this timer removed the
    /// invitation; `None` when an image or a newer invitation got there first.
    pub async fn await_image_timeout(&self, user: &Id, ticket: PendingTicket) -> Option<Reply> {
        match self.pending.await_timeout(user, ticket).await {
            TimeoutOutcome::Expired => {
                info!(user = ?user, "Image request timed out");
                Some(reply::timed_out())
            }
            TimeoutOutcome::Resolved => None,
        }
    }

    /// Claim the invitation of `user` for an incoming image.
    ///
    /// Call only for messages that actually carry an image, so other messages
    /// leave the invitation open.
    pub async fn claim_image(&self, user: &Id) -> bool {
        matches!(
            self.pending.try_consume(user).await,
            ConsumeOutcome::Consumed(_)
        )
    }

    /// Submit a claimed image and format the outcome
    pub async fn animate(&self, image: ImageInput, caption: Option<&str>) -> Reply {
        let prompt = caption.and_then(non_blank);
        match self.submit_image(image, prompt).await {
            Ok(job) => {
                info!(job_id = %job.id, "Image-to-video job submitted");
                reply::submitted(prompt, &job)
            }
            Err(e) => {
                log_failure(&e, GENERATE_FAILED);
                reply::error(&e, GENERATE_FAILED)
            }
        }
    }

    /// Cancel all outstanding invitations; called when the bot stops.
    pub async fn shutdown(&self) {
        self.pending.clear().await;
    }
}

fn log_failure(err: &VideoError, action: &str) {
    if err.is_remote() {
        warn!("{action}: {err}");
    } else {
        info!("{action}: rejected before remote call ({err})");
    }
}
