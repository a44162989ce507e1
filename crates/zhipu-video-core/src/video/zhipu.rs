use super::http_utils;
use super::{JobStatus, SubmittedJob, VideoError, VideoProvider, VideoRequest};
use crate::config::VideoSettings;
use async_trait::async_trait;
use reqwest::{Client as HttpClient, Url};
use serde_json::{json, Value};
use tracing::debug;

/// Video provider backed by the Zhipu open platform (CogVideoX)
pub struct ZhipuVideoClient {
    http_client: HttpClient,
    api_key: String,
    api_base: String,
}

impl ZhipuVideoClient {
    /// Create a new client for the given key and base URL
    #[must_use]
    pub fn new(api_key: String, api_base: &str, http_client: HttpClient) -> Self {
        Self {
            http_client,
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Build a client from settings, or `None` when no API key is configured.
    #[must_use]
    pub fn from_settings(settings: &VideoSettings) -> Option<Self> {
        let api_key = settings.api_key()?;
        Some(Self::new(
            api_key.to_string(),
            &settings.zhipu_api_base,
            http_utils::create_http_client(settings.http_timeout()),
        ))
    }

    fn build_generation_body(request: &VideoRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "with_audio": request.with_audio,
        });
        if let Some(prompt) = &request.prompt {
            body["prompt"] = json!(prompt);
        }
        if let Some(image) = &request.image {
            body["image_url"] = json!(image.to_data_url());
        }
        body
    }

    fn result_url(&self, job_id: &str) -> Result<Url, VideoError> {
        let mut url = Url::parse(&format!("{}/async-result", self.api_base))
            .map_err(|e| VideoError::ApiError(format!("Invalid API base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| VideoError::ApiError("Invalid API base URL".to_string()))?
            .push(job_id);
        Ok(url)
    }
}

#[async_trait]
impl VideoProvider for ZhipuVideoClient {
    async fn submit(&self, request: VideoRequest) -> Result<SubmittedJob, VideoError> {
        let url = format!("{}/videos/generations", self.api_base);
        let body = Self::build_generation_body(&request);
        debug!(
            model = %request.model,
            has_image = request.image.is_some(),
            "Submitting video generation job"
        );
        http_utils::post_json(&self.http_client, &url, &body, &self.api_key).await
    }

    async fn poll(&self, job_id: &str) -> Result<JobStatus, VideoError> {
        let url = self.result_url(job_id)?;
        debug!(job_id, "Polling video generation job");
        http_utils::get_json(&self.http_client, url.as_str(), &self.api_key).await
    }
}
