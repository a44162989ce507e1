//! Testing helpers and mock utilities.
//!
//! Provides convenient constructors for mocked video providers and settings.

use crate::config::VideoSettings;
use crate::video::{JobStatus, MockVideoProvider, SubmittedJob, TaskStatus, VideoError};

/// Settings with a dummy API key and every other value at its default.
#[must_use]
pub fn configured_settings() -> VideoSettings {
    VideoSettings {
        zhipu_api_key: Some("test-key".to_string()),
        ..VideoSettings::default()
    }
}

/// Create a mock provider that accepts every submission with `job_id`.
///
/// `poll` reports the job as still processing.
///
/// # Example
///
/// ```rust,ignore
/// use zhipu_video_core::testing::mock_video_simple;
///
/// let mock = mock_video_simple("job-1");
/// // Use the mock in tests...
/// ```
#[must_use]
pub fn mock_video_simple(job_id: &'static str) -> MockVideoProvider {
    let mut mock = MockVideoProvider::new();
    mock.expect_submit().returning(move |request| {
        Ok(SubmittedJob {
            id: job_id.to_string(),
            model: Some(request.model),
            task_status: Some(TaskStatus::Processing),
            request_id: None,
        })
    });

    mock.expect_poll().returning(|_| {
        Ok(JobStatus {
            model: None,
            task_status: TaskStatus::Processing,
            video_result: Vec::new(),
            request_id: None,
        })
    });

    mock
}

/// Create a mock provider whose every call fails with an API error.
#[must_use]
pub fn mock_video_failing(message: &'static str) -> MockVideoProvider {
    let mut mock = MockVideoProvider::new();
    mock.expect_submit()
        .returning(move |_| Err(VideoError::ApiError(message.to_string())));
    mock.expect_poll()
        .returning(move |_| Err(VideoError::ApiError(message.to_string())));
    mock
}
