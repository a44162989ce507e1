//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the defaults used by the video commands.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default CogVideoX model variant
pub const DEFAULT_VIDEO_MODEL: &str = "CogVideoX-Flash";
/// Default base URL of the Zhipu open platform API
pub const DEFAULT_API_BASE: &str = "https://open.bigmodel.cn/api/paas/v4";
/// Seconds a user has to send an image after `/aivd_image`
pub const DEFAULT_IMAGE_WAIT_SECS: u64 = 30;
/// Longest accepted invitation window; larger `image_wait_secs` values are capped
pub const MAX_IMAGE_WAIT_SECS: u64 = 3600;

/// Build the layered configuration shared by every settings struct.
///
/// Sources, lowest priority first: `config/default`, `config/{RUN_MODE}`,
/// `config/local`, `APP__*` variables, then plain environment variables.
///
/// # Errors
///
/// Returns a `ConfigError` if any present source cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Local overrides, not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // UPPER_SNAKE_CASE variables map onto snake_case keys, empty ones count as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

/// Settings for the video generation commands
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VideoSettings {
    /// Zhipu open platform API key
    pub zhipu_api_key: Option<String>,
    /// Model variant passed to the generation endpoint
    #[serde(default = "default_video_model")]
    pub zhipu_video_model: String,
    /// Base URL of the API, without trailing slash
    #[serde(default = "default_api_base")]
    pub zhipu_api_base: String,
    /// Ask the model to generate an audio track
    #[serde(default = "default_with_audio")]
    pub zhipu_with_audio: bool,
    /// Optional HTTP timeout for API calls; unset means no timeout
    pub zhipu_http_timeout_secs: Option<u64>,
    /// Window for the image-to-video invitation
    #[serde(default = "default_image_wait_secs")]
    pub image_wait_secs: u64,
}

fn default_video_model() -> String {
    DEFAULT_VIDEO_MODEL.to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

const fn default_with_audio() -> bool {
    true
}

const fn default_image_wait_secs() -> u64 {
    DEFAULT_IMAGE_WAIT_SECS
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            zhipu_api_key: None,
            zhipu_video_model: default_video_model(),
            zhipu_api_base: default_api_base(),
            zhipu_with_audio: default_with_audio(),
            zhipu_http_timeout_secs: None,
            image_wait_secs: default_image_wait_secs(),
        }
    }
}

impl VideoSettings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use zhipu_video_core::config::VideoSettings;
    ///
    /// let settings = VideoSettings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// Returns the API key if one is configured and not blank.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.zhipu_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Returns the invitation window as a `Duration`, capped at
    /// [`MAX_IMAGE_WAIT_SECS`].
    #[must_use]
    pub const fn image_wait(&self) -> Duration {
        let secs = if self.image_wait_secs > MAX_IMAGE_WAIT_SECS {
            MAX_IMAGE_WAIT_SECS
        } else {
            self.image_wait_secs
        };
        Duration::from_secs(secs)
    }

    /// Returns the HTTP timeout, if one is configured.
    #[must_use]
    pub fn http_timeout(&self) -> Option<Duration> {
        self.zhipu_http_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("ZHIPU_API_KEY", "test-key");
        env::set_var("ZHIPU_VIDEO_MODEL", "cogvideox-3");
        env::set_var("IMAGE_WAIT_SECS", "45");

        let settings = VideoSettings::new()?;
        assert_eq!(settings.api_key(), Some("test-key"));
        assert_eq!(settings.zhipu_video_model, "cogvideox-3");
        assert_eq!(settings.image_wait(), Duration::from_secs(45));
        assert_eq!(settings.zhipu_api_base, DEFAULT_API_BASE);

        env::remove_var("ZHIPU_API_KEY");
        env::remove_var("ZHIPU_VIDEO_MODEL");
        env::remove_var("IMAGE_WAIT_SECS");

        // Empty variables are treated as unset
        env::set_var("ZHIPU_API_KEY", "");
        let settings = VideoSettings::new()?;
        assert_eq!(settings.api_key(), None);
        assert_eq!(settings.zhipu_video_model, DEFAULT_VIDEO_MODEL);
        env::remove_var("ZHIPU_API_KEY");
        Ok(())
    }

    #[test]
    fn test_blank_api_key_is_missing() {
        let settings = VideoSettings {
            zhipu_api_key: Some("   ".to_string()),
            ..VideoSettings::default()
        };
        assert_eq!(settings.api_key(), None);
    }

    #[test]
    fn test_image_wait_is_capped() {
        let mut settings = VideoSettings::default();
        assert_eq!(settings.image_wait(), Duration::from_secs(DEFAULT_IMAGE_WAIT_SECS));

        settings.image_wait_secs = u64::MAX;
        assert_eq!(
            settings.image_wait(),
            Duration::from_secs(MAX_IMAGE_WAIT_SECS)
        );
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let mut settings = VideoSettings::default();
        assert_eq!(settings.http_timeout(), None);

        settings.zhipu_http_timeout_secs = Some(0);
        assert_eq!(settings.http_timeout(), None);

        settings.zhipu_http_timeout_secs = Some(90);
        assert_eq!(settings.http_timeout(), Some(Duration::from_secs(90)));
    }
}
