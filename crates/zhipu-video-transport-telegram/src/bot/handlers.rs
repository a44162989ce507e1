use crate::bot::messaging::send_reply;
use crate::bot::UnauthorizedCache;
use anyhow::Result;
use std::sync::Arc;
use teloxide::{
    net::Download,
    prelude::*,
    types::{ChatAction, FileId},
    utils::command::{BotCommands, ParseError},
};
use tracing::{error, info, warn};
use zhipu_video_core::reply;
use zhipu_video_core::service::VideoService;
use zhipu_video_core::video::ImageInput;

/// Command service as shared through the dispatcher dependencies
pub type SharedVideoService = Arc<VideoService<i64>>;

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

// Helper function to get user name from Message
fn get_user_name(msg: &Message) -> String {
    if let Some(ref user) = msg.from {
        if let Some(ref username) = user.username {
            return username.clone();
        }
        if !user.first_name.is_empty() {
            return user.first_name.clone();
        }
    }
    "Unknown".to_string()
}

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

// Hands the raw argument text to the handler, blank included, so a missing
// argument is answered with a usage hint instead of falling through.
fn rest_of_line(input: String) -> Result<(String,), ParseError> {
    Ok((input,))
}

/// Supported commands for the bot
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Show the welcome message
    #[command(description = "Start the bot.")]
    Start,
    /// List available commands
    #[command(description = "Show available commands.")]
    Help,
    /// Generate a video from a text prompt
    #[command(description = "Generate a video from a prompt.", parse_with = rest_of_line)]
    Aivd(String),
    /// Poll a generation job by id
    #[command(
        rename = "aivd_query",
        description = "Check a generation job by id.",
        parse_with = rest_of_line
    )]
    AivdQuery(String),
    /// Wait for an image to animate
    #[command(rename = "aivd_image", description = "Animate the next image you send.")]
    AivdImage,
}

/// Image attached to a message, as a Telegram file reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingImage {
    /// Telegram file id
    pub file_id: FileId,
    /// MIME type reported by Telegram
    pub mime_type: String,
}

/// Returns the image carried by `msg`: the largest photo size, or a
/// document with an `image/*` MIME type.
#[must_use]
pub fn extract_image(msg: &Message) -> Option<IncomingImage> {
    if let Some(photo) = msg.photo().and_then(<[_]>::last) {
        return Some(IncomingImage {
            file_id: photo.file.id.clone(),
            mime_type: DEFAULT_IMAGE_MIME.to_string(),
        });
    }

    let document = msg.document()?;
    let mime_type = document.mime_type.as_ref()?.essence_str().to_string();
    mime_type.starts_with("image/").then(|| IncomingImage {
        file_id: document.file.id.clone(),
        mime_type,
    })
}

/// Start / help handler
///
/// # Errors
///
/// Returns an error if the message cannot be sent.
pub async fn help(bot: Bot, msg: Message) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!("User {user_id} ({}) asked for help.", get_user_name(&msg));
    send_reply(&bot, msg.chat.id, &reply::help()).await
}

/// `/aivd <prompt>` handler
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn generate(
    bot: Bot,
    msg: Message,
    prompt: String,
    service: SharedVideoService,
) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!("User {user_id} ({}) requested video generation.", get_user_name(&msg));

    if service.is_configured() && !prompt.trim().is_empty() {
        bot.send_chat_action(msg.chat.id, ChatAction::Typing).await?;
    }
    let reply = service.generate(&prompt).await;
    send_reply(&bot, msg.chat.id, &reply).await
}

/// `/aivd_query <id>` handler
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn query(
    bot: Bot,
    msg: Message,
    job_id: String,
    service: SharedVideoService,
) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!("User {user_id} queried video job '{}'.", job_id.trim());

    let reply = service.query(&job_id).await;
    send_reply(&bot, msg.chat.id, &reply).await
}

/// `/aivd_image` handler.
///
/// Opens the invitation, sends it, and spawns the timer task that reports a
/// timeout if no image is claimed before the window closes.
///
/// # Errors
///
/// Returns an error if the invitation or rejection cannot be sent.
pub async fn image_request(bot: Bot, msg: Message, service: SharedVideoService) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    if user_id == 0 {
        warn!("Ignoring image request without a sender");
        return Ok(());
    }
    info!("User {user_id} ({}) requested image-to-video.", get_user_name(&msg));

    let (ticket, invitation) = match service.begin_image_request(user_id).await {
        Ok(started) => started,
        Err(rejection) => return send_reply(&bot, msg.chat.id, &rejection).await,
    };

    if let Err(e) = send_reply(&bot, msg.chat.id, &invitation).await {
        // Nobody was told to send an image; do not leave the invitation open
        service.pending().cancel(&user_id, ticket).await;
        return Err(e);
    }

    let chat_id = msg.chat.id;
    tokio::spawn(async move {
        if let Some(timeout_reply) = service.await_image_timeout(&user_id, ticket).await {
            if let Err(e) = send_reply(&bot, chat_id, &timeout_reply).await {
                error!("Failed to send timeout notice to {user_id}: {e}");
            }
        }
    });

    Ok(())
}

/// Generic inbound message handler.
///
/// Runs for every non-command message. Messages without an image, and
/// senders without an open invitation, return without side effects.
///
/// # Errors
///
/// Returns an error if a reply cannot be sent.
pub async fn handle_inbound(bot: Bot, msg: Message, service: SharedVideoService) -> Result<()> {
    let Some(image) = extract_image(&msg) else {
        return Ok(());
    };
    let user_id = get_user_id_safe(&msg);
    if !service.claim_image(&user_id).await {
        return Ok(());
    }

    info!("User {user_id} sent an image for image-to-video.");
    // The invitation is already claimed, so the image goes through either way
    if let Err(e) = send_reply(&bot, msg.chat.id, &reply::processing()).await {
        error!("Failed to acknowledge image from user {user_id}: {e}");
    }

    let bytes = match download(&bot, &image.file_id).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to download image from user {user_id}: {e}");
            let failure = reply::Reply::plain(format!("❌ Could not download the image: {e}"));
            return send_reply(&bot, msg.chat.id, &failure).await;
        }
    };

    let reply = service
        .animate(ImageInput::new(bytes, image.mime_type), msg.caption())
        .await;
    send_reply(&bot, msg.chat.id, &reply).await
}

async fn download(bot: &Bot, file_id: &FileId) -> Result<Vec<u8>> {
    let file = bot.get_file(file_id.clone()).await?;
    let mut buf = Vec::new();
    bot.download_file(&file.path, &mut buf).await?;
    Ok(buf)
}

/// Access denied handler, rate limited per user
///
/// # Errors
///
/// Never fails; delivery errors are logged and the cooldown slot released.
pub async fn unauthorized(bot: Bot, msg: Message, cache: Arc<UnauthorizedCache>) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    if !cache.try_claim(user_id).await {
        return Ok(());
    }

    info!(
        "⛔️ Unauthorized access from user {} ({}). Sending denial message.",
        user_id,
        get_user_name(&msg)
    );
    if let Err(e) = bot.send_message(msg.chat.id, "⛔️ Access denied").await {
        error!("Failed to send access denied message to {}: {}", user_id, e);
        cache.release(user_id).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use zhipu_video_core::config::VideoSettings;
    use zhipu_video_core::video::{
        JobStatus, SubmittedJob, VideoError, VideoProvider, VideoRequest,
    };

    const USER: i64 = 4242;

    #[derive(Default)]
    struct RecordingProvider {
        submitted: Mutex<Vec<VideoRequest>>,
    }

    #[async_trait]
    impl VideoProvider for RecordingProvider {
        async fn submit(&self, request: VideoRequest) -> Result<SubmittedJob, VideoError> {
            self.submitted.lock().await.push(request);
            Ok(SubmittedJob {
                id: "img-job".to_string(),
                model: None,
                task_status: None,
                request_id: None,
            })
        }

        async fn poll(&self, job_id: &str) -> Result<JobStatus, VideoError> {
            Err(VideoError::ApiError(format!("unexpected poll of {job_id}")))
        }
    }

    fn video_service(provider: Arc<RecordingProvider>) -> SharedVideoService {
        let settings = VideoSettings {
            zhipu_api_key: Some("test-key".to_string()),
            ..VideoSettings::default()
        };
        Arc::new(VideoService::new(Arc::new(settings), Some(provider)))
    }

    fn message(content: Value) -> Message {
        let mut value = json!({
            "message_id": 17,
            "date": 1_700_000_000,
            "chat": { "id": USER, "type": "private", "first_name": "Ada" },
            "from": { "id": USER, "is_bot": false, "first_name": "Ada" }
        });
        if let (Some(fields), Some(content)) = (value.as_object_mut(), content.as_object()) {
            fields.extend(content.clone());
        }
        serde_json::from_value(value).unwrap_or_else(|e| panic!("invalid message json: {e}"))
    }

    fn photo_message() -> Message {
        message(json!({
            "photo": [
                { "file_id": "small", "file_unique_id": "s1", "width": 90, "height": 90, "file_size": 900 },
                { "file_id": "large", "file_unique_id": "l1", "width": 1280, "height": 960, "file_size": 3 }
            ]
        }))
    }

    fn document_message(mime_type: &str) -> Message {
        message(json!({
            "document": {
                "file_id": "doc",
                "file_unique_id": "d1",
                "file_name": "upload",
                "mime_type": mime_type,
                "file_size": 3
            }
        }))
    }

    #[test]
    fn test_text_message_has_no_image() {
        assert_eq!(extract_image(&message(json!({ "text": "here it comes" }))), None);
    }

    #[test]
    fn test_photo_uses_largest_size() {
        let image = extract_image(&photo_message())
            .unwrap_or_else(|| panic!("photo message must carry an image"));
        assert_eq!(image.file_id.to_string(), "large");
        assert_eq!(image.mime_type, "image/jpeg");
    }

    #[test]
    fn test_image_document_is_accepted() {
        let image = extract_image(&document_message("image/png"))
            .unwrap_or_else(|| panic!("png document must count as an image"));
        assert_eq!(image.file_id.to_string(), "doc");
        assert_eq!(image.mime_type, "image/png");
    }

    #[test]
    fn test_other_documents_are_ignored() {
        assert_eq!(extract_image(&document_message("application/pdf")), None);
    }

    #[tokio::test]
    async fn test_text_message_keeps_invitation_open() {
        let provider = Arc::new(RecordingProvider::default());
        let service = video_service(provider.clone());
        assert!(service.begin_image_request(USER).await.is_ok());

        let text = message(json!({ "text": "wait, one sec" }));
        let result = handle_inbound(Bot::new("123:test"), text, service.clone()).await;

        assert!(result.is_ok());
        assert!(service.pending().is_pending(&USER).await);
        assert!(provider.submitted.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_claimed_image_is_submitted_when_acknowledgement_fails() {
        let telegram = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"(?i)/bot[^/]+/sendmessage$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&telegram)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"(?i)/bot[^/]+/getfile$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {
                    "file_id": "large",
                    "file_unique_id": "l1",
                    "file_size": 3,
                    "file_path": "photos/cat.jpg"
                }
            })))
            .mount(&telegram)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"/file/bot[^/]+/photos/cat\.jpg$"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1_u8, 2, 3]))
            .mount(&telegram)
            .await;

        let api_url = reqwest::Url::parse(&telegram.uri())
            .unwrap_or_else(|e| panic!("mock server uri: {e}"));
        let bot = Bot::new("123:test").set_api_url(api_url);

        let provider = Arc::new(RecordingProvider::default());
        let service = video_service(provider.clone());
        assert!(service.begin_image_request(USER).await.is_ok());

        let result = handle_inbound(bot, photo_message(), service.clone()).await;

        // Only the final reply's delivery failure is reported
        assert!(result.is_err());
        assert!(!service.pending().is_pending(&USER).await);
        let submitted = provider.submitted.lock().await;
        assert_eq!(submitted.len(), 1);
        let image = submitted[0]
            .image
            .as_ref()
            .unwrap_or_else(|| panic!("image-to-video request must carry the image"));
        assert_eq!(image.bytes, vec![1, 2, 3]);
        assert_eq!(image.mime_type, "image/jpeg");
    }

    fn parse(text: &str) -> Option<Command> {
        Command::parse(text, "video_bot").ok()
    }

    #[test]
    fn test_generate_takes_whole_prompt() {
        assert_eq!(
            parse("/aivd a cat surfing at dusk"),
            Some(Command::Aivd("a cat surfing at dusk".to_string()))
        );
    }

    #[test]
    fn test_generate_without_prompt_still_parses() {
        assert_eq!(parse("/aivd"), Some(Command::Aivd(String::new())));
    }

    #[test]
    fn test_query_and_image_commands() {
        assert_eq!(
            parse("/aivd_query 8112345"),
            Some(Command::AivdQuery("8112345".to_string()))
        );
        assert_eq!(parse("/aivd_image"), Some(Command::AivdImage));
        assert_eq!(parse("/aivd_image@video_bot"), Some(Command::AivdImage));
    }

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(parse("hello"), None);
    }
}
