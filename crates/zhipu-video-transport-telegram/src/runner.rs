use crate::bot::handlers::{self, get_user_id_safe, Command, SharedVideoService};
use crate::bot::UnauthorizedCache;
use crate::config::{get_unauthorized_cache_max_size, get_unauthorized_cooldown, BotSettings};
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::{error, info, warn};
use zhipu_video_core::service::VideoService;

/// Run the Telegram transport runtime.
///
/// Pending image invitations live as long as this call; they are cleared
/// once the dispatcher stops.
pub async fn run_bot(settings: Arc<BotSettings>) {
    let service: SharedVideoService = Arc::new(VideoService::from_settings(settings.video.clone()));
    info!(
        "Video service initialized (model: {}, configured: {}).",
        settings.video.zhipu_video_model,
        service.is_configured()
    );

    if settings.telegram.allowed_users().is_empty() {
        warn!("ALLOWED_USERS is empty, the bot answers everyone.");
    }

    let bot = Bot::new(settings.telegram.telegram_token.clone());
    let unauthorized_cache = init_unauthorized_cache();
    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![
            settings,
            service.clone(),
            unauthorized_cache
        ])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    service.shutdown().await;
    info!("Bot stopped.");
}

fn init_unauthorized_cache() -> Arc<UnauthorizedCache> {
    let cooldown = get_unauthorized_cooldown();
    let max_size = get_unauthorized_cache_max_size();

    info!(
        "Initializing UnauthorizedCache (cooldown: {}s, max_size: {})",
        cooldown, max_size
    );

    Arc::new(UnauthorizedCache::new(cooldown, max_size))
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(
            Update::filter_message().branch(
                dptree::filter(|msg: Message, settings: Arc<BotSettings>| {
                    settings.is_allowed(get_user_id_safe(&msg))
                })
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(dptree::endpoint(handle_inbound)),
            ),
        )
        .branch(
            // All who are not in the filter above — unauthorized
            Update::filter_message().endpoint(handle_unauthorized),
        )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    service: SharedVideoService,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start | Command::Help => handlers::help(bot, msg).await,
        Command::Aivd(prompt) => handlers::generate(bot, msg, prompt, service).await,
        Command::AivdQuery(job_id) => handlers::query(bot, msg, job_id, service).await,
        Command::AivdImage => handlers::image_request(bot, msg, service).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_inbound(
    bot: Bot,
    msg: Message,
    service: SharedVideoService,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_inbound(bot, msg, service).await {
        error!("Inbound message handler error: {}", e);
    }
    respond(())
}

async fn handle_unauthorized(
    bot: Bot,
    msg: Message,
    cache: Arc<UnauthorizedCache>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::unauthorized(bot, msg, cache).await {
        error!("Unauthorized handler error: {}", e);
    }
    respond(())
}
