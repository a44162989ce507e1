//! Reply delivery

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode};
use zhipu_video_core::reply::Reply;
use zhipu_video_core::utils::truncate_str;

/// Telegram accepts 4096 characters; keep a margin for the truncation note.
const MAX_MESSAGE_CHARS: usize = 4000;

/// Send a reply chain as one message.
///
/// Rendered as HTML; a reply too long for one message is sent as truncated
/// plain text instead, so no tag or entity gets cut in half.
///
/// # Errors
///
/// Returns an error if Telegram rejects the message.
pub async fn send_reply(bot: &Bot, chat_id: ChatId, reply: &Reply) -> Result<()> {
    let html = reply.to_html();
    if html.chars().count() <= MAX_MESSAGE_CHARS {
        bot.send_message(chat_id, html)
            .parse_mode(ParseMode::Html)
            .await?;
    } else {
        bot.send_message(chat_id, plain_fallback(reply)).await?;
    }
    Ok(())
}

fn plain_fallback(reply: &Reply) -> String {
    let text = reply.to_plain_text();
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text;
    }
    format!("{}...\n\n(message truncated)", truncate_str(&text, MAX_MESSAGE_CHARS))
}
