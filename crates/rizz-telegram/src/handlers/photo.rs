use teloxide::prelude::*;
use tracing::info;

use rizz_core::{
    domain::{ChatId, UserId},
    i18n::{text, MessageKey},
    messaging::{deliver_reply, ChatAction},
};

use crate::router::AppState;

use super::{download::download_bytes, ensure_ready};

const LEARN_CAPTION: &str = "learn";

fn is_learn_caption(caption: Option<&str>) -> bool {
    caption.is_some_and(|c| c.trim().eq_ignore_ascii_case(LEARN_CAPTION))
}

pub async fn handle_photo(bot: &Bot, msg: &Message, state: &AppState) -> anyhow::Result<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(best) = msg.photo().and_then(|sizes| sizes.last()) else {
        return Ok(());
    };
    let user_id = UserId(user.id.0 as i64);
    let chat_id = ChatId(msg.chat.id.0);

    if !ensure_ready(state, chat_id, user_id).await? {
        return Ok(());
    }
    let lang = state.users.language(user_id).await;
    let caption = msg.caption();

    if is_learn_caption(caption) {
        let _ = state.messenger.send_chat_action(chat_id, ChatAction::Typing).await;
        let jpeg = download_bytes(bot, &best.file.id).await?;
        let added = state.coach.learn_style(user_id, &jpeg).await?;
        let key = if added == 0 {
            MessageKey::NothingToLearn
        } else {
            MessageKey::ProcessedConversation
        };
        state.messenger.send_text(chat_id, text(lang, key)).await?;
        return Ok(());
    }

    state
        .messenger
        .send_text(chat_id, text(lang, MessageKey::ProcessingPhoto))
        .await?;
    let jpeg = download_bytes(bot, &best.file.id).await?;
    let description = state.coach.describe_image(&jpeg).await?;
    info!(user_id = user_id.0, chars = description.len(), "photo described");

    let _ = state.messenger.send_chat_action(chat_id, ChatAction::Typing).await;
    let reply = state.coach.reply_to_image(user_id, &description, caption).await?;
    deliver_reply(state.messenger.as_ref(), chat_id, &reply).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learn_caption_is_case_insensitive() {
        assert!(is_learn_caption(Some("learn")));
        assert!(is_learn_caption(Some("  LEARN ")));
        assert!(!is_learn_caption(Some("learn this")));
        assert!(!is_learn_caption(None));
    }
}
