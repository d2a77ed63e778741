use teloxide::prelude::*;
use tracing::debug;

use rizz_core::{
    domain::{ChatId, UserId},
    pipeline::TextRequest,
};

use crate::router::AppState;

use super::{send_bot_reply, today};

pub async fn handle_text(msg: &Message, state: &AppState) -> anyhow::Result<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if text.trim().is_empty() {
        return Ok(());
    }
    let user_id = UserId(user.id.0 as i64);
    let chat_id = ChatId(msg.chat.id.0);

    if !state.users.exists(user_id).await {
        let reply = state
            .onboarding
            .start(user_id, &user.first_name, user.username.as_deref())
            .await?;
        send_bot_reply(state, chat_id, reply).await?;
        return Ok(());
    }

    // Setup answers and settings edits are handled right away.
    if let Some(reply) = state.onboarding.handle_text(user_id, text, today()).await? {
        send_bot_reply(state, chat_id, reply).await?;
        return Ok(());
    }

    let outcome = state.coalescer.on_message(
        user_id,
        TextRequest {
            chat_id,
            text: text.to_string(),
        },
        msg.date,
    );
    debug!(
        user_id = user_id.0,
        task_id = outcome.task_id,
        delay_ms = outcome.delay.as_millis() as u64,
        superseded = outcome.superseded,
        "text queued"
    );
    Ok(())
}
