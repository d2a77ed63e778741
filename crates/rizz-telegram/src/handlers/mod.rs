//! Telegram update handlers.
//!
//! Each handler is a small adapter that resolves the user, hands the update
//! to the core (onboarding, debouncer, coach) and sends the result back.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};
use tracing::{error, warn};

use rizz_core::{
    domain::{ChatId, UserId},
    i18n::{render, text, MessageKey},
    onboarding::BotReply,
    Result,
};
use rizz_payments::Access;

use crate::router::AppState;

mod callback;
mod commands;
mod download;
mod photo;
mod text;
mod video;
mod voice;

pub async fn handle_callback(
    _bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(q, state).await;
    Ok(())
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = UserId(user.id.0 as i64);
    let chat_id = ChatId(msg.chat.id.0);

    if let Some(t) = msg.text() {
        let result = if t.starts_with('/') {
            commands::handle_command(&msg, &state).await
        } else {
            text::handle_text(&msg, &state).await
        };
        if let Err(e) = result {
            report_failure(&state, chat_id, user_id, MessageKey::ErrorGeneric, &e).await;
        }
        return Ok(());
    }

    // Media replies take seconds to minutes; run them off the dispatcher so
    // the same chat's text keeps flowing into the debouncer.
    if msg.voice().is_some() || msg.photo().is_some() || msg.video().is_some() || msg.video_note().is_some() {
        tokio::spawn(async move {
            let result = if msg.voice().is_some() {
                voice::handle_voice(&bot, &msg, &state).await
            } else if msg.photo().is_some() {
                photo::handle_photo(&bot, &msg, &state).await
            } else {
                video::handle_video(&bot, &msg, &state).await
            };
            if let Err(e) = result {
                report_failure(&state, chat_id, user_id, MessageKey::ErrorProcessingMedia, &e).await;
            }
        });
    }

    Ok(())
}

async fn report_failure(state: &AppState, chat_id: ChatId, user_id: UserId, key: MessageKey, err: &anyhow::Error) {
    error!(user_id = user_id.0, error = %err, "handler failed");
    let lang = state.users.language(user_id).await;
    if let Err(e) = state.messenger.send_text(chat_id, text(lang, key)).await {
        warn!(chat_id = chat_id.0, error = %e, "failed to report error to user");
    }
}

pub(crate) async fn send_bot_reply(state: &AppState, chat_id: ChatId, reply: BotReply) -> Result<()> {
    match reply.keyboard {
        Some(kb) => state.messenger.send_keyboard(chat_id, &reply.text, kb).await?,
        None => state.messenger.send_text(chat_id, &reply.text).await?,
    };
    Ok(())
}

/// Media needs a finished profile. Otherwise re-prompt the pending setup step
/// and return `false`.
pub(crate) async fn ensure_ready(state: &AppState, chat_id: ChatId, user_id: UserId) -> Result<bool> {
    let profile = state.users.get(user_id).await;
    let onboarding = profile.as_ref().map_or(true, |p| p.is_onboarding());
    if !onboarding {
        return Ok(true);
    }
    let lang = state.users.language(user_id).await;
    state
        .messenger
        .send_text(chat_id, text(lang, MessageKey::FinishSetupFirst))
        .await?;
    let prompt = match profile {
        Some(_) => state.onboarding.settings(user_id).await,
        None => state.onboarding.start(user_id, "", None).await?,
    };
    send_bot_reply(state, chat_id, prompt).await?;
    Ok(false)
}

/// Spend a premium credit. On `false` the user has already been told why.
pub(crate) async fn premium_allowed(state: &AppState, chat_id: ChatId, user_id: UserId) -> Result<bool> {
    let lang = state.users.language(user_id).await;
    match state.gate.check(user_id).await {
        Ok(Access::Granted) => Ok(true),
        Ok(Access::PaymentRequired(url)) => {
            let msg = format!(
                "{}\n\n{}",
                text(lang, MessageKey::PremiumRequired),
                render(lang, MessageKey::PremiumPaymentLink, &[("paymentUrl", &url)])
            );
            state.messenger.send_text(chat_id, &msg).await?;
            Ok(false)
        }
        Err(e) => {
            warn!(user_id = user_id.0, error = %e, "premium check failed");
            state
                .messenger
                .send_text(chat_id, text(lang, MessageKey::ErrorPayment))
                .await?;
            Ok(false)
        }
    }
}

/// Give back the credit spent on a premium reply that failed.
pub(crate) async fn refund_credit(state: &AppState, user_id: UserId) {
    if !state.gate.enabled() {
        return;
    }
    if let Err(e) = state.users.grant_credits(user_id, 1).await {
        warn!(user_id = user_id.0, error = %e, "credit refund failed");
    }
}

fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}
