use teloxide::prelude::*;
use tracing::{info, warn};

use rizz_core::{
    domain::{ChatId, UserId},
    i18n::{render, text, MessageKey},
};

use crate::router::AppState;

use super::send_bot_reply;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Command {
    Start,
    Settings,
    Premium,
    Help,
}

fn parse_command(text: &str) -> Option<Command> {
    // Telegram may send `/cmd@botname arg1 ...`
    let first = text.split_whitespace().next().unwrap_or("");
    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    match cmd.as_str() {
        "start" => Some(Command::Start),
        "settings" | "setting" => Some(Command::Settings),
        "premium" => Some(Command::Premium),
        "help" => Some(Command::Help),
        _ => None,
    }
}

pub async fn handle_command(msg: &Message, state: &AppState) -> anyhow::Result<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(raw) = msg.text() else {
        return Ok(());
    };
    let user_id = UserId(user.id.0 as i64);
    let chat_id = ChatId(msg.chat.id.0);
    let lang = state.users.language(user_id).await;

    let Some(cmd) = parse_command(raw) else {
        state.messenger.send_text(chat_id, text(lang, MessageKey::Help)).await?;
        return Ok(());
    };
    info!(user_id = user_id.0, command = ?cmd, "command");

    match cmd {
        Command::Start => {
            // A restart drops anything still waiting in the debouncer.
            state.coalescer.cancel(user_id);
            let reply = state
                .onboarding
                .start(user_id, &user.first_name, user.username.as_deref())
                .await?;
            send_bot_reply(state, chat_id, reply).await?;
        }
        Command::Settings => {
            let reply = state.onboarding.settings(user_id).await;
            send_bot_reply(state, chat_id, reply).await?;
        }
        Command::Premium => {
            let out = match state.gate.payment_link(user_id).await {
                Ok(Some(url)) => {
                    let balance = state.gate.balance(user_id).await.to_string();
                    format!(
                        "{}\n\n{}",
                        render(lang, MessageKey::CreditsBalance, &[("credits", &balance)]),
                        render(lang, MessageKey::PremiumPaymentLink, &[("paymentUrl", &url)])
                    )
                }
                Ok(None) => text(lang, MessageKey::PaymentsDisabled).to_string(),
                Err(e) => {
                    warn!(user_id = user_id.0, error = %e, "checkout session failed");
                    text(lang, MessageKey::ErrorPayment).to_string()
                }
            };
            state.messenger.send_text(chat_id, &out).await?;
        }
        Command::Help => {
            state.messenger.send_text(chat_id, text(lang, MessageKey::Help)).await?;
        }
    }
    Ok(())
}
