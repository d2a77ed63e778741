use teloxide::prelude::*;
use tracing::info;

use rizz_core::{
    domain::{ChatId, UserId},
    messaging::ChatAction,
};

use crate::router::AppState;

use super::{
    download::{download_to, temp_path, TempFiles},
    ensure_ready, premium_allowed, refund_credit,
};

pub async fn handle_voice(bot: &Bot, msg: &Message, state: &AppState) -> anyhow::Result<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(voice) = msg.voice() else {
        return Ok(());
    };
    let user_id = UserId(user.id.0 as i64);
    let chat_id = ChatId(msg.chat.id.0);

    if !ensure_ready(state, chat_id, user_id).await? {
        return Ok(());
    }
    if !premium_allowed(state, chat_id, user_id).await? {
        return Ok(());
    }

    let result = answer_voice(bot, state, chat_id, user_id, &voice.file.id).await;
    if result.is_err() {
        refund_credit(state, user_id).await;
    }
    result
}

async fn answer_voice(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    user_id: UserId,
    file_id: &str,
) -> anyhow::Result<()> {
    let mut tmp = TempFiles::default();
    let voice_path = tmp.track(temp_path(&state.cfg.temp_dir, "voice", "ogg"));
    download_to(bot, file_id, &voice_path).await?;

    let _ = state.messenger.send_chat_action(chat_id, ChatAction::Typing).await;
    let transcript = state.transcriber.transcribe(&voice_path).await?;
    info!(user_id = user_id.0, chars = transcript.len(), "voice transcribed");

    let answer = state.coach.reply_to_voice(user_id, &transcript).await?;

    let _ = state.messenger.send_chat_action(chat_id, ChatAction::RecordVoice).await;
    let ogg = state.speech.synthesize(&answer).await?;
    state.messenger.send_voice(chat_id, ogg).await?;
    Ok(())
}
