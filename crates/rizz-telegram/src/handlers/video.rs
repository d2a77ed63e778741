use teloxide::prelude::*;
use tracing::{info, warn};

use rizz_core::{
    domain::{ChatId, UserId},
    i18n::{text, MessageKey},
    media::{extract_audio, extract_frames},
    messaging::ChatAction,
};

use crate::router::AppState;

use super::{
    download::{download_to, temp_path, TempFiles},
    ensure_ready, premium_allowed, refund_credit,
};

pub async fn handle_video(bot: &Bot, msg: &Message, state: &AppState) -> anyhow::Result<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let file_id = match (msg.video(), msg.video_note()) {
        (Some(v), _) => v.file.id.clone(),
        (None, Some(n)) => n.file.id.clone(),
        (None, None) => return Ok(()),
    };
    let user_id = UserId(user.id.0 as i64);
    let chat_id = ChatId(msg.chat.id.0);

    if !ensure_ready(state, chat_id, user_id).await? {
        return Ok(());
    }
    if !premium_allowed(state, chat_id, user_id).await? {
        return Ok(());
    }

    let result = answer_video(bot, state, chat_id, user_id, &file_id).await;
    if result.is_err() {
        refund_credit(state, user_id).await;
    }
    result
}

async fn answer_video(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    user_id: UserId,
    file_id: &str,
) -> anyhow::Result<()> {
    let cfg = &state.cfg;
    let lang = state.users.language(user_id).await;
    state
        .messenger
        .send_text(chat_id, text(lang, MessageKey::ProcessingVideo))
        .await?;

    let mut tmp = TempFiles::default();
    let video_path = tmp.track(temp_path(&cfg.temp_dir, "video", "mp4"));
    let frames_dir = tmp.track(temp_path(&cfg.temp_dir, "frames", "d"));
    let audio_path = tmp.track(temp_path(&cfg.temp_dir, "audio", "wav"));
    download_to(bot, file_id, &video_path).await?;

    let frames = extract_frames(
        &cfg.ffmpeg_path,
        &video_path,
        &frames_dir,
        cfg.video_frame_interval,
        cfg.video_max_frames,
    )
    .await?;

    let mut descriptions = Vec::with_capacity(frames.len());
    for frame in &frames {
        let jpeg = tokio::fs::read(frame).await?;
        descriptions.push(state.coach.describe_image(&jpeg).await?);
    }
    let visual_summary = if descriptions.is_empty() {
        String::new()
    } else {
        state.coach.summarize_frames(&descriptions).await?
    };

    // Silent clips and clips without an audio track still get a reply.
    let transcript = match extract_audio(&cfg.ffmpeg_path, &video_path, &audio_path).await {
        Ok(()) => match state.transcriber.transcribe(&audio_path).await {
            Ok(t) => t,
            Err(e) => {
                warn!(user_id = user_id.0, error = %e, "video transcription failed");
                String::new()
            }
        },
        Err(e) => {
            warn!(user_id = user_id.0, error = %e, "audio extraction failed");
            String::new()
        }
    };
    info!(
        user_id = user_id.0,
        frames = frames.len(),
        transcript_chars = transcript.len(),
        "video analysed"
    );

    let answer = state
        .coach
        .reply_to_video(user_id, &visual_summary, &transcript)
        .await?;

    let _ = state.messenger.send_chat_action(chat_id, ChatAction::RecordVoice).await;
    let ogg = state.speech.synthesize(&answer).await?;
    state.messenger.send_voice(chat_id, ogg).await?;
    Ok(())
}
