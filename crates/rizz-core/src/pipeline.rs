//! The debounced text path: what runs once a burst of text messages settles.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    coach::Coach,
    debounce::ResponsePipeline,
    domain::{ChatId, UserId},
    i18n::{text, MessageKey},
    messaging::{deliver_reply, ChatAction, MessagingPort},
    Result,
};

/// A text message waiting to be answered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextRequest {
    pub chat_id: ChatId,
    pub text: String,
}

pub struct ChatReplyPipeline {
    coach: Arc<Coach>,
    messenger: Arc<dyn MessagingPort>,
}

impl ChatReplyPipeline {
    pub fn new(coach: Arc<Coach>, messenger: Arc<dyn MessagingPort>) -> Self {
        Self { coach, messenger }
    }
}

#[async_trait]
impl ResponsePipeline for ChatReplyPipeline {
    type Message = TextRequest;

    async fn respond(&self, user_id: UserId, req: TextRequest) -> Result<()> {
        if let Err(e) = self
            .messenger
            .send_chat_action(req.chat_id, ChatAction::Typing)
            .await
        {
            debug!(chat_id = req.chat_id.0, error = %e, "typing indicator failed");
        }

        match self.coach.reply_to_text(user_id, &req.text).await {
            Ok(reply) => deliver_reply(self.messenger.as_ref(), req.chat_id, &reply).await,
            Err(e) => {
                let lang = self.coach.users().language(user_id).await;
                if let Err(send_err) = self
                    .messenger
                    .send_text(req.chat_id, text(lang, MessageKey::ErrorProcessing))
                    .await
                {
                    warn!(chat_id = req.chat_id.0, error = %send_err, "failed to report error to user");
                }
                Err(e)
            }
        }
    }
}
