use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{debug, error, warn};

use rizz_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    i18n::{text, MessageKey},
    messaging::MessagingPort,
    onboarding::BotReply,
    Result,
};

use crate::router::AppState;

use super::today;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) {
    let user_id = UserId(q.from.id.0 as i64);
    let data = q.data.clone().unwrap_or_default();

    // Always answer the callback query so the client stops spinning.
    if let Err(e) = state.messenger.answer_callback_query(&q.id, None).await {
        debug!(error = %e, "answer_callback_query failed");
    }

    let Some(origin) = q.message.as_ref().map(|m| MessageRef {
        chat_id: ChatId(m.chat.id.0),
        message_id: MessageId(m.id.0),
    }) else {
        return;
    };
    if data.is_empty() {
        return;
    }

    match state.onboarding.handle_callback(user_id, &data, today()).await {
        Ok(Some(reply)) => {
            if let Err(e) = show_reply(state.messenger.as_ref(), origin, reply).await {
                warn!(user_id = user_id.0, error = %e, "failed to send callback reply");
            }
        }
        Ok(None) => debug!(user_id = user_id.0, data = %data, "unhandled callback"),
        Err(e) => {
            error!(user_id = user_id.0, data = %data, error = %e, "callback failed");
            let lang = state.users.language(user_id).await;
            let _ = state
                .messenger
                .send_text(origin.chat_id, text(lang, MessageKey::ErrorGeneric))
                .await;
        }
    }
}

/// Replace the pressed keyboard when the answer is another keyboard;
/// anything else goes out as a new message.
async fn show_reply(messenger: &dyn MessagingPort, origin: MessageRef, reply: BotReply) -> Result<()> {
    match reply.keyboard {
        Some(kb) => {
            if let Err(e) = messenger.edit_keyboard(origin, &reply.text, kb.clone()).await {
                debug!(error = %e, "keyboard edit failed, sending a new message");
                messenger.send_keyboard(origin.chat_id, &reply.text, kb).await?;
            }
        }
        None => {
            messenger.send_text(origin.chat_id, &reply.text).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rizz_core::{
        errors::Error,
        messaging::{ChatAction, InlineButton, InlineKeyboard},
    };

    use super::*;

    #[derive(Default)]
    struct Recorder {
        fail_edits: bool,
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessagingPort for Recorder {
        async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
            self.calls.lock().unwrap().push(format!("text:{text}"));
            Ok(MessageRef { chat_id, message_id: MessageId(100) })
        }
        async fn send_voice(&self, chat_id: ChatId, _ogg: Vec<u8>) -> Result<MessageRef> {
            Ok(MessageRef { chat_id, message_id: MessageId(100) })
        }
        async fn send_chat_action(&self, _chat_id: ChatId, _action: ChatAction) -> Result<()> {
            Ok(())
        }
        async fn send_keyboard(&self, chat_id: ChatId, text: &str, _kb: InlineKeyboard) -> Result<MessageRef> {
            self.calls.lock().unwrap().push(format!("keyboard:{text}"));
            Ok(MessageRef { chat_id, message_id: MessageId(100) })
        }
        async fn edit_keyboard(&self, msg: MessageRef, text: &str, _kb: InlineKeyboard) -> Result<()> {
            if self.fail_edits {
                return Err(Error::External("message is too old".to_string()));
            }
            self.calls.lock().unwrap().push(format!("edit:{}:{text}", msg.message_id.0));
            Ok(())
        }
        async fn answer_callback_query(&self, _id: &str, _text: Option<&str>) -> Result<()> {
            Ok(())
        }
    }

    fn origin() -> MessageRef {
        MessageRef {
            chat_id: ChatId(1),
            message_id: MessageId(7),
        }
    }

    fn keyboard_reply() -> BotReply {
        BotReply {
            text: "Gender?".to_string(),
            keyboard: Some(InlineKeyboard::one_per_row(vec![InlineButton::new("Male", "set_gender_male")])),
        }
    }

    #[tokio::test]
    async fn keyboard_answer_edits_the_pressed_message() {
        let m = Recorder::default();
        show_reply(&m, origin(), keyboard_reply()).await.unwrap();
        assert_eq!(m.calls(), vec!["edit:7:Gender?"]);
    }

    #[tokio::test]
    async fn failed_edit_falls_back_to_a_new_keyboard() {
        let m = Recorder {
            fail_edits: true,
            ..Recorder::default()
        };
        show_reply(&m, origin(), keyboard_reply()).await.unwrap();
        assert_eq!(m.calls(), vec!["keyboard:Gender?"]);
    }

    #[tokio::test]
    async fn text_answer_is_a_new_message() {
        let m = Recorder::default();
        let reply = BotReply {
            text: "What's your name?".to_string(),
            keyboard: None,
        };
        show_reply(&m, origin(), reply).await.unwrap();
        assert_eq!(m.calls(), vec!["text:What's your name?"]);
    }
}
