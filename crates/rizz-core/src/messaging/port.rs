use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{ChatAction, InlineKeyboard},
    Result,
};

/// Outbound side of the chat platform.
///
/// Texts are sent as plain text; the bot never relies on markup.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;

    /// `ogg` is an OGG/Opus encoded voice note.
    async fn send_voice(&self, chat_id: ChatId, ogg: Vec<u8>) -> Result<MessageRef>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;

    async fn send_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    /// Replace both the text and the keyboard of a message sent earlier.
    async fn edit_keyboard(&self, msg: MessageRef, text: &str, keyboard: InlineKeyboard) -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
