use std::time::Duration;

use tracing::debug;

use crate::{domain::ChatId, messaging::port::MessagingPort, reply::Reply, Result};

const AFTER_COMMENT_PAUSE: Duration = Duration::from_millis(500);
const BETWEEN_OPENERS_PAUSE: Duration = Duration::from_millis(200);

/// Send a parsed model reply.
///
/// Openers go out as separate messages so each one can be forwarded on its
/// own, with short pauses so they arrive in order and read naturally.
pub async fn deliver_reply<M>(messenger: &M, chat_id: ChatId, reply: &Reply) -> Result<()>
where
    M: MessagingPort + ?Sized,
{
    match reply {
        Reply::Plain(text) => {
            messenger.send_text(chat_id, text).await?;
        }
        Reply::Openers { comment, openers } => {
            if !comment.is_empty() {
                messenger.send_text(chat_id, comment).await?;
                tokio::time::sleep(AFTER_COMMENT_PAUSE).await;
            }
            debug!(chat_id = chat_id.0, count = openers.len(), "sending openers");
            for opener in openers {
                messenger.send_text(chat_id, opener).await?;
                tokio::time::sleep(BETWEEN_OPENERS_PAUSE).await;
            }
        }
    }
    Ok(())
}
