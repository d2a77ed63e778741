//! Outbound messenger abstraction (Telegram today).

pub mod delivery;
pub mod port;
pub mod types;

pub use delivery::deliver_reply;
pub use port::MessagingPort;
pub use types::{ChatAction, InlineButton, InlineKeyboard};
