use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rizz_core::{
    coach::Coach,
    config::Config,
    debounce::Coalescer,
    messaging::MessagingPort,
    model::{SpeechSynthesizer, Transcriber},
    onboarding::Onboarding,
    pipeline::ChatReplyPipeline,
    users::UserStore,
};
use rizz_payments::PremiumGate;

use crate::handlers;

/// Everything the update handlers need.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub users: Arc<UserStore>,
    pub coach: Arc<Coach>,
    pub onboarding: Arc<Onboarding>,
    pub coalescer: Coalescer<ChatReplyPipeline>,
    pub messenger: Arc<dyn MessagingPort>,
    pub transcriber: Arc<dyn Transcriber>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub gate: Arc<PremiumGate>,
}

/// Long-poll Telegram until `shutdown` fires.
pub async fn run_polling(bot: Bot, state: Arc<AppState>, shutdown: CancellationToken) -> anyhow::Result<()> {
    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "bot started"),
        Err(e) => warn!(error = %e, "get_me failed"),
    }

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|_| async {})
        .build();

    let token = dispatcher.shutdown_token();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        match token.shutdown() {
            Ok(done) => {
                done.await;
                info!("dispatcher stopped");
            }
            Err(e) => warn!(error = %e, "dispatcher was not running"),
        }
    });

    dispatcher.dispatch().await;
    Ok(())
}
