use std::sync::Arc;

use teloxide::Bot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rizz_core::{
    coach::{Coach, CoachSettings},
    config::Config,
    debounce::Coalescer,
    history::ChatHistory,
    messaging::MessagingPort,
    onboarding::Onboarding,
    pipeline::ChatReplyPipeline,
    style::StyleStore,
    users::UserStore,
};
use rizz_openai::OpenAiClient;
use rizz_payments::{PremiumGate, StripeClient, WebhookState};
use rizz_telegram::{router::AppState, TelegramMessenger};

#[tokio::main]
async fn main() -> Result<(), rizz_core::Error> {
    rizz_core::logging::init("rizz")?;

    let cfg = Arc::new(Config::load()?);
    info!(
        data_dir = %cfg.data_dir.display(),
        payments = cfg.payments_enabled(),
        "configuration loaded"
    );

    let openai = Arc::new(OpenAiClient::new(cfg.openai.clone())?);
    let users = Arc::new(UserStore::open(cfg.users_file()).await?);
    let styles = Arc::new(StyleStore::open(openai.clone(), cfg.data_dir.join("styles")).await?);
    let history = Arc::new(ChatHistory::new(cfg.history_limit));
    let coach = Arc::new(Coach::new(
        openai.clone(),
        openai.clone(),
        users.clone(),
        history,
        styles,
        CoachSettings {
            temperature: cfg.chat_temperature,
            summary_model: Some(cfg.openai.summary_model.clone()),
        },
    ));

    let bot = Bot::new(cfg.telegram_bot_token.clone());
    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));

    let pipeline = Arc::new(ChatReplyPipeline::new(coach.clone(), messenger.clone()));
    let coalescer = Coalescer::new(pipeline, cfg.debounce());

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    let (gate, webhook) = match &cfg.payments {
        Some(p) => {
            let stripe = StripeClient::new(p.stripe_secret_key.clone())?;
            let state = Arc::new(WebhookState::new(
                p.webhook_secret.clone(),
                p.credits_per_purchase,
                users.clone(),
                messenger.clone(),
            ));
            let port = p.port;
            let token = shutdown.clone();
            let server = tokio::spawn(async move {
                if let Err(e) = rizz_payments::serve(state, port, token.clone()).await {
                    warn!(error = %e, "payment webhook server failed");
                    token.cancel();
                }
            });
            (PremiumGate::new(users.clone(), stripe, p.clone()), Some(server))
        }
        None => (PremiumGate::disabled(users.clone()), None),
    };

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        users: users.clone(),
        coach: coach.clone(),
        onboarding: Arc::new(Onboarding::new(users, coach)),
        coalescer: coalescer.clone(),
        messenger,
        transcriber: openai.clone(),
        speech: openai,
        gate: Arc::new(gate),
    });

    let polled = rizz_telegram::router::run_polling(bot, state, shutdown.clone()).await;

    shutdown.cancel();
    let dropped = coalescer.cancel_all();
    info!(dropped, "cancelled pending replies");
    if let Some(server) = webhook {
        let _ = server.await;
    }

    polled.map_err(|e| rizz_core::Error::External(format!("telegram bot failed: {e}")))
}

fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    warn!(error = %e, "SIGTERM handler unavailable");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("shutdown requested");
        shutdown.cancel();
    });
}
