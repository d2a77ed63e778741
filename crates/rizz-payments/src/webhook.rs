//! Stripe webhook receiver.

use std::{
    collections::{HashSet, VecDeque},
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rizz_core::{
    domain::{ChatId, UserId},
    i18n::{render, MessageKey},
    messaging::MessagingPort,
    users::UserStore,
};

use crate::signature::{verify_signature, DEFAULT_TOLERANCE};

const SIGNATURE_HEADER: &str = "stripe-signature";
const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
/// Stripe stops redelivering after three days; a few thousand ids cover that.
const MAX_TRACKED_EVENTS: usize = 10_000;

/// Recently applied event ids, oldest evicted first.
struct SeenEvents {
    ids: HashSet<String>,
    order: VecDeque<String>,
    cap: usize,
}

impl SeenEvents {
    fn new(cap: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    /// `false` when `id` was already recorded.
    fn insert(&mut self, id: &str) -> bool {
        if !self.ids.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        while self.order.len() > self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    fn remove(&mut self, id: &str) {
        if self.ids.remove(id) {
            self.order.retain(|e| e != id);
        }
    }
}

pub struct WebhookState {
    webhook_secret: String,
    credits_per_purchase: u32,
    users: Arc<UserStore>,
    messenger: Arc<dyn MessagingPort>,
    processed: Mutex<SeenEvents>,
}

impl WebhookState {
    pub fn new(
        webhook_secret: impl Into<String>,
        credits_per_purchase: u32,
        users: Arc<UserStore>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            credits_per_purchase,
            users,
            messenger,
            processed: Mutex::new(SeenEvents::new(MAX_TRACKED_EVENTS)),
        }
    }

    /// Verify and apply one webhook delivery. `now` is unix seconds.
    pub async fn handle(&self, signature: Option<&str>, body: &[u8], now: i64) -> (StatusCode, String) {
        let Some(signature) = signature else {
            return (StatusCode::BAD_REQUEST, "missing signature".to_string());
        };
        if let Err(e) = verify_signature(body, signature, &self.webhook_secret, now, DEFAULT_TOLERANCE) {
            warn!(error = %e, "rejected webhook");
            return (StatusCode::BAD_REQUEST, format!("webhook error: {e}"));
        }

        let event: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => return (StatusCode::BAD_REQUEST, format!("webhook error: {e}")),
        };
        let event_type = event["type"].as_str().unwrap_or_default();
        let event_id = event["id"].as_str().unwrap_or_default().to_string();

        if event_type != CHECKOUT_COMPLETED {
            debug!(event_type, "ignoring webhook event");
            return (StatusCode::OK, "ignored".to_string());
        }

        let session = &event["data"]["object"];
        if session["payment_status"].as_str() == Some("unpaid") {
            info!(event_id, "checkout completed without payment");
            return (StatusCode::OK, "unpaid".to_string());
        }
        let Some(user_id) = session_user(session) else {
            warn!(event_id, "checkout session without user reference");
            return (StatusCode::OK, "no user".to_string());
        };

        if !event_id.is_empty() && !self.mark_processed(&event_id) {
            debug!(event_id, "duplicate webhook delivery");
            return (StatusCode::OK, "duplicate".to_string());
        }

        let balance = match self.users.grant_credits(user_id, self.credits_per_purchase).await {
            Ok(b) => b,
            Err(e) => {
                error!(user_id = user_id.0, error = %e, "failed to grant credits");
                // Let Stripe redeliver.
                self.forget(&event_id);
                return (StatusCode::INTERNAL_SERVER_ERROR, "grant failed".to_string());
            }
        };
        info!(user_id = user_id.0, balance, "checkout completed");

        let lang = self.users.language(user_id).await;
        let credits = self.credits_per_purchase.to_string();
        let msg = render(lang, MessageKey::PaymentReceived, &[("credits", &credits)]);
        if let Err(e) = self.messenger.send_text(ChatId(user_id.0), &msg).await {
            warn!(user_id = user_id.0, error = %e, "failed to notify payment");
        }

        (StatusCode::OK, "ok".to_string())
    }

    fn mark_processed(&self, event_id: &str) -> bool {
        match self.processed.lock() {
            Ok(mut seen) => seen.insert(event_id),
            Err(poisoned) => poisoned.into_inner().insert(event_id),
        }
    }

    fn forget(&self, event_id: &str) {
        match self.processed.lock() {
            Ok(mut seen) => seen.remove(event_id),
            Err(poisoned) => poisoned.into_inner().remove(event_id),
        }
    }
}

fn session_user(session: &Value) -> Option<UserId> {
    let parse = |v: &Value| match v {
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    };
    parse(&session["metadata"]["user_id"])
        .or_else(|| parse(&session["client_reference_id"]))
        .map(UserId)
}

pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn webhook_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let now = chrono::Utc::now().timestamp();
    state.handle(signature, body.as_bytes(), now).await.into_response()
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Bind `0.0.0.0:port` and serve until `shutdown` fires.
pub async fn serve(state: Arc<WebhookState>, port: u16, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, state, shutdown).await
}

pub async fn serve_listener(
    listener: TcpListener,
    state: Arc<WebhookState>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "payment webhook listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("payment webhook stopped");
    Ok(())
}
