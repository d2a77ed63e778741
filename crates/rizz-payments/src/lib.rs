//! Stripe payments: checkout links, webhook verification and the webhook
//! server that turns completed checkouts into premium credits.

pub mod checkout;
pub mod gate;
pub mod signature;
pub mod webhook;

pub use checkout::StripeClient;
pub use gate::{Access, PremiumGate};
pub use signature::{verify_signature, SignatureError, DEFAULT_TOLERANCE};
pub use webhook::{router, serve, WebhookState};
