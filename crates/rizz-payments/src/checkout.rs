use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use rizz_core::{config::PaymentsConfig, domain::UserId, errors::Error, Result};

const STRIPE_API: &str = "https://api.stripe.com/v1";

/// Minimal Stripe client for hosted checkout sessions.
#[derive(Clone, Debug)]
pub struct StripeClient {
    secret_key: String,
    api_base: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>) -> Result<Self> {
        Self::with_base(secret_key, STRIPE_API)
    }

    pub fn with_base(secret_key: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Payment(format!("stripe client build error: {e}")))?;
        Ok(Self {
            secret_key: secret_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Create a one-off card checkout for `user_id` and return its URL.
    pub async fn create_checkout_session(&self, user_id: UserId, cfg: &PaymentsConfig) -> Result<String> {
        let form = checkout_form(user_id, cfg);
        let resp = self
            .http
            .post(format!("{}/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, Some(""))
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Payment(format!("stripe request error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Payment(format!(
                "stripe checkout failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let session: CheckoutSession = resp
            .json()
            .await
            .map_err(|e| Error::Payment(format!("stripe json error: {e}")))?;
        debug!(session_id = %session.id, "checkout session created");

        let url = session
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::Payment("stripe session has no url".to_string()))?;
        info!(user_id = user_id.0, session_id = %session.id, "payment link issued");
        Ok(url)
    }
}

/// Form fields for `POST /v1/checkout/sessions`.
pub fn checkout_form(user_id: UserId, cfg: &PaymentsConfig) -> Vec<(String, String)> {
    let user = user_id.0.to_string();
    [
        ("payment_method_types[0]", "card".to_string()),
        ("mode", "payment".to_string()),
        ("line_items[0][price_data][currency]", cfg.currency.to_ascii_lowercase()),
        (
            "line_items[0][price_data][product_data][name]",
            format!("Unlock {} credits", cfg.credits_per_purchase),
        ),
        ("line_items[0][price_data][unit_amount]", cfg.price_cents.to_string()),
        ("line_items[0][quantity]", "1".to_string()),
        ("success_url", cfg.success_url.clone()),
        ("cancel_url", cfg.cancel_url.clone()),
        ("client_reference_id", user.clone()),
        ("metadata[user_id]", user),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn payments_config() -> PaymentsConfig {
        PaymentsConfig {
            stripe_secret_key: "sk_test".to_string(),
            webhook_secret: "whsec_test".to_string(),
            success_url: "https://t.me/rizz_bot".to_string(),
            cancel_url: "https://t.me/rizz_bot".to_string(),
            port: 0,
            price_cents: 499,
            currency: "EUR".to_string(),
            credits_per_purchase: 10,
        }
    }

    fn field<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
        form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn form_carries_price_and_user_reference() {
        let form = checkout_form(UserId(77), &payments_config());
        assert_eq!(field(&form, "mode"), Some("payment"));
        assert_eq!(field(&form, "line_items[0][price_data][currency]"), Some("eur"));
        assert_eq!(field(&form, "line_items[0][price_data][unit_amount]"), Some("499"));
        assert_eq!(
            field(&form, "line_items[0][price_data][product_data][name]"),
            Some("Unlock 10 credits")
        );
        assert_eq!(field(&form, "client_reference_id"), Some("77"));
        assert_eq!(field(&form, "metadata[user_id]"), Some("77"));
    }

    #[test]
    fn api_base_is_normalized() {
        let client = StripeClient::with_base("sk", "http://localhost:12111/v1/").unwrap();
        assert_eq!(client.api_base, "http://localhost:12111/v1");
    }
}
