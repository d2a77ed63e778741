use std::sync::Arc;

use tracing::debug;

use rizz_core::{config::PaymentsConfig, domain::UserId, users::UserStore, Result};

use crate::checkout::StripeClient;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Access {
    Granted,
    /// No credits left; the user should pay at this checkout URL.
    PaymentRequired(String),
}

/// Meters premium replies against the user's credit balance.
///
/// Without a payments config every request is granted.
pub struct PremiumGate {
    users: Arc<UserStore>,
    payments: Option<(StripeClient, PaymentsConfig)>,
}

impl PremiumGate {
    pub fn disabled(users: Arc<UserStore>) -> Self {
        Self { users, payments: None }
    }

    pub fn new(users: Arc<UserStore>, stripe: StripeClient, cfg: PaymentsConfig) -> Self {
        Self {
            users,
            payments: Some((stripe, cfg)),
        }
    }

    pub fn enabled(&self) -> bool {
        self.payments.is_some()
    }

    /// Spend one credit for a premium reply, or produce a payment link.
    pub async fn check(&self, user_id: UserId) -> Result<Access> {
        let Some((stripe, cfg)) = &self.payments else {
            return Ok(Access::Granted);
        };
        if self.users.consume_credit(user_id).await? {
            return Ok(Access::Granted);
        }
        debug!(user_id = user_id.0, "no credits left");
        let url = stripe.create_checkout_session(user_id, cfg).await?;
        Ok(Access::PaymentRequired(url))
    }

    /// A fresh checkout link, or `None` when payments are off.
    pub async fn payment_link(&self, user_id: UserId) -> Result<Option<String>> {
        match &self.payments {
            Some((stripe, cfg)) => Ok(Some(stripe.create_checkout_session(user_id, cfg).await?)),
            None => Ok(None),
        }
    }

    pub async fn balance(&self, user_id: UserId) -> u32 {
        self.users.get(user_id).await.map(|p| p.credits).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::tests::payments_config;

    #[tokio::test]
    async fn disabled_gate_always_grants() {
        let users = Arc::new(UserStore::in_memory());
        let gate = PremiumGate::disabled(users.clone());
        assert!(!gate.enabled());
        assert_eq!(gate.check(UserId(1)).await.unwrap(), Access::Granted);
        assert_eq!(gate.payment_link(UserId(1)).await.unwrap(), None);
        assert!(users.get(UserId(1)).await.is_none());
    }

    #[tokio::test]
    async fn credits_are_spent_one_per_check() {
        let users = Arc::new(UserStore::in_memory());
        users.grant_credits(UserId(2), 2).await.unwrap();
        // Never reached while the user still has credits.
        let stripe = StripeClient::with_base("sk_test", "http://127.0.0.1:9").unwrap();
        let gate = PremiumGate::new(users.clone(), stripe, payments_config());

        assert_eq!(gate.check(UserId(2)).await.unwrap(), Access::Granted);
        assert_eq!(gate.check(UserId(2)).await.unwrap(), Access::Granted);
        assert_eq!(gate.balance(UserId(2)).await, 0);
    }

    #[tokio::test]
    async fn exhausted_balance_surfaces_checkout_errors() {
        let users = Arc::new(UserStore::in_memory());
        let stripe = StripeClient::with_base("sk_test", "http://127.0.0.1:9").unwrap();
        let gate = PremiumGate::new(users, stripe, payments_config());
        assert!(gate.check(UserId(3)).await.is_err());
    }
}
