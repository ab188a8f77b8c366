//! Payment gateway adapter.
//!
//! The only place in the service allowed to talk to the external payment
//! processor. Everything else depends on the [`PaymentGateway`] trait; the
//! reqwest implementation lives in [`http`]. The adapter is a pure
//! translation layer: any malformed or incomplete provider response is an
//! operation failure, never coerced into a fabricated success.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

pub mod http;

pub use http::HttpPaymentGateway;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Non-success HTTP status from the provider, with the response body
    /// kept for diagnostics.
    #[error("Payment provider returned HTTP {status}: {body}")]
    Provider { status: u16, body: String },

    /// Network failure or the per-call timeout elapsed.
    #[error("Payment provider unreachable: {0}")]
    Transport(String),

    /// The provider answered 2xx but the body was not what it promises.
    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

#[derive(Clone, Debug)]
pub struct CreateSessionRequest {
    pub description: String,
    pub amount: Decimal,
    pub currency: String,
    pub success_url: String,
    pub failure_url: String,
    pub pending_url: String,
    /// Correlation key echoed back in webhook-resolvable payment records.
    /// This service always passes the order id.
    pub external_reference: String,
    pub payer_email: Option<String>,
}

/// Provider-hosted checkout session the shopper is redirected to.
#[derive(Clone, Debug)]
pub struct CheckoutSession {
    pub id: String,
    pub init_point: String,
    pub sandbox_init_point: Option<String>,
}

impl CheckoutSession {
    /// The URL the UI should navigate to. Prefers the sandbox variant when
    /// sandbox mode is on and the provider supplied one.
    pub fn redirect_url(&self, sandbox: bool) -> &str {
        if sandbox {
            self.sandbox_init_point.as_deref().unwrap_or(&self.init_point)
        } else {
            &self.init_point
        }
    }
}

#[derive(Clone, Debug)]
pub struct Card {
    pub id: String,
    pub last_four: String,
    pub brand: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentLookup {
    pub external_reference: String,
    pub status: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> std::result::Result<CheckoutSession, GatewayError>;

    /// Looks a customer up by email first and only creates a new record
    /// when none exists, so repeated add-card attempts never produce
    /// duplicate customer profiles.
    async fn find_or_create_customer(
        &self,
        email: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> std::result::Result<String, GatewayError>;

    /// Attaches a client-side card token to a customer. The opaque token is
    /// the only card material this system ever handles.
    async fn attach_card(
        &self,
        customer_id: &str,
        card_token: &str,
    ) -> std::result::Result<Card, GatewayError>;

    /// Fetches the authoritative state of a payment. `None` when the
    /// provider cannot resolve the id or the response lacks the external
    /// reference or status.
    async fn payment_status(
        &self,
        payment_id: &str,
    ) -> std::result::Result<Option<PaymentLookup>, GatewayError>;
}
