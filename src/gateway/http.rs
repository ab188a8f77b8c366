//! Reqwest implementation of the payment gateway adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    Card, CheckoutSession, CreateSessionRequest, GatewayError, PaymentGateway, PaymentLookup,
};

/// Fixed per-call budget; a stalled provider call is a hard failure, never
/// retried within the request.
const CALL_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
    access_token: String,
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(CALL_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Turns a non-success response into a `Provider` error carrying the
    /// provider's status code and body.
    async fn check(response: Response) -> Result<Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Provider {
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}

// Wire shapes of the provider API. Amounts travel as decimal strings; the
// provider accepts numeric strings and this side never rounds through
// floats.

#[derive(Serialize)]
struct PreferenceItem<'a> {
    title: &'a str,
    quantity: u32,
    unit_price: Decimal,
    currency_id: &'a str,
}

#[derive(Serialize)]
struct BackUrls<'a> {
    success: &'a str,
    failure: &'a str,
    pending: &'a str,
}

#[derive(Serialize)]
struct Payer<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct PreferenceBody<'a> {
    items: Vec<PreferenceItem<'a>>,
    back_urls: BackUrls<'a>,
    external_reference: &'a str,
    auto_return: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payer: Option<Payer<'a>>,
}

#[derive(Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: String,
    sandbox_init_point: Option<String>,
}

#[derive(Deserialize)]
struct CustomerSearchResponse {
    #[serde(default)]
    results: Vec<CustomerResponse>,
}

#[derive(Deserialize)]
struct CustomerResponse {
    id: String,
}

#[derive(Serialize)]
struct CreateCustomerBody<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_name: Option<&'a str>,
}

#[derive(Serialize)]
struct CardBody<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct CardResponse {
    id: String,
    last_four_digits: String,
    payment_method: Option<CardPaymentMethod>,
}

#[derive(Deserialize)]
struct CardPaymentMethod {
    name: String,
}

#[derive(Deserialize)]
struct PaymentResponse {
    external_reference: Option<String>,
    status: Option<String>,
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        debug!(external_reference = %request.external_reference, "creating checkout session");
        let body = PreferenceBody {
            items: vec![PreferenceItem {
                title: &request.description,
                quantity: 1,
                unit_price: request.amount,
                currency_id: &request.currency,
            }],
            back_urls: BackUrls {
                success: &request.success_url,
                failure: &request.failure_url,
                pending: &request.pending_url,
            },
            external_reference: &request.external_reference,
            auto_return: "approved",
            payer: request.payer_email.as_deref().map(|email| Payer { email }),
        };
        let response = self
            .client
            .post(self.url("/checkout/preferences"))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        let preference: PreferenceResponse = Self::decode(Self::check(response).await?).await?;
        Ok(CheckoutSession {
            id: preference.id,
            init_point: preference.init_point,
            sandbox_init_point: preference.sandbox_init_point,
        })
    }

    async fn find_or_create_customer(
        &self,
        email: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<String, GatewayError> {
        let response = self
            .client
            .get(self.url("/v1/customers/search"))
            .bearer_auth(&self.access_token)
            .query(&[("email", email)])
            .send()
            .await?;
        let search: CustomerSearchResponse = Self::decode(Self::check(response).await?).await?;
        if let Some(existing) = search.results.into_iter().next() {
            debug!(customer_id = %existing.id, "found existing customer");
            return Ok(existing.id);
        }

        let response = self
            .client
            .post(self.url("/v1/customers"))
            .bearer_auth(&self.access_token)
            .json(&CreateCustomerBody {
                email,
                first_name,
                last_name,
            })
            .send()
            .await?;
        let created: CustomerResponse = Self::decode(Self::check(response).await?).await?;
        Ok(created.id)
    }

    async fn attach_card(
        &self,
        customer_id: &str,
        card_token: &str,
    ) -> Result<Card, GatewayError> {
        let response = self
            .client
            .post(self.url(&format!("/v1/customers/{customer_id}/cards")))
            .bearer_auth(&self.access_token)
            .json(&CardBody { token: card_token })
            .send()
            .await?;
        let card: CardResponse = Self::decode(Self::check(response).await?).await?;
        Ok(Card {
            id: card.id,
            last_four: card.last_four_digits,
            brand: card
                .payment_method
                .map(|m| m.name)
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    async fn payment_status(
        &self,
        payment_id: &str,
    ) -> Result<Option<PaymentLookup>, GatewayError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/payments/{payment_id}")))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let payment: PaymentResponse = Self::decode(Self::check(response).await?).await?;
        match (payment.external_reference, payment.status) {
            (Some(external_reference), Some(status)) => Ok(Some(PaymentLookup {
                external_reference,
                status,
            })),
            _ => Ok(None),
        }
    }
}
