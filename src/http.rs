//! HTTP surface: router, application state and request/response DTOs.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use validator::Validate;

use crate::checkout::{CheckoutCommand, CheckoutItem, CheckoutService};
use crate::domain::ShippingSummary;
use crate::stores::OrderStore;
use crate::webhook::WebhookService;
use crate::CheckoutError;

#[derive(Clone)]
pub struct AppState {
    pub checkout: CheckoutService,
    pub webhook: WebhookService,
    pub orders: Arc<dyn OrderStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/webhooks/payments", post(payment_webhook))
        .route("/api/v1/orders/:id", get(get_order))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "healthy", "service": "storefront-checkout"}))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub user_id: String,
    #[validate(length(min = 1, message = "items must not be empty"))]
    pub items: Vec<CheckoutItemRequest>,
    pub shipping: Option<ShippingRequest>,
    pub currency: String,
    pub success_url: String,
    pub failure_url: String,
    pub pending_url: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItemRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingRequest {
    pub address_line: String,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    pub total_amount: Decimal,
    pub currency: String,
}

async fn checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Response {
    if let Err(e) = request.validate() {
        let error = if request.items.is_empty() {
            CheckoutError::EmptyItems
        } else {
            CheckoutError::InvalidItem(e.to_string())
        };
        return checkout_failure(&error, &request.currency);
    }

    let command = CheckoutCommand {
        user_id: request.user_id,
        items: request
            .items
            .into_iter()
            .map(|i| CheckoutItem {
                product_id: i.product_id,
                quantity: i.quantity,
            })
            .collect(),
        shipping: request.shipping.map(|s| ShippingSummary {
            address_line: s.address_line,
            city: s.city,
            state: s.state,
        }),
        currency: request.currency.clone(),
        success_url: request.success_url,
        failure_url: request.failure_url,
        pending_url: request.pending_url,
    };

    match state.checkout.checkout(command).await {
        Ok(outcome) => Json(CheckoutResponse {
            success: true,
            error_code: None,
            error_message: None,
            order_id: Some(outcome.order_id),
            checkout_url: Some(outcome.checkout_url),
            total_amount: outcome.total,
            currency: outcome.currency,
        })
        .into_response(),
        Err(error) => checkout_failure(&error, &request.currency),
    }
}

/// Maps a checkout error onto the wire shape. Gateway and storage failures
/// surface as a generic message; provider internals stay in the logs.
fn checkout_failure(error: &CheckoutError, currency: &str) -> Response {
    let (status, message) = match error {
        e if e.is_caller_error() => (StatusCode::BAD_REQUEST, e.to_string()),
        CheckoutError::Gateway(e) => {
            tracing::error!(error = %e, "payment gateway failure during checkout");
            (
                StatusCode::BAD_GATEWAY,
                "Payment system unavailable, please try again".to_string(),
            )
        }
        e => {
            tracing::error!(error = %e, "checkout failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
        }
    };
    (
        status,
        Json(CheckoutResponse {
            success: false,
            error_code: Some(error.code().to_string()),
            error_message: Some(message),
            order_id: None,
            checkout_url: None,
            total_amount: Decimal::ZERO,
            currency: currency.to_string(),
        }),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    #[serde(rename = "type")]
    pub notification_type: String,
    #[serde(default)]
    pub data: Option<WebhookData>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub processed: bool,
}

/// Provider notifications. Structurally invalid JSON or a missing `type`
/// field is a 400; everything else answers 200 with the disposition so the
/// provider's retry loop settles.
async fn payment_webhook(
    State(state): State<AppState>,
    request: Result<Json<WebhookRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = request else {
        return (StatusCode::BAD_REQUEST, "invalid webhook payload").into_response();
    };
    let payment_id = request.data.as_ref().and_then(|d| d.id.as_deref());
    match state
        .webhook
        .process(&request.notification_type, payment_id)
        .await
    {
        Ok(disposition) => Json(WebhookResponse {
            processed: disposition.processed(),
        })
        .into_response(),
        Err(e) => {
            // A hard failure (gateway or store) answers non-2xx so the
            // provider redelivers.
            tracing::error!(error = %e, "webhook reconciliation failed");
            (StatusCode::BAD_GATEWAY, "reconciliation failed").into_response()
        }
    }
}

async fn get_order(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.orders.order(&id).await {
        Ok(Some(order)) => Json(order).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "order not found").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to load order");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}
