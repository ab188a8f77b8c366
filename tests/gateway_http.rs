//! Payment gateway adapter tests against a mocked provider.

use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storefront_checkout::gateway::{
    CreateSessionRequest, GatewayError, HttpPaymentGateway, PaymentGateway, PaymentLookup,
};

fn session_request(external_reference: &str) -> CreateSessionRequest {
    CreateSessionRequest {
        description: format!("Order {external_reference}"),
        amount: dec!(20.00),
        currency: "BRL".into(),
        success_url: "https://shop.example/ok".into(),
        failure_url: "https://shop.example/fail".into(),
        pending_url: "https://shop.example/pending".into(),
        external_reference: external_reference.into(),
        payer_email: None,
    }
}

#[tokio::test]
async fn create_checkout_session_sends_bearer_and_reference() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/checkout/preferences"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({
            "external_reference": "O-1",
            "back_urls": { "success": "https://shop.example/ok" },
            "auto_return": "approved"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "pref-1",
            "init_point": "https://pay.example/init",
            "sandbox_init_point": "https://sandbox.pay.example/init"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(server.uri(), "test-token").unwrap();
    let session = gateway
        .create_checkout_session(session_request("O-1"))
        .await
        .unwrap();
    assert_eq!(session.id, "pref-1");
    assert_eq!(session.init_point, "https://pay.example/init");
    assert_eq!(
        session.sandbox_init_point.as_deref(),
        Some("https://sandbox.pay.example/init")
    );
}

#[tokio::test]
async fn provider_error_carries_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/checkout/preferences"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid currency_id"))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(server.uri(), "test-token").unwrap();
    let err = gateway
        .create_checkout_session(session_request("O-1"))
        .await
        .unwrap_err();
    match err {
        GatewayError::Provider { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "invalid currency_id");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn malformed_success_body_is_an_error_not_a_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/checkout/preferences"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>surprise</html>"))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(server.uri(), "test-token").unwrap();
    let err = gateway
        .create_checkout_session(session_request("O-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Malformed(_)));
}

#[tokio::test]
async fn existing_customer_is_reused_not_duplicated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/customers/search"))
        .and(query_param("email", "shopper@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "id": "cus-77" }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/customers"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "cus-new" })))
        .expect(0)
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(server.uri(), "test-token").unwrap();
    let id = gateway
        .find_or_create_customer("shopper@example.com", None, None)
        .await
        .unwrap();
    assert_eq!(id, "cus-77");
}

#[tokio::test]
async fn unknown_customer_is_created() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/customers/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/customers"))
        .and(body_partial_json(json!({
            "email": "new@example.com",
            "first_name": "Ada"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "cus-new" })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(server.uri(), "test-token").unwrap();
    let id = gateway
        .find_or_create_customer("new@example.com", Some("Ada"), None)
        .await
        .unwrap();
    assert_eq!(id, "cus-new");
}

#[tokio::test]
async fn attach_card_maps_token_to_card_summary() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/customers/cus-77/cards"))
        .and(body_partial_json(json!({ "token": "tok-abc" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "card-9",
            "last_four_digits": "4321",
            "payment_method": { "name": "visa" }
        })))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(server.uri(), "test-token").unwrap();
    let card = gateway.attach_card("cus-77", "tok-abc").await.unwrap();
    assert_eq!(card.id, "card-9");
    assert_eq!(card.last_four, "4321");
    assert_eq!(card.brand, "visa");
}

#[tokio::test]
async fn payment_status_resolves_reference_and_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/payments/pay_123"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "external_reference": "O-abc",
            "status": "approved",
            "transaction_amount": 20.0
        })))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(server.uri(), "test-token").unwrap();
    let lookup = gateway.payment_status("pay_123").await.unwrap();
    assert_eq!(
        lookup,
        Some(PaymentLookup {
            external_reference: "O-abc".into(),
            status: "approved".into(),
        })
    );
}

#[tokio::test]
async fn unresolvable_payment_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/payments/pay_404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "payment not found"
        })))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(server.uri(), "test-token").unwrap();
    assert_eq!(gateway.payment_status("pay_404").await.unwrap(), None);
}

#[tokio::test]
async fn payment_without_external_reference_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/payments/pay_55"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "approved"
        })))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(server.uri(), "test-token").unwrap();
    assert_eq!(gateway.payment_status("pay_55").await.unwrap(), None);
}

#[tokio::test]
async fn payment_status_server_error_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/payments/pay_500"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(server.uri(), "test-token").unwrap();
    let err = gateway.payment_status("pay_500").await.unwrap_err();
    assert!(matches!(err, GatewayError::Provider { status: 500, .. }));
}
