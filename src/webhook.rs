//! Webhook reconciliation.
//!
//! Converts an inbound, untrusted, at-least-once-delivered payment
//! notification into an authoritative order status update. The
//! notification body is never trusted beyond the payment id: every
//! delivery re-fetches the payment from the gateway, so replays and
//! out-of-order deliveries cannot regress an order.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument, warn};

use crate::domain::{OrderStatus, StatusWrite};
use crate::events::EventPublisher;
use crate::gateway::PaymentGateway;
use crate::stores::OrderStore;
use crate::{CheckoutError, Result};

/// The only notification type this service acts on; the provider sends
/// several others (merchant orders, chargeback previews) that are no-ops
/// here.
pub const PAYMENT_NOTIFICATION_TYPE: &str = "payment";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// The notification led to an authoritative status reconciliation.
    Processed,
    /// The notification was not for us, or could not be resolved; not an
    /// error.
    Ignored,
}

impl WebhookDisposition {
    pub fn processed(self) -> bool {
        self == Self::Processed
    }
}

#[derive(Clone)]
pub struct WebhookService {
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    events: EventPublisher,
}

impl WebhookService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        events: EventPublisher,
    ) -> Self {
        Self {
            orders,
            gateway,
            events,
        }
    }

    #[instrument(skip(self))]
    pub async fn process(
        &self,
        notification_type: &str,
        payment_id: Option<&str>,
    ) -> Result<WebhookDisposition> {
        if notification_type != PAYMENT_NOTIFICATION_TYPE {
            return Ok(WebhookDisposition::Ignored);
        }
        let Some(payment_id) = payment_id else {
            return Ok(WebhookDisposition::Ignored);
        };

        let Some(lookup) = self.gateway.payment_status(payment_id).await? else {
            // Unresolvable id or incomplete payment record on the provider
            // side; they will redeliver once it settles.
            return Ok(WebhookDisposition::Ignored);
        };

        let status = OrderStatus::from_provider(&lookup.status);
        match self
            .orders
            .set_status(&lookup.external_reference, status.clone())
            .await
        {
            Ok(StatusWrite::Updated) => {
                info!(order_id = %lookup.external_reference, status = %status, "order reconciled");
                self.events
                    .publish(
                        "order.status_changed",
                        json!({ "order_id": lookup.external_reference, "status": status.as_str() }),
                    )
                    .await;
                Ok(WebhookDisposition::Processed)
            }
            // Redelivery of an already-applied status.
            Ok(StatusWrite::Unchanged) => Ok(WebhookDisposition::Processed),
            Ok(StatusWrite::Refused) => {
                warn!(
                    order_id = %lookup.external_reference,
                    status = %status,
                    "refused status regression from stale notification"
                );
                Ok(WebhookDisposition::Processed)
            }
            Err(CheckoutError::OrderNotFound) => {
                warn!(
                    external_reference = %lookup.external_reference,
                    "payment resolved to an unknown order"
                );
                Ok(WebhookDisposition::Ignored)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LineItem, Order};
    use crate::gateway::{
        Card, CheckoutSession, CreateSessionRequest, GatewayError, PaymentLookup,
    };
    use crate::stores::{MemoryStore, OrderStore};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    /// Gateway double whose fetch-status endpoint answers from a fixed map.
    struct MapGateway {
        payments: HashMap<String, PaymentLookup>,
    }

    impl MapGateway {
        fn resolving(payment_id: &str, external_reference: &str, status: &str) -> Self {
            let mut payments = HashMap::new();
            payments.insert(
                payment_id.to_string(),
                PaymentLookup {
                    external_reference: external_reference.to_string(),
                    status: status.to_string(),
                },
            );
            Self { payments }
        }

        fn empty() -> Self {
            Self {
                payments: HashMap::new(),
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for MapGateway {
        async fn create_checkout_session(
            &self,
            _request: CreateSessionRequest,
        ) -> std::result::Result<CheckoutSession, GatewayError> {
            unreachable!("webhook path never opens sessions")
        }

        async fn find_or_create_customer(
            &self,
            _email: &str,
            _first_name: Option<&str>,
            _last_name: Option<&str>,
        ) -> std::result::Result<String, GatewayError> {
            unreachable!("webhook path never creates customers")
        }

        async fn attach_card(
            &self,
            _customer_id: &str,
            _card_token: &str,
        ) -> std::result::Result<Card, GatewayError> {
            unreachable!("webhook path never attaches cards")
        }

        async fn payment_status(
            &self,
            payment_id: &str,
        ) -> std::result::Result<Option<PaymentLookup>, GatewayError> {
            Ok(self.payments.get(payment_id).cloned())
        }
    }

    async fn store_with_order(order_id: &str) -> MemoryStore {
        let store = MemoryStore::new();
        let order = Order::new(
            order_id,
            "u1",
            "BRL",
            vec![LineItem {
                product_id: "p1".into(),
                name: "Product p1".into(),
                unit_price: dec!(10.00),
                quantity: 1,
            }],
            None,
        );
        store
            .put_product(crate::stores::StockRecord {
                id: "p1".into(),
                name: "Product p1".into(),
                unit_price: dec!(10.00),
                available: 1,
            })
            .await;
        store.create_reserving_stock(&order).await.unwrap();
        store
    }

    fn service(store: &MemoryStore, gateway: MapGateway) -> WebhookService {
        WebhookService::new(
            Arc::new(store.clone()),
            Arc::new(gateway),
            EventPublisher::disabled(),
        )
    }

    #[tokio::test]
    async fn approved_payment_updates_the_referenced_order() {
        let store = store_with_order("O-abc").await;
        let svc = service(&store, MapGateway::resolving("pay_123", "O-abc", "approved"));

        let disposition = svc.process("payment", Some("pay_123")).await.unwrap();
        assert!(disposition.processed());
        let order = store.order("O-abc").await.unwrap().unwrap();
        assert_eq!(order.status(), &OrderStatus::Approved);
    }

    #[tokio::test]
    async fn non_payment_types_and_missing_ids_are_ignored() {
        let store = store_with_order("O-abc").await;
        let svc = service(&store, MapGateway::resolving("pay_123", "O-abc", "approved"));

        assert!(!svc
            .process("merchant_order", None)
            .await
            .unwrap()
            .processed());
        assert!(!svc.process("payment", None).await.unwrap().processed());
        // No order touched either way.
        let order = store.order("O-abc").await.unwrap().unwrap();
        assert_eq!(order.status(), &OrderStatus::PendingPayment);
    }

    #[tokio::test]
    async fn unresolvable_payment_is_ignored() {
        let store = store_with_order("O-abc").await;
        let svc = service(&store, MapGateway::empty());

        assert!(!svc
            .process("payment", Some("pay_999"))
            .await
            .unwrap()
            .processed());
    }

    #[tokio::test]
    async fn unknown_external_reference_is_ignored() {
        let store = store_with_order("O-abc").await;
        let svc = service(&store, MapGateway::resolving("pay_123", "O-zzz", "approved"));

        assert!(!svc
            .process("payment", Some("pay_123"))
            .await
            .unwrap()
            .processed());
    }

    #[tokio::test]
    async fn redelivery_is_idempotent() {
        let store = store_with_order("O-abc").await;
        let svc = service(&store, MapGateway::resolving("pay_123", "O-abc", "approved"));

        assert!(svc.process("payment", Some("pay_123")).await.unwrap().processed());
        assert!(svc.process("payment", Some("pay_123")).await.unwrap().processed());
        let order = store.order("O-abc").await.unwrap().unwrap();
        assert_eq!(order.status(), &OrderStatus::Approved);
    }

    #[tokio::test]
    async fn stale_notification_cannot_regress_a_finalized_order() {
        let store = store_with_order("O-abc").await;
        store
            .set_status("O-abc", OrderStatus::Approved)
            .await
            .unwrap();

        // The provider's fetch now (incorrectly, or stalely) says pending.
        let svc = service(&store, MapGateway::resolving("pay_123", "O-abc", "in_process"));
        assert!(svc.process("payment", Some("pay_123")).await.unwrap().processed());

        let order = store.order("O-abc").await.unwrap().unwrap();
        assert_eq!(order.status(), &OrderStatus::Approved);
    }

    #[tokio::test]
    async fn provider_finalizing_a_pending_order_moves_it_forward() {
        let store = store_with_order("O-abc").await;
        let pending = service(&store, MapGateway::resolving("pay_123", "O-abc", "in_process"));
        pending.process("payment", Some("pay_123")).await.unwrap();
        assert_eq!(
            store.order("O-abc").await.unwrap().unwrap().status(),
            &OrderStatus::Pending
        );

        let approved = service(&store, MapGateway::resolving("pay_123", "O-abc", "approved"));
        approved.process("payment", Some("pay_123")).await.unwrap();
        assert_eq!(
            store.order("O-abc").await.unwrap().unwrap().status(),
            &OrderStatus::Approved
        );
    }

    #[tokio::test]
    async fn unrecognized_provider_status_is_recorded_verbatim() {
        let store = store_with_order("O-abc").await;
        let svc = service(
            &store,
            MapGateway::resolving("pay_123", "O-abc", "authorized_pending_capture"),
        );
        svc.process("payment", Some("pay_123")).await.unwrap();
        assert_eq!(
            store.order("O-abc").await.unwrap().unwrap().status(),
            &OrderStatus::Unknown("authorized_pending_capture".into())
        );
    }
}
