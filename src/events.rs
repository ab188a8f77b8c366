//! Best-effort event publishing.
//!
//! Order lifecycle events go out over NATS when a client is configured.
//! Publishing never fails the surrounding request; a broken broker costs
//! observability, not orders.

use tracing::warn;

#[derive(Clone, Default)]
pub struct EventPublisher {
    client: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(client: Option<async_nats::Client>) -> Self {
        Self { client }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub async fn publish(&self, subject: &'static str, payload: serde_json::Value) {
        let Some(client) = &self.client else {
            return;
        };
        let bytes = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(subject, error = %e, "failed to encode event");
                return;
            }
        };
        if let Err(e) = client.publish(subject.to_string(), bytes.into()).await {
            warn!(subject, error = %e, "failed to publish event");
        }
    }
}
