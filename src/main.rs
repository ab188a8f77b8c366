//! Storefront Checkout - order checkout and payment reconciliation service

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_checkout::checkout::CheckoutService;
use storefront_checkout::config::Config;
use storefront_checkout::events::EventPublisher;
use storefront_checkout::gateway::HttpPaymentGateway;
use storefront_checkout::http::{self, AppState};
use storefront_checkout::stores::{PgOrderStore, PgProductStockStore};
use storefront_checkout::webhook::WebhookService;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events disabled");
                None
            }
        },
        None => None,
    };
    let events = EventPublisher::new(nats);

    let gateway = Arc::new(HttpPaymentGateway::new(
        config.payment_api_base_url.clone(),
        config.payment_access_token.clone(),
    )?);
    let orders = Arc::new(PgOrderStore::new(db.clone()));
    let products = Arc::new(PgProductStockStore::new(db.clone()));

    let checkout = CheckoutService::new(
        orders.clone(),
        products,
        gateway.clone(),
        events.clone(),
        config.payment_sandbox,
    );
    let webhook = WebhookService::new(orders.clone(), gateway, events);

    // Compensation sweep: cancel orders stuck in pending_payment with no
    // payment reference and return their stock.
    let sweep = checkout.clone();
    let ttl_secs = config.abandoned_order_ttl_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(ttl_secs));
        interval.tick().await;
        loop {
            interval.tick().await;
            match sweep
                .release_abandoned(chrono::Duration::seconds(ttl_secs as i64))
                .await
            {
                Ok(0) => {}
                Ok(n) => tracing::info!(count = n, "released abandoned orders"),
                Err(e) => tracing::error!(error = %e, "abandoned-order sweep failed"),
            }
        }
    });

    let app = http::router(AppState {
        checkout,
        webhook,
        orders,
    });
    tracing::info!("🚀 Storefront checkout listening on 0.0.0.0:{}", config.port);
    axum::serve(
        tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?,
        app,
    )
    .await?;
    Ok(())
}
