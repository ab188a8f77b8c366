//! Environment-driven configuration.

use anyhow::{Context, Result};

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub payment_api_base_url: String,
    /// Bearer credential for the payment provider. Never logged.
    pub payment_access_token: String,
    pub payment_sandbox: bool,
    pub nats_url: Option<String>,
    pub abandoned_order_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8084".to_string())
                .parse()
                .context("PORT must be a port number")?,
            payment_api_base_url: std::env::var("PAYMENT_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.mercadopago.com".to_string()),
            payment_access_token: std::env::var("PAYMENT_ACCESS_TOKEN")
                .context("PAYMENT_ACCESS_TOKEN is required")?,
            payment_sandbox: std::env::var("PAYMENT_SANDBOX")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            nats_url: std::env::var("NATS_URL").ok(),
            abandoned_order_ttl_secs: std::env::var("ABANDONED_ORDER_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1800),
        })
    }
}
