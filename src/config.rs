use std::env;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub razorpay_key_id: String,
    pub razorpay_key_secret: String,
    pub razorpay_webhook_secret: String,
    /// Accept unsigned webhooks when no secret is set. Local development only.
    pub razorpay_webhook_insecure: bool,
    pub razorpay_api_base: String,
    pub payment_currency: String,
    pub gateway_max_attempts: u32,
    pub allowed_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET is not set")?;
        let razorpay_key_secret =
            env::var("RAZORPAY_KEY_SECRET").context("RAZORPAY_KEY_SECRET is not set")?;
        let razorpay_webhook_insecure = env::var("RAZORPAY_WEBHOOK_INSECURE")
            .map(|v| matches!(v.trim(), "1" | "true"))
            .unwrap_or(false);
        let razorpay_webhook_secret = webhook_secret(
            env::var("RAZORPAY_WEBHOOK_SECRET").ok(),
            razorpay_webhook_insecure,
        )?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let gateway_max_attempts = env::var("GATEWAY_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(3)
            .max(1);

        let mut allowed_origins = vec![
            "http://localhost:3000".to_string(),
            "http://localhost:5000".to_string(),
        ];
        if let Some(frontend) = env::var("FRONTEND_URL").ok().filter(|v| !v.is_empty()) {
            allowed_origins.push(frontend);
        }

        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret,
            razorpay_key_id: env::var("RAZORPAY_KEY_ID").unwrap_or_default(),
            razorpay_key_secret,
            razorpay_webhook_secret,
            razorpay_webhook_insecure,
            razorpay_api_base: env::var("RAZORPAY_API_BASE")
                .unwrap_or_else(|_| "https://api.razorpay.com".to_string()),
            payment_currency: env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "INR".to_string()),
            gateway_max_attempts,
            allowed_origins,
        })
    }

    /// Configuration for tests and tools that never read the environment.
    pub fn for_database(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            host: "127.0.0.1".to_string(),
            port: 0,
            jwt_secret: "test-jwt-secret".to_string(),
            razorpay_key_id: "rzp_test_key".to_string(),
            razorpay_key_secret: "test_secret".to_string(),
            razorpay_webhook_secret: "test_webhook_secret".to_string(),
            razorpay_webhook_insecure: false,
            razorpay_api_base: "http://127.0.0.1:9".to_string(),
            payment_currency: "INR".to_string(),
            gateway_max_attempts: 1,
            allowed_origins: Vec::new(),
        }
    }
}

fn webhook_secret(secret: Option<String>, insecure: bool) -> anyhow::Result<String> {
    match secret.filter(|v| !v.trim().is_empty()) {
        Some(secret) => Ok(secret),
        None if insecure => Ok(String::new()),
        None => anyhow::bail!(
            "RAZORPAY_WEBHOOK_SECRET is not set (set RAZORPAY_WEBHOOK_INSECURE=1 to accept unsigned webhooks locally)"
        ),
    }
}
