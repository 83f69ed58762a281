use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub risk: RiskConfig,
    pub scheduler: SchedulerConfig,
    /// Public base URL of the site payers are sent back to when a
    /// return callback cannot be matched to its payment.
    pub site_url: String,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RiskConfig {
    pub endpoint: Option<String>,
    pub api_key: Secret<String>,
    pub timeout_seconds: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct SchedulerConfig {
    pub page_size: u64,
    pub poll_interval_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("GATEWAY_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("GATEWAY_SERVICE_PORT")
            .unwrap_or_else(|_| "3005".to_string())
            .parse()?;

        let db_url = env::var("GATEWAY_DATABASE_URL").expect("GATEWAY_DATABASE_URL must be set");
        let db_name =
            env::var("GATEWAY_DATABASE_NAME").unwrap_or_else(|_| "gateway_db".to_string());

        let risk_endpoint = env::var("GATEWAY_RISK_ENDPOINT").ok().filter(|s| !s.is_empty());
        let risk_api_key = env::var("GATEWAY_RISK_API_KEY").unwrap_or_default();
        let risk_timeout = env::var("GATEWAY_RISK_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .unwrap_or(20);

        let page_size = env::var("GATEWAY_SCHEDULER_PAGE_SIZE")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);
        let poll_interval_ms = env::var("GATEWAY_SCHEDULER_POLL_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .unwrap_or(1000);

        let site_url =
            env::var("GATEWAY_SITE_URL").unwrap_or_else(|_| "http://localhost:3005".to_string());

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            risk: RiskConfig {
                endpoint: risk_endpoint,
                api_key: Secret::new(risk_api_key),
                timeout_seconds: risk_timeout,
            },
            scheduler: SchedulerConfig {
                page_size,
                poll_interval_ms,
            },
            site_url,
            service_name: "gateway-service".to_string(),
        })
    }
}
