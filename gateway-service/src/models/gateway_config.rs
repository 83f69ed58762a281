//! Gateway configuration model.
//!
//! A persisted record binding a provider integration and its settings to a
//! mode. Read-only to the orchestrator; resolved once per payment start and
//! cached on the payment.

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Provider integration tag. The gateway registry maps each tag to a
/// factory; anything it does not know resolves to no gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Hosted,
    Mock,
    #[serde(other)]
    Unknown,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Hosted => "hosted",
            Provider::Mock => "mock",
            Provider::Unknown => "unknown",
        }
    }
}

/// Gateway mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayMode {
    Test,
    Live,
}

impl GatewayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayMode::Test => "test",
            GatewayMode::Live => "live",
        }
    }
}

/// A gateway configuration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub provider: Provider,
    pub mode: GatewayMode,
    /// Provider-specific credentials and settings.
    pub settings: HashMap<String, String>,
    pub is_default: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl GatewayConfig {
    pub fn new(provider: Provider, mode: GatewayMode) -> Self {
        let now = DateTime::now();
        Self {
            id: Uuid::new_v4(),
            provider,
            mode,
            settings: HashMap::new(),
            is_default: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}
