//! Gateway registry.
//!
//! Static map from provider tag to a factory building the concrete
//! gateway from a configuration record. Unknown tags resolve to nothing,
//! which the orchestrator treats as "gateway does not exist".

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{GatewayConfig, Provider};

use super::{Gateway, HostedPageGateway, MockGateway};

type GatewayFactory = Arc<dyn Fn(&GatewayConfig) -> Arc<dyn Gateway> + Send + Sync>;

#[derive(Clone, Default)]
pub struct GatewayRegistry {
    factories: HashMap<Provider, GatewayFactory>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in provider integrations.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Provider::Hosted, |config| {
            Arc::new(HostedPageGateway::from_config(config))
        });
        registry.register(Provider::Mock, |config| {
            Arc::new(MockGateway::new(config.mode))
        });
        registry
    }

    pub fn register<F>(&mut self, provider: Provider, factory: F)
    where
        F: Fn(&GatewayConfig) -> Arc<dyn Gateway> + Send + Sync + 'static,
    {
        self.factories.insert(provider, Arc::new(factory));
    }

    /// Build the gateway for a configuration record, if its provider
    /// integration is registered.
    pub fn resolve(&self, config: &GatewayConfig) -> Option<Arc<dyn Gateway>> {
        self.factories.get(&config.provider).map(|f| f(config))
    }

    pub fn providers(&self) -> Vec<Provider> {
        self.factories.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GatewayMode;

    #[test]
    fn unknown_provider_resolves_to_none() {
        let registry = GatewayRegistry::with_builtins();
        let config = GatewayConfig::new(Provider::Unknown, GatewayMode::Test);
        assert!(registry.resolve(&config).is_none());
    }

    #[test]
    fn builtin_providers_resolve() {
        let registry = GatewayRegistry::with_builtins();
        let config = GatewayConfig::new(Provider::Mock, GatewayMode::Live);
        let gateway = registry.resolve(&config).expect("mock gateway registered");
        assert_eq!(gateway.mode(), GatewayMode::Live);
    }
}
