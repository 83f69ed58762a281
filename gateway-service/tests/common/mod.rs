//! Test fixtures for gateway-service integration tests.
//!
//! Everything runs in-process against the in-memory store and queue, with
//! a scripted mock gateway registered as the default provider.

#![allow(dead_code)]

use secrecy::Secret;
use std::sync::Arc;

use gateway_service::config::{
    Config, DatabaseConfig, RiskConfig, SchedulerConfig, ServerConfig,
};
use gateway_service::gateways::{Gateway, GatewayRegistry, MockGateway};
use gateway_service::models::{
    GatewayConfig, GatewayMode, Payment, PaymentStatus, Provider, RecordQuery,
};
use gateway_service::services::{
    MemoryRecordStore, MemoryTaskQueue, Orchestrator, QueryActionsScheduler, RecordAction,
    RecordStore, SchedulerSet, StatusChecker, TaskDispatcher, TaskQueue,
};
use gateway_service::AppState;

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            url: Secret::new("mongodb://localhost:27017".to_string()),
            db_name: "gateway_test".to_string(),
        },
        risk: RiskConfig {
            endpoint: None,
            api_key: Secret::new(String::new()),
            timeout_seconds: 20,
        },
        scheduler: SchedulerConfig {
            page_size: 100,
            poll_interval_ms: 10,
        },
        site_url: "https://shop.example".to_string(),
        service_name: "gateway-service".to_string(),
    }
}

/// Handler-level state over this app's backends.
pub fn app_state(app: &TestApp, schedulers: Arc<SchedulerSet>) -> AppState {
    AppState {
        config: test_config(),
        orchestrator: app.orchestrator.clone(),
        schedulers,
        queue: app.queue.clone() as Arc<dyn TaskQueue>,
    }
}

/// In-process application fixture.
pub struct TestApp {
    pub store: Arc<MemoryRecordStore>,
    pub queue: Arc<MemoryTaskQueue>,
    pub gateway: Arc<MockGateway>,
    pub config: GatewayConfig,
    pub checker: Arc<StatusChecker>,
    pub orchestrator: Arc<Orchestrator>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::with_gateway(MockGateway::new(GatewayMode::Test)).await
    }

    /// Spawn with a pre-configured mock gateway, registered as the
    /// default configuration's provider.
    pub async fn with_gateway(gateway: MockGateway) -> Self {
        let store = Arc::new(MemoryRecordStore::new());
        let queue = Arc::new(MemoryTaskQueue::new());
        let gateway = Arc::new(gateway);

        let mut registry = GatewayRegistry::new();
        let shared: Arc<dyn Gateway> = gateway.clone();
        registry.register(Provider::Mock, move |_| shared.clone());

        let mut config = GatewayConfig::new(Provider::Mock, GatewayMode::Test);
        config.is_default = true;
        store
            .insert_gateway_config(&config)
            .await
            .expect("insert gateway config");

        let checker = Arc::new(StatusChecker::new(queue.clone() as Arc<dyn TaskQueue>));
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone() as Arc<dyn RecordStore>,
            registry,
            checker.clone(),
            None,
        ));

        Self {
            store,
            queue,
            gateway,
            config,
            checker,
            orchestrator,
        }
    }

    /// A scheduler over open payments, wired to this app's store and queue.
    pub fn open_payments_scheduler(
        &self,
        name: &str,
        page_size: u64,
        action: Arc<dyn RecordAction>,
    ) -> Arc<QueryActionsScheduler> {
        Arc::new(QueryActionsScheduler::new(
            name,
            RecordQuery::Payments {
                status: Some(PaymentStatus::Open),
            },
            page_size,
            self.store.clone() as Arc<dyn RecordStore>,
            self.queue.clone() as Arc<dyn TaskQueue>,
            action,
        ))
    }

    /// A dispatcher routing this app's queue to the given schedulers.
    pub fn dispatcher(&self, schedulers: Vec<Arc<QueryActionsScheduler>>) -> TaskDispatcher {
        let mut set = SchedulerSet::new();
        for scheduler in schedulers {
            set.register(scheduler);
        }
        TaskDispatcher::new(
            self.queue.clone() as Arc<dyn TaskQueue>,
            Arc::new(set),
            self.checker.clone(),
            self.orchestrator.clone(),
        )
    }

    /// Insert an open payment of `amount_minor` EUR cents.
    pub async fn insert_open_payment(&self, amount_minor: i64) -> Payment {
        let payment = Payment::new(amount_minor, "EUR");
        self.store
            .insert_payment(&payment)
            .await
            .expect("insert payment");
        payment
    }
}

/// Record action that counts invocations and optionally always fails.
pub mod actions {
    use async_trait::async_trait;
    use gateway_service::services::RecordAction;
    use service_core::error::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    #[derive(Default)]
    pub struct CountingAction {
        pub calls: AtomicU32,
        pub fail: bool,
    }

    impl CountingAction {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail: true,
            })
        }

        pub fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RecordAction for CountingAction {
        async fn run(&self, _record_id: Uuid) -> Result<(), AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::InternalError(anyhow::anyhow!(
                    "callback failed on purpose"
                )));
            }
            Ok(())
        }
    }
}
