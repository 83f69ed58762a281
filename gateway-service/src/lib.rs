pub mod config;
pub mod dtos;
pub mod gateways;
pub mod handlers;
pub mod models;
pub mod services;

use async_trait::async_trait;
use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{metrics::metrics_middleware, tracing::request_id_middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use config::Config;
use gateways::GatewayRegistry;
use models::{PaymentStatus, RecordQuery};
use services::{
    metrics::init_metrics, MongoRecordStore, MongoTaskQueue, Orchestrator, QueryActionsScheduler,
    RecordAction, RecordStore, RiskClient, RunContext, SchedulerSet, StatusChecker,
    TaskDispatcher, TaskQueue,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub orchestrator: Arc<Orchestrator>,
    pub schedulers: Arc<SchedulerSet>,
    pub queue: Arc<dyn TaskQueue>,
}

/// Scheduler callback refreshing one open payment's status.
struct PaymentStatusAction {
    orchestrator: Arc<Orchestrator>,
}

#[async_trait]
impl RecordAction for PaymentStatusAction {
    async fn run(&self, record_id: Uuid) -> Result<(), AppError> {
        self.orchestrator
            .update_payment(record_id, RunContext::Background, false)
            .await?;
        Ok(())
    }
}

pub struct Application {
    port: u16,
    router: Router,
    dispatcher: Arc<TaskDispatcher>,
    poll_interval: Duration,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret()).await?;
        client_options.app_name = Some("gateway-service".to_string());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let mongo_store = MongoRecordStore::new(&db);
        mongo_store.init_indexes().await?;
        let store: Arc<dyn RecordStore> = Arc::new(mongo_store);
        let queue: Arc<dyn TaskQueue> = Arc::new(MongoTaskQueue::new(&db));

        init_metrics();

        let risk = RiskClient::from_config(&config.risk);
        if risk.is_some() {
            tracing::info!("Risk pre-check client initialized");
        }

        let registry = GatewayRegistry::with_builtins();
        let checker = Arc::new(StatusChecker::new(queue.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            registry,
            checker.clone(),
            risk,
        ));

        let mut schedulers = SchedulerSet::new();
        schedulers.register(Arc::new(QueryActionsScheduler::new(
            "payment_status",
            RecordQuery::Payments {
                status: Some(PaymentStatus::Open),
            },
            config.scheduler.page_size,
            store.clone(),
            queue.clone(),
            Arc::new(PaymentStatusAction {
                orchestrator: orchestrator.clone(),
            }),
        )));
        let schedulers = Arc::new(schedulers);

        let dispatcher = Arc::new(TaskDispatcher::new(
            queue.clone(),
            schedulers.clone(),
            checker,
            orchestrator.clone(),
        ));

        let state = AppState {
            config: config.clone(),
            orchestrator,
            schedulers,
            queue,
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/metrics", get(handlers::metrics))
            .route("/payments", post(handlers::payments::create_payment))
            .route("/payments/:id", get(handlers::payments::get_payment))
            .route(
                "/payments/:id/return",
                get(handlers::payments::return_callback),
            )
            .route(
                "/payments/:id/check",
                post(handlers::payments::force_status_check),
            )
            .route(
                "/payments/:id/refunds",
                post(handlers::refunds::create_refund),
            )
            .route("/schedulers", get(handlers::schedulers::list_schedulers))
            .route(
                "/schedulers/:name/schedule",
                post(handlers::schedulers::schedule),
            )
            .route(
                "/schedulers/:name/run",
                post(handlers::schedulers::run_actions),
            )
            .layer(from_fn(metrics_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                }),
            )
            .with_state(state);

        Ok(Self {
            port: config.server.port,
            router,
            dispatcher,
            poll_interval: Duration::from_millis(config.scheduler.poll_interval_ms),
        })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let dispatcher = self.dispatcher.clone();
        let poll_interval = self.poll_interval;
        tokio::spawn(async move {
            dispatcher.run(poll_interval).await;
        });

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router).await?;

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
