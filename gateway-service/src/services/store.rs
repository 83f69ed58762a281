//! Record store.
//!
//! Persistence substrate for payments, subscriptions and gateway
//! configurations, plus per-record key-value metadata. The trait keeps the
//! orchestrator and scheduler independent of MongoDB; tests run against
//! the in-memory implementation.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOptions, IndexOptions, ReplaceOptions};
use mongodb::{Collection, Database, IndexModel};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    GatewayConfig, IdPage, Payment, RecordQuery, RecordType, Subscription,
};

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError>;
    async fn save_payment(&self, payment: &Payment) -> Result<(), AppError>;
    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>, AppError>;

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<(), AppError>;
    async fn save_subscription(&self, subscription: &Subscription) -> Result<(), AppError>;
    async fn get_subscription(&self, id: Uuid) -> Result<Option<Subscription>, AppError>;

    async fn insert_gateway_config(&self, config: &GatewayConfig) -> Result<(), AppError>;
    async fn get_gateway_config(&self, id: Uuid) -> Result<Option<GatewayConfig>, AppError>;
    /// The configuration marked as default, if any.
    async fn default_gateway_config(&self) -> Result<Option<GatewayConfig>, AppError>;

    /// One page of record ids for a filtered query, with the full-count
    /// total page count. Pages are 1-based and ordered by creation time.
    async fn query_ids(
        &self,
        query: &RecordQuery,
        page: u64,
        page_size: u64,
    ) -> Result<IdPage, AppError>;

    async fn get_meta(
        &self,
        record: RecordType,
        id: Uuid,
        key: &str,
    ) -> Result<Option<String>, AppError>;
    async fn set_meta(
        &self,
        record: RecordType,
        id: Uuid,
        key: &str,
        value: &str,
    ) -> Result<(), AppError>;
    async fn delete_meta(&self, record: RecordType, id: Uuid, key: &str) -> Result<(), AppError>;
}

fn query_filter(query: &RecordQuery) -> Document {
    match query {
        RecordQuery::Payments { status } => match status {
            Some(status) => doc! { "status": status.as_str() },
            None => doc! {},
        },
        RecordQuery::Subscriptions { status } => match status {
            Some(status) => doc! { "status": status.as_str() },
            None => doc! {},
        },
    }
}

fn total_pages(count: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    count.div_ceil(page_size)
}

// ---------------------------------------------------------------------------
// MongoDB implementation
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MongoRecordStore {
    db: Database,
    payments: Collection<Payment>,
    subscriptions: Collection<Subscription>,
    gateway_configs: Collection<GatewayConfig>,
}

impl MongoRecordStore {
    pub fn new(db: &Database) -> Self {
        Self {
            db: db.clone(),
            payments: db.collection("payments"),
            subscriptions: db.collection("subscriptions"),
            gateway_configs: db.collection("gateway_configs"),
        }
    }

    /// Initialize indexes for the scheduler's status-filtered queries.
    pub async fn init_indexes(&self) -> Result<(), AppError> {
        let status_created_index = IndexModel::builder()
            .keys(doc! { "status": 1, "created_at": 1 })
            .options(
                IndexOptions::builder()
                    .name("status_created_idx".to_string())
                    .build(),
            )
            .build();

        self.payments
            .create_index(status_created_index.clone(), None)
            .await?;
        self.subscriptions
            .create_index(status_created_index, None)
            .await?;

        let default_config_index = IndexModel::builder()
            .keys(doc! { "is_default": 1 })
            .options(
                IndexOptions::builder()
                    .name("default_config_idx".to_string())
                    .build(),
            )
            .build();
        self.gateway_configs
            .create_index(default_config_index, None)
            .await?;

        tracing::info!("Gateway service indexes initialized");
        Ok(())
    }

    fn meta_collection(&self, record: RecordType) -> Collection<Document> {
        self.db.collection(record.collection())
    }
}

#[async_trait]
impl RecordStore for MongoRecordStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError> {
        self.payments.insert_one(payment, None).await?;
        Ok(())
    }

    async fn save_payment(&self, payment: &Payment) -> Result<(), AppError> {
        let filter = doc! { "_id": payment.id.to_string() };
        let options = ReplaceOptions::builder().upsert(true).build();
        self.payments.replace_one(filter, payment, options).await?;
        Ok(())
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>, AppError> {
        let filter = doc! { "_id": id.to_string() };
        Ok(self.payments.find_one(filter, None).await?)
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<(), AppError> {
        self.subscriptions.insert_one(subscription, None).await?;
        Ok(())
    }

    async fn save_subscription(&self, subscription: &Subscription) -> Result<(), AppError> {
        let filter = doc! { "_id": subscription.id.to_string() };
        let options = ReplaceOptions::builder().upsert(true).build();
        self.subscriptions
            .replace_one(filter, subscription, options)
            .await?;
        Ok(())
    }

    async fn get_subscription(&self, id: Uuid) -> Result<Option<Subscription>, AppError> {
        let filter = doc! { "_id": id.to_string() };
        Ok(self.subscriptions.find_one(filter, None).await?)
    }

    async fn insert_gateway_config(&self, config: &GatewayConfig) -> Result<(), AppError> {
        self.gateway_configs.insert_one(config, None).await?;
        Ok(())
    }

    async fn get_gateway_config(&self, id: Uuid) -> Result<Option<GatewayConfig>, AppError> {
        let filter = doc! { "_id": id.to_string() };
        Ok(self.gateway_configs.find_one(filter, None).await?)
    }

    async fn default_gateway_config(&self) -> Result<Option<GatewayConfig>, AppError> {
        let filter = doc! { "is_default": true };
        Ok(self.gateway_configs.find_one(filter, None).await?)
    }

    async fn query_ids(
        &self,
        query: &RecordQuery,
        page: u64,
        page_size: u64,
    ) -> Result<IdPage, AppError> {
        let collection = self.meta_collection(query.record_type());
        let filter = query_filter(query);

        // Full count first so callers learn the page count. Page membership
        // is re-derived per call; see the scheduler for the tolerance model.
        let count = collection.count_documents(filter.clone(), None).await?;
        let total_pages = total_pages(count, page_size);

        let options = FindOptions::builder()
            .sort(doc! { "created_at": 1, "_id": 1 })
            .skip(page.saturating_sub(1) * page_size)
            .limit(page_size as i64)
            .projection(doc! { "_id": 1 })
            .build();

        let cursor = collection.find(filter, Some(options)).await?;
        let documents: Vec<Document> = cursor.try_collect().await?;

        let ids = documents
            .iter()
            .filter_map(|d| d.get_str("_id").ok())
            .filter_map(|s| Uuid::parse_str(s).ok())
            .collect();

        Ok(IdPage { ids, total_pages })
    }

    async fn get_meta(
        &self,
        record: RecordType,
        id: Uuid,
        key: &str,
    ) -> Result<Option<String>, AppError> {
        let filter = doc! { "_id": id.to_string() };
        let document = self.meta_collection(record).find_one(filter, None).await?;
        Ok(document
            .as_ref()
            .and_then(|d| d.get_document("meta").ok())
            .and_then(|meta| meta.get_str(key).ok())
            .map(String::from))
    }

    async fn set_meta(
        &self,
        record: RecordType,
        id: Uuid,
        key: &str,
        value: &str,
    ) -> Result<(), AppError> {
        let filter = doc! { "_id": id.to_string() };
        let update = doc! { "$set": { format!("meta.{}", key): value } };
        self.meta_collection(record)
            .update_one(filter, update, None)
            .await?;
        Ok(())
    }

    async fn delete_meta(&self, record: RecordType, id: Uuid, key: &str) -> Result<(), AppError> {
        let filter = doc! { "_id": id.to_string() };
        let update = doc! { "$unset": { format!("meta.{}", key): "" } };
        self.meta_collection(record)
            .update_one(filter, update, None)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// DashMap-backed store for tests and local development.
#[derive(Default)]
pub struct MemoryRecordStore {
    payments: DashMap<Uuid, Payment>,
    subscriptions: DashMap<Uuid, Subscription>,
    gateway_configs: DashMap<Uuid, GatewayConfig>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matching_ids(&self, query: &RecordQuery) -> Vec<Uuid> {
        let mut rows: Vec<(mongodb::bson::DateTime, Uuid)> = match query {
            RecordQuery::Payments { status } => self
                .payments
                .iter()
                .filter(|entry| status.map_or(true, |s| entry.value().status == s))
                .map(|entry| (entry.value().created_at, *entry.key()))
                .collect(),
            RecordQuery::Subscriptions { status } => self
                .subscriptions
                .iter()
                .filter(|entry| status.map_or(true, |s| entry.value().status == s))
                .map(|entry| (entry.value().created_at, *entry.key()))
                .collect(),
        };
        rows.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        rows.into_iter().map(|(_, id)| id).collect()
    }

    fn with_meta<R>(
        &self,
        record: RecordType,
        id: Uuid,
        f: impl FnOnce(&mut std::collections::HashMap<String, String>) -> R,
    ) -> Option<R> {
        match record {
            RecordType::Payment => self.payments.get_mut(&id).map(|mut p| f(&mut p.meta)),
            RecordType::Subscription => self
                .subscriptions
                .get_mut(&id)
                .map(|mut s| f(&mut s.meta)),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError> {
        if self.payments.contains_key(&payment.id) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Payment {} already exists",
                payment.id
            )));
        }
        self.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn save_payment(&self, payment: &Payment) -> Result<(), AppError> {
        self.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>, AppError> {
        Ok(self.payments.get(&id).map(|entry| entry.value().clone()))
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<(), AppError> {
        if self.subscriptions.contains_key(&subscription.id) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Subscription {} already exists",
                subscription.id
            )));
        }
        self.subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn save_subscription(&self, subscription: &Subscription) -> Result<(), AppError> {
        self.subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn get_subscription(&self, id: Uuid) -> Result<Option<Subscription>, AppError> {
        Ok(self
            .subscriptions
            .get(&id)
            .map(|entry| entry.value().clone()))
    }

    async fn insert_gateway_config(&self, config: &GatewayConfig) -> Result<(), AppError> {
        self.gateway_configs.insert(config.id, config.clone());
        Ok(())
    }

    async fn get_gateway_config(&self, id: Uuid) -> Result<Option<GatewayConfig>, AppError> {
        Ok(self
            .gateway_configs
            .get(&id)
            .map(|entry| entry.value().clone()))
    }

    async fn default_gateway_config(&self) -> Result<Option<GatewayConfig>, AppError> {
        Ok(self
            .gateway_configs
            .iter()
            .find(|entry| entry.value().is_default)
            .map(|entry| entry.value().clone()))
    }

    async fn query_ids(
        &self,
        query: &RecordQuery,
        page: u64,
        page_size: u64,
    ) -> Result<IdPage, AppError> {
        let all = self.matching_ids(query);
        let total = total_pages(all.len() as u64, page_size);
        let start = (page.saturating_sub(1) * page_size) as usize;
        let ids = all
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect();
        Ok(IdPage {
            ids,
            total_pages: total,
        })
    }

    async fn get_meta(
        &self,
        record: RecordType,
        id: Uuid,
        key: &str,
    ) -> Result<Option<String>, AppError> {
        Ok(self
            .with_meta(record, id, |meta| meta.get(key).cloned())
            .flatten())
    }

    async fn set_meta(
        &self,
        record: RecordType,
        id: Uuid,
        key: &str,
        value: &str,
    ) -> Result<(), AppError> {
        self.with_meta(record, id, |meta| {
            meta.insert(key.to_string(), value.to_string());
        });
        Ok(())
    }

    async fn delete_meta(&self, record: RecordType, id: Uuid, key: &str) -> Result<(), AppError> {
        self.with_meta(record, id, |meta| {
            meta.remove(key);
        });
        Ok(())
    }
}
