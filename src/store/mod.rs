//! Persistence port.
//!
//! Business logic talks to the three capability traits below and never to a
//! concrete database. One adapter per technology implements all of them; the
//! adapter is chosen once at start-up from [`DatabaseConfig`] and the resulting
//! [`Store`] handle is injected into every request.

pub mod dynamodb;
pub mod memory;
pub mod postgres;
pub mod records;

use crate::config::database::{BackendKind, DatabaseConfig};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub use records::*;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("{field} already exists")]
    Duplicate { field: String },

    #[error("backing store failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        StoreError::Backend(err.into())
    }

    pub fn duplicate(field: impl Into<String>) -> Self {
        StoreError::Duplicate {
            field: field.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<UserRecord>>;

    async fn find_user(&self, lookup: UserLookup<'_>) -> StoreResult<Option<UserRecord>>;

    /// Fails with [`StoreError::Duplicate`] naming `email` or `username`.
    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord>;

    async fn increment_points(&self, id: Uuid, delta: i64) -> StoreResult<()>;

    /// Highest points first, ties by username.
    async fn top_users(&self, limit: u64) -> StoreResult<Vec<UserRecord>>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn find_report_by_id(&self, id: Uuid) -> StoreResult<Option<ReportRecord>>;

    /// Returns the requested page and the total number of matching reports.
    async fn find_reports(&self, query: &ReportQuery) -> StoreResult<(Vec<ReportRecord>, u64)>;

    async fn count_reports(&self, filter: &ReportFilter) -> StoreResult<u64>;

    async fn create_report(&self, report: NewReport) -> StoreResult<ReportRecord>;

    async fn update_report(&self, id: Uuid, changes: ReportChanges) -> StoreResult<ReportRecord>;

    /// Removes the report together with its upvotes.
    async fn delete_report(&self, id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait UpvoteStore: Send + Sync {
    async fn find_upvote(&self, user_id: Uuid, report_id: Uuid)
        -> StoreResult<Option<UpvoteRecord>>;

    async fn count_upvotes(&self, report_id: Uuid) -> StoreResult<u64>;

    /// Adds the (user, report) upvote if absent, removes it otherwise, and moves
    /// the report counter in the same atomic step.
    async fn toggle_upvote(&self, user_id: Uuid, report_id: Uuid) -> StoreResult<UpvoteToggle>;
}

#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;
}

/// Process-wide store handle.
#[derive(Clone)]
pub struct Store {
    pub users: Arc<dyn UserStore>,
    pub reports: Arc<dyn ReportStore>,
    pub upvotes: Arc<dyn UpvoteStore>,
    health: Arc<dyn StoreHealth>,
    kind: BackendKind,
}

impl Store {
    pub fn from_backend<B>(kind: BackendKind, backend: B) -> Self
    where
        B: UserStore + ReportStore + UpvoteStore + StoreHealth + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            users: backend.clone(),
            reports: backend.clone(),
            upvotes: backend.clone(),
            health: backend,
            kind,
        }
    }

    pub fn memory() -> Self {
        Self::from_backend(BackendKind::Memory, memory::MemoryStore::default())
    }

    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let store = match config.backend {
            BackendKind::Postgres => {
                let pg = postgres::PostgresStore::connect(config).await?;
                Self::from_backend(BackendKind::Postgres, pg)
            }
            BackendKind::DynamoDb => {
                let dynamo = dynamodb::DynamoStore::connect(&config.dynamodb).await?;
                Self::from_backend(BackendKind::DynamoDb, dynamo)
            }
            BackendKind::Memory => Self::memory(),
        };
        tracing::info!("Backing store ready: {}", store.kind.as_str());
        Ok(store)
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub async fn is_reachable(&self) -> bool {
        match self.health.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Backing store ping failed: {}", e);
                false
            }
        }
    }
}
