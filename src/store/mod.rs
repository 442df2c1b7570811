//! Durable store of record: tenant directory, embedded documents and the
//! conversation log. All cached data elsewhere in the system is a disposable
//! projection of what lives behind these traits.
//!
//! Two implementations: an HTTP client against a Supabase-style REST API
//! (production) and an in-process store (tests, local development).

pub mod http;
pub mod memory;

pub use http::HttpStore;
pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A paying customer of the platform, isolated from all others' data.
///
/// `requests_used` is monotonically non-decreasing within a billing period;
/// it is incremented asynchronously by the usage accountant, so any value
/// read through a cached snapshot is an approximation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    /// Public, long-lived identifier embedded in the tenant's client-side
    /// widget code. Not secret-grade; origin validation is the second factor.
    pub widget_token: String,
    pub secret_key: String,
    pub is_active: bool,
    pub allowed_origins: Vec<String>,
    pub monthly_quota: u64,
    pub requests_used: u64,
}

/// One embedded knowledge chunk, always bound to the tenant that ingested it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub tenant_id: String,
    pub content: String,
    pub source: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub tenant_id: String,
    pub messages: Vec<ChatTurn>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// One question/answer exchange, stamped now.
    pub fn exchange(tenant_id: &str, question: &str, answer: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            messages: vec![
                ChatTurn { role: "user".into(), content: question.into() },
                ChatTurn { role: "bot".into(), content: answer.into() },
            ],
            created_at: Utc::now(),
        }
    }
}

/// Best-effort audit record for security-relevant rejections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub tenant_id: String,
    pub domain_detected: String,
    pub reason: String,
}

/// Durable-store failure. Callers must be able to tell "row absent"
/// (`Ok(None)`) apart from "store unavailable" (`Err`).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("durable store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Tenant records and their quota counters.
#[async_trait::async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn find_active_by_widget_token(&self, token: &str) -> StoreResult<Option<Tenant>>;
    async fn find_active_by_email(&self, email: &str) -> StoreResult<Option<Tenant>>;
    async fn find_active_by_id(&self, id: &str) -> StoreResult<Option<Tenant>>;
    /// Atomic durable increment of `requests_used`.
    async fn increment_usage(&self, tenant_id: &str) -> StoreResult<()>;
    async fn log_security_event(&self, event: SecurityEvent) -> StoreResult<()>;
}

/// Tenant-scoped insert and similarity search over embedded documents.
/// The tenant filter is mandatory on every search; there is no cross-tenant
/// query surface at all.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, doc: Document) -> StoreResult<()>;
    async fn search(
        &self,
        tenant_id: &str,
        embedding: &[f32],
        threshold: f32,
        top_k: usize,
    ) -> StoreResult<Vec<Document>>;
}

#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append(&self, conversation: Conversation) -> StoreResult<()>;
    /// Newest first.
    async fn list_for_tenant(&self, tenant_id: &str) -> StoreResult<Vec<Conversation>>;
}
