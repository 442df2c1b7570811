//! In-process store used by tests and local development. Backs every trait
//! in the store module with parking_lot-guarded maps and a brute-force
//! cosine scan for similarity search.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{
    Conversation, ConversationStore, Document, DocumentStore, SecurityEvent, StoreError,
    StoreResult, Tenant, TenantDirectory,
};

#[derive(Default)]
pub struct MemoryStore {
    tenants: RwLock<HashMap<String, Tenant>>,
    documents: RwLock<Vec<Document>>,
    conversations: RwLock<Vec<Conversation>>,
    security_events: RwLock<Vec<SecurityEvent>>,
    /// When set, every call fails with `StoreError::Unavailable`. Lets tests
    /// exercise the degraded/upstream-failure paths.
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_tenant(&self, tenant: Tenant) {
        self.tenants.write().insert(tenant.id.clone(), tenant);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn security_events(&self) -> Vec<SecurityEvent> {
        self.security_events.read().clone()
    }

    pub fn requests_used(&self, tenant_id: &str) -> Option<u64> {
        self.tenants.read().get(tenant_id).map(|t| t.requests_used)
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store offline".into()))
        } else {
            Ok(())
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

#[async_trait::async_trait]
impl TenantDirectory for MemoryStore {
    async fn find_active_by_widget_token(&self, token: &str) -> StoreResult<Option<Tenant>> {
        self.check_online()?;
        let map = self.tenants.read();
        Ok(map
            .values()
            .find(|t| t.widget_token == token && t.is_active)
            .cloned())
    }

    async fn find_active_by_email(&self, email: &str) -> StoreResult<Option<Tenant>> {
        self.check_online()?;
        let map = self.tenants.read();
        Ok(map
            .values()
            .find(|t| t.email.eq_ignore_ascii_case(email) && t.is_active)
            .cloned())
    }

    async fn find_active_by_id(&self, id: &str) -> StoreResult<Option<Tenant>> {
        self.check_online()?;
        let map = self.tenants.read();
        Ok(map.get(id).filter(|t| t.is_active).cloned())
    }

    async fn increment_usage(&self, tenant_id: &str) -> StoreResult<()> {
        self.check_online()?;
        let mut map = self.tenants.write();
        if let Some(t) = map.get_mut(tenant_id) {
            t.requests_used = t.requests_used.saturating_add(1);
        }
        Ok(())
    }

    async fn log_security_event(&self, event: SecurityEvent) -> StoreResult<()> {
        self.check_online()?;
        self.security_events.write().push(event);
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, doc: Document) -> StoreResult<()> {
        self.check_online()?;
        self.documents.write().push(doc);
        Ok(())
    }

    async fn search(
        &self,
        tenant_id: &str,
        embedding: &[f32],
        threshold: f32,
        top_k: usize,
    ) -> StoreResult<Vec<Document>> {
        self.check_online()?;
        let docs = self.documents.read();
        let mut scored: Vec<(f32, &Document)> = docs
            .iter()
            .filter(|d| d.tenant_id == tenant_id)
            .map(|d| (cosine_similarity(&d.embedding, embedding), d))
            .filter(|(score, _)| *score >= threshold)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(top_k).map(|(_, d)| d.clone()).collect())
    }
}

#[async_trait::async_trait]
impl ConversationStore for MemoryStore {
    async fn append(&self, conversation: Conversation) -> StoreResult<()> {
        self.check_online()?;
        self.conversations.write().push(conversation);
        Ok(())
    }

    async fn list_for_tenant(&self, tenant_id: &str) -> StoreResult<Vec<Conversation>> {
        self.check_online()?;
        let all = self.conversations.read();
        let mut out: Vec<Conversation> = all
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}
