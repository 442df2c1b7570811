//! HTTP client for a Supabase-style REST durable store.
//!
//! Tables: `clients`, `documents`, `conversations`, `security_logs`.
//! RPCs: `increment_usage(row_id)` and `match_documents(query_embedding,
//! match_threshold, match_count, filter_client_id)`.
//!
//! Every call is bounded by the client-level timeout; any transport or
//! non-2xx failure maps to `StoreError::Unavailable` so callers can fall
//! back or degrade without inspecting transport details.

use serde_json::json;
use std::time::Duration;

use super::{
    Conversation, ConversationStore, Document, DocumentStore, SecurityEvent, StoreError,
    StoreResult, Tenant, TenantDirectory,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpStore {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpStore {
    pub fn new(base_url: &str, api_key: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn rpc_url(&self, func: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, func)
    }

    fn authed(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        rb.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn get_rows<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> StoreResult<Vec<T>> {
        let resp = self
            .authed(self.client.get(self.table_url(table)).query(query))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let resp = resp
            .error_for_status()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        resp.json::<Vec<T>>()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn insert_row(&self, table: &str, body: serde_json::Value) -> StoreResult<()> {
        let resp = self
            .authed(self.client.post(self.table_url(table)).json(&body))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        resp.error_for_status()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn find_one_active(&self, field: &str, value: &str) -> StoreResult<Option<Tenant>> {
        let rows: Vec<Tenant> = self
            .get_rows(
                "clients",
                &[
                    (field, format!("eq.{value}")),
                    ("is_active", "eq.true".into()),
                    ("select", "*".into()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait::async_trait]
impl TenantDirectory for HttpStore {
    async fn find_active_by_widget_token(&self, token: &str) -> StoreResult<Option<Tenant>> {
        self.find_one_active("widget_token", token).await
    }

    async fn find_active_by_email(&self, email: &str) -> StoreResult<Option<Tenant>> {
        self.find_one_active("email", email).await
    }

    async fn find_active_by_id(&self, id: &str) -> StoreResult<Option<Tenant>> {
        self.find_one_active("id", id).await
    }

    async fn increment_usage(&self, tenant_id: &str) -> StoreResult<()> {
        let resp = self
            .authed(
                self.client
                    .post(self.rpc_url("increment_usage"))
                    .json(&json!({ "row_id": tenant_id })),
            )
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        resp.error_for_status()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn log_security_event(&self, event: SecurityEvent) -> StoreResult<()> {
        self.insert_row(
            "security_logs",
            json!({
                "client_id": event.tenant_id,
                "domain_detected": event.domain_detected,
                "reason": event.reason,
            }),
        )
        .await
    }
}

#[async_trait::async_trait]
impl DocumentStore for HttpStore {
    async fn insert(&self, doc: Document) -> StoreResult<()> {
        self.insert_row(
            "documents",
            json!({
                "client_id": doc.tenant_id,
                "content": doc.content,
                "metadata": { "source": doc.source },
                "embedding": doc.embedding,
            }),
        )
        .await
    }

    async fn search(
        &self,
        tenant_id: &str,
        embedding: &[f32],
        threshold: f32,
        top_k: usize,
    ) -> StoreResult<Vec<Document>> {
        #[derive(serde::Deserialize)]
        struct MatchRow {
            content: String,
            #[serde(default)]
            metadata: serde_json::Value,
        }
        let resp = self
            .authed(
                self.client.post(self.rpc_url("match_documents")).json(&json!({
                    "query_embedding": embedding,
                    "match_threshold": threshold,
                    "match_count": top_k,
                    "filter_client_id": tenant_id,
                })),
            )
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let resp = resp
            .error_for_status()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let rows: Vec<MatchRow> = resp
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|r| Document {
                tenant_id: tenant_id.to_string(),
                content: r.content,
                source: r
                    .metadata
                    .get("source")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                embedding: Vec::new(),
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl ConversationStore for HttpStore {
    async fn append(&self, conversation: Conversation) -> StoreResult<()> {
        self.insert_row(
            "conversations",
            json!({
                "client_id": conversation.tenant_id,
                "messages": conversation.messages,
            }),
        )
        .await
    }

    async fn list_for_tenant(&self, tenant_id: &str) -> StoreResult<Vec<Conversation>> {
        #[derive(serde::Deserialize)]
        struct Row {
            #[serde(default)]
            messages: Vec<super::ChatTurn>,
            created_at: chrono::DateTime<chrono::Utc>,
        }
        let rows: Vec<Row> = self
            .get_rows(
                "conversations",
                &[
                    ("client_id", format!("eq.{tenant_id}")),
                    ("select", "*".into()),
                    ("order", "created_at.desc".into()),
                ],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| Conversation {
                tenant_id: tenant_id.to_string(),
                messages: r.messages,
                created_at: r.created_at,
            })
            .collect())
    }
}
