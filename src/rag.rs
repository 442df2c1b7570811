//! Language-model plumbing: embedding and chat-completion clients, the
//! system prompt, and the fixed-size-with-overlap chunker used by the
//! scrape ingestion path.

use serde_json::json;
use std::time::Duration;

pub const EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const CHAT_TEMPERATURE: f64 = 0.7;

const API_BASE: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Text to fixed-length vector.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// System prompt + user question to answer text.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system_prompt: &str, question: &str) -> anyhow::Result<String>;
}

pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_key: &str) -> anyhow::Result<Self> {
        Self::with_base_url(api_key, API_BASE)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": EMBEDDING_MODEL, "input": text }))
            .send()
            .await?
            .error_for_status()?;
        let body: serde_json::Value = resp.json().await?;
        let vector = body
            .get("data")
            .and_then(|d| d.get(0))
            .and_then(|row| row.get("embedding"))
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("embedding response missing data[0].embedding"))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();
        Ok(vector)
    }
}

#[async_trait::async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, system_prompt: &str, question: &str) -> anyhow::Result<String> {
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": CHAT_MODEL,
                "temperature": CHAT_TEMPERATURE,
                "messages": [
                    { "role": "system", "content": system_prompt },
                    { "role": "user", "content": question },
                ],
            }))
            .send()
            .await?
            .error_for_status()?;
        let body: serde_json::Value = resp.json().await?;
        let answer = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|row| row.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("chat response missing choices[0].message.content"))?;
        Ok(answer.to_string())
    }
}

/// Ground the assistant strictly in the tenant's retrieved context.
pub fn build_system_prompt(tenant_name: &str, context: &[String]) -> String {
    let context_text = if context.is_empty() {
        "No specific information found.".to_string()
    } else {
        context.join("\n\n")
    };
    format!(
        "You are the assistant for {tenant_name}.\n\
         Use ONLY the context below to answer.\n\
         If the answer is not in the context, politely say you do not know.\n\
         CONTEXT: {context_text}"
    )
}

/// Split text into chunks of at most `chunk_size` characters with `overlap`
/// characters carried between consecutive chunks, preferring to break at a
/// paragraph, then a line, then a space.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    assert!(overlap < chunk_size, "overlap must be smaller than chunk size");
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    if chars.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let hard_end = (start + chunk_size).min(chars.len());
        let mut end = hard_end;
        if hard_end < chars.len() {
            // Prefer a natural break inside the window, scanning backwards.
            let window: String = chars[start..hard_end].iter().collect();
            for sep in ["\n\n", "\n", " "] {
                if let Some(pos) = window.rfind(sep) {
                    if pos > 0 {
                        end = start + window[..pos].chars().count() + sep.len();
                        break;
                    }
                }
            }
        }
        let chunk: String = chars[start..end].iter().collect();
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        if end >= chars.len() {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }
    chunks
}
