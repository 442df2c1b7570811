//! Environment-driven configuration, read once at startup.

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Durable REST store endpoint (Supabase-style).
    pub store_url: String,
    pub store_key: String,
    /// Fast cache endpoint. Absent means degraded mode: no tenant snapshot
    /// cache and no rate limiting. Startup must still succeed.
    pub cache_url: Option<String>,
    /// HS256 signing secret for dashboard session credentials.
    pub session_secret: String,
    /// Generation/embedding API key.
    pub openai_api_key: String,
    pub http_port: u16,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        let store_url = std::env::var("SUPABASE_URL").context("SUPABASE_URL is required")?;
        let store_key = std::env::var("SUPABASE_KEY").context("SUPABASE_KEY is required")?;
        let cache_url = std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty());
        let session_secret =
            std::env::var("JWT_SECRET_KEY").context("JWT_SECRET_KEY is required")?;
        let openai_api_key =
            std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is required")?;
        let http_port = std::env::var("RAGWAY_HTTP_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8000);
        Ok(Self { store_url, store_key, cache_url, session_secret, openai_api_key, http_port })
    }
}
