use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let http_port = std::env::var("RAGWAY_HTTP_PORT").unwrap_or_else(|_| "8000".to_string());
    let cache_configured = std::env::var("REDIS_URL").map(|v| !v.is_empty()).unwrap_or(false);
    info!(
        target: "ragway",
        "ragway starting: RUST_LOG='{}', http_port={}, fast_cache_configured={}",
        rust_log, http_port, cache_configured
    );

    ragway::server::run().await
}
