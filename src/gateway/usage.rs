//! Fire-and-forget usage accounting.
//!
//! Each successfully served widget request schedules two independent
//! best-effort writes on a detached task: a fast-cache counter for
//! near-real-time dashboards and the durable increment on the tenant row.
//! Neither write blocks the response, neither failure is retried, and
//! nothing here can surface to the caller. A burst of concurrent requests
//! may therefore transiently exceed the configured quota before the durable
//! counter catches up.

use std::sync::Arc;
use tracing::warn;

use crate::cache::SharedCache;
use crate::store::TenantDirectory;

fn quota_key(tenant_id: &str) -> String {
    format!("quota:{tenant_id}")
}

#[derive(Clone)]
pub struct UsageAccountant {
    directory: Arc<dyn TenantDirectory>,
    cache: Option<SharedCache>,
}

impl UsageAccountant {
    pub fn new(directory: Arc<dyn TenantDirectory>, cache: Option<SharedCache>) -> Self {
        Self { directory, cache }
    }

    /// Schedule both counter writes and return immediately.
    pub fn record_usage(&self, tenant_id: &str) {
        let directory = Arc::clone(&self.directory);
        let cache = self.cache.clone();
        let tenant_id = tenant_id.to_string();
        tokio::spawn(async move {
            if let Some(cache) = &cache {
                if let Err(e) = cache.incr(&quota_key(&tenant_id)).await {
                    warn!(tenant = %tenant_id, "quota cache increment failed: {e}");
                }
            }
            if let Err(e) = directory.increment_usage(&tenant_id).await {
                warn!(tenant = %tenant_id, "durable usage increment failed: {e}");
            }
        });
    }
}
