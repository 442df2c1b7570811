//! Widget-token to tenant resolution, cache-first.
//!
//! The cached snapshot may be stale by up to `SNAPSHOT_TTL`; everything read
//! from it (notably `requests_used`) is an approximation of the durable
//! record. A cache failure at any point degrades to a durable-store lookup;
//! it never fails the resolution.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::SharedCache;
use crate::error::{AppError, AppResult};
use crate::store::{Tenant, TenantDirectory};

const SNAPSHOT_TTL: Duration = Duration::from_secs(3600);

fn snapshot_key(token: &str) -> String {
    format!("tenant:{token}")
}

pub struct TenantResolver {
    directory: Arc<dyn TenantDirectory>,
    cache: Option<SharedCache>,
}

impl TenantResolver {
    pub fn new(directory: Arc<dyn TenantDirectory>, cache: Option<SharedCache>) -> Self {
        Self { directory, cache }
    }

    /// `Ok(None)` means the token maps to no active tenant; a durable-store
    /// failure is a distinct `Upstream` error so callers can tell "does not
    /// exist" from "store unavailable".
    pub async fn resolve(&self, widget_token: &str) -> AppResult<Option<Tenant>> {
        let key = snapshot_key(widget_token);

        if let Some(cache) = &self.cache {
            match cache.get(&key).await {
                Ok(Some(raw)) => match serde_json::from_str::<Tenant>(&raw) {
                    Ok(tenant) => return Ok(Some(tenant)),
                    Err(e) => debug!("tenant snapshot deserialization failed, refetching: {e}"),
                },
                Ok(None) => {}
                Err(e) => debug!("tenant snapshot read failed, falling back to store: {e}"),
            }
        }

        let tenant = self
            .directory
            .find_active_by_widget_token(widget_token)
            .await
            .map_err(|e| AppError::upstream("store_unavailable", e.to_string()))?;

        let Some(tenant) = tenant else {
            return Ok(None);
        };

        // Populate the snapshot best-effort; a cache write failure must not
        // fail the resolution.
        if let Some(cache) = &self.cache {
            match serde_json::to_string(&tenant) {
                Ok(raw) => {
                    if let Err(e) = cache.set_ex(&key, &raw, SNAPSHOT_TTL).await {
                        warn!("tenant snapshot write failed: {e}");
                    }
                }
                Err(e) => warn!("tenant snapshot serialization failed: {e}"),
            }
        }

        Ok(Some(tenant))
    }
}
