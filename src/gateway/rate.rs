//! Per-(widget token, caller IP) rolling-window rate limiting over the fast
//! cache's atomic increment/expire primitives.
//!
//! The counter lives only in the cache: without a cache there is no rate
//! limiting at all, and any cache error during the check is swallowed as
//! "allow". Availability wins over strictness for this control; the typed
//! outcome keeps the degraded path visible to callers, logs and tests.

use std::time::Duration;
use tracing::warn;

use crate::cache::SharedCache;

pub const WINDOW: Duration = Duration::from_secs(60);
pub const MAX_REQUESTS_PER_WINDOW: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateOutcome {
    /// Under the limit; carries the post-increment count in the window.
    Allowed(i64),
    Limited,
    /// Cache missing or erroring: the check did not run (fail open).
    Unavailable,
}

fn counter_key(widget_token: &str, client_ip: &str) -> String {
    format!("rate:{widget_token}:{client_ip}")
}

pub struct RateLimiter {
    cache: Option<SharedCache>,
}

impl RateLimiter {
    pub fn new(cache: Option<SharedCache>) -> Self {
        Self { cache }
    }

    pub async fn check(&self, widget_token: &str, client_ip: &str) -> RateOutcome {
        let Some(cache) = &self.cache else {
            return RateOutcome::Unavailable;
        };
        let key = counter_key(widget_token, client_ip);
        let count = match cache.incr(&key).await {
            Ok(c) => c,
            Err(e) => {
                warn!("rate counter increment failed, allowing: {e}");
                return RateOutcome::Unavailable;
            }
        };
        if count == 1 {
            // First hit in the window starts the rolling expiry.
            if let Err(e) = cache.expire(&key, WINDOW).await {
                warn!("rate counter expiry set failed: {e}");
            }
        }
        if count > MAX_REQUESTS_PER_WINDOW {
            RateOutcome::Limited
        } else {
            RateOutcome::Allowed(count)
        }
    }
}
