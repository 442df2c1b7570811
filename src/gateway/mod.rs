//! Request-admission and tenant-isolation gateway for widget traffic.
//!
//! Every inbound widget request passes through [`AdmissionGate::admit`]:
//! token presence, token resolution, origin validation, rate limiting and
//! quota, strictly in that order, short-circuiting on the first failure.
//! Cheapest and most identity-establishing checks run first so anonymous or
//! malformed traffic is rejected before spending a cache round trip.

pub mod origin;
pub mod rate;
pub mod resolver;
pub mod usage;

pub use rate::{RateLimiter, RateOutcome, MAX_REQUESTS_PER_WINDOW, WINDOW};
pub use resolver::TenantResolver;
pub use usage::UsageAccountant;

use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::SharedCache;
use crate::error::{AppError, AppResult};
use crate::store::{SecurityEvent, Tenant, TenantDirectory};

/// The identity-relevant slice of an inbound widget request.
#[derive(Debug, Clone, Default)]
pub struct AdmissionRequest {
    pub widget_token: Option<String>,
    /// Origin header value, falling back to Referer when absent. A request
    /// without either is not origin-checked at all (trusted), matching the
    /// widget's same-origin behavior.
    pub origin: Option<String>,
    pub client_ip: String,
}

pub struct AdmissionGate {
    directory: Arc<dyn TenantDirectory>,
    resolver: TenantResolver,
    limiter: RateLimiter,
}

impl AdmissionGate {
    pub fn new(directory: Arc<dyn TenantDirectory>, cache: Option<SharedCache>) -> Self {
        let resolver = TenantResolver::new(Arc::clone(&directory), cache.clone());
        let limiter = RateLimiter::new(cache);
        Self { directory, resolver, limiter }
    }

    /// Decide whether the request may proceed, and under which tenant.
    pub async fn admit(&self, req: &AdmissionRequest) -> AppResult<Tenant> {
        // 1. Token presence
        let Some(token) = req.widget_token.as_deref().filter(|t| !t.is_empty()) else {
            return Err(AppError::unauthenticated(
                "missing_widget_token",
                "missing X-Widget-Token header",
            ));
        };

        // 2. Token resolution (cache-first; inactive tenants resolve to None)
        let Some(tenant) = self.resolver.resolve(token).await? else {
            return Err(AppError::forbidden(
                "invalid_widget_token",
                "invalid token or inactive client",
            ));
        };

        // 3. Origin check, only when a non-loopback origin was declared
        if let Some(raw_origin) = req.origin.as_deref().filter(|o| !o.is_empty()) {
            if !origin::is_loopback(raw_origin)
                && !origin::is_allowed(raw_origin, &tenant.allowed_origins)
            {
                self.log_violation(&tenant.id, raw_origin);
                return Err(AppError::forbidden("domain_mismatch", "origin not allowed"));
            }
        }

        // 4. Rate limiting (fail open on cache trouble)
        match self.limiter.check(token, &req.client_ip).await {
            RateOutcome::Limited => {
                return Err(AppError::rate_limited(
                    "rate_exceeded",
                    "too many requests, retry in a minute",
                ));
            }
            RateOutcome::Allowed(_) => {}
            RateOutcome::Unavailable => {}
        }

        // 5. Quota, against the possibly-stale snapshot counter
        if tenant.requests_used >= tenant.monthly_quota {
            return Err(AppError::quota_exceeded("quota_exceeded", "monthly quota exceeded"));
        }

        Ok(tenant)
    }

    /// Best-effort, non-blocking security-violation audit entry.
    fn log_violation(&self, tenant_id: &str, origin: &str) {
        info!(tenant = %tenant_id, origin = %origin, "origin rejected");
        let directory = Arc::clone(&self.directory);
        let event = SecurityEvent {
            tenant_id: tenant_id.to_string(),
            domain_detected: origin.to_string(),
            reason: "Domain mismatch".to_string(),
        };
        tokio::spawn(async move {
            if let Err(e) = directory.log_security_event(event).await {
                warn!("security event write failed: {e}");
            }
        });
    }
}
