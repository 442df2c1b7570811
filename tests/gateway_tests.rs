//! Admission gate integration tests: check ordering, rate limiting, quota
//! enforcement and degraded-mode behavior with in-memory doubles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ragway::cache::{CacheError, CacheResult, FastCache, MemoryCache, SharedCache};
use ragway::error::AppError;
use ragway::gateway::{AdmissionGate, AdmissionRequest, UsageAccountant};
use ragway::store::{MemoryStore, Tenant};

fn tenant(id: &str, token: &str) -> Tenant {
    Tenant {
        id: id.into(),
        name: format!("tenant {id}"),
        email: format!("{id}@example.com"),
        password_hash: String::new(),
        widget_token: token.into(),
        secret_key: "sk".into(),
        is_active: true,
        allowed_origins: vec!["*.example.com".into()],
        monthly_quota: 1000,
        requests_used: 0,
    }
}

fn widget_request(token: Option<&str>, origin: Option<&str>) -> AdmissionRequest {
    AdmissionRequest {
        widget_token: token.map(|s| s.to_string()),
        origin: origin.map(|s| s.to_string()),
        client_ip: "203.0.113.9".to_string(),
    }
}

/// Counts increments so tests can assert which gate steps actually ran.
struct SpyCache {
    inner: MemoryCache,
    incrs: AtomicUsize,
}

impl SpyCache {
    fn new() -> Self {
        Self { inner: MemoryCache::new(), incrs: AtomicUsize::new(0) }
    }
}

#[async_trait::async_trait]
impl FastCache for SpyCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.inner.get(key).await
    }
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.inner.set_ex(key, value, ttl).await
    }
    async fn incr(&self, key: &str) -> CacheResult<i64> {
        self.incrs.fetch_add(1, Ordering::SeqCst);
        self.inner.incr(key).await
    }
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        self.inner.expire(key, ttl).await
    }
}

/// Every operation fails, as if the cache endpoint were unreachable.
struct UnreachableCache;

#[async_trait::async_trait]
impl FastCache for UnreachableCache {
    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
    async fn incr(&self, _key: &str) -> CacheResult<i64> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
    async fn expire(&self, _key: &str, _ttl: Duration) -> CacheResult<()> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn missing_token_rejected_before_any_cache_traffic() {
    let store = Arc::new(MemoryStore::new());
    store.insert_tenant(tenant("a", "tok_a"));
    let spy = Arc::new(SpyCache::new());
    let spy_cache: SharedCache = spy.clone();
    let gate = AdmissionGate::new(store, Some(spy_cache));

    let err = gate.admit(&widget_request(None, None)).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }));
    assert_eq!(spy.incrs.load(Ordering::SeqCst), 0, "rate counter must be untouched");
}

#[tokio::test]
async fn unknown_or_inactive_token_is_forbidden() {
    let store = Arc::new(MemoryStore::new());
    let mut inactive = tenant("b", "tok_b");
    inactive.is_active = false;
    store.insert_tenant(inactive);
    let gate = AdmissionGate::new(store, None);

    for token in ["tok_missing", "tok_b"] {
        let err = gate.admit(&widget_request(Some(token), None)).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }), "token {token}");
    }
}

#[tokio::test]
async fn origin_mismatch_rejected_and_audited() {
    let store = Arc::new(MemoryStore::new());
    store.insert_tenant(tenant("a", "tok_a"));
    let gate = AdmissionGate::new(store.clone(), None);

    let err = gate
        .admit(&widget_request(Some("tok_a"), Some("https://evil.com")))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden { .. }));

    // The audit write is fire-and-forget; give the spawned task a beat.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let events = store.security_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].domain_detected, "https://evil.com");
}

#[tokio::test]
async fn matching_and_loopback_origins_are_admitted() {
    let store = Arc::new(MemoryStore::new());
    store.insert_tenant(tenant("a", "tok_a"));
    let gate = AdmissionGate::new(store, None);

    for origin in [
        Some("https://shop.example.com"),
        Some("http://localhost:5173"),
        None, // absent origin is not evaluated
    ] {
        let admitted = gate.admit(&widget_request(Some("tok_a"), origin)).await;
        assert!(admitted.is_ok(), "origin {origin:?}");
    }
}

#[tokio::test]
async fn rate_limit_trips_on_21st_and_resets_after_window() {
    let store = Arc::new(MemoryStore::new());
    store.insert_tenant(tenant("a", "tok_a"));
    let mem = Arc::new(MemoryCache::new());
    let cache: SharedCache = mem.clone();
    let gate = AdmissionGate::new(store, Some(cache));

    for i in 1..=20 {
        let res = gate.admit(&widget_request(Some("tok_a"), None)).await;
        assert!(res.is_ok(), "request {i} should pass");
    }
    let err = gate.admit(&widget_request(Some("tok_a"), None)).await.unwrap_err();
    assert!(matches!(err, AppError::RateLimited { .. }));

    mem.advance(Duration::from_secs(61));
    assert!(gate.admit(&widget_request(Some("tok_a"), None)).await.is_ok());
}

#[tokio::test]
async fn rate_counters_are_scoped_per_caller_ip() {
    let store = Arc::new(MemoryStore::new());
    store.insert_tenant(tenant("a", "tok_a"));
    let mem = Arc::new(MemoryCache::new());
    let cache: SharedCache = mem;
    let gate = AdmissionGate::new(store, Some(cache));

    for _ in 0..20 {
        let mut req = widget_request(Some("tok_a"), None);
        req.client_ip = "198.51.100.1".into();
        gate.admit(&req).await.unwrap();
    }
    // A different caller still has a fresh window.
    let other = widget_request(Some("tok_a"), None);
    assert!(gate.admit(&other).await.is_ok());
}

#[tokio::test]
async fn quota_boundary_rejects_at_exactly_used_equals_quota() {
    let store = Arc::new(MemoryStore::new());
    let mut t = tenant("a", "tok_a");
    t.monthly_quota = 5;
    t.requests_used = 5;
    store.insert_tenant(t);
    let gate = AdmissionGate::new(store, None);

    let err = gate.admit(&widget_request(Some("tok_a"), None)).await.unwrap_err();
    assert!(matches!(err, AppError::QuotaExceeded { .. }));
}

#[tokio::test]
async fn usage_accounting_is_async_and_eventually_enforced() {
    let store = Arc::new(MemoryStore::new());
    let mut t = tenant("a", "tok_a");
    t.monthly_quota = 1;
    store.insert_tenant(t);
    let gate = AdmissionGate::new(store.clone(), None);
    let accountant = UsageAccountant::new(store.clone(), None);

    // First request passes with a zeroed counter; the increment lands later.
    let admitted = gate.admit(&widget_request(Some("tok_a"), None)).await.unwrap();
    accountant.record_usage(&admitted.id);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.requests_used("a"), Some(1));

    let err = gate.admit(&widget_request(Some("tok_a"), None)).await.unwrap_err();
    assert!(matches!(err, AppError::QuotaExceeded { .. }));
}

#[tokio::test]
async fn no_cache_means_no_rate_limiting_but_valid_requests_still_pass() {
    let store = Arc::new(MemoryStore::new());
    store.insert_tenant(tenant("a", "tok_a"));
    let gate = AdmissionGate::new(store, None);

    for _ in 0..40 {
        assert!(gate.admit(&widget_request(Some("tok_a"), None)).await.is_ok());
    }
}

#[tokio::test]
async fn unreachable_cache_degrades_instead_of_failing() {
    let store = Arc::new(MemoryStore::new());
    store.insert_tenant(tenant("a", "tok_a"));
    let cache: SharedCache = Arc::new(UnreachableCache);
    let gate = AdmissionGate::new(store, Some(cache));

    // Resolution falls back to the durable store; rate limiting fails open.
    for _ in 0..40 {
        assert!(gate.admit(&widget_request(Some("tok_a"), None)).await.is_ok());
    }
}

#[tokio::test]
async fn store_outage_surfaces_as_upstream_not_forbidden() {
    let store = Arc::new(MemoryStore::new());
    store.insert_tenant(tenant("a", "tok_a"));
    store.set_offline(true);
    let gate = AdmissionGate::new(store, None);

    let err = gate.admit(&widget_request(Some("tok_a"), None)).await.unwrap_err();
    assert!(matches!(err, AppError::Upstream { .. }));
}

#[tokio::test]
async fn cached_snapshot_serves_resolution_through_a_store_outage() {
    let store = Arc::new(MemoryStore::new());
    store.insert_tenant(tenant("a", "tok_a"));
    let mem = Arc::new(MemoryCache::new());
    let cache: SharedCache = mem;
    let gate = AdmissionGate::new(store.clone(), Some(cache));

    // Warm the snapshot, then take the durable store down.
    gate.admit(&widget_request(Some("tok_a"), None)).await.unwrap();
    store.set_offline(true);
    assert!(gate.admit(&widget_request(Some("tok_a"), None)).await.is_ok());
}
