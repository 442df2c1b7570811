//! Session authenticator tests: login, credential verification, expiry and
//! deactivation behavior.

use std::sync::Arc;

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ragway::error::AppError;
use ragway::identity::{hash_password, Claims, SessionAuthenticator};
use ragway::store::{MemoryStore, Tenant};

const SECRET: &str = "test-signing-secret";

fn tenant_with_password(id: &str, email: &str, password: &str) -> Tenant {
    Tenant {
        id: id.into(),
        name: format!("tenant {id}"),
        email: email.into(),
        password_hash: hash_password(password).unwrap(),
        widget_token: format!("tok_{id}"),
        secret_key: "sk".into(),
        is_active: true,
        allowed_origins: vec![],
        monthly_quota: 100,
        requests_used: 0,
    }
}

fn fixture() -> (Arc<MemoryStore>, SessionAuthenticator) {
    let store = Arc::new(MemoryStore::new());
    store.insert_tenant(tenant_with_password("a", "owner@acme.test", "hunter2"));
    let auth = SessionAuthenticator::new(store.clone(), SECRET);
    (store, auth)
}

#[tokio::test]
async fn login_then_authenticate_round_trip() {
    let (_store, auth) = fixture();
    let (token, tenant) = auth.login("owner@acme.test", "hunter2").await.unwrap();
    assert_eq!(tenant.id, "a");

    let resolved = auth.authenticate(&token).await.unwrap();
    assert_eq!(resolved.id, "a");
    assert_eq!(resolved.email, "owner@acme.test");
}

#[tokio::test]
async fn unknown_email_and_bad_password_are_indistinguishable() {
    let (_store, auth) = fixture();
    let e1 = auth.login("nobody@acme.test", "hunter2").await.unwrap_err();
    let e2 = auth.login("owner@acme.test", "wrong").await.unwrap_err();
    assert_eq!(e1.code_str(), e2.code_str());
    assert_eq!(e1.message(), e2.message());
    assert!(matches!(e1, AppError::Unauthenticated { .. }));
}

#[tokio::test]
async fn credential_signed_with_wrong_secret_is_rejected() {
    let (store, auth) = fixture();
    let other = SessionAuthenticator::new(store, "a-different-secret");
    let (token, _) = auth.login("owner@acme.test", "hunter2").await.unwrap();

    let err = other.authenticate(&token).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }));
}

#[tokio::test]
async fn credential_expired_by_one_second_is_rejected() {
    let (_store, auth) = fixture();
    let claims = Claims { sub: "a".into(), exp: chrono::Utc::now().timestamp() - 1 };
    let stale = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();

    let err = auth.authenticate(&stale).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }));
}

#[tokio::test]
async fn valid_credential_for_deactivated_tenant_is_rejected() {
    let (store, auth) = fixture();
    let (token, _) = auth.login("owner@acme.test", "hunter2").await.unwrap();

    let mut gone = tenant_with_password("a", "owner@acme.test", "hunter2");
    gone.is_active = false;
    store.insert_tenant(gone);

    let err = auth.authenticate(&token).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }));
}

#[tokio::test]
async fn garbage_credential_is_rejected() {
    let (_store, auth) = fixture();
    let err = auth.authenticate("not.a.jwt").await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }));
}
