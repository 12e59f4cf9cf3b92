use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use room_admin::api::{AuthService, LoginResponse};
use room_admin::db;
use room_admin::error::ApiError;
use room_admin::session::{SessionContext, SessionStore, TOKEN_KEY, USER_KEY};

async fn setup_store() -> (db::Pool, SessionStore) {
    let pool = db::init_pool("sqlite::memory:").await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    (pool.clone(), SessionStore::from_pool(pool))
}

#[derive(Clone, Default)]
struct FakeAuth {
    calls: Arc<AtomicUsize>,
    reject: bool,
}

#[async_trait::async_trait]
impl AuthService for FakeAuth {
    async fn login(&self, email: &str, _password: &str) -> Result<LoginResponse, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(ApiError::from_response(
                reqwest::StatusCode::UNAUTHORIZED,
                r#"{"message":"Invalid credentials"}"#,
            ));
        }
        Ok(LoginResponse {
            token: "jwt-abc".into(),
            user: json!({"_id": "admin-7", "email": email, "username": "ops"}),
        })
    }
}

#[tokio::test]
async fn login_persists_and_next_start_restores() {
    let (pool, store) = setup_store().await;
    let ctx = SessionContext::load(&store).await.unwrap();
    assert!(!ctx.is_signed_in());

    let session = ctx
        .login(&FakeAuth::default(), &store, "ops@example.com", "pw")
        .await
        .unwrap();
    assert_eq!(session.profile.id(), "admin-7");
    assert_eq!(ctx.token().as_deref(), Some("jwt-abc"));

    assert_eq!(
        db::get_item(&pool, TOKEN_KEY).await.unwrap().as_deref(),
        Some("jwt-abc")
    );

    let restored = SessionContext::load(&store).await.unwrap();
    assert_eq!(restored.admin_id().as_deref(), Some("admin-7"));
    assert_eq!(
        restored.current().unwrap().profile.display_name(),
        "ops"
    );
}

#[tokio::test]
async fn logout_clears_memory_and_storage() {
    let (pool, store) = setup_store().await;
    let ctx = SessionContext::signed_out();
    ctx.login(&FakeAuth::default(), &store, "ops@example.com", "pw")
        .await
        .unwrap();
    let shared = ctx.clone();

    ctx.logout(&store).await.unwrap();
    assert!(!shared.is_signed_in());
    assert!(db::get_item(&pool, TOKEN_KEY).await.unwrap().is_none());
    assert!(db::get_item(&pool, USER_KEY).await.unwrap().is_none());
    assert!(!SessionContext::load(&store).await.unwrap().is_signed_in());
}

#[tokio::test]
async fn rejected_login_leaves_session_untouched() {
    let (pool, store) = setup_store().await;
    let ctx = SessionContext::signed_out();
    let auth = FakeAuth {
        reject: true,
        ..Default::default()
    };

    let err = ctx
        .login(&auth, &store, "ops@example.com", "wrong")
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("Invalid credentials"));
    assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
    assert!(!ctx.is_signed_in());
    assert!(db::get_item(&pool, TOKEN_KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn corrupt_stored_profile_is_ignored() {
    let (pool, store) = setup_store().await;
    db::set_item(&pool, TOKEN_KEY, "jwt").await.unwrap();
    db::set_item(&pool, USER_KEY, "{not json").await.unwrap();

    assert!(store.load().await.unwrap().is_none());
    assert!(!SessionContext::load(&store).await.unwrap().is_signed_in());
}
