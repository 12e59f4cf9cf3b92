//! Process-wide session context: the acting admin's token and profile.
//!
//! The context is created once at startup (`SessionContext::load`), cloned into
//! every controller and the API client, and cleared on logout. Persistence goes
//! through `SessionStore`, a small key/value table modelled on browser local
//! storage (`token` and `user` keys).
use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

use crate::api::AuthService;
use crate::catalog::scalar_to_string;
use crate::db::{self, Pool};

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";

/// Profile of the signed-in admin. Only the identifier is interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminProfile {
    id: String,
    raw: Value,
}

impl AdminProfile {
    /// Build from the backend's user object; `None` when no identifier is present.
    pub fn from_json(raw: Value) -> Option<Self> {
        let id = ["_id", "id", "ui_id"]
            .iter()
            .find_map(|k| raw.get(*k).and_then(scalar_to_string))?;
        let id = id.trim().to_string();
        if id.is_empty() {
            return None;
        }
        Some(Self { id, raw })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        ["username", "name", "email"]
            .iter()
            .find_map(|k| self.raw.get(*k).and_then(Value::as_str))
            .unwrap_or(&self.id)
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub profile: AdminProfile,
}

/// Cloneable handle to the current session; all clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionContext {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        let ctx = Self::default();
        ctx.set(session);
        ctx
    }

    /// Load-on-init: restore the persisted session, if any.
    pub async fn load(store: &SessionStore) -> Result<Self> {
        let ctx = Self::default();
        if let Some(session) = store.load().await? {
            info!(admin_id = %session.profile.id(), "restored session");
            ctx.set(session);
        }
        Ok(ctx)
    }

    pub fn current(&self) -> Option<Session> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn token(&self) -> Option<String> {
        self.current().map(|s| s.token)
    }

    pub fn admin_id(&self) -> Option<String> {
        self.current().map(|s| s.profile.id().to_string())
    }

    pub fn is_signed_in(&self) -> bool {
        self.current().is_some()
    }

    pub fn set(&self, session: Session) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Perform the opaque login POST, persist token and profile, and install
    /// the session in this context.
    pub async fn login(
        &self,
        auth: &dyn AuthService,
        store: &SessionStore,
        email: &str,
        password: &str,
    ) -> Result<Session> {
        let resp = auth
            .login(email, password)
            .await
            .context("login request failed")?;
        let profile = AdminProfile::from_json(resp.user)
            .context("login response carried no user identifier")?;
        let session = Session {
            token: resp.token,
            profile,
        };
        store.save(&session).await?;
        self.set(session.clone());
        info!(admin_id = %session.profile.id(), "signed in");
        Ok(session)
    }

    /// Clear-on-logout: drop the in-memory session and the persisted copy.
    pub async fn logout(&self, store: &SessionStore) -> Result<()> {
        self.clear();
        store.clear().await?;
        info!("signed out");
        Ok(())
    }
}

/// Persistence for the session (token + user profile JSON).
#[derive(Debug, Clone)]
pub struct SessionStore {
    pool: Pool,
}

impl SessionStore {
    pub async fn open(database_url: &str) -> Result<Self> {
        let pool = db::init_pool(database_url).await?;
        db::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    /// Absent or unreadable entries yield `None`; corrupt entries are logged.
    pub async fn load(&self) -> Result<Option<Session>> {
        let token = db::get_item(&self.pool, TOKEN_KEY).await?;
        let user = db::get_item(&self.pool, USER_KEY).await?;
        let (Some(token), Some(user)) = (token, user) else {
            return Ok(None);
        };
        if token.trim().is_empty() {
            return Ok(None);
        }
        let raw: Value = match serde_json::from_str(&user) {
            Ok(v) => v,
            Err(err) => {
                warn!(?err, "stored user profile is not valid JSON; ignoring");
                return Ok(None);
            }
        };
        match AdminProfile::from_json(raw) {
            Some(profile) => Ok(Some(Session { token, profile })),
            None => {
                warn!("stored user profile has no identifier; ignoring");
                Ok(None)
            }
        }
    }

    pub async fn save(&self, session: &Session) -> Result<()> {
        db::set_item(&self.pool, TOKEN_KEY, &session.token).await?;
        let user = serde_json::to_string(session.profile.raw())?;
        db::set_item(&self.pool, USER_KEY, &user).await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        db::remove_item(&self.pool, TOKEN_KEY).await?;
        db::remove_item(&self.pool, USER_KEY).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn profile_id_accepts_numbers_and_trims() {
        let p = AdminProfile::from_json(json!({"id": 42, "username": "root"})).unwrap();
        assert_eq!(p.id(), "42");
        assert_eq!(p.display_name(), "root");

        let p = AdminProfile::from_json(json!({"_id": " a1 "})).unwrap();
        assert_eq!(p.id(), "a1");
        assert_eq!(p.display_name(), "a1");

        assert!(AdminProfile::from_json(json!({"name": "nobody"})).is_none());
    }

    #[test]
    fn context_clones_share_session() {
        let ctx = SessionContext::signed_out();
        let other = ctx.clone();
        ctx.set(Session {
            token: "t".into(),
            profile: AdminProfile::from_json(json!({"id": "7"})).unwrap(),
        });
        assert_eq!(other.admin_id().as_deref(), Some("7"));
        other.clear();
        assert!(!ctx.is_signed_in());
    }
}
