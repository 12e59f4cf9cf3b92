//! REST client for the platform backend and the service traits the
//! controllers are written against.
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::catalog::{DeleteMode, ResourceSpec, UpdateMethod};
use crate::config::Config;
use crate::error::ApiError;
use crate::session::SessionContext;

pub mod model;

pub use model::{ChatMessage, LoginResponse};
use model::{extract_items, extract_search_hit, ChatFeed, LoginRequest, SendChatRequest};

/// Entity CRUD and status actions for one resource descriptor.
#[async_trait]
pub trait ResourceService: Send + Sync {
    async fn list(&self, spec: &ResourceSpec) -> Result<Vec<Value>, ApiError>;

    /// Remote search by id against the descriptor's dedicated endpoint.
    async fn find(&self, spec: &ResourceSpec, id: &str) -> Result<Vec<Value>, ApiError>;

    async fn create(&self, spec: &ResourceSpec, body: Value) -> Result<Value, ApiError>;

    async fn update(&self, spec: &ResourceSpec, id: &str, body: Value) -> Result<Value, ApiError>;

    async fn delete(&self, spec: &ResourceSpec, id: &str) -> Result<Value, ApiError>;

    async fn act(&self, spec: &ResourceSpec, id: &str, action: &str) -> Result<Value, ApiError>;
}

/// Room chat feed.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn fetch_messages(&self, room_id: &str) -> Result<Vec<ChatMessage>, ApiError>;

    /// Fails with `ApiError::Forbidden` when moderation rejects the message.
    async fn send_message(
        &self,
        room_id: &str,
        sender_id: &str,
        message: &str,
    ) -> Result<(), ApiError>;
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError>;
}

#[derive(Clone)]
pub struct AdminClient {
    http: Client,
    base_url: Url,
    session: SessionContext,
}

impl fmt::Debug for AdminClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl AdminClient {
    pub fn new(base_url: Url, timeout: Duration, session: SessionContext) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(concat!("room-admin/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: with_trailing_slash(base_url),
            session,
        })
    }

    pub fn from_config(cfg: &Config, session: SessionContext) -> Result<Self, ApiError> {
        let base_url = Url::parse(cfg.api.base_url.trim())
            .map_err(|err| ApiError::Validation(format!("invalid api.base_url: {err}")))?;
        Self::new(base_url, Duration::from_secs(cfg.api.timeout_secs), session)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| ApiError::Validation(format!("invalid endpoint path {path}: {err}")))
    }

    /// Build an authenticated JSON request against `path` (relative to the base URL).
    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Request, ApiError> {
        let mut builder = self.http.request(method, self.endpoint(path)?);
        if let Some(token) = self.session.token() {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.build()?)
    }

    async fn execute(&self, request: reqwest::Request) -> Result<Value, ApiError> {
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "sending request");
        let res = self.http.execute(request).await?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            warn!(%method, %url, %status, body = %text, "request rejected");
            return Err(ApiError::from_response(status, &text));
        }
        debug!(%method, %url, %status, "request succeeded");
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        let request = self.build_request(method, path, body)?;
        self.execute(request).await
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Record body for an update: the form fields plus the id under the
/// descriptor's id field.
pub fn build_update_body(spec: &ResourceSpec, id: &str, body: Value) -> Value {
    let mut map = match body {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("data".into(), other);
            map
        }
    };
    map.insert(spec.id_field.clone(), Value::String(id.to_string()));
    Value::Object(map)
}

pub fn build_action_body(spec: &ResourceSpec, id: &str, action: &str) -> Value {
    let mut map = Map::new();
    map.insert("id".into(), Value::String(id.to_string()));
    map.insert(spec.action_field.clone(), Value::String(action.to_string()));
    Value::Object(map)
}

#[async_trait]
impl ResourceService for AdminClient {
    #[instrument(skip_all, fields(resource = %spec.name))]
    async fn list(&self, spec: &ResourceSpec) -> Result<Vec<Value>, ApiError> {
        let body = self.send(Method::GET, &spec.list_path, None).await?;
        extract_items(body, spec.list_key.as_deref())
    }

    #[instrument(skip_all, fields(resource = %spec.name, id = %id))]
    async fn find(&self, spec: &ResourceSpec, id: &str) -> Result<Vec<Value>, ApiError> {
        let path = spec.search_url_path(id).ok_or_else(|| {
            ApiError::Validation(format!("{} does not support search by id", spec.name))
        })?;
        match self.send(Method::GET, &path, None).await {
            Ok(body) => Ok(extract_search_hit(body, spec.list_key.as_deref(), &spec.id_field)),
            Err(ApiError::Status { status, .. }) if status == StatusCode::NOT_FOUND => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    #[instrument(skip_all, fields(resource = %spec.name))]
    async fn create(&self, spec: &ResourceSpec, body: Value) -> Result<Value, ApiError> {
        self.send(Method::POST, &spec.create_url_path(), Some(&body)).await
    }

    #[instrument(skip_all, fields(resource = %spec.name, id = %id))]
    async fn update(&self, spec: &ResourceSpec, id: &str, body: Value) -> Result<Value, ApiError> {
        let method = match spec.update_method {
            UpdateMethod::Put => Method::PUT,
            UpdateMethod::Post => Method::POST,
        };
        let body = build_update_body(spec, id, body);
        self.send(method, &spec.update_url_path(id), Some(&body)).await
    }

    #[instrument(skip_all, fields(resource = %spec.name, id = %id))]
    async fn delete(&self, spec: &ResourceSpec, id: &str) -> Result<Value, ApiError> {
        let path = spec.delete_url_path(id);
        match spec.delete_mode {
            DeleteMode::Path => self.send(Method::DELETE, &path, None).await,
            DeleteMode::Body => {
                let mut map = Map::new();
                map.insert(spec.id_field.clone(), Value::String(id.to_string()));
                let body = Value::Object(map);
                self.send(Method::DELETE, &path, Some(&body)).await
            }
        }
    }

    #[instrument(skip_all, fields(resource = %spec.name, id = %id, action = %action))]
    async fn act(&self, spec: &ResourceSpec, id: &str, action: &str) -> Result<Value, ApiError> {
        let body = build_action_body(spec, id, action);
        self.send(Method::POST, &spec.action_url_path(id), Some(&body)).await
    }
}

#[async_trait]
impl ChatService for AdminClient {
    async fn fetch_messages(&self, room_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
        let body = self
            .send(Method::GET, &format!("room/{room_id}/chat"), None)
            .await?;
        if body.is_null() {
            return Ok(Vec::new());
        }
        let feed: ChatFeed = serde_json::from_value(body)?;
        Ok(feed.into_messages())
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn send_message(
        &self,
        room_id: &str,
        sender_id: &str,
        message: &str,
    ) -> Result<(), ApiError> {
        let body = serde_json::to_value(SendChatRequest {
            ui_id: sender_id,
            message,
        })?;
        self.send(Method::POST, &format!("room/{room_id}/chat"), Some(&body))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AuthService for AdminClient {
    #[instrument(skip_all)]
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let body = serde_json::to_value(LoginRequest { email, password })?;
        let resp = self.send(Method::POST, "auth/login", Some(&body)).await?;
        Ok(serde_json::from_value(resp)?)
    }
}
