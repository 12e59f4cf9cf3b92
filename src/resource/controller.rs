use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

use super::filter::{self, Filter};
use super::paginate::{clamp_page, total_pages, PageView};
use crate::api::model::response_message;
use crate::api::ResourceService;
use crate::catalog::{ResourceSpec, UploadTarget};
use crate::error::ApiError;
use crate::guard::ViewGuard;
use crate::notice::Notice;
use crate::session::SessionContext;
use crate::upload::MediaUploader;

/// Screen lifecycle. `Error` keeps the last good collection visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    Submitting,
    Error(String),
}

/// What an operation did. Failures are reported through notices, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// The user declined the confirmation step.
    Cancelled,
    /// The control was disabled: the same mutation is already in flight.
    Busy,
    /// Rejected client-side; no request was sent.
    Rejected,
    Failed,
    /// The view was disposed before the response arrived; it was dropped.
    Discarded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Value),
    /// Local file; uploaded and replaced by its URL on submit.
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorMode {
    Create,
    Edit(String),
}

/// Open create/edit form (the modal).
#[derive(Debug, Clone, PartialEq)]
pub struct Editor {
    pub mode: EditorMode,
    pub fields: BTreeMap<String, FieldValue>,
}

/// Record-level mutations that need explicit confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Delete,
    Status(String),
}

impl Action {
    fn verb(&self) -> &str {
        match self {
            Action::Delete => "delete",
            Action::Status(a) => a,
        }
    }
}

/// Confirmation step for destructive or status-changing actions.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Confirms everything; for non-interactive use (`--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

#[async_trait]
impl Confirm for AssumeYes {
    async fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

#[derive(Debug)]
struct ListState {
    records: Vec<Value>,
    filter: Filter,
    page: usize,
    phase: Phase,
    pending: HashSet<String>,
    submitting: bool,
    editor: Option<Editor>,
    remote_search: Option<String>,
    notices: Vec<Notice>,
}

impl ListState {
    fn filtered_len(&self, spec: &ResourceSpec) -> usize {
        filter::apply(&self.records, spec, &self.filter).len()
    }
}

/// Drives one "list of entity + CRUD" screen: fetch, filter, paginate,
/// mutate, refresh.
///
/// All methods take `&self`; state lives behind a mutex that is never held
/// across a request, so the screen can render (and see pending markers) while
/// calls are in flight.
pub struct ListController {
    spec: ResourceSpec,
    service: Arc<dyn ResourceService>,
    uploader: Arc<dyn MediaUploader>,
    session: SessionContext,
    page_size: usize,
    guard: ViewGuard,
    state: Mutex<ListState>,
}

impl ListController {
    pub fn new(
        spec: ResourceSpec,
        service: Arc<dyn ResourceService>,
        uploader: Arc<dyn MediaUploader>,
        session: SessionContext,
        page_size: usize,
    ) -> Self {
        Self {
            spec,
            service,
            uploader,
            session,
            page_size: page_size.max(1),
            guard: ViewGuard::new(),
            state: Mutex::new(ListState {
                records: Vec::new(),
                filter: Filter::default(),
                page: 1,
                phase: Phase::Idle,
                pending: HashSet::new(),
                submitting: false,
                editor: None,
                remote_search: None,
                notices: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, notice: Notice) {
        self.lock().notices.push(notice);
    }

    fn require_session(&self) -> Result<(), Outcome> {
        if self.session.is_signed_in() {
            return Ok(());
        }
        self.notify(Notice::error(ApiError::Unauthenticated.to_string()));
        Err(Outcome::Rejected)
    }

    pub fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    /// Tear the screen down; late responses are discarded from here on.
    pub fn dispose(&self) {
        self.guard.dispose();
    }

    /// Fetch the full collection. On failure the previous collection stays.
    #[instrument(skip_all, fields(resource = %self.spec.name))]
    pub async fn load(&self) -> Outcome {
        if !self.guard.is_live() {
            return Outcome::Discarded;
        }
        if let Err(outcome) = self.require_session() {
            return outcome;
        }
        self.lock().phase = Phase::Loading;

        let result = self.service.list(&self.spec).await;
        if !self.guard.is_live() {
            debug!("view disposed; dropping list response");
            return Outcome::Discarded;
        }

        let mut state = self.lock();
        match result {
            Ok(records) => {
                debug!(count = records.len(), "loaded collection");
                state.records = records;
                state.remote_search = None;
                state.phase = Phase::Ready;
                let pages = total_pages(state.filtered_len(&self.spec), self.page_size);
                state.page = clamp_page(state.page, pages);
                Outcome::Done
            }
            Err(err) => {
                warn!(?err, "load failed; keeping previous collection");
                state.phase = Phase::Error(err.to_string());
                state
                    .notices
                    .push(Notice::error(format!("Failed to load {}: {err}", self.spec.name)));
                Outcome::Failed
            }
        }
    }

    /// Consistency hook run after every mutation. Currently a full reload.
    pub async fn refresh(&self) -> Outcome {
        self.load().await
    }

    pub fn set_search(&self, term: &str) {
        let mut state = self.lock();
        state.filter.search = term.to_string();
        state.page = 1;
    }

    pub fn set_category(&self, category: Option<&str>) {
        let mut state = self.lock();
        state.filter.category = category.map(str::to_string);
        state.page = 1;
    }

    /// Replace the collection with the server's search-by-id result (zero or
    /// one record) and go back to page 1. A blank id restores the full list.
    #[instrument(skip_all, fields(resource = %self.spec.name))]
    pub async fn remote_search(&self, id: &str) -> Outcome {
        let id = id.trim();
        if id.is_empty() {
            return self.clear_remote_search().await;
        }
        if self.spec.search_path.is_none() {
            self.notify(Notice::error(format!(
                "{} does not support search by id",
                self.spec.name
            )));
            return Outcome::Rejected;
        }
        if let Err(outcome) = self.require_session() {
            return outcome;
        }
        self.lock().phase = Phase::Loading;

        let result = self.service.find(&self.spec, id).await;
        if !self.guard.is_live() {
            return Outcome::Discarded;
        }

        let mut state = self.lock();
        match result {
            Ok(mut hits) => {
                hits.truncate(1);
                if hits.is_empty() {
                    state.notices.push(Notice::info(format!("No {} with id {id}", self.spec.name)));
                }
                state.records = hits;
                state.remote_search = Some(id.to_string());
                state.page = 1;
                state.phase = Phase::Ready;
                Outcome::Done
            }
            Err(err) => {
                warn!(?err, id, "remote search failed");
                state.phase = Phase::Error(err.to_string());
                state.notices.push(Notice::error(format!("Search failed: {err}")));
                Outcome::Failed
            }
        }
    }

    pub async fn clear_remote_search(&self) -> Outcome {
        self.lock().page = 1;
        self.load().await
    }

    pub fn remote_search_term(&self) -> Option<String> {
        self.lock().remote_search.clone()
    }

    pub fn page_view(&self) -> PageView {
        let state = self.lock();
        let filtered = filter::apply(&state.records, &self.spec, &state.filter);
        PageView::build(&filtered, state.page, self.page_size)
    }

    /// Navigate; the page is clamped to the available range.
    pub fn goto_page(&self, page: usize) -> usize {
        let mut state = self.lock();
        let pages = total_pages(state.filtered_len(&self.spec), self.page_size);
        state.page = clamp_page(page, pages);
        state.page
    }

    pub fn next_page(&self) -> usize {
        let current = self.lock().page;
        self.goto_page(current.saturating_add(1))
    }

    pub fn prev_page(&self) -> usize {
        let current = self.lock().page;
        self.goto_page(current.saturating_sub(1))
    }

    pub fn records(&self) -> Vec<Value> {
        self.lock().records.clone()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase.clone()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.lock().pending.contains(id)
    }

    pub fn pending_ids(&self) -> HashSet<String> {
        self.lock().pending.clone()
    }

    pub fn is_submitting(&self) -> bool {
        self.lock().submitting
    }

    pub fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut self.lock().notices)
    }

    pub fn editor(&self) -> Option<Editor> {
        self.lock().editor.clone()
    }

    pub fn open_create(&self) {
        self.lock().editor = Some(Editor {
            mode: EditorMode::Create,
            fields: BTreeMap::new(),
        });
    }

    /// Open the edit form prefilled from the loaded record. `false` when the
    /// id is not in the current collection.
    pub fn open_edit(&self, id: &str) -> bool {
        let mut state = self.lock();
        let Some(record) = state
            .records
            .iter()
            .find(|r| self.spec.record_id(r).as_deref() == Some(id))
        else {
            return false;
        };
        let fields = record
            .as_object()
            .map(|map| {
                map.iter()
                    .filter(|(k, _)| **k != self.spec.id_field)
                    .map(|(k, v)| (k.clone(), FieldValue::Value(v.clone())))
                    .collect()
            })
            .unwrap_or_default();
        state.editor = Some(Editor {
            mode: EditorMode::Edit(id.to_string()),
            fields,
        });
        true
    }

    /// Set a form field; no-op when no form is open.
    pub fn set_field(&self, name: &str, value: Value) {
        if let Some(editor) = self.lock().editor.as_mut() {
            editor
                .fields
                .insert(name.to_string(), FieldValue::Value(value));
        }
    }

    pub fn set_file(&self, name: &str, path: PathBuf) {
        if let Some(editor) = self.lock().editor.as_mut() {
            editor.fields.insert(name.to_string(), FieldValue::File(path));
        }
    }

    pub fn close_editor(&self) {
        self.lock().editor = None;
    }

    fn missing_required(&self, fields: &BTreeMap<String, FieldValue>) -> Vec<String> {
        self.spec
            .required
            .iter()
            .filter(|name| match fields.get(*name) {
                None => true,
                Some(FieldValue::File(_)) => false,
                Some(FieldValue::Value(Value::Null)) => true,
                Some(FieldValue::Value(Value::String(s))) => s.trim().is_empty(),
                Some(FieldValue::Value(_)) => false,
            })
            .cloned()
            .collect()
    }

    /// Upload file-valued fields (concurrently) and build the JSON payload.
    async fn build_payload(&self, fields: BTreeMap<String, FieldValue>) -> Result<Value, ApiError> {
        let mut body = Map::new();
        let mut files = Vec::new();
        for (name, value) in fields {
            match value {
                FieldValue::Value(v) => {
                    body.insert(name, v);
                }
                FieldValue::File(path) => {
                    let target = self
                        .spec
                        .file_fields
                        .get(&name)
                        .copied()
                        .unwrap_or(UploadTarget::ImageHost);
                    files.push((name, path, target));
                }
            }
        }

        let uploads = files.iter().map(|(name, path, target)| async move {
            let url = self.uploader.upload(path, *target).await?;
            Ok::<_, ApiError>((name.clone(), url))
        });
        for (name, url) in try_join_all(uploads).await? {
            body.insert(name, Value::String(url));
        }
        Ok(Value::Object(body))
    }

    /// Submit the open form. On success the form closes and the list
    /// refreshes; on failure the form stays open for another attempt.
    #[instrument(skip_all, fields(resource = %self.spec.name))]
    pub async fn submit(&self) -> Outcome {
        if !self.guard.is_live() {
            return Outcome::Discarded;
        }
        if let Err(outcome) = self.require_session() {
            return outcome;
        }
        let editor = {
            let mut state = self.lock();
            if state.submitting {
                return Outcome::Busy;
            }
            let Some(editor) = state.editor.clone() else {
                state.notices.push(Notice::error("No form is open"));
                return Outcome::Rejected;
            };
            let missing = self.missing_required(&editor.fields);
            if !missing.is_empty() {
                state.notices.push(Notice::error(format!(
                    "Missing required fields: {}",
                    missing.join(", ")
                )));
                return Outcome::Rejected;
            }
            state.submitting = true;
            state.phase = Phase::Submitting;
            editor
        };

        let result = match self.build_payload(editor.fields).await {
            Ok(body) => match &editor.mode {
                EditorMode::Create => self.service.create(&self.spec, body).await,
                EditorMode::Edit(id) => self.service.update(&self.spec, id, body).await,
            },
            Err(err) => Err(err),
        };
        if !self.guard.is_live() {
            debug!("view disposed; dropping submit response");
            return Outcome::Discarded;
        }

        match result {
            Ok(resp) => {
                {
                    let mut state = self.lock();
                    state.submitting = false;
                    state.phase = Phase::Ready;
                    state.editor = None;
                    let text = response_message(&resp).unwrap_or_else(|| "Saved".to_string());
                    state.notices.push(Notice::info(text));
                }
                info!("saved record");
                self.refresh().await;
                Outcome::Done
            }
            Err(err) => {
                warn!(?err, "submit failed");
                let mut state = self.lock();
                state.submitting = false;
                state.phase = Phase::Error(err.to_string());
                state.notices.push(Notice::error(format!("Save failed: {err}")));
                Outcome::Failed
            }
        }
    }

    /// Confirm, run a delete or status action on one record, then refresh
    /// whatever the result. The record is marked pending while in flight.
    #[instrument(skip_all, fields(resource = %self.spec.name, id = %id, action = action.verb()))]
    pub async fn perform(&self, action: &Action, id: &str, confirm: &dyn Confirm) -> Outcome {
        if let Action::Status(name) = action {
            if !self.spec.supports_action(name) {
                self.notify(Notice::error(format!(
                    "{} does not support '{name}'",
                    self.spec.name
                )));
                return Outcome::Rejected;
            }
        }
        if !self.guard.is_live() {
            return Outcome::Discarded;
        }
        if let Err(outcome) = self.require_session() {
            return outcome;
        }
        if self.is_pending(id) {
            return Outcome::Busy;
        }

        let prompt = format!("{} {} {id}?", action.verb(), self.spec.name);
        if !confirm.confirm(&prompt).await {
            return Outcome::Cancelled;
        }

        {
            let mut state = self.lock();
            if !state.pending.insert(id.to_string()) {
                return Outcome::Busy;
            }
        }

        let result = match action {
            Action::Delete => self.service.delete(&self.spec, id).await,
            Action::Status(name) => self.service.act(&self.spec, id, name).await,
        };
        if !self.guard.is_live() {
            debug!("view disposed; dropping action response");
            return Outcome::Discarded;
        }

        let outcome = {
            let mut state = self.lock();
            state.pending.remove(id);
            match result {
                Ok(resp) => {
                    let text = response_message(&resp).unwrap_or_else(|| match action {
                        Action::Delete => format!("Deleted {id}"),
                        Action::Status(name) => format!("{name}: {id}"),
                    });
                    state.notices.push(Notice::info(text));
                    Outcome::Done
                }
                Err(err) => {
                    warn!(?err, "action failed");
                    state.notices.push(Notice::error(format!(
                        "Failed to {} {id}: {err}",
                        action.verb()
                    )));
                    Outcome::Failed
                }
            }
        };
        self.refresh().await;
        outcome
    }
}
