//! Room-scoped chat feed refreshed on a fixed interval.
//!
//! `activate` starts the poll task; `deactivate` (or dropping the view) stops
//! it. Polling never backs off and never gives up: a failed fetch sets the
//! static load-error text and the next tick tries again.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::api::{ChatMessage, ChatService};
use crate::error::ApiError;
use crate::guard::ViewGuard;
use crate::notice::Notice;
use crate::session::SessionContext;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const LOAD_FAILED: &str = "Failed to load messages";

/// Which side of the feed a message renders on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Sent by the acting admin (right-aligned).
    Own,
    Remote,
}

pub fn normalize_id(id: &str) -> String {
    id.trim().to_lowercase()
}

/// Attribute a message: `Own` when the sender matches the admin id after
/// trimming and case folding.
pub fn classify(message: &ChatMessage, admin_id: &str) -> Side {
    let admin = normalize_id(admin_id);
    if !admin.is_empty() && normalize_id(&message.sender_id) == admin {
        Side::Own
    } else {
        Side::Remote
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Empty or whitespace-only input; nothing sent.
    Ignored,
    /// Input is disabled by the moderation banner.
    Blocked,
    /// A send is already in flight.
    Busy,
    /// Moderation rejected the message; the reason is now the banner text.
    Banned(String),
    Failed,
    Discarded,
}

#[derive(Debug, Default)]
struct ChatState {
    messages: Vec<ChatMessage>,
    input: String,
    load_error: Option<&'static str>,
    banner: Option<String>,
    sending: bool,
    scroll_pending: bool,
    notices: Vec<Notice>,
}

fn lock(state: &Mutex<ChatState>) -> MutexGuard<'_, ChatState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fetch once and replace the feed. Returns whether the fetch succeeded.
async fn poll_once(
    service: &dyn ChatService,
    room_id: &str,
    state: &Mutex<ChatState>,
    guard: &ViewGuard,
) -> bool {
    let result = service.fetch_messages(room_id).await;
    if !guard.is_live() {
        return false;
    }
    let mut state = lock(state);
    match result {
        Ok(messages) => {
            if messages != state.messages {
                state.scroll_pending = true;
            }
            state.messages = messages;
            state.load_error = None;
            true
        }
        Err(err) => {
            warn!(?err, room_id, "chat fetch failed");
            state.load_error = Some(LOAD_FAILED);
            false
        }
    }
}

pub struct ChatView {
    service: Arc<dyn ChatService>,
    room_id: String,
    session: SessionContext,
    interval: Duration,
    guard: ViewGuard,
    state: Arc<Mutex<ChatState>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl ChatView {
    pub fn new(
        service: Arc<dyn ChatService>,
        room_id: impl Into<String>,
        session: SessionContext,
        interval: Duration,
    ) -> Self {
        Self {
            service,
            room_id: room_id.into(),
            session,
            interval,
            guard: ViewGuard::new(),
            state: Arc::new(Mutex::new(ChatState::default())),
            poller: Mutex::new(None),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Start polling; the first fetch happens immediately. Calling it on an
    /// active or deactivated view does nothing.
    pub fn activate(&self) {
        let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if poller.is_some() || !self.guard.is_live() {
            return;
        }
        let service = Arc::clone(&self.service);
        let state = Arc::clone(&self.state);
        let guard = self.guard.clone();
        let room_id = self.room_id.clone();
        let period = self.interval;
        info!(room_id = %room_id, interval_ms = period.as_millis() as u64, "chat polling started");
        *poller = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !guard.is_live() {
                    break;
                }
                poll_once(service.as_ref(), &room_id, &state, &guard).await;
            }
        }));
    }

    /// Stop polling and dispose the view; in-flight responses are dropped.
    pub fn deactivate(&self) {
        self.guard.dispose();
        let handle = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            info!(room_id = %self.room_id, "chat polling stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.guard.is_live()
            && self
                .poller
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
    }

    /// Immediate refetch outside the poll schedule.
    pub async fn refresh(&self) -> bool {
        poll_once(self.service.as_ref(), &self.room_id, &self.state, &self.guard).await
    }

    /// Update the input box. Ignored while input is disabled.
    pub fn set_input(&self, text: &str) -> bool {
        let mut state = lock(&self.state);
        if state.banner.is_some() {
            return false;
        }
        state.input = text.to_string();
        true
    }

    /// Send the current input.
    pub async fn send_input(&self) -> SendOutcome {
        let text = lock(&self.state).input.clone();
        self.send(&text).await
    }

    #[instrument(skip_all, fields(room_id = %self.room_id))]
    pub async fn send(&self, text: &str) -> SendOutcome {
        let message = text.trim();
        if message.is_empty() {
            return SendOutcome::Ignored;
        }
        if !self.guard.is_live() {
            return SendOutcome::Discarded;
        }
        let Some(sender_id) = self.session.admin_id() else {
            lock(&self.state)
                .notices
                .push(Notice::error(ApiError::Unauthenticated.to_string()));
            return SendOutcome::Failed;
        };
        {
            let mut state = lock(&self.state);
            if state.banner.is_some() {
                return SendOutcome::Blocked;
            }
            if state.sending {
                return SendOutcome::Busy;
            }
            state.input = text.to_string();
            state.sending = true;
        }

        let result = self
            .service
            .send_message(&self.room_id, &sender_id, message)
            .await;
        if !self.guard.is_live() {
            debug!("view disposed; dropping send response");
            return SendOutcome::Discarded;
        }

        match result {
            Ok(()) => {
                {
                    let mut state = lock(&self.state);
                    state.sending = false;
                    state.input.clear();
                    state.banner = None;
                }
                self.refresh().await;
                SendOutcome::Sent
            }
            Err(ApiError::Forbidden(reason)) => {
                info!(%reason, "message rejected by moderation");
                let mut state = lock(&self.state);
                state.sending = false;
                state.banner = Some(reason.clone());
                SendOutcome::Banned(reason)
            }
            Err(err) => {
                warn!(?err, "send failed");
                let mut state = lock(&self.state);
                state.sending = false;
                state
                    .notices
                    .push(Notice::error(format!("Failed to send message: {err}")));
                SendOutcome::Failed
            }
        }
    }

    /// Clear the moderation banner and re-enable input.
    pub fn dismiss_banner(&self) {
        lock(&self.state).banner = None;
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.state).messages.clone()
    }

    /// Messages paired with their side for the acting admin.
    pub fn attributed(&self) -> Vec<(Side, ChatMessage)> {
        let admin_id = self.session.admin_id().unwrap_or_default();
        lock(&self.state)
            .messages
            .iter()
            .map(|m| (classify(m, &admin_id), m.clone()))
            .collect()
    }

    pub fn input(&self) -> String {
        lock(&self.state).input.clone()
    }

    pub fn input_enabled(&self) -> bool {
        lock(&self.state).banner.is_none()
    }

    pub fn can_send(&self) -> bool {
        let state = lock(&self.state);
        state.banner.is_none() && !state.sending && !state.input.trim().is_empty()
    }

    pub fn banner(&self) -> Option<String> {
        lock(&self.state).banner.clone()
    }

    pub fn load_error(&self) -> Option<&'static str> {
        lock(&self.state).load_error
    }

    /// True once per change of the message list (auto-scroll to latest).
    pub fn take_scroll_request(&self) -> bool {
        std::mem::take(&mut lock(&self.state).scroll_pending)
    }

    pub fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut lock(&self.state).notices)
    }
}

impl Drop for ChatView {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(sender: &str) -> ChatMessage {
        ChatMessage {
            sender_id: sender.into(),
            message: "hi".into(),
            timestamp: None,
        }
    }

    #[test]
    fn trimmed_sender_is_own() {
        assert_eq!(classify(&msg(" 42 "), "42"), Side::Own);
    }

    #[test]
    fn case_folded_sender_is_own() {
        assert_eq!(classify(&msg("AdminX"), " adminx"), Side::Own);
    }

    #[test]
    fn other_senders_are_remote() {
        assert_eq!(classify(&msg("421"), "42"), Side::Remote);
        assert_eq!(classify(&msg(""), ""), Side::Remote);
    }
}
