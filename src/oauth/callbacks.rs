//! Rendezvous between in-flight authorization flows and their callbacks
//!
//! A flow pre-registers a slot keyed by its `flow_id` (and, once known, its
//! `state`) before it hands the authorize URL to anyone. The HTTP callback
//! handler resolves the slot with the callback's query parameters, waking the
//! waiting flow exactly once.
//!
//! - Each slot is a `oneshot::Sender`; delivering removes it, so a second
//!   delivery for the same flow reports "not found".
//! - A state index maps `state` to `flow_id` for callbacks that arrive on the
//!   path-less route.
//! - [`PendingFlowGuard`] discards the slot when dropped, which also covers a
//!   flow future that is cancelled mid-await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

/// Page shown to the browser once a callback has been accepted.
pub const CALLBACK_COMPLETE_HTML: &str = "<!DOCTYPE html><html><head><title>Authorization complete</title></head>\
<body><h1>Authorization complete</h1><p>You can close this window and return to your application.</p></body></html>";

/// Query (or form) parameters received on a callback.
pub type CallbackPayload = HashMap<String, String>;

/// Receiving half of a registered callback slot.
pub type CallbackHandle = oneshot::Receiver<CallbackPayload>;

#[derive(Default)]
struct RegistryInner {
    pending: HashMap<String, oneshot::Sender<CallbackPayload>>,
    states: HashMap<String, String>,
}

/// Process-wide map from `flow_id` to a one-shot callback slot.
///
/// Shared via `Arc` between the flow coordinator and the callback router.
///
/// # Examples
///
/// ```
/// use mcp_oauth_broker::oauth::callbacks::{CallbackPayload, OAuthCallbackRegistry};
///
/// # tokio_test::block_on(async {
/// let registry = OAuthCallbackRegistry::new();
/// let handle = registry.create_handle("flow-1");
///
/// let mut payload = CallbackPayload::new();
/// payload.insert("code".to_string(), "abc".to_string());
/// assert!(registry.deliver("flow-1", payload));
///
/// assert_eq!(handle.await.unwrap()["code"], "abc");
/// # });
/// ```
#[derive(Default)]
pub struct OAuthCallbackRegistry {
    inner: Mutex<RegistryInner>,
}

impl std::fmt::Debug for OAuthCallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCallbackRegistry")
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl OAuthCallbackRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // A panic while holding the lock cannot leave the maps half-updated,
        // so a poisoned guard is still usable.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a slot for `flow_id` and returns its receiving half.
    ///
    /// Registering the same `flow_id` twice replaces the earlier slot; its
    /// receiver then observes a closed channel.
    pub fn create_handle(&self, flow_id: &str) -> CallbackHandle {
        let (tx, rx) = oneshot::channel();
        if self.lock().pending.insert(flow_id.to_string(), tx).is_some() {
            tracing::warn!(flow_id, "Replaced an existing pending OAuth callback slot");
        }
        rx
    }

    /// Indexes `state` so [`deliver_by_state`](Self::deliver_by_state) can
    /// find the flow.
    pub fn register_state(&self, flow_id: &str, state: &str) {
        self.lock()
            .states
            .insert(state.to_string(), flow_id.to_string());
    }

    /// Resolves the slot for `flow_id` with `payload`.
    ///
    /// Returns `false` if no slot exists, it was already resolved, or the
    /// waiting flow has gone away.
    pub fn deliver(&self, flow_id: &str, payload: CallbackPayload) -> bool {
        let sender = {
            let mut inner = self.lock();
            let sender = inner.pending.remove(flow_id);
            if sender.is_some() {
                inner.states.retain(|_, id| id != flow_id);
            }
            sender
        };

        match sender {
            Some(tx) => {
                let delivered = tx.send(payload).is_ok();
                tracing::debug!(flow_id, delivered, "Delivered OAuth callback");
                delivered
            }
            None => {
                tracing::debug!(flow_id, "No pending OAuth flow for callback");
                false
            }
        }
    }

    /// Resolves the slot whose registered state equals `state`.
    pub fn deliver_by_state(&self, state: &str, payload: CallbackPayload) -> bool {
        let flow_id = self.lock().states.get(state).cloned();
        match flow_id {
            Some(flow_id) => self.deliver(&flow_id, payload),
            None => {
                tracing::debug!("No pending OAuth flow for callback state");
                false
            }
        }
    }

    /// Removes the slot and any state indexed for `flow_id`. Idempotent.
    pub fn discard(&self, flow_id: &str) {
        let mut inner = self.lock();
        inner.pending.remove(flow_id);
        inner.states.retain(|_, id| id != flow_id);
    }

    /// Number of flows currently awaiting a callback.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }
}

/// Discards a registered flow when dropped.
///
/// Hold one for the lifetime of a flow so the slot is removed on every exit
/// path, including cancellation.
#[must_use = "the flow is discarded as soon as the guard is dropped"]
pub struct PendingFlowGuard {
    registry: Arc<OAuthCallbackRegistry>,
    flow_id: String,
}

impl PendingFlowGuard {
    /// Creates a guard for `flow_id`.
    pub fn new(registry: Arc<OAuthCallbackRegistry>, flow_id: impl Into<String>) -> Self {
        Self {
            registry,
            flow_id: flow_id.into(),
        }
    }

    /// The guarded flow id.
    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }
}

impl Drop for PendingFlowGuard {
    fn drop(&mut self) {
        self.registry.discard(&self.flow_id);
    }
}
