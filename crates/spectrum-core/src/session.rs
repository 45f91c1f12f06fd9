//! Per-chat conversation sessions

use spectrum_util::ChatId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::Flow;

/// Conversation state of one chat
#[derive(Debug)]
pub struct ChatSession {
    /// Flow in progress, if any
    flow: Option<Flow>,

    /// Last time a message for this chat was handled (monotonic)
    touched_at: Instant,
}

impl ChatSession {
    fn new(now: Instant) -> Self {
        Self {
            flow: None,
            touched_at: now,
        }
    }

    pub fn flow(&self) -> Option<&Flow> {
        self.flow.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.flow.is_none()
    }

    /// Take the flow out; the session is idle until one is put back
    pub(crate) fn take_flow(&mut self) -> Option<Flow> {
        self.flow.take()
    }

    pub(crate) fn set_flow(&mut self, flow: Flow) {
        self.flow = Some(flow);
    }

    pub fn clear(&mut self) {
        self.flow = None;
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.touched_at = now;
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.touched_at)
    }
}

/// Sessions keyed by chat. Each chat has its own lock, held for the whole
/// of one message, so messages from one chat are handled one at a time
/// while different chats proceed in parallel.
#[derive(Debug, Default)]
pub struct SessionStore {
    slots: Mutex<HashMap<ChatId, Arc<Mutex<ChatSession>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ChatId, Arc<Mutex<ChatSession>>>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get or create the session slot for a chat
    pub fn slot(&self, chat_id: ChatId, now: Instant) -> Arc<Mutex<ChatSession>> {
        self.slots()
            .entry(chat_id)
            .or_insert_with(|| Arc::new(Mutex::new(ChatSession::new(now))))
            .clone()
    }

    pub fn contains(&self, chat_id: ChatId) -> bool {
        self.slots().contains_key(&chat_id)
    }

    pub fn remove(&self, chat_id: ChatId) -> bool {
        self.slots().remove(&chat_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    /// Chats with a flow in progress. Sessions locked by a running message
    /// count as active.
    pub fn active_flows(&self) -> usize {
        self.slots()
            .values()
            .filter(|slot| match slot.try_lock() {
                Ok(session) => !session.is_idle(),
                Err(_) => true,
            })
            .count()
    }

    /// Drop sessions untouched for at least `ttl`. Sessions in use by a
    /// message are kept regardless of age.
    pub fn sweep(&self, ttl: Duration, now: Instant) -> usize {
        let mut slots = self.slots();
        let before = slots.len();

        slots.retain(|chat_id, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            let Ok(session) = slot.try_lock() else {
                return true;
            };
            let expired = session.idle_for(now) >= ttl;
            if expired {
                debug!(
                    chat_id = %chat_id,
                    flow = session.flow().map(Flow::name),
                    "Session expired"
                );
            }
            !expired
        });

        before - slots.len()
    }
}

/// Lock a chat session. A panic in an earlier message leaves the flow in an
/// unknown state, so a poisoned session is reset instead of propagated.
pub fn lock_session(slot: &Mutex<ChatSession>) -> MutexGuard<'_, ChatSession> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            let mut guard = poisoned.into_inner();
            guard.clear();
            slot.clear_poison();
            guard
        }
    }
}
