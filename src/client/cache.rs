//! Client-side conversation cache.
//!
//! Every mutation goes through [`ConversationCache`], which replaces the whole
//! [`ClientState`] snapshot inside a `watch` channel so that each update observes
//! the result of the previous one. The folds themselves are plain functions over
//! `Vec<Conversation>` and never fail.

use crate::domain::conversation::{Conversation, finalize};
use crate::domain::event::RealtimeEvent;
use crate::domain::message::{DeliveryStatus, Message, MessageContent, SELF_SENDER, StatusPatch};
use tokio::sync::watch;
use uuid::Uuid;

pub use crate::domain::message::TEMP_ID_PREFIX;

/// Conversation id used when an event carries neither a conversation nor a sender.
pub const UNKNOWN_CONVERSATION: &str = "unknown";

/// How far apart an optimistic record and its server echo may be, in seconds.
pub const ECHO_WINDOW_SECS: i64 = 120;

/// Shown when a local send could not reach the server.
pub const SEND_FAILED_ERROR: &str = "Failed to send message. Please try again.";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientState {
    pub conversations: Vec<Conversation>,
    /// Dismissible error surfaced to the user.
    pub error: Option<String>,
    /// Set when events may have been missed; cleared by a re-fetch.
    pub needs_resync: bool,
}

/// Normalizes a server-provided list into cache order.
#[must_use]
pub fn load(mut conversations: Vec<Conversation>) -> Vec<Conversation> {
    finalize(&mut conversations);
    conversations
}

/// Loads a fresh server list while keeping what only exists locally.
///
/// Unconfirmed optimistic records and conversations opened without any message
/// yet survive the reload. An optimistic record the server already holds is dropped.
#[must_use]
pub fn reload(previous: &[Conversation], fresh: Vec<Conversation>) -> Vec<Conversation> {
    let mut conversations = load(fresh);
    for conversation in previous {
        if conversation.messages.is_empty() {
            open_conversation(&mut conversations, &conversation.conversation_id, &conversation.display_name);
            continue;
        }
        for pending in conversation.messages.iter().filter(|m| m.id.starts_with(TEMP_ID_PREFIX)) {
            if !has_server_copy(&conversations, pending) {
                fold_new_message(&mut conversations, pending.clone());
            }
        }
    }
    finalize(&mut conversations);
    conversations
}

fn has_server_copy(conversations: &[Conversation], pending: &Message) -> bool {
    conversations
        .iter()
        .filter(|c| c.conversation_id == pending.conversation_id)
        .flat_map(|c| c.messages.iter())
        .any(|m| {
            m.id == pending.id
                || (!m.id.starts_with(TEMP_ID_PREFIX)
                    && m.is_self_authored()
                    && m.text_body() == pending.text_body()
                    && (m.timestamp - pending.timestamp).abs() <= ECHO_WINDOW_SECS)
        })
}

/// Applies a real-time event. Returns whether anything changed.
pub fn fold_event(conversations: &mut Vec<Conversation>, event: &RealtimeEvent) -> bool {
    match event {
        RealtimeEvent::NewMessage(message) => fold_new_message(conversations, message.clone()),
        RealtimeEvent::StatusUpdate(patch) => fold_status(conversations, patch),
        RealtimeEvent::Resync => false,
    }
}

fn resolve_conversation_id(message: &Message) -> String {
    if !message.conversation_id.trim().is_empty() {
        message.conversation_id.clone()
    } else if !message.from.trim().is_empty() {
        message.from.clone()
    } else {
        UNKNOWN_CONVERSATION.to_string()
    }
}

/// Index of a pending optimistic record that `echo` is the server copy of.
fn pending_echo_slot(conversation: &Conversation, echo: &Message) -> Option<usize> {
    if !echo.is_self_authored() || echo.id.starts_with(TEMP_ID_PREFIX) {
        return None;
    }
    conversation.messages.iter().position(|pending| {
        pending.id.starts_with(TEMP_ID_PREFIX)
            && pending.is_self_authored()
            && pending.text_body() == echo.text_body()
            && (pending.timestamp - echo.timestamp).abs() <= ECHO_WINDOW_SECS
    })
}

/// Adds a message to its conversation, creating the conversation when needed.
///
/// A message whose id is already present is ignored. A self-authored echo that
/// matches a pending optimistic record replaces it in place.
pub fn fold_new_message(conversations: &mut Vec<Conversation>, mut message: Message) -> bool {
    message.conversation_id = resolve_conversation_id(&message);

    let slot = match conversations.iter().position(|c| c.conversation_id == message.conversation_id) {
        Some(slot) => slot,
        None => {
            conversations.push(Conversation::new(message.conversation_id.clone(), String::new()));
            conversations.len() - 1
        }
    };

    let conversation = &mut conversations[slot];
    if conversation.contains(&message.id) {
        return false;
    }

    conversation.adopt_display_name(&message.display_name);
    match pending_echo_slot(conversation, &message) {
        Some(pending) => conversation.messages[pending] = message,
        None => conversation.messages.push(message),
    }

    finalize(conversations);
    true
}

/// Sets the status of every cached message with the patch's id.
pub fn fold_status(conversations: &mut [Conversation], patch: &StatusPatch) -> bool {
    let mut changed = false;
    for message in conversations.iter_mut().flat_map(|c| c.messages.iter_mut()) {
        if message.id == patch.target_id && message.delivery_status != patch.new_status {
            message.delivery_status = patch.new_status;
            changed = true;
        }
    }
    if changed {
        finalize(conversations);
    }
    changed
}

/// Builds the record shown for a local send before the server confirms it.
#[must_use]
pub fn optimistic_message(conversation_id: &str, display_name: &str, body: &str, now: i64) -> Message {
    Message {
        id: format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4().simple()),
        conversation_id: conversation_id.to_string(),
        display_name: display_name.to_string(),
        from: SELF_SENDER.to_string(),
        timestamp: now,
        content: MessageContent::text(body),
        delivery_status: DeliveryStatus::Sent,
    }
}

/// Starts a new chat. The empty conversation is placed on top if it does not exist yet.
pub fn open_conversation(conversations: &mut Vec<Conversation>, conversation_id: &str, display_name: &str) -> bool {
    let conversation_id = conversation_id.trim();
    if conversation_id.is_empty() || conversations.iter().any(|c| c.conversation_id == conversation_id) {
        return false;
    }
    let name = if display_name.trim().is_empty() { conversation_id } else { display_name.trim() };
    conversations.insert(0, Conversation::new(conversation_id, name));
    true
}

/// Case-insensitive search over display names, falling back to the conversation id.
#[must_use]
pub fn filter_conversations<'a>(conversations: &'a [Conversation], query: &str) -> Vec<&'a Conversation> {
    let needle = query.trim().to_lowercase();
    conversations
        .iter()
        .filter(|c| {
            if needle.is_empty() {
                return true;
            }
            let label = if c.display_name.is_empty() { &c.conversation_id } else { &c.display_name };
            label.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Shared handle to the client state.
#[derive(Debug, Clone)]
pub struct ConversationCache {
    tx: watch::Sender<ClientState>,
}

impl Default for ConversationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationCache {
    #[must_use]
    pub fn new() -> Self {
        Self { tx: watch::Sender::new(ClientState::default()) }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> ClientState {
        self.tx.borrow().clone()
    }

    /// Replaces the cached list with a fresh server list and clears the resync flag.
    ///
    /// Local-only entries are carried over, see [`reload`].
    pub fn replace(&self, conversations: Vec<Conversation>) {
        self.tx.send_modify(|state| {
            state.conversations = reload(&state.conversations, conversations);
            state.needs_resync = false;
        });
    }

    pub fn apply_event(&self, event: &RealtimeEvent) {
        self.tx.send_if_modified(|state| match event {
            RealtimeEvent::Resync => {
                let changed = !state.needs_resync;
                state.needs_resync = true;
                changed
            }
            _ => fold_event(&mut state.conversations, event),
        });
    }

    /// Folds a locally composed message in through the `new_message` path.
    pub fn apply_local_send(&self, message: Message) {
        self.tx.send_if_modified(|state| fold_new_message(&mut state.conversations, message));
    }

    pub fn open_conversation(&self, conversation_id: &str, display_name: &str) {
        self.tx.send_if_modified(|state| open_conversation(&mut state.conversations, conversation_id, display_name));
    }

    pub fn set_error(&self, error: impl Into<String>) {
        let error = error.into();
        self.tx.send_modify(|state| state.error = Some(error));
    }

    pub fn dismiss_error(&self) {
        self.tx.send_if_modified(|state| state.error.take().is_some());
    }

    pub fn mark_resync(&self) {
        self.tx.send_if_modified(|state| !std::mem::replace(&mut state.needs_resync, true));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incoming(id: &str, wa_id: &str, timestamp: i64, body: &str) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: wa_id.to_string(),
            display_name: "Neha Joshi".to_string(),
            from: wa_id.to_string(),
            timestamp,
            content: MessageContent::text(body),
            delivery_status: DeliveryStatus::Sent,
        }
    }

    fn echo_of(pending: &Message, id: &str) -> Message {
        Message { id: id.to_string(), ..pending.clone() }
    }

    #[test]
    fn test_new_message_creates_conversation() {
        let mut conversations = Vec::new();
        assert!(fold_new_message(&mut conversations, incoming("m1", "w1", 100, "hi")));

        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].display_name, "Neha Joshi");
        assert_eq!(conversations[0].last_message_preview, "hi");
    }

    #[test]
    fn test_duplicate_id_is_ignored() {
        let mut conversations = Vec::new();
        fold_new_message(&mut conversations, incoming("m1", "w1", 100, "hi"));

        assert!(!fold_new_message(&mut conversations, incoming("m1", "w1", 100, "hi")));
        assert_eq!(conversations[0].messages.len(), 1);
    }

    #[test]
    fn test_blank_conversation_falls_back_to_sender_then_unknown() {
        let mut conversations = Vec::new();
        let mut from_only = incoming("m1", "", 100, "a");
        from_only.from = "w9".to_string();
        fold_new_message(&mut conversations, from_only);

        let mut anonymous = incoming("m2", "", 200, "b");
        anonymous.from = String::new();
        fold_new_message(&mut conversations, anonymous);

        let ids: Vec<_> = conversations.iter().map(|c| c.conversation_id.as_str()).collect();
        assert_eq!(ids, [UNKNOWN_CONVERSATION, "w9"]);
    }

    #[test]
    fn test_out_of_order_arrival_is_sorted() {
        let mut conversations = Vec::new();
        fold_new_message(&mut conversations, incoming("late", "w1", 200, "second"));
        fold_new_message(&mut conversations, incoming("early", "w1", 100, "first"));

        let ids: Vec<_> = conversations[0].messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["early", "late"]);
        assert_eq!(conversations[0].last_message_preview, "second");
    }

    #[test]
    fn test_activity_reorders_conversations() {
        let mut conversations = load(vec![]);
        fold_new_message(&mut conversations, incoming("a", "w1", 100, "x"));
        fold_new_message(&mut conversations, incoming("b", "w2", 200, "y"));
        assert_eq!(conversations[0].conversation_id, "w2");

        fold_new_message(&mut conversations, incoming("c", "w1", 300, "z"));
        assert_eq!(conversations[0].conversation_id, "w1");
    }

    #[test]
    fn test_status_patches_only_matching_id() {
        let mut conversations = Vec::new();
        fold_new_message(&mut conversations, incoming("m1", "w1", 100, "a"));
        fold_new_message(&mut conversations, incoming("m2", "w1", 200, "b"));

        let patch = StatusPatch { target_id: "m1".to_string(), new_status: DeliveryStatus::Read };
        assert!(fold_status(&mut conversations, &patch));

        let statuses: Vec<_> = conversations[0].messages.iter().map(|m| m.delivery_status).collect();
        assert_eq!(statuses, [DeliveryStatus::Read, DeliveryStatus::Sent]);
    }

    #[test]
    fn test_status_for_unknown_id_changes_nothing() {
        let mut conversations = Vec::new();
        fold_new_message(&mut conversations, incoming("m1", "w1", 100, "a"));
        let before = conversations.clone();

        let patch = StatusPatch { target_id: "ghost".to_string(), new_status: DeliveryStatus::Read };
        assert!(!fold_status(&mut conversations, &patch));
        assert_eq!(conversations, before);
    }

    #[test]
    fn test_echo_with_same_id_is_deduplicated() {
        let mut conversations = Vec::new();
        let pending = optimistic_message("w1", "Neha Joshi", "hello", 1000);
        fold_new_message(&mut conversations, pending.clone());

        let echo = Message { timestamp: 1001, ..pending };
        assert!(!fold_new_message(&mut conversations, echo));
        assert_eq!(conversations[0].messages.len(), 1);
    }

    #[test]
    fn test_echo_with_new_id_replaces_pending_record() {
        let mut conversations = Vec::new();
        let pending = optimistic_message("w1", "", "hello", 1000);
        fold_new_message(&mut conversations, pending.clone());

        assert!(fold_new_message(&mut conversations, echo_of(&pending, "local_1")));

        let ids: Vec<_> = conversations[0].messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["local_1"]);
    }

    #[test]
    fn test_echo_outside_window_is_appended() {
        let mut conversations = Vec::new();
        let pending = optimistic_message("w1", "", "hello", 1000);
        fold_new_message(&mut conversations, pending.clone());

        let late = Message { timestamp: 1000 + ECHO_WINDOW_SECS + 1, ..echo_of(&pending, "local_1") };
        fold_new_message(&mut conversations, late);

        assert_eq!(conversations[0].messages.len(), 2);
    }

    #[test]
    fn test_incoming_message_never_replaces_pending() {
        let mut conversations = Vec::new();
        let pending = optimistic_message("w1", "", "hello", 1000);
        fold_new_message(&mut conversations, pending);

        fold_new_message(&mut conversations, incoming("wamid.1", "w1", 1000, "hello"));
        assert_eq!(conversations[0].messages.len(), 2);
    }

    #[test]
    fn test_optimistic_message_shape() {
        let message = optimistic_message("w1", "Neha", "hi", 42);
        assert!(message.id.starts_with(TEMP_ID_PREFIX));
        assert_eq!(message.from, SELF_SENDER);
        assert_eq!(message.delivery_status, DeliveryStatus::Sent);
        assert_eq!(message.timestamp, 42);
    }

    #[test]
    fn test_open_conversation_inserts_on_top_once() {
        let mut conversations = Vec::new();
        fold_new_message(&mut conversations, incoming("m1", "w1", 100, "a"));

        assert!(open_conversation(&mut conversations, "w2", ""));
        assert!(!open_conversation(&mut conversations, "w2", "Other"));
        assert!(!open_conversation(&mut conversations, "w1", ""));

        assert_eq!(conversations[0].conversation_id, "w2");
        assert_eq!(conversations[0].display_name, "w2");
        assert_eq!(conversations.len(), 2);
    }

    #[test]
    fn test_filter_is_case_insensitive_with_id_fallback() {
        let conversations = vec![Conversation::new("919937320320", "Ravi Kumar"), Conversation::new("929967673820", "")];

        let by_name: Vec<_> = filter_conversations(&conversations, "ravi").iter().map(|c| c.display_name.clone()).collect();
        assert_eq!(by_name, ["Ravi Kumar"]);

        let by_id = filter_conversations(&conversations, "9299");
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].conversation_id, "929967673820");

        assert_eq!(filter_conversations(&conversations, "  ").len(), 2);
    }

    #[test]
    fn test_cache_publishes_snapshots() {
        let cache = ConversationCache::new();
        let mut rx = cache.subscribe();

        cache.apply_local_send(optimistic_message("w1", "", "hi", 10));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().conversations.len(), 1);

        cache.apply_event(&RealtimeEvent::StatusUpdate(StatusPatch {
            target_id: "ghost".to_string(),
            new_status: DeliveryStatus::Read,
        }));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_cache_resync_and_error_flags() {
        let cache = ConversationCache::new();

        cache.apply_event(&RealtimeEvent::Resync);
        assert!(cache.snapshot().needs_resync);

        cache.replace(vec![Conversation::new("w1", "")]);
        assert!(!cache.snapshot().needs_resync);

        cache.set_error(SEND_FAILED_ERROR);
        assert_eq!(cache.snapshot().error.as_deref(), Some(SEND_FAILED_ERROR));
        cache.dismiss_error();
        assert_eq!(cache.snapshot().error, None);
    }

    #[test]
    fn test_refetch_keeps_unsent_optimistic_record() {
        let cache = ConversationCache::new();
        cache.apply_local_send(optimistic_message("w1", "Neha", "unsent", 1000));
        cache.set_error(SEND_FAILED_ERROR);

        cache.replace(vec![]);

        let state = cache.snapshot();
        assert_eq!(state.error.as_deref(), Some(SEND_FAILED_ERROR));
        assert_eq!(state.conversations.len(), 1);
        assert_eq!(state.conversations[0].messages[0].text_body(), Some("unsent"));
    }

    #[test]
    fn test_refetch_drops_optimistic_record_the_server_holds() {
        let pending = optimistic_message("w1", "", "hello", 1000);
        let previous = vec![Conversation { messages: vec![pending.clone()], ..Conversation::new("w1", "") }];

        let adopted = load(vec![Conversation { messages: vec![pending.clone()], ..Conversation::new("w1", "") }]);
        assert_eq!(reload(&previous, adopted)[0].messages.len(), 1);

        let echoed = vec![Conversation { messages: vec![echo_of(&pending, "local_1")], ..Conversation::new("w1", "") }];
        let merged = reload(&previous, echoed);
        let ids: Vec<_> = merged[0].messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["local_1"]);
    }

    #[test]
    fn test_refetch_keeps_opened_conversation_on_top() {
        let mut previous = Vec::new();
        fold_new_message(&mut previous, incoming("m1", "w1", 100, "a"));
        open_conversation(&mut previous, "w2", "Draft");

        let fresh = vec![Conversation { messages: vec![incoming("m1", "w1", 100, "a")], ..Conversation::new("w1", "") }];
        let merged = reload(&previous, fresh);

        let ids: Vec<_> = merged.iter().map(|c| c.conversation_id.as_str()).collect();
        assert_eq!(ids, ["w2", "w1"]);
        assert_eq!(merged[0].display_name, "Draft");
    }

    #[test]
    fn test_refetch_merges_server_messages_with_pending() {
        let mut previous = Vec::new();
        fold_new_message(&mut previous, optimistic_message("w1", "", "mine", 2000));

        let fresh = vec![Conversation { messages: vec![incoming("m1", "w1", 1000, "theirs")], ..Conversation::new("w1", "") }];
        let merged = reload(&previous, fresh);

        assert_eq!(merged.len(), 1);
        let bodies: Vec<_> = merged[0].messages.iter().map(|m| m.text_body()).collect();
        assert_eq!(bodies, [Some("theirs"), Some("mine")]);
    }
}
