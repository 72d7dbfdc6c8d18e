use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod events;
pub mod message_types;
pub mod session;

/// Unique identifier for one live WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

struct SessionEntry {
    user_id: Uuid,
    sender: UnboundedSender<String>,
}

#[derive(Default)]
struct DirectoryInner {
    sessions: HashMap<SessionId, SessionEntry>,
    /// Scalar handle per user, last-connected wins (single-device model).
    users: HashMap<Uuid, SessionId>,
    /// conversation id -> sessions joined to that room
    rooms: HashMap<Uuid, HashSet<SessionId>>,
    /// session id -> rooms it joined, for O(memberships) teardown
    memberships: HashMap<SessionId, HashSet<Uuid>>,
}

/// Process-wide map of live connections: user <-> connection handle and
/// conversation -> subscriber set. Purely in-memory; every entry lives
/// exactly as long as its connection. Injected through `AppState`, never
/// accessed as ambient state.
#[derive(Default, Clone)]
pub struct ConnectionDirectory {
    inner: Arc<RwLock<DirectoryInner>>,
}

impl ConnectionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a user. Returns the session id and the
    /// receiving half the session actor drains. A previous session of the
    /// same user stays subscribed to its rooms but is no longer reachable
    /// through the user index.
    pub async fn register(&self, user_id: Uuid) -> (SessionId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let session_id = SessionId::new();

        let mut guard = self.inner.write().await;
        guard.sessions.insert(
            session_id,
            SessionEntry {
                user_id,
                sender: tx,
            },
        );
        guard.users.insert(user_id, session_id);
        guard.memberships.insert(session_id, HashSet::new());

        tracing::debug!(%user_id, ?session_id, "registered connection");
        (session_id, rx)
    }

    /// Drop a connection and every room membership it held. Returns the
    /// rooms it was joined to so callers can fan out presence updates.
    pub async fn unregister(&self, session_id: SessionId) -> Vec<Uuid> {
        let mut guard = self.inner.write().await;

        let rooms: Vec<Uuid> = guard
            .memberships
            .remove(&session_id)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();

        for conversation_id in &rooms {
            if let Some(members) = guard.rooms.get_mut(conversation_id) {
                members.remove(&session_id);
                if members.is_empty() {
                    guard.rooms.remove(conversation_id);
                }
            }
        }

        if let Some(entry) = guard.sessions.remove(&session_id) {
            // Only clear the user index if it still points at this session;
            // a newer connection may have taken over.
            if guard.users.get(&entry.user_id) == Some(&session_id) {
                guard.users.remove(&entry.user_id);
            }
            tracing::debug!(user_id = %entry.user_id, ?session_id, "unregistered connection");
        }

        rooms
    }

    pub async fn join(&self, session_id: SessionId, conversation_id: Uuid) {
        let mut guard = self.inner.write().await;
        if !guard.sessions.contains_key(&session_id) {
            return;
        }
        guard
            .rooms
            .entry(conversation_id)
            .or_default()
            .insert(session_id);
        guard
            .memberships
            .entry(session_id)
            .or_default()
            .insert(conversation_id);
    }

    pub async fn leave(&self, session_id: SessionId, conversation_id: Uuid) {
        let mut guard = self.inner.write().await;
        if let Some(members) = guard.rooms.get_mut(&conversation_id) {
            members.remove(&session_id);
            if members.is_empty() {
                guard.rooms.remove(&conversation_id);
            }
        }
        if let Some(rooms) = guard.memberships.get_mut(&session_id) {
            rooms.remove(&conversation_id);
        }
    }

    /// Join a user's current live session (if any) to a room. Used when a
    /// send implicitly creates a conversation: both sides must hear the
    /// first broadcast without an explicit subscribe round-trip.
    pub async fn join_user(&self, user_id: Uuid, conversation_id: Uuid) {
        let session_id = {
            let guard = self.inner.read().await;
            guard.users.get(&user_id).copied()
        };
        if let Some(session_id) = session_id {
            self.join(session_id, conversation_id).await;
        }
    }

    /// Drop a user's current live session (if any) from a room. Used when
    /// group membership changes server-side.
    pub async fn leave_user(&self, user_id: Uuid, conversation_id: Uuid) {
        let session_id = {
            let guard = self.inner.read().await;
            guard.users.get(&user_id).copied()
        };
        if let Some(session_id) = session_id {
            self.leave(session_id, conversation_id).await;
        }
    }

    /// Broadcast a payload to every session joined to the conversation's
    /// room, optionally excluding one (the originator). Dead senders are
    /// pruned on the way.
    pub async fn broadcast(
        &self,
        conversation_id: Uuid,
        payload: &str,
        exclude: Option<SessionId>,
    ) {
        let mut guard = self.inner.write().await;
        let Some(members) = guard.rooms.get(&conversation_id) else {
            return;
        };

        let mut dead: Vec<SessionId> = Vec::new();
        for session_id in members.iter().copied() {
            if Some(session_id) == exclude {
                continue;
            }
            if let Some(entry) = guard.sessions.get(&session_id) {
                if entry.sender.send(payload.to_string()).is_err() {
                    dead.push(session_id);
                }
            } else {
                dead.push(session_id);
            }
        }

        for session_id in dead {
            if let Some(members) = guard.rooms.get_mut(&conversation_id) {
                members.remove(&session_id);
            }
            if let Some(rooms) = guard.memberships.get_mut(&session_id) {
                rooms.remove(&conversation_id);
            }
        }
    }

    /// Deliver a payload to a user's current connection. No-op when the
    /// user is offline.
    pub async fn send_to_user(&self, user_id: Uuid, payload: &str) -> bool {
        let guard = self.inner.read().await;
        let Some(session_id) = guard.users.get(&user_id) else {
            return false;
        };
        match guard.sessions.get(session_id) {
            Some(entry) => entry.sender.send(payload.to_string()).is_ok(),
            None => false,
        }
    }

    pub async fn rooms_of(&self, session_id: SessionId) -> Vec<Uuid> {
        let guard = self.inner.read().await;
        guard
            .memberships
            .get(&session_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn rooms_for_user(&self, user_id: Uuid) -> Vec<Uuid> {
        let guard = self.inner.read().await;
        guard
            .users
            .get(&user_id)
            .and_then(|sid| guard.memberships.get(sid))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn is_user_connected(&self, user_id: Uuid) -> bool {
        let guard = self.inner.read().await;
        guard.users.contains_key(&user_id)
    }

    pub async fn room_size(&self, conversation_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard
            .rooms
            .get(&conversation_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_joined_sessions_and_honors_exclude() {
        let directory = ConnectionDirectory::new();
        let conversation = Uuid::new_v4();

        let (alice_sid, mut alice_rx) = directory.register(Uuid::new_v4()).await;
        let (bob_sid, mut bob_rx) = directory.register(Uuid::new_v4()).await;
        directory.join(alice_sid, conversation).await;
        directory.join(bob_sid, conversation).await;

        directory
            .broadcast(conversation, "hello", Some(alice_sid))
            .await;

        assert_eq!(bob_rx.recv().await.unwrap(), "hello");
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_drops_all_memberships() {
        let directory = ConnectionDirectory::new();
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();

        let (sid, _rx) = directory.register(Uuid::new_v4()).await;
        directory.join(sid, room_a).await;
        directory.join(sid, room_b).await;
        assert_eq!(directory.room_size(room_a).await, 1);

        let mut rooms = directory.unregister(sid).await;
        rooms.sort();
        let mut expected = vec![room_a, room_b];
        expected.sort();
        assert_eq!(rooms, expected);
        assert_eq!(directory.room_size(room_a).await, 0);
        assert_eq!(directory.room_size(room_b).await, 0);
    }

    #[tokio::test]
    async fn send_to_user_is_noop_when_offline() {
        let directory = ConnectionDirectory::new();
        assert!(!directory.send_to_user(Uuid::new_v4(), "hi").await);
    }

    #[tokio::test]
    async fn last_connected_session_wins_the_user_index() {
        let directory = ConnectionDirectory::new();
        let user = Uuid::new_v4();

        let (_old_sid, mut old_rx) = directory.register(user).await;
        let (_new_sid, mut new_rx) = directory.register(user).await;

        assert!(directory.send_to_user(user, "ping").await);
        assert_eq!(new_rx.recv().await.unwrap(), "ping");
        assert!(old_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stale_session_does_not_clear_newer_user_entry() {
        let directory = ConnectionDirectory::new();
        let user = Uuid::new_v4();

        let (old_sid, _old_rx) = directory.register(user).await;
        let (_new_sid, mut new_rx) = directory.register(user).await;

        directory.unregister(old_sid).await;

        assert!(directory.is_user_connected(user).await);
        assert!(directory.send_to_user(user, "still here").await);
        assert_eq!(new_rx.recv().await.unwrap(), "still here");
    }

    #[tokio::test]
    async fn join_user_subscribes_the_live_session() {
        let directory = ConnectionDirectory::new();
        let user = Uuid::new_v4();
        let conversation = Uuid::new_v4();

        let (_sid, mut rx) = directory.register(user).await;
        directory.join_user(user, conversation).await;
        directory.broadcast(conversation, "first", None).await;

        assert_eq!(rx.recv().await.unwrap(), "first");
    }
}
