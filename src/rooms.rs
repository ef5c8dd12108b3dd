//! Room membership controller.
//!
//! Memberships are declarative: the set of rooms this session wants is kept
//! locally, and the whole set is replayed on every transition to connected.
//! The backend treats joins as idempotent, so replays are at-least-once.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use frames::{ClientMessage, QuizId, Role, RoomKey, UserKey};
use tracing::debug;

use crate::net::{Connection, EventKind, Subscription};

struct RoomsShared {
    conn: Connection,
    joined: Mutex<BTreeSet<RoomKey>>,
}

impl RoomsShared {
    fn joined(&self) -> MutexGuard<'_, BTreeSet<RoomKey>> {
        self.joined.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn replay(&self) {
        let rooms: Vec<RoomKey> = self.joined().iter().cloned().collect();
        debug!(count = rooms.len(), "rejoining rooms");
        for room in rooms {
            self.conn.send(&ClientMessage::JoinRoom(room));
        }
    }
}

/// The rooms one session is a member of. Leaves every room when dropped.
pub struct Rooms {
    shared: Arc<RoomsShared>,
    _rejoin: Subscription,
}

impl Rooms {
    #[must_use]
    pub fn new(conn: &Connection) -> Self {
        let shared = Arc::new(RoomsShared { conn: conn.clone(), joined: Mutex::new(BTreeSet::new()) });
        let weak: Weak<RoomsShared> = Arc::downgrade(&shared);
        let rejoin = conn.subscribe(EventKind::Connect, move |_| {
            if let Some(shared) = weak.upgrade() {
                shared.replay();
            }
        });
        Self { shared, _rejoin: rejoin }
    }

    /// Add `room`. Returns `false` when it was already a member.
    ///
    /// A join message goes out immediately only when connected; otherwise the
    /// next connect replays it.
    pub fn join(&self, room: RoomKey) -> bool {
        if !self.shared.joined().insert(room.clone()) {
            return false;
        }
        if self.shared.conn.is_connected() {
            self.shared.conn.send(&ClientMessage::JoinRoom(room));
        }
        true
    }

    pub fn join_quiz_room(&self, quiz_id: QuizId) -> bool {
        self.join(RoomKey::Quiz { quiz_id })
    }

    pub fn join_role_room(&self, quiz_id: QuizId, role: Role) -> bool {
        self.join(RoomKey::Role { quiz_id, role })
    }

    pub fn join_personal_room(&self, quiz_id: QuizId, user_id: UserKey) -> bool {
        self.join(RoomKey::Personal { quiz_id, user_id })
    }

    /// Drop `room`. Returns `false` when it was not a member.
    pub fn leave(&self, room: &RoomKey) -> bool {
        if !self.shared.joined().remove(room) {
            return false;
        }
        if self.shared.conn.is_connected() {
            self.shared.conn.send(&ClientMessage::LeaveRoom(room.clone()));
        }
        true
    }

    pub fn leave_all(&self) {
        let rooms = std::mem::take(&mut *self.shared.joined());
        let connected = self.shared.conn.is_connected();
        for room in rooms {
            if connected {
                self.shared.conn.send(&ClientMessage::LeaveRoom(room));
            }
        }
    }

    #[must_use]
    pub fn memberships(&self) -> Vec<RoomKey> {
        self.shared.joined().iter().cloned().collect()
    }

    #[must_use]
    pub fn is_joined(&self, room: &RoomKey) -> bool {
        self.shared.joined().contains(room)
    }
}

impl Drop for Rooms {
    fn drop(&mut self) {
        self.leave_all();
    }
}

impl std::fmt::Debug for Rooms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rooms").field("joined", &self.memberships()).finish()
    }
}

#[cfg(test)]
#[path = "rooms_test.rs"]
mod tests;
