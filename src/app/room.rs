//! Application rooms: a named set of clients scoped to one application.
//! `_` (the hall) is the default room every application gets for free and
//! that never gets torn down by emptiness.

use std::sync::Mutex;

use crate::rtmp::connection::ConnectionHandle;

/// Room name reserved for an application's default, eagerly-created room.
pub const HALL: &str = "_";

pub struct Room {
    pub application_name: String,
    pub name: String,
    clients: Mutex<Vec<ConnectionHandle>>,
}

impl Room {
    pub fn new(application_name: impl Into<String>, name: impl Into<String>) -> Self {
        Room {
            application_name: application_name.into(),
            name: name.into(),
            clients: Mutex::new(Vec::new()),
        }
    }

    pub fn hall(application_name: impl Into<String>) -> Self {
        Room::new(application_name, HALL)
    }

    pub fn is_hall(&self) -> bool {
        self.name == HALL
    }

    /// Add `client` to the room. Logs instead of panicking if the client is
    /// already a member, since that points at a bookkeeping bug elsewhere
    /// rather than something worth crashing a connection task over.
    pub fn enter(&self, client: ConnectionHandle) {
        let mut clients = self.clients.lock().unwrap();
        if clients.iter().any(|c| c.id() == client.id()) {
            log::warn!("client {} entered room {:?} it was already in", client.id(), self.name);
            return;
        }
        clients.push(client);
    }

    /// Remove `client` from the room. Returns whether the room is now
    /// empty, so callers can decide whether to tear it down.
    pub fn leave(&self, client: &ConnectionHandle) -> bool {
        let mut clients = self.clients.lock().unwrap();
        clients.retain(|c| c.id() != client.id());
        clients.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().unwrap().is_empty()
    }

    /// Snapshot of current members, for broadcast iteration: callers clone
    /// the membership set before sending rather than hold the lock while
    /// pushing to each client.
    pub fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.clients.lock().unwrap().clone()
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.clients.lock().unwrap().len();
        write!(f, "Room({:?} @ {:?}, {} clients)", self.name, self.application_name, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtmp::connection::test_support::fake_handle;

    #[test]
    fn enter_and_leave_track_membership() {
        let room = Room::new("app", "kitchen");
        let a = fake_handle(1);
        let b = fake_handle(2);

        room.enter(a.clone());
        room.enter(b.clone());
        assert_eq!(room.snapshot().len(), 2);
        assert!(!room.is_empty());

        assert!(!room.leave(&a));
        assert!(room.leave(&b));
        assert!(room.is_empty());
    }

    #[test]
    fn hall_is_named_underscore() {
        let hall = Room::hall("app");
        assert!(hall.is_hall());
        assert_eq!(hall.name, "_");
    }
}
