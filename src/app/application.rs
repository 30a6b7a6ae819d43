//! Applications: one registered RTMP endpoint, its hall/rooms state, and
//! the generic connect/disconnect orchestration around it.
//!
//! `Application` owns the shared state (hall, named rooms) and the
//! orchestration; `ApplicationHooks` is the customization point an
//! application author implements (`EchoApplication`, `ChatApplication`,
//! ...). Splitting state from behavior this way avoids needing
//! inheritance to override individual lifecycle steps.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::amf::Amf0Value;
use crate::app::room::Room;
use crate::rtmp::connection::ConnectionHandle;

/// Customizable behavior for one RTMP application: the hooks an
/// implementation overrides to react to connect/room lifecycle events and
/// to answer RPC calls by name.
#[async_trait]
pub trait ApplicationHooks: Send + Sync {
    /// Registered name clients connect to (the head segment of `params.app`).
    fn app_name(&self) -> &'static str;

    /// Called once per successful connect, before room entry. A failing
    /// hook aborts the whole connect chain with no side effects.
    async fn on_connect(&self, _client: &ConnectionHandle, _path: &[String], _params: &Amf0Value) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called the first time a named room is entered. Not called for the hall.
    async fn on_create_room(&self, _client: &ConnectionHandle, _room_name: &str, _path: &[String]) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once a client has been admitted into `_room`.
    async fn on_enter_room(&self, _client: &ConnectionHandle, _room: &Arc<Room>, _path: &[String]) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called as a client leaves `_room`. Best-effort: must not fail;
    /// implementations that can fail should log and swallow the error.
    async fn on_leave_room(&self, _client: &ConnectionHandle, _room: &Arc<Room>) {}

    /// Called once a non-hall room has lost its last member. Best-effort,
    /// same as `on_leave_room`.
    async fn on_destroy_room(&self, _room: &Arc<Room>) {}

    /// Named RPC dispatch. Returns `None` when this application has no
    /// handler for `name` (the caller treats this as an unhandled invoke),
    /// `Some(Ok(value))` with the single reply value on success, or
    /// `Some(Err(_))` if the handler failed.
    async fn invoke(&self, _name: &str, _client: &ConnectionHandle, _args: &[Amf0Value]) -> Option<anyhow::Result<Amf0Value>> {
        None
    }
}

/// One registered application: its hooks plus the hall/rooms state shared
/// across every client connected to it.
pub struct Application {
    hooks: Arc<dyn ApplicationHooks>,
    hall: Arc<Room>,
    rooms: DashMap<String, Arc<Room>>,
}

impl Application {
    pub fn new(hooks: Arc<dyn ApplicationHooks>) -> Self {
        let hall = Arc::new(Room::hall(hooks.app_name()));
        Application {
            hooks,
            hall,
            rooms: DashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.hooks.app_name()
    }

    pub fn hall(&self) -> &Arc<Room> {
        &self.hall
    }

    /// Run the full connect chain: `on_connect`, then create-or-find the
    /// target room and `on_enter_room`. `path` is the connect path with the
    /// application name already stripped off.
    pub async fn connect(&self, client: &ConnectionHandle, path: &[String], params: &Amf0Value) -> anyhow::Result<Arc<Room>> {
        self.hooks.on_connect(client, path, params).await?;

        let (room, path_tail) = match path.split_first() {
            None => (self.hall.clone(), &[][..]),
            Some((room_name, path_tail)) => {
                let room = match self.rooms.get(room_name.as_str()) {
                    Some(existing) => existing.clone(),
                    None => {
                        self.hooks.on_create_room(client, room_name, path_tail).await?;
                        let room = Arc::new(Room::new(self.name(), room_name.clone()));
                        self.rooms.insert(room_name.clone(), room.clone());
                        room
                    }
                };
                (room, path_tail)
            }
        };

        match self.hooks.on_enter_room(client, &room, path_tail).await {
            Ok(()) => {
                room.enter(client.clone());
                Ok(room)
            }
            Err(e) => {
                self.destroy_if_abandoned(&room).await;
                Err(e)
            }
        }
    }

    /// Run a client's leave-room chain: `on_leave_room`, then tear the room
    /// down if it's now empty.
    pub async fn disconnect(&self, client: &ConnectionHandle, room: &Arc<Room>) {
        self.hooks.on_leave_room(client, room).await;
        room.leave(client);
        self.destroy_if_abandoned(room).await;
    }

    pub async fn invoke(&self, name: &str, client: &ConnectionHandle, args: &[Amf0Value]) -> Option<anyhow::Result<Amf0Value>> {
        self.hooks.invoke(name, client, args).await
    }

    /// A non-hall room with no members left is torn down and dropped from
    /// the registry.
    async fn destroy_if_abandoned(&self, room: &Arc<Room>) {
        if room.is_hall() || !room.is_empty() {
            return;
        }
        self.hooks.on_destroy_room(room).await;
        self.rooms.remove(&room.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::rtmp::connection::test_support::fake_handle;

    /// Records hook calls in order, for lifecycle-ordering assertions.
    #[derive(Default)]
    struct RecordingHooks {
        name: &'static str,
        log: Mutex<Vec<String>>,
        fail_connect: bool,
        fail_create_room: bool,
        fail_enter_room: bool,
    }

    #[async_trait]
    impl ApplicationHooks for RecordingHooks {
        fn app_name(&self) -> &'static str {
            self.name
        }

        async fn on_connect(&self, _client: &ConnectionHandle, path: &[String], _params: &Amf0Value) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("on_connect({:?})", path));
            if self.fail_connect {
                anyhow::bail!("connect refused");
            }
            Ok(())
        }

        async fn on_create_room(&self, _client: &ConnectionHandle, room_name: &str, path: &[String]) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("on_create_room({:?}, {:?})", room_name, path));
            if self.fail_create_room {
                anyhow::bail!("create room refused");
            }
            Ok(())
        }

        async fn on_enter_room(&self, _client: &ConnectionHandle, room: &Arc<Room>, path: &[String]) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("on_enter_room({:?}, {:?})", room.name, path));
            if self.fail_enter_room {
                anyhow::bail!("enter room refused");
            }
            Ok(())
        }

        async fn on_leave_room(&self, _client: &ConnectionHandle, room: &Arc<Room>) {
            self.log.lock().unwrap().push(format!("on_leave_room({:?})", room.name));
        }

        async fn on_destroy_room(&self, room: &Arc<Room>) {
            self.log.lock().unwrap().push(format!("on_destroy_room({:?})", room.name));
        }
    }

    fn params() -> Amf0Value {
        Amf0Value::Object { class_name: None, entries: vec![] }
    }

    #[test]
    fn connect_with_no_path_lands_in_hall() {
        smol::block_on(async {
            let hooks = Arc::new(RecordingHooks { name: "app", ..Default::default() });
            let app = Application::new(hooks);
            let client = fake_handle(1);

            let room = app.connect(&client, &[], &params()).await.unwrap();
            assert!(room.is_hall());
            assert!(app.rooms.is_empty());
        });
    }

    #[test]
    fn connect_with_path_creates_room_once_for_two_clients() {
        smol::block_on(async {
            let hooks = Arc::new(RecordingHooks { name: "app", ..Default::default() });
            let app = Application::new(hooks.clone());
            let c1 = fake_handle(1);
            let c2 = fake_handle(2);
            let path = vec!["kitchen".to_string()];

            let room1 = app.connect(&c1, &path, &params()).await.unwrap();
            let room2 = app.connect(&c2, &path, &params()).await.unwrap();

            assert_eq!(room1.name, "kitchen");
            assert!(Arc::ptr_eq(&room1, &room2));
            assert_eq!(room1.snapshot().len(), 2);

            let log = hooks.log.lock().unwrap();
            assert_eq!(log.iter().filter(|l| l.starts_with("on_create_room")).count(), 1);
        });
    }

    #[test]
    fn disconnect_from_sole_room_destroys_it() {
        smol::block_on(async {
            let hooks = Arc::new(RecordingHooks { name: "app", ..Default::default() });
            let app = Application::new(hooks.clone());
            let client = fake_handle(1);
            let path = vec!["kitchen".to_string()];

            let room = app.connect(&client, &path, &params()).await.unwrap();
            app.disconnect(&client, &room).await;

            assert!(app.rooms.is_empty());
            let log = hooks.log.lock().unwrap().clone();
            assert_eq!(
                log,
                vec![
                    "on_connect([\"kitchen\"])".to_string(),
                    "on_create_room(\"kitchen\", [])".to_string(),
                    "on_enter_room(\"kitchen\", [])".to_string(),
                    "on_leave_room(\"kitchen\")".to_string(),
                    "on_destroy_room(\"kitchen\")".to_string(),
                ]
            );
        });
    }

    #[test]
    fn refused_connect_leaves_no_room_state() {
        smol::block_on(async {
            let hooks = Arc::new(RecordingHooks { name: "app", fail_connect: true, ..Default::default() });
            let app = Application::new(hooks);
            let client = fake_handle(1);

            let err = app.connect(&client, &["kitchen".to_string()], &params()).await;
            assert!(err.is_err());
            assert!(app.rooms.is_empty());
        });
    }

    #[test]
    fn refused_create_room_is_never_registered() {
        smol::block_on(async {
            let hooks = Arc::new(RecordingHooks { name: "app", fail_create_room: true, ..Default::default() });
            let app = Application::new(hooks);
            let client = fake_handle(1);

            let err = app.connect(&client, &["kitchen".to_string()], &params()).await;
            assert!(err.is_err());
            assert!(app.rooms.is_empty());
        });
    }

    #[test]
    fn refused_enter_room_after_create_destroys_and_removes_room() {
        smol::block_on(async {
            let hooks = Arc::new(RecordingHooks { name: "app", fail_enter_room: true, ..Default::default() });
            let app = Application::new(hooks.clone());
            let client = fake_handle(1);

            let err = app.connect(&client, &["kitchen".to_string()], &params()).await;
            assert!(err.is_err());
            assert!(app.rooms.is_empty());

            let log = hooks.log.lock().unwrap();
            assert!(log.iter().any(|l| l.starts_with("on_destroy_room")));
        });
    }
}
