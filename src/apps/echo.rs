//! Demo application mirroring `fmspy.plugins.echo_application.EchoApplication`
//! (SPEC_FULL.md §4 "Demo applications"): a minimal, unconditionally
//! successful application used to exercise the connect/room lifecycle with
//! no interesting business logic of its own.

use async_trait::async_trait;
use std::sync::Arc;

use crate::amf::Amf0Value;
use crate::app::application::ApplicationHooks;
use crate::app::room::Room;
use crate::rtmp::connection::ConnectionHandle;

pub struct EchoApplication;

#[async_trait]
impl ApplicationHooks for EchoApplication {
    fn app_name(&self) -> &'static str {
        "echo"
    }

    async fn on_connect(&self, client: &ConnectionHandle, path: &[String], _params: &Amf0Value) -> anyhow::Result<()> {
        log::info!("echo: {} connecting, path={:?}", client.peer_addr(), path);
        Ok(())
    }

    async fn on_create_room(&self, client: &ConnectionHandle, room_name: &str, _path: &[String]) -> anyhow::Result<()> {
        log::info!("echo: {} created room {:?}", client.peer_addr(), room_name);
        Ok(())
    }

    async fn on_enter_room(&self, client: &ConnectionHandle, room: &Arc<Room>, _path: &[String]) -> anyhow::Result<()> {
        log::info!("echo: {} entered room {:?}", client.peer_addr(), room.name);
        Ok(())
    }

    async fn on_leave_room(&self, client: &ConnectionHandle, room: &Arc<Room>) {
        log::info!("echo: {} left room {:?}", client.peer_addr(), room.name);
    }

    async fn on_destroy_room(&self, room: &Arc<Room>) {
        log::info!("echo: room {:?} destroyed", room.name);
    }

    /// `invoke_echo` (spec.md §9: `invoke_<name>` -> this registry entry):
    /// hands the first argument straight back.
    async fn invoke(&self, name: &str, client: &ConnectionHandle, args: &[Amf0Value]) -> Option<anyhow::Result<Amf0Value>> {
        if name != "echo" {
            return None;
        }
        let value = args.get(0).cloned().unwrap_or(Amf0Value::Null);
        log::debug!("echo: {} called echo({:?})", client.peer_addr(), value);
        Some(Ok(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtmp::connection::test_support::fake_handle;

    #[test]
    fn invoke_echo_returns_its_argument() {
        smol::block_on(async {
            let app = EchoApplication;
            let client = fake_handle(1);
            let result = app.invoke("echo", &client, &[Amf0Value::String("hi".to_string())]).await;
            match result {
                Some(Ok(Amf0Value::String(s))) => assert_eq!(s, "hi"),
                other => panic!("unexpected: {:?}", other.map(|r| r.is_ok())),
            }
        });
    }

    #[test]
    fn invoke_unknown_name_is_unhandled() {
        smol::block_on(async {
            let app = EchoApplication;
            let client = fake_handle(1);
            assert!(app.invoke("nope", &client, &[]).await.is_none());
        });
    }
}
