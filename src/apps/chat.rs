//! Demo application mirroring `fmspy.plugins.chat_application.ChatApplication`
//! (SPEC_FULL.md §4 "Demo applications"): a room-scoped group chat that
//! exercises Room broadcast iteration (spec.md §5 "broadcasts by a handler
//! iterate clients in an unspecified but stable-within-call order").
//!
//! Each client must `identify(name)` once before `say(text)` works; both
//! failures surface as `_error` replies via `AppError`'s custom status code
//! (spec.md §4.6 `Status.from_error`).

use async_trait::async_trait;
use std::sync::Arc;

use crate::amf::Amf0Value;
use crate::app::application::ApplicationHooks;
use crate::app::room::Room;
use crate::error::AppError;
use crate::rtmp::connection::ConnectionHandle;
use crate::rtmp::constants::CONTROL_CHANNEL;
use crate::rtmp::packet::{Invoke, Packet};

mod status_code {
    pub const ALREADY_IDENTIFIED: &str = "Chat.Error.AlreadyIdentified";
    pub const NOT_IDENTIFIED: &str = "Chat.Error.NotIdentified";
}

/// This client's chosen display name, held in its `ConnectionHandle`
/// scratch slot (spec.md §9 "per-connection opaque scratch").
#[derive(Clone)]
struct Identity(String);

/// Push a one-way "chat line" notification to `client` — a fire-and-forget
/// `Invoke` the peer doesn't reply to, the same shape `fmspy`'s chat plugin
/// uses for `onChat`-style pushes outside the request/reply RPC flow.
fn push_notify(client: &ConnectionHandle, method: &str, text: String) {
    let notify = Invoke::new(CONTROL_CHANNEL, method, 0.0, vec![Amf0Value::Null, Amf0Value::String(text)]);
    client.push_packet(Packet::Invoke(notify));
}

fn broadcast(room: &Arc<Room>, except: u64, method: &str, text: String) {
    for member in room.snapshot() {
        if member.id() != except {
            push_notify(&member, method, text.clone());
        }
    }
}

pub struct ChatApplication;

#[async_trait]
impl ApplicationHooks for ChatApplication {
    fn app_name(&self) -> &'static str {
        "chat"
    }

    async fn on_leave_room(&self, client: &ConnectionHandle, room: &Arc<Room>) {
        let name = client.with_scratch::<Identity, _>(|id| id.map(|i| i.0.clone()));
        if let Some(name) = name {
            broadcast(room, client.id(), "onChat", format!("{} has left", name));
        }
    }

    /// `invoke_identify` (spec.md §9 `invoke_<name>`): binds a display name
    /// to this connection, once.
    async fn invoke(&self, name: &str, client: &ConnectionHandle, args: &[Amf0Value]) -> Option<anyhow::Result<Amf0Value>> {
        match name {
            "identify" => Some(self.identify(client, args)),
            "say" => Some(self.say(client, args)),
            _ => None,
        }
    }
}

impl ChatApplication {
    fn identify(&self, client: &ConnectionHandle, args: &[Amf0Value]) -> anyhow::Result<Amf0Value> {
        let already = client.with_scratch::<Identity, _>(|id| id.is_some());
        if already {
            return Err(AppError::new(status_code::ALREADY_IDENTIFIED, "already identified").into());
        }

        let name = args
            .get(0)
            .and_then(|v| v.try_as_str())
            .unwrap_or("anonymous")
            .to_string();

        client.set_scratch(Identity(name.clone()));
        log::info!("chat: {} identified as {:?}", client.peer_addr(), name);
        Ok(Amf0Value::String(name))
    }

    fn say(&self, client: &ConnectionHandle, args: &[Amf0Value]) -> anyhow::Result<Amf0Value> {
        let name = client
            .with_scratch::<Identity, _>(|id| id.map(|i| i.0.clone()))
            .ok_or_else(|| AppError::new(status_code::NOT_IDENTIFIED, "call identify(name) before say(text)"))?;

        let text = args.get(0).and_then(|v| v.try_as_str()).unwrap_or("").to_string();
        let line = format!("{}: {}", name, text);

        if let Some(room) = client.room() {
            broadcast(&room, client.id(), "onChat", line.clone());
        }

        Ok(Amf0Value::String(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtmp::connection::test_support::fake_handle;

    #[test]
    fn identify_then_say_succeeds() {
        smol::block_on(async {
            let app = ChatApplication;
            let client = fake_handle(1);

            let result = app.invoke("identify", &client, &[Amf0Value::String("alice".to_string())]).await.unwrap();
            assert!(result.is_ok());

            let said = app.invoke("say", &client, &[Amf0Value::String("hello".to_string())]).await.unwrap();
            match said {
                Ok(Amf0Value::String(s)) => assert_eq!(s, "alice: hello"),
                other => panic!("unexpected: {:?}", other.is_ok()),
            }
        });
    }

    #[test]
    fn identify_twice_fails() {
        smol::block_on(async {
            let app = ChatApplication;
            let client = fake_handle(1);
            app.invoke("identify", &client, &[Amf0Value::String("alice".to_string())]).await.unwrap().unwrap();

            let err = app.invoke("identify", &client, &[Amf0Value::String("bob".to_string())]).await.unwrap();
            assert!(err.is_err());
        });
    }

    #[test]
    fn say_before_identify_fails() {
        smol::block_on(async {
            let app = ChatApplication;
            let client = fake_handle(1);
            let err = app.invoke("say", &client, &[Amf0Value::String("hi".to_string())]).await.unwrap();
            assert!(err.is_err());
        });
    }
}
