//! RPC dispatch glue (spec.md §4.6, §4.7): resolving a `connect` call into
//! an application/room, and a regular invoke into an `Application` handler.
//!
//! These are free functions rather than `ConnectionContext` methods because
//! they run inside a spawned task (spec.md §5: "suspension is possible only
//! between... dispatcher steps") while the connection's own event loop keeps
//! pumping bytes; they only need a `ConnectionHandle` and `Arc`-shared state,
//! never the connection's owned disassembler/assembler.

use std::sync::Arc;

use crate::amf::Amf0Value;
use crate::app::application::Application;
use crate::app::registry::Registry;
use crate::app::room::Room;
use crate::error::AppError;
use crate::rtmp::connection::ConnectionHandle;
use crate::rtmp::constants::status_code;
use crate::rtmp::packet::Status;

/// Pull `params.app` apart into `/`-separated path segments (spec.md §4.7
/// step 2). The head segment names the application; the rest is handed to
/// `on_create_room`/`on_enter_room` as extra path.
fn connect_path(params: &Amf0Value) -> Result<Vec<String>, Status> {
    let app = match params {
        Amf0Value::Object { entries, .. } | Amf0Value::EcmaArray { entries } => {
            entries.iter().find(|p| p.key == "app").map(|p| &p.value)
        }
        _ => None,
    };

    match app.and_then(|v| v.try_as_str()) {
        Some(app) if !app.is_empty() => Ok(app.split('/').map(str::to_string).collect()),
        _ => Err(Status::new("error", status_code::CONNECT_INVALID_APP, "connect params missing 'app'")),
    }
}

/// Resolve a `connect` Invoke into a bound application + room (spec.md
/// §4.7 steps 2-5). On success, returns the connect-success reply argv
/// along with the application/room the connection should bind to.
pub async fn dispatch_connect(
    registry: &Registry,
    client: &ConnectionHandle,
    params: &Amf0Value,
) -> Result<(Vec<Amf0Value>, Arc<Application>, Arc<Room>), Status> {
    let path = connect_path(params)?;
    let (app_name, room_path) = path.split_first().expect("connect_path never returns empty");

    let app = registry
        .get(app_name)
        .ok_or_else(|| Status::new("error", status_code::CONNECT_INVALID_APP, format!("no such application: {}", app_name)))?;

    let room = app
        .connect(client, room_path, params)
        .await
        .map_err(|e| Status::from_handler_error(&e))?;

    let status = Status::new("status", status_code::CONNECT_SUCCESS, "Connect OK");
    Ok((vec![Amf0Value::Null, status.to_amf()], app, room))
}

/// Resolve a non-`connect` Invoke into the bound application's handler
/// (spec.md §4.6/§4.7: `defaultInvokeHandler`). `app` is `None` when the
/// client has not completed `connect` yet.
pub async fn dispatch_invoke(
    app: Option<Arc<Application>>,
    client: &ConnectionHandle,
    name: &str,
    args: &[Amf0Value],
) -> Result<Vec<Amf0Value>, Status> {
    let app = app.ok_or_else(|| {
        Status::new("error", status_code::CALL_FAILED, format!("cannot call {} before connect", name))
    })?;

    match app.invoke(name, client, args).await {
        Some(Ok(value)) => Ok(vec![Amf0Value::Null, value]),
        Some(Err(e)) => Err(Status::from_handler_error(&e)),
        None => Err(Status::new("error", status_code::CALL_FAILED, format!("unhandled invoke: {}", name))),
    }
}

impl Status {
    /// Build a status from whatever error a handler/hook raised, preserving
    /// a custom code if the error carries one (spec.md §4.6
    /// `Status.from_error`: "`e.code` if present else a default
    /// `NetConnection.Error`, and `repr(e)` as description").
    pub fn from_handler_error(err: &anyhow::Error) -> Status {
        match err.downcast_ref::<AppError>() {
            Some(app_err) => Status::from_error(app_err.code.clone(), app_err),
            None => Status::from_error(status_code::NET_CONNECTION_ERROR, &format!("{:#}", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amf::Pair;

    fn connect_params(app: &str) -> Amf0Value {
        Amf0Value::Object {
            class_name: None,
            entries: vec![Pair {
                key: "app".to_string(),
                value: Amf0Value::String(app.to_string()),
            }],
        }
    }

    #[test]
    fn connect_path_splits_on_slash() {
        let params = connect_params("chat/kitchen/extra");
        let path = connect_path(&params).unwrap();
        assert_eq!(path, vec!["chat", "kitchen", "extra"]);
    }

    #[test]
    fn connect_path_rejects_missing_app() {
        let params = Amf0Value::Object { class_name: None, entries: vec![] };
        assert!(connect_path(&params).is_err());
    }

    #[test]
    fn dispatch_connect_fails_for_unknown_application() {
        smol::block_on(async {
            let registry = Registry::new();
            let client = crate::rtmp::connection::test_support::fake_handle(1);
            let params = connect_params("nope");
            let err = dispatch_connect(&registry, &client, &params).await.unwrap_err();
            assert_eq!(err.code, status_code::CONNECT_INVALID_APP);
        });
    }
}
