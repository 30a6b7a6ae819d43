//! C0 Bootstrap (SPEC_FULL.md §2: "explicitly out-of-core" — a TCP listener
//! accept loop and the static application registry). Mirrors the teacher's
//! `rtmp_server::accept_loop`, generalized to hand each accepted connection
//! to `rtmp::connection::run` instead of the teacher's media-streaming
//! dispatch.

use std::sync::Arc;

use smol::net::TcpListener;
use smol::prelude::*;

use crate::app::application::Application;
use crate::app::registry::Registry;
use crate::apps::{chat::ChatApplication, echo::EchoApplication};
use crate::config::Opts;
use crate::rtmp::connection;

/// Build the process-wide application registry from `opts.enabled_apps`
/// (spec.md §6 "application-enable flags by application name"). Built once
/// at startup and never mutated again (spec.md §5 "Shared resources").
pub fn build_registry(opts: &Opts) -> Registry {
    let mut registry = Registry::new();
    for name in &opts.enabled_apps {
        match name.as_str() {
            "echo" => registry.register(Arc::new(Application::new(Arc::new(EchoApplication)))),
            "chat" => registry.register(Arc::new(Application::new(Arc::new(ChatApplication)))),
            other => log::warn!("unknown application {:?} in --enabled-apps, ignoring", other),
        }
    }
    registry
}

/// Accept connections on `opts.listen_addr()` until the listener errors,
/// spawning one task per connection (spec.md §5 "per process" event loop,
/// realized here as one `smol` task per connection — see SPEC_FULL.md §5
/// "Realization").
pub async fn accept_loop(opts: Arc<Opts>, registry: Arc<Registry>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(opts.listen_addr()).await?;
    log::info!("RTMP server listening on {}", opts.listen_addr());

    let mut incoming = listener.incoming();
    while let Some(stream) = incoming.next().await {
        let stream = stream?;
        let peer_addr = stream.peer_addr()?;
        log::info!("accepted connection from {}", peer_addr);

        let opts = opts.clone();
        let registry = registry.clone();
        smol::spawn(async move {
            if let Err(e) = connection::run(stream, peer_addr, opts, registry).await {
                log::debug!("connection {} ended: {:#}", peer_addr, e);
            }
        })
        .detach();
    }
    Ok(())
}
