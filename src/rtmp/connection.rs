//! Connection state machine (spec.md §4.5): handshake, keep-alive, the
//! inbound dispatch pump, and the outbound `invoke` Future/Promise model
//! (spec.md §9 "deferred control flow").
//!
//! One `ConnectionContext` owns its `Disassembler`/`Assembler`/`TcpStream`
//! exclusively and runs on a single `smol::spawn`-ed task — the "single-
//! threaded, cooperative event loop per connection" realization of spec.md
//! §5. The only way another task (a room broadcast, a spawned invoke
//! dispatch) touches this connection is through a cloneable
//! `ConnectionHandle`, which just enqueues an event for the owning task to
//! act on — no lock is ever held across an `.await`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use futures::channel::oneshot;
use futures::FutureExt;
use smol::channel::{Receiver, Sender};
use smol::io::{AsyncReadExt, AsyncWriteExt};
use smol::net::TcpStream;
use smol::Timer;

use crate::amf::Amf0Value;
use crate::app::application::Application;
use crate::app::registry::Registry;
use crate::app::room::Room;
use crate::config::Opts;
use crate::error::{AppError, ConnectionError};
use crate::rtmp::assembly::{Assembler, Disassembler};
use crate::rtmp::constants;
use crate::rtmp::handshake;
use crate::rtmp::header::ChunkHeader;
use crate::rtmp::invoke;
use crate::rtmp::packet::{BytesRead, Invoke, Packet, Ping, Status};
use crate::time;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_connection_id() -> u64 {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Events another task can raise against a connection it only holds a
/// `ConnectionHandle` for. Handled one at a time by the owning task's event
/// loop, interleaved with reading the socket.
enum ConnEvent {
    /// Keep-alive ticker fired.
    Tick,
    /// Fire-and-forget: write this packet on my connection (room broadcasts,
    /// and spawned invoke-dispatch tasks delivering their `_result`/`_error`).
    Push(Packet),
    /// Outbound RPC request (spec.md §4.6): allocate the next id, register
    /// the reply channel, and write the Invoke — all on the owning task so
    /// id allocation needs no synchronization.
    Invoke {
        name: String,
        args: Vec<Amf0Value>,
        reply: oneshot::Sender<anyhow::Result<Vec<Amf0Value>>>,
    },
    /// A spawned `connect` dispatch finished. Binding the resolved
    /// application/room onto this connection's state has to happen on the
    /// owning task, so unlike a plain invoke reply this can't just be
    /// pushed as a packet.
    ConnectResolved {
        header: ChunkHeader,
        id: f64,
        outcome: Result<(Vec<Amf0Value>, Arc<Application>, Arc<Room>), Status>,
    },
}

struct Shared {
    id: u64,
    peer_addr: String,
    tx: Sender<ConnEvent>,
    /// Application-opaque per-client scratch storage (spec.md §3
    /// ConnectionContext, §9 "per-connection opaque scratch"). The core
    /// never looks inside this; an `Application` picks whatever type it
    /// needs (`chat` stores the client's display name here) and owns the
    /// downcast.
    scratch: std::sync::Mutex<Option<Box<dyn std::any::Any + Send>>>,
    /// The room this connection is currently bound to, mirrored from
    /// `ConnectionContext.room` so application handlers can find "the
    /// caller's room" (e.g. to broadcast) without the core threading a
    /// `Room` through every `invoke` call.
    room: std::sync::Mutex<Option<Arc<Room>>>,
}

/// Cheap, cloneable reference to a connection, held by `Room`s and by
/// spawned dispatch tasks. The only way to affect the connection from
/// outside its own task.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn peer_addr(&self) -> &str {
        &self.shared.peer_addr
    }

    /// Store this connection's application-typed scratch value, replacing
    /// whatever was there before (spec.md §9 "per-connection opaque scratch").
    pub fn set_scratch<T: Send + 'static>(&self, value: T) {
        *self.shared.scratch.lock().unwrap() = Some(Box::new(value));
    }

    /// Read the scratch slot, if it's set and holds a `T`. Applications that
    /// store their own state type just downcast; a mismatched or unset slot
    /// reads as `None` rather than panicking.
    pub fn with_scratch<T: Send + 'static, R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let guard = self.shared.scratch.lock().unwrap();
        f(guard.as_ref().and_then(|b| b.downcast_ref::<T>()))
    }

    /// The room this connection currently belongs to, if it has completed
    /// `connect` and hasn't disconnected yet.
    pub fn room(&self) -> Option<Arc<Room>> {
        self.shared.room.lock().unwrap().clone()
    }

    fn set_room(&self, room: Option<Arc<Room>>) {
        *self.shared.room.lock().unwrap() = room;
    }

    /// Enqueue a packet to be written on this connection. Best-effort: a
    /// connection that has already closed just drops it, the same way a
    /// room broadcast to a disconnected client would find no one listening.
    pub fn push_packet(&self, packet: Packet) {
        if self.shared.tx.try_send(ConnEvent::Push(packet)).is_err() {
            log::debug!("dropped packet for closed connection {}", self.shared.id);
        }
    }

    /// Call a remote method on this connection and await its `_result`/
    /// `_error` reply (spec.md §4.6 outbound `invoke`). The returned error
    /// carries the peer's `Status` when it replied with `_error`, or a
    /// generic "connection closed" failure if the connection went away
    /// before replying.
    pub async fn invoke(&self, name: impl Into<String>, args: Vec<Amf0Value>) -> anyhow::Result<Vec<Amf0Value>> {
        let (reply, reply_rx) = oneshot::channel();
        self.shared
            .tx
            .send(ConnEvent::Invoke { name: name.into(), args, reply })
            .await
            .map_err(|_| anyhow::anyhow!("connection closed"))?;
        reply_rx.await.map_err(|_| anyhow::anyhow!("connection closed before reply"))?
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConnectionHandle({}@{})", self.shared.id, self.shared.peer_addr)
    }
}

/// Per-connection state (spec.md §3 ConnectionContext). Owned exclusively by
/// the task running `run()`.
struct ConnectionContext {
    peer_addr: String,
    disassembler: Disassembler,
    assembler: Assembler,
    next_invoke_id: f64,
    pending: HashMap<u64, oneshot::Sender<anyhow::Result<Vec<Amf0Value>>>>,
    bytes_received: u64,
    last_received_at: i64,
    app: Option<Arc<Application>>,
    room: Option<Arc<Room>>,
    registry: Arc<Registry>,
    handle: ConnectionHandle,
    tx: Sender<ConnEvent>,
    config: Arc<Opts>,
}

impl ConnectionContext {
    fn new(peer_addr: String, handle: ConnectionHandle, tx: Sender<ConnEvent>, config: Arc<Opts>, registry: Arc<Registry>) -> Self {
        ConnectionContext {
            peer_addr,
            disassembler: Disassembler::new(config.default_chunk_size),
            assembler: Assembler::new(config.default_chunk_size),
            next_invoke_id: 2.0,
            pending: HashMap::new(),
            bytes_received: 0,
            last_received_at: time::seconds(),
            app: None,
            room: None,
            registry,
            handle,
            tx,
            config,
        }
    }

    async fn write_packet(&mut self, stream: &mut TcpStream, packet: Packet) -> Result<(), ConnectionError> {
        let bytes = self.assembler.push_packet(&packet);
        stream.write_all(&bytes).await?;
        Ok(())
    }

    /// The main pump: alternates between socket reads and connection
    /// events until something closes the connection.
    async fn drive(&mut self, stream: &mut TcpStream, events: Receiver<ConnEvent>) -> Result<(), ConnectionError> {
        let mut read_buf = vec![0u8; 4096];
        loop {
            let read_fut = stream.read(&mut read_buf).fuse();
            let event_fut = events.recv().fuse();
            futures::pin_mut!(read_fut, event_fut);

            futures::select! {
                result = read_fut => {
                    let n = result?;
                    if n == 0 {
                        return Err(ConnectionError::Closed);
                    }
                    self.bytes_received += n as u64;
                    self.last_received_at = time::seconds();
                    self.disassembler.push_data(&read_buf[..n]);
                    while let Some(packet) = self.disassembler.try_next()? {
                        self.handle_packet(stream, packet).await?;
                    }
                }
                event = event_fut => {
                    match event {
                        Ok(ev) => self.handle_event(stream, ev).await?,
                        Err(_) => return Err(ConnectionError::Closed),
                    }
                }
            }
        }
    }

    async fn handle_event(&mut self, stream: &mut TcpStream, event: ConnEvent) -> Result<(), ConnectionError> {
        match event {
            ConnEvent::Tick => self.on_tick(stream).await,
            ConnEvent::Push(packet) => self.write_packet(stream, packet).await,
            ConnEvent::Invoke { name, args, reply } => {
                let id = self.next_invoke_id;
                self.next_invoke_id += 1.0;
                self.pending.insert(id as u64, reply);

                let mut argv = vec![Amf0Value::Null];
                argv.extend(args);
                let invoke = Invoke::new(constants::INVOKE_CHANNEL, name, id, argv);
                self.write_packet(stream, Packet::Invoke(invoke)).await
            }
            ConnEvent::ConnectResolved { header, id, outcome } => self.on_connect_resolved(stream, header, id, outcome).await,
        }
    }

    async fn handle_packet(&mut self, stream: &mut TcpStream, packet: Packet) -> Result<(), ConnectionError> {
        match packet {
            Packet::Invoke(inv) => {
                self.handle_invoke(inv);
                Ok(())
            }
            Packet::Ping(ping) => self.handle_ping(stream, ping).await,
            Packet::BytesRead(br) => {
                log::trace!("peer {} acknowledged {} bytes", self.peer_addr, br.bytes);
                Ok(())
            }
            Packet::RawData { header, data } => self.handle_raw(header, data),
        }
    }

    fn handle_raw(&mut self, header: ChunkHeader, data: Vec<u8>) -> Result<(), ConnectionError> {
        match header.message_type {
            Some(constants::CHUNK_SIZE) if data.len() >= 4 => {
                let size = BigEndian::read_u32(&data);
                log::debug!("peer {} set chunk size to {}", self.peer_addr, size);
                self.disassembler.set_chunk_size(size);
            }
            other => {
                log::trace!("peer {} sent unhandled message type {:?}, {} bytes", self.peer_addr, other, data.len());
            }
        }
        Ok(())
    }

    async fn handle_ping(&mut self, stream: &mut TcpStream, ping: Ping) -> Result<(), ConnectionError> {
        use constants::ping_event::{CLIENT_BUFFER, FIRST_PING, PING_CLIENT, PONG_SERVER, STREAM_CLEAR};

        let reply = match ping.event {
            CLIENT_BUFFER => Some(Ping::new(constants::CONTROL_CHANNEL, STREAM_CLEAR, vec![*ping.data.get(0).unwrap_or(&0)])),
            PING_CLIENT => Some(Ping::new(constants::CONTROL_CHANNEL, PONG_SERVER, ping.data.clone())),
            PONG_SERVER | FIRST_PING => None,
            other => {
                log::trace!("peer {} sent ping event {} with no defined reply", self.peer_addr, other);
                None
            }
        };

        match reply {
            Some(reply) => self.write_packet(stream, Packet::Ping(reply)).await,
            None => Ok(()),
        }
    }

    fn handle_invoke(&mut self, inv: Invoke) {
        if inv.name == "_result" || inv.name == "_error" {
            self.resolve_pending(&inv);
            return;
        }

        if inv.name == "connect" {
            self.start_connect(inv);
            return;
        }

        self.start_invoke_dispatch(inv);
    }

    /// Pop the pending reply matching `inv.id` and settle it (spec.md §4.6
    /// inbound `_result`/`_error` handling). An unmatched id is logged and
    /// dropped, per spec.md §8 "replies with unknown ids are dropped".
    fn resolve_pending(&mut self, inv: &Invoke) {
        let sender = match self.pending.remove(&(inv.id as u64)) {
            Some(sender) => sender,
            None => {
                log::warn!("peer {} sent {} for unknown invoke id {}", self.peer_addr, inv.name, inv.id);
                return;
            }
        };

        let result = if inv.name == "_result" {
            Ok(inv.argv.clone())
        } else {
            let status = inv
                .argv
                .get(1)
                .map(Status::from_amf)
                .unwrap_or_else(|| Status::new("error", constants::status_code::NET_CONNECTION_ERROR, "missing status in _error reply"));
            Err(anyhow::Error::new(AppError::new(status.code, status.description)))
        };

        let _ = sender.send(result);
    }

    /// Resolve a `connect` Invoke in a spawned task (spec.md §5: connect
    /// hooks may suspend) and report the outcome back through the channel —
    /// binding the resolved application/room has to happen on this task.
    fn start_connect(&mut self, inv: Invoke) {
        let client = self.handle.clone();
        let registry = self.registry.clone();
        let tx = self.tx.clone();
        let header = inv.header;
        let id = inv.id;
        let params = inv.argv.get(0).cloned().unwrap_or(Amf0Value::Null);

        smol::spawn(async move {
            let outcome = invoke::dispatch_connect(&registry, &client, &params).await;
            let _ = tx.send(ConnEvent::ConnectResolved { header, id, outcome }).await;
        })
        .detach();
    }

    /// Resolve a non-`connect` Invoke in a spawned task and deliver its
    /// reply as a plain pushed packet — the bound application/room doesn't
    /// change, so there's nothing this task needs to do with the result.
    fn start_invoke_dispatch(&mut self, inv: Invoke) {
        let client = self.handle.clone();
        let app = self.app.clone();
        let header = inv.header;
        let id = inv.id;
        // Handler resolution is by lowercased name (spec.md §9 "mapping
        // from lowercase method name"), matching `defaultInvokeHandler`'s
        // `'invoke_' + packet.name.lower()` lookup.
        let name = inv.name.to_lowercase();
        let args: Vec<Amf0Value> = if inv.argv.is_empty() { Vec::new() } else { inv.argv[1..].to_vec() };

        smol::spawn(async move {
            let reply = match invoke::dispatch_invoke(app, &client, &name, &args).await {
                Ok(argv) => Invoke { header, name: "_result".to_string(), id, argv },
                Err(status) => Invoke {
                    header,
                    name: "_error".to_string(),
                    id,
                    argv: vec![Amf0Value::Null, status.to_amf()],
                },
            };
            client.push_packet(Packet::Invoke(reply));
        })
        .detach();
    }

    async fn on_connect_resolved(
        &mut self,
        stream: &mut TcpStream,
        header: ChunkHeader,
        id: f64,
        outcome: Result<(Vec<Amf0Value>, Arc<Application>, Arc<Room>), Status>,
    ) -> Result<(), ConnectionError> {
        match outcome {
            Ok((argv, app, room)) => {
                log::info!("peer {} connected to application {:?}", self.peer_addr, app.name());
                self.app = Some(app);
                self.room = Some(room.clone());
                self.handle.set_room(Some(room));
                self.send_first_ping(stream).await?;
                let reply = Invoke { header, name: "_result".to_string(), id, argv };
                self.write_packet(stream, Packet::Invoke(reply)).await
            }
            Err(status) => {
                log::warn!("peer {} connect refused: {}", self.peer_addr, status.description);
                let reply = Invoke {
                    header,
                    name: "_error".to_string(),
                    id,
                    argv: vec![Amf0Value::Null, status.to_amf()],
                };
                self.write_packet(stream, Packet::Invoke(reply)).await
            }
        }
    }

    /// `Ping(event=8, data=[0, 1, now_ms & 0x7FFFFFFF])` sent right after a
    /// successful connect, before the connect reply itself (spec.md §4.5
    /// "First ping").
    async fn send_first_ping(&mut self, stream: &mut TcpStream) -> Result<(), ConnectionError> {
        let ping = Ping::new(
            constants::CONTROL_CHANNEL,
            constants::ping_event::FIRST_PING,
            vec![0, 1, time::ping_timestamp()],
        );
        self.write_packet(stream, Packet::Ping(ping)).await
    }

    /// Keep-alive tick (spec.md §4.5): close on excessive idle, otherwise
    /// ping if idle past one interval, and always report bytes received.
    async fn on_tick(&mut self, stream: &mut TcpStream) -> Result<(), ConnectionError> {
        let idle = time::seconds() - self.last_received_at;

        if idle > self.config.keep_alive_timeout_secs as i64 {
            return Err(ConnectionError::KeepAliveTimeout);
        }

        if idle > self.config.ping_interval_secs as i64 {
            let ping = Ping::new(constants::CONTROL_CHANNEL, constants::ping_event::PING_CLIENT, vec![time::ping_timestamp()]);
            self.write_packet(stream, Packet::Ping(ping)).await?;
        }

        let bytes_read = BytesRead::new(constants::CONTROL_CHANNEL, self.bytes_received as u32);
        self.write_packet(stream, Packet::BytesRead(bytes_read)).await
    }

    /// Cancellation on close (spec.md §5): reject every pending outbound
    /// invoke, then leave/maybe-destroy the bound room.
    async fn on_close(&mut self) {
        for (_, sender) in self.pending.drain() {
            let _ = sender.send(Err(anyhow::anyhow!("connection closed")));
        }
        if let (Some(app), Some(room)) = (self.app.take(), self.room.take()) {
            app.disconnect(&self.handle, &room).await;
        }
        self.handle.set_room(None);
    }
}

/// Run one accepted connection to completion: handshake (with timeout),
/// then the dispatch pump until the peer disconnects, times out, or a
/// protocol error closes the connection.
pub async fn run(mut stream: TcpStream, peer_addr: SocketAddr, config: Arc<Opts>, registry: Arc<Registry>) -> Result<(), ConnectionError> {
    {
        let handshake_fut = handshake::server_handshake(&mut stream).fuse();
        let timeout_fut = Timer::after(Duration::from_secs(config.handshake_timeout_secs)).fuse();
        futures::pin_mut!(handshake_fut, timeout_fut);

        futures::select! {
            result = handshake_fut => result?,
            _ = timeout_fut => return Err(ConnectionError::HandshakeTimeout),
        }
    }

    let id = next_connection_id();
    let (tx, rx) = smol::channel::unbounded();
    let handle = ConnectionHandle {
        shared: Arc::new(Shared { id, peer_addr: peer_addr.to_string(), tx: tx.clone(), scratch: std::sync::Mutex::new(None), room: std::sync::Mutex::new(None) }),
    };

    let ticker = {
        let tx = tx.clone();
        let interval = Duration::from_secs(config.ping_interval_secs.max(1));
        smol::spawn(async move {
            loop {
                Timer::after(interval).await;
                if tx.send(ConnEvent::Tick).await.is_err() {
                    break;
                }
            }
        })
    };

    let mut ctx = ConnectionContext::new(peer_addr.to_string(), handle, tx, config, registry);
    let result = ctx.drive(&mut stream, rx).await;

    ticker.cancel().await;
    ctx.on_close().await;

    match &result {
        Ok(()) => {}
        Err(e) if e.is_routine() => log::info!("connection {} ({}) closed: {}", id, peer_addr, e),
        Err(e) => log::warn!("connection {} ({}) closed with error: {:#}", id, peer_addr, e),
    }

    result
}

/// A `ConnectionHandle` backed by a channel whose receiving end is
/// immediately dropped — fine for tests that only need `.id()` identity and
/// never expect a pushed packet or outbound `invoke` to actually land.
#[cfg(test)]
pub(crate) mod test_support {
    use super::{ConnectionHandle, Shared};
    use std::sync::Arc;

    pub fn fake_handle(id: u64) -> ConnectionHandle {
        let (tx, _rx) = smol::channel::unbounded();
        ConnectionHandle {
            shared: Arc::new(Shared { id, peer_addr: "0.0.0.0:0".to_string(), tx, scratch: std::sync::Mutex::new(None), room: std::sync::Mutex::new(None) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::application::ApplicationHooks;
    use async_trait::async_trait;
    use smol::net::TcpListener;

    struct EchoOnce;

    #[async_trait]
    impl ApplicationHooks for EchoOnce {
        fn app_name(&self) -> &'static str {
            "echo"
        }

        async fn invoke(&self, name: &str, _client: &ConnectionHandle, args: &[Amf0Value]) -> Option<anyhow::Result<Amf0Value>> {
            if name == "echo" {
                Some(Ok(args.get(0).cloned().unwrap_or(Amf0Value::Null)))
            } else {
                None
            }
        }
    }

    fn test_config() -> Arc<Opts> {
        Arc::new(Opts {
            bind: "127.0.0.1".to_string(),
            rtmp_port: 0,
            backlog: 16,
            handshake_timeout_secs: 5,
            ping_interval_secs: 3600,
            keep_alive_timeout_secs: 7200,
            default_chunk_size: 128,
            enabled_apps: vec!["echo".to_string()],
        })
    }

    #[test]
    fn full_connect_and_invoke_round_trip_over_loopback() {
        smol::block_on(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();

            let mut registry = Registry::new();
            registry.register(Arc::new(Application::new(Arc::new(EchoOnce))));
            let registry = Arc::new(registry);
            let config = test_config();

            let server = smol::spawn(async move {
                let (socket, peer) = listener.accept().await.unwrap();
                run(socket, peer, config, registry).await
            });

            let mut client = TcpStream::connect(addr).await.unwrap();
            handshake::client_handshake(&mut client).await.unwrap();

            let mut disassembler = Disassembler::new(128);
            let mut assembler = Assembler::new(128);

            let connect = Invoke::new(
                constants::INVOKE_CHANNEL,
                "connect",
                1.0,
                vec![Amf0Value::Object {
                    class_name: None,
                    entries: vec![amf::Pair { key: "app".to_string(), value: Amf0Value::String("echo".to_string()) }],
                }],
            );
            client.write_all(&assembler.push_packet(&Packet::Invoke(connect))).await.unwrap();

            let connect_reply = read_n_packets(&mut client, &mut disassembler, 2).await;
            let first_ping = match &connect_reply[0] {
                Packet::Ping(p) => p.clone(),
                other => panic!("expected first ping, got {:?}", other),
            };
            assert_eq!(first_ping.event, constants::ping_event::FIRST_PING);

            let connect_result = match &connect_reply[1] {
                Packet::Invoke(inv) => inv.clone(),
                other => panic!("expected connect _result, got {:?}", other),
            };
            assert_eq!(connect_result.name, "_result");
            assert_eq!(connect_result.id, 1.0);

            let echo_call = Invoke::new(constants::INVOKE_CHANNEL, "echo", 2.0, vec![Amf0Value::Null, Amf0Value::String("hi".to_string())]);
            client.write_all(&assembler.push_packet(&Packet::Invoke(echo_call))).await.unwrap();

            let echo_reply = read_n_packets(&mut client, &mut disassembler, 1).await;
            match &echo_reply[0] {
                Packet::Invoke(inv) => {
                    assert_eq!(inv.name, "_result");
                    assert_eq!(inv.id, 2.0);
                    assert_eq!(inv.argv, vec![Amf0Value::Null, Amf0Value::String("hi".to_string())]);
                }
                other => panic!("expected echo _result, got {:?}", other),
            }

            drop(client);
            let _ = server.await;
        });
    }

    /// spec.md §9: handlers resolve by lowercased method name, so a peer
    /// that sends mixed-case invoke names (real Flash clients do) still
    /// dispatches to `invoke_echo`.
    #[test]
    fn invoke_dispatch_lowercases_the_method_name() {
        smol::block_on(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();

            let mut registry = Registry::new();
            registry.register(Arc::new(Application::new(Arc::new(EchoOnce))));
            let registry = Arc::new(registry);
            let config = test_config();

            let server = smol::spawn(async move {
                let (socket, peer) = listener.accept().await.unwrap();
                run(socket, peer, config, registry).await
            });

            let mut client = TcpStream::connect(addr).await.unwrap();
            handshake::client_handshake(&mut client).await.unwrap();

            let mut disassembler = Disassembler::new(128);
            let mut assembler = Assembler::new(128);

            let connect = Invoke::new(
                constants::INVOKE_CHANNEL,
                "connect",
                1.0,
                vec![Amf0Value::Object {
                    class_name: None,
                    entries: vec![amf::Pair { key: "app".to_string(), value: Amf0Value::String("echo".to_string()) }],
                }],
            );
            client.write_all(&assembler.push_packet(&Packet::Invoke(connect))).await.unwrap();
            read_n_packets(&mut client, &mut disassembler, 2).await;

            let echo_call = Invoke::new(constants::INVOKE_CHANNEL, "Echo", 2.0, vec![Amf0Value::Null, Amf0Value::String("hi".to_string())]);
            client.write_all(&assembler.push_packet(&Packet::Invoke(echo_call))).await.unwrap();

            let echo_reply = read_n_packets(&mut client, &mut disassembler, 1).await;
            match &echo_reply[0] {
                Packet::Invoke(inv) => {
                    assert_eq!(inv.name, "_result");
                    assert_eq!(inv.argv, vec![Amf0Value::Null, Amf0Value::String("hi".to_string())]);
                }
                other => panic!("expected echo _result, got {:?}", other),
            }

            drop(client);
            let _ = server.await;
        });
    }

    async fn read_n_packets(client: &mut TcpStream, disassembler: &mut Disassembler, n: usize) -> Vec<Packet> {
        let mut buf = [0u8; 4096];
        let mut collected = Vec::new();
        while collected.len() < n {
            collected.extend(disassembler.drain().unwrap());
            if collected.len() >= n {
                break;
            }
            let read = client.read(&mut buf).await.unwrap();
            assert!(read > 0, "connection closed before enough replies arrived");
            disassembler.push_data(&buf[..read]);
        }
        collected
    }
}
