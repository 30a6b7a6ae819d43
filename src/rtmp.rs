//! The RTMP core: chunk framing, the packet taxonomy, the connection state
//! machine, and RPC dispatch glue.

pub mod assembly;
pub mod connection;
pub mod constants;
pub mod handshake;
pub mod header;
pub mod invoke;
pub mod packet;
