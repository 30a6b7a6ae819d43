//! The C0/C1/C2 <-> S0/S1/S2 handshake (spec.md §4.5, §6).
//!
//! Grounded in `fmspy.rtmp.protocol.server._handshakeSendReceived`/
//! `_handshakeVerifyReceived` and the client-side mirror in
//! `fmspy.rtmp.protocol.client`: this is deliberately *not* the real Adobe
//! handshake algorithm (no embedded timestamps or digest verification) —
//! the server just echoes whatever 1536-byte block the peer sent, twice,
//! and never inspects the content of what comes back (spec.md §1 Non-goals:
//! "client-side handshake identity verification beyond byte echo").

use smol::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::ConnectionError;
use crate::rtmp::constants::{HANDSHAKE_SIZE, HANDSHAKE_VERSION};

/// Run the server side of the handshake on an already-connected stream.
///
/// Waits for C0 (1 byte) + C1 (1536 bytes), replies with S0 + S1 + S2 where
/// S1 and S2 are both just C1 echoed back, then waits for and discards C2
/// (1536 bytes) without checking it — `fmspy`'s own comment calls this
/// "tolerant of client quirks".
pub async fn server_handshake<S>(stream: &mut S) -> Result<(), ConnectionError>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    let mut c0 = [0u8; 1];
    stream.read_exact(&mut c0).await?;
    if c0[0] != HANDSHAKE_VERSION {
        log::warn!("C0 carried version byte {}, expected {}", c0[0], HANDSHAKE_VERSION);
    }

    let mut c1 = vec![0u8; HANDSHAKE_SIZE as usize];
    stream.read_exact(&mut c1).await?;

    stream.write_all(&[HANDSHAKE_VERSION]).await?;
    stream.write_all(&c1).await?;
    stream.write_all(&c1).await?;

    let mut c2 = vec![0u8; HANDSHAKE_SIZE as usize];
    stream.read_exact(&mut c2).await?;

    Ok(())
}

/// Run the client side, for tests and for any future outbound-connection use.
///
/// Sends C0 + C1 (1536 zero bytes), waits for S0 + S1 + S2, echoes back S2
/// as C2, and is done — no separate verify phase on the client side
/// (`fmspy.rtmp.protocol.client._handshakeVerifyReceived` is `assert False`:
/// a client never receives data in that state).
pub async fn client_handshake<S>(stream: &mut S) -> Result<(), ConnectionError>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    stream.write_all(&[HANDSHAKE_VERSION]).await?;
    stream.write_all(&vec![0u8; HANDSHAKE_SIZE as usize]).await?;

    let mut s0 = [0u8; 1];
    stream.read_exact(&mut s0).await?;

    let mut s1 = vec![0u8; HANDSHAKE_SIZE as usize];
    stream.read_exact(&mut s1).await?;

    let mut s2 = vec![0u8; HANDSHAKE_SIZE as usize];
    stream.read_exact(&mut s2).await?;

    stream.write_all(&[HANDSHAKE_VERSION]).await?;
    stream.write_all(&s2).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use smol::net::{TcpListener, TcpStream};

    #[test]
    fn server_and_client_handshakes_agree_over_loopback() {
        smol::block_on(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();

            let server_task = smol::spawn(async move {
                let (mut socket, _) = listener.accept().await.unwrap();
                server_handshake(&mut socket).await.unwrap();
            });

            let mut client = TcpStream::connect(addr).await.unwrap();
            client_handshake(&mut client).await.unwrap();

            server_task.await;
        });
    }

    #[test]
    fn server_echoes_c1_as_both_s1_and_s2() {
        smol::block_on(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();

            let server_task = smol::spawn(async move {
                let (mut socket, _) = listener.accept().await.unwrap();
                server_handshake(&mut socket).await.unwrap();
            });

            let mut client = TcpStream::connect(addr).await.unwrap();
            let mut c1 = vec![0xABu8; HANDSHAKE_SIZE as usize];
            c1[0] = 1;
            c1[1] = 2;
            c1[2] = 3;
            client.write_all(&[HANDSHAKE_VERSION]).await.unwrap();
            client.write_all(&c1).await.unwrap();

            let mut s0 = [0u8; 1];
            client.read_exact(&mut s0).await.unwrap();
            assert_eq!(s0[0], HANDSHAKE_VERSION);

            let mut s1 = vec![0u8; HANDSHAKE_SIZE as usize];
            client.read_exact(&mut s1).await.unwrap();
            assert_eq!(s1, c1);

            let mut s2 = vec![0u8; HANDSHAKE_SIZE as usize];
            client.read_exact(&mut s2).await.unwrap();
            assert_eq!(s2, c1);

            client.write_all(&vec![0u8; HANDSHAKE_SIZE as usize]).await.unwrap();
            server_task.await;
        });
    }
}
