//! Byte-level plumbing between a TCP stream and a session.
//!
//! Frames are newline-terminated UTF-8 lines in both directions; a trailing
//! `\r` is tolerated on input. Inbound lines longer than [`MAX_LINE_LENGTH`]
//! end the connection.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use super::protocol::Reply;
use super::server::ServerContext;
use super::session::{self, SessionLink};

/// Longest inbound line accepted, in bytes, excluding the terminator
pub const MAX_LINE_LENGTH: usize = 4096;

/// How long queued replies may take to flush after the session ends
const FLUSH_GRACE: Duration = Duration::from_secs(2);

/// Serve one client connection until either side closes it
pub async fn handle(stream: TcpStream, ctx: Arc<ServerContext>) -> Result<()> {
    let peer = stream.peer_addr()?;
    info!("New connection from {}", peer);
    let (reader, mut writer) = stream.into_split();
    let SessionLink { inbound, mut outbound, task } = session::spawn(ctx, peer.ip().to_string());

    let close_signal = inbound.handle().close_signal();
    let writer_task = tokio::spawn(async move {
        while let Some(line) = outbound.recv().await {
            let framed = format!("{}\n", line);
            if let Err(e) = writer.write_all(framed.as_bytes()).await {
                debug!("Write to {} failed: {}", peer, e);
                close_signal.close();
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    let handle = inbound.handle().clone();
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    loop {
        tokio::select! {
            line = lines.next() => match line {
                Some(Ok(line)) => {
                    if !inbound.deliver(line) {
                        break;
                    }
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    warn!("{} sent a line over {} bytes, disconnecting", peer, MAX_LINE_LENGTH);
                    handle.send(&Reply::terminal("Line too long, closing connection."));
                    break;
                }
                Some(Err(LinesCodecError::Io(e))) => {
                    warn!("Read from {} failed: {}", peer, e);
                    break;
                }
                None => {
                    debug!("{} closed the connection", peer);
                    break;
                }
            },
            _ = handle.closed() => break,
        }
    }

    inbound.disconnect();
    if let Err(e) = task.await {
        warn!("Session task for {} panicked: {e:?}", peer);
    }
    drop(handle);
    // The writer drains once the last handle clone is gone.
    if tokio::time::timeout(FLUSH_GRACE, writer_task).await.is_err() {
        debug!("Writer for {} still busy after {:?}, detaching", peer, FLUSH_GRACE);
    }
    info!("Connection from {} finished", peer);
    Ok(())
}
