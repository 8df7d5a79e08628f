//! Concrete transports (§4.7 / C6). All four frame the same wire protocol;
//! this module holds the one piece of logic they share — driving a
//! [`Session`] from a split byte stream — plus one submodule per transport.

#[cfg(feature = "tcp")]
pub mod tcp;
#[cfg(feature = "websocket")]
pub mod websocket;
#[cfg(feature = "http")]
pub mod http;
pub mod shm;

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use nprpc_codec::{endpoint::Endpoint, header::ExceptionKind};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Error;
use crate::session::Session;
use crate::statistics::StatisticsReporter;
use nprpc_service::Poa;

/// Default cap on a single message's `size` field (§6): 16 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Reads one length-prefixed frame off `reader` (the Header's `size` field
/// doubles as the frame length, per §4.7's framed-TCP rule — WebSocket and
/// shm reuse this for the body they've already extracted from their own
/// framing).
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_message_size: usize,
) -> Result<Bytes, Error> {
    let mut size_buf = [0u8; 4];
    reader.read_exact(&mut size_buf).await?;
    let size = u32::from_le_bytes(size_buf) as usize;

    if size > max_message_size {
        return Err(ExceptionKind::BadInput.into());
    }

    let mut frame = BytesMut::with_capacity(4 + size);
    frame.extend_from_slice(&size_buf);
    frame.resize(4 + size, 0);
    reader.read_exact(&mut frame[4..]).await?;

    Ok(frame.freeze())
}

/// Spawns the read loop and write loop for a framed byte-stream transport
/// (TCP today; anything else that is just "bytes in, bytes out, length
/// prefix already embedded" can reuse this). Returns the session so the
/// caller can register it for outbound connection reuse.
pub fn spawn_framed_session<S>(
    stream: S,
    remote_endpoint: Endpoint,
    poas: Arc<Vec<Arc<Poa>>>,
    statistics: StatisticsReporter,
    max_message_size: usize,
) -> Arc<Session>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (session, mut outbox) = Session::new(remote_endpoint, poas, statistics);

    tokio::spawn(async move {
        while let Some(frame) = outbox.recv().await {
            if writer.write_all(&frame).await.is_err() {
                break;
            }
        }
    });

    {
        let session = session.clone();
        tokio::spawn(async move {
            loop {
                match read_frame(&mut reader, max_message_size).await {
                    Ok(frame) => {
                        let session = session.clone();
                        tokio::spawn(async move {
                            if let Err(err) = session.handle_frame(frame).await {
                                log::warn!("failed to handle inbound frame: {err}");
                            }
                        });
                    }
                    Err(err) => {
                        log::debug!("session read loop ending: {err}");
                        session.close(ExceptionKind::CommFailure {
                            what: err.to_string(),
                        });
                        break;
                    }
                }
            }
        });
    }

    session
}
