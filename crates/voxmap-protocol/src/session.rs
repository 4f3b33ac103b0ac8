use crate::codec::FrameCodec;
use bytes::Bytes;
use futures::SinkExt;
use std::net::SocketAddr;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_util::codec::FramedWrite;
use voxmap_common::types::{Result, SessionId};
use voxmap_common::VoxmapError;

/// One connected client as seen by the hub: its id and the sending half of its
/// bounded outbound queue. The socket itself belongs to the connection task.
#[derive(Debug)]
pub struct ClientSession {
    pub id: SessionId,
    pub peer: Option<SocketAddr>,
    outbound: mpsc::Sender<Bytes>,
}

impl ClientSession {
    pub fn new(
        id: SessionId,
        peer: Option<SocketAddr>,
        queue_capacity: usize,
    ) -> (Self, mpsc::Receiver<Bytes>) {
        let (outbound, receiver) = mpsc::channel(queue_capacity.max(1));
        (
            Self {
                id,
                peer,
                outbound,
            },
            receiver,
        )
    }

    pub fn sender(&self) -> mpsc::Sender<Bytes> {
        self.outbound.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Queues a frame, waiting at most `limit` for room.
    pub async fn enqueue(&self, frame: Bytes, limit: Duration) -> Result<()> {
        enqueue_with_timeout(self.id, &self.outbound, frame, limit).await
    }
}

pub(crate) async fn enqueue_with_timeout(
    id: SessionId,
    sender: &mpsc::Sender<Bytes>,
    frame: Bytes,
    limit: Duration,
) -> Result<()> {
    match timeout(limit, sender.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(VoxmapError::SessionClosed(id)),
        Err(_) => Err(VoxmapError::SendTimeout(id)),
    }
}

/// Drains a session's outbound queue into its socket until the queue is closed
/// (the session was disconnected) or a write fails or stalls past `write_timeout`.
pub async fn run_writer<W>(
    mut queue: mpsc::Receiver<Bytes>,
    mut sink: FramedWrite<W, FrameCodec>,
    write_timeout: Duration,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = queue.recv().await {
        match timeout(write_timeout, sink.send(frame)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(VoxmapError::IoError(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "socket write timed out",
                )))
            }
        }
    }
    sink.close().await?;
    Ok(())
}
