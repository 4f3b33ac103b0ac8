use crate::pipeline::{ProjectionJob, ProjectionSubmitter};
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use voxmap_common::types::{ChunkCoordinate, Result};
use voxmap_logger::log::log;
use voxmap_logger::severity::LogSeverity::{Debug, Warning};
use voxmap_protocol::markup::{parse_styled, StyledSpan};
use voxmap_protocol::{FrameCodec, Packet};

const EVENT_QUEUE_CAPACITY: usize = 256;

/// Things the render loop cares about, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerEvent {
    Hello { client_id: u8 },
    /// A Message, or an Exception when `important` is set
    Chat { spans: Vec<StyledSpan>, important: bool },
    /// A chunk was handed to the projection pipeline
    ChunkQueued(ChunkCoordinate),
    Closed { reason: String },
}

/// Reads the server's stream on a background task. Chunks go straight to the
/// projection pipeline; everything else comes out of `next_event`.
pub struct ViewerConnection {
    events: mpsc::Receiver<ViewerEvent>,
    reader: JoinHandle<()>,
}

impl ViewerConnection {
    pub async fn connect(
        address: &str,
        max_frame_length: usize,
        submitter: ProjectionSubmitter,
    ) -> Result<Self> {
        let socket = TcpStream::connect(address).await?;
        socket.set_nodelay(true)?;
        Ok(Self::from_stream(socket, max_frame_length, submitter))
    }

    pub fn from_stream<S>(stream: S, max_frame_length: usize, submitter: ProjectionSubmitter) -> Self
    where
        S: AsyncRead + Unpin + Send + 'static,
    {
        let (events_tx, events) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let frames = FramedRead::new(stream, FrameCodec::new(max_frame_length));
        let reader = tokio::spawn(async move {
            let reason = read_stream(frames, &events_tx, submitter).await;
            let _ = events_tx.send(ViewerEvent::Closed { reason }).await;
        });
        Self { events, reader }
    }

    /// Next event, or None after `Closed` has been delivered.
    pub async fn next_event(&mut self) -> Option<ViewerEvent> {
        self.events.recv().await
    }

    /// Stops reading and waits for the reader task to go away.
    pub async fn close(self) {
        self.reader.abort();
        let _ = self.reader.await;
    }
}

/// Returns the reason the stream ended.
async fn read_stream<S>(
    mut frames: FramedRead<S, FrameCodec>,
    events: &mpsc::Sender<ViewerEvent>,
    submitter: ProjectionSubmitter,
) -> String
where
    S: AsyncRead + Unpin,
{
    while let Some(frame) = frames.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => return err.to_string(),
        };

        let event = match Packet::decode(frame) {
            Ok(Packet::Hello { client_id }) => ViewerEvent::Hello { client_id },
            Ok(Packet::Message { text }) => ViewerEvent::Chat {
                spans: parse_styled(&text),
                important: false,
            },
            Ok(Packet::Exception { text }) => ViewerEvent::Chat {
                spans: parse_styled(&text),
                important: true,
            },
            Ok(Packet::ChunkData { coord, blocks }) => {
                let submitter = submitter.clone();
                let job = ProjectionJob {
                    coord,
                    chunk: blocks,
                };
                // Blocks while the projection queue is full, which holds off reading
                match tokio::task::spawn_blocking(move || submitter.submit(job)).await {
                    Ok(Ok(())) => ViewerEvent::ChunkQueued(coord),
                    Ok(Err(err)) => return err.to_string(),
                    Err(err) => return err.to_string(),
                }
            }
            Err(err) => {
                log(format!("Dropping bad packet from server: {}", err), Warning);
                continue;
            }
        };

        if events.send(event).await.is_err() {
            log("Event receiver gone, stopping reader".to_owned(), Debug);
            return "viewer closed".to_owned();
        }
    }
    "connection closed by server".to_owned()
}
