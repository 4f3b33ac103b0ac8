use crate::chunk_store::ChunkStore;
use crate::console;
use crate::ingest::IngestServer;
use bytes::Bytes;
use futures::StreamExt;
use std::future::pending;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep, Duration};
use tokio_util::codec::{FramedRead, FramedWrite};
use voxmap_common::config::ServerConfig;
use voxmap_common::types::{ChunkCoordinate, ChunkRaw, Result, SessionId};
use voxmap_common::VoxmapError;
use voxmap_logger::log::log;
use voxmap_logger::severity::LogSeverity::{Debug, Error, Fatal, Info, Warning};
use voxmap_protocol::session::run_writer;
use voxmap_protocol::{BroadcastReport, FrameCodec, Packet, SessionEvent, SessionManager};

/// Time given to session writers to flush a fault report before shutdown
const FAULT_FLUSH_DELAY: Duration = Duration::from_millis(250);

/// State shared by every connection, the upload endpoint and the console.
pub struct ServerState {
    pub config: ServerConfig,
    pub hub: SessionManager,
    pub store: ChunkStore,
    /// Held while a chunk is published and while a new session gets its Hello, so
    /// no ChunkData can overtake the Hello.
    publish_lock: Mutex<()>,
}

#[derive(Debug)]
pub struct PublishReport {
    pub retained: usize,
    pub broadcast: BroadcastReport,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        let hub = SessionManager::new(config.outbound_queue_capacity, config.send_timeout());
        Self {
            config,
            hub,
            store: ChunkStore::new(),
            publish_lock: Mutex::new(()),
        }
    }

    /// Stores a chunk and fans it out to every connected client.
    pub async fn publish_chunk(&self, coord: ChunkCoordinate, blocks: ChunkRaw) -> PublishReport {
        let frame = Packet::chunk_data(coord, blocks).encode();
        let _guard = self.publish_lock.lock().await;
        let retained = self.store.put(coord, frame.clone()).await;
        let broadcast = self.hub.broadcast(frame).await;

        log(
            format!(
                "Chunk {} stored ({} total), sent to {} clients",
                coord,
                retained,
                broadcast.delivered()
            ),
            Debug,
        );
        PublishReport {
            retained,
            broadcast,
        }
    }

    /// Registers a session and queues its Hello.
    pub async fn admit(&self, peer: Option<SocketAddr>) -> Result<(SessionId, mpsc::Receiver<Bytes>)> {
        let _guard = self.publish_lock.lock().await;
        let (id, queue) = self.hub.connect(peer).await;
        self.hub.send_packet(id, &Packet::hello(id)).await?;
        Ok((id, queue))
    }

    /// Rest of the greeting after `admit`: every retained chunk, then a message
    /// with the count.
    pub async fn greet(&self, id: SessionId) -> Result<usize> {
        let replayed = self.store.replay_to(&self.hub, id, &self.publish_lock).await?;
        self.hub
            .send_packet(id, &Packet::message(format!("Sent {} chunk packets", replayed)))
            .await?;
        Ok(replayed)
    }

    /// Operator broadcast. Empty text and an empty server are logged locally and
    /// nothing is sent.
    pub async fn say(&self, text: &str) -> Option<BroadcastReport> {
        let text = text.trim();
        if text.is_empty() {
            log("Usage: say <text>".to_owned(), Info);
            return None;
        }

        let clients = self.hub.session_count().await;
        if clients == 0 {
            log("No clients connected".to_owned(), Info);
            return None;
        }

        log(
            format!("Broadcasting message \"{}\" to {} clients...", text, clients),
            Info,
        );
        Some(self.hub.broadcast_packet(&Packet::message(text)).await)
    }

    /// Tells every client about a fault in the server core.
    pub async fn report_fault(&self, description: &str) -> BroadcastReport {
        self.hub
            .broadcast_packet(&Packet::exception(format!(
                "&4Uncaught server exception: &c{}",
                description
            )))
            .await
    }
}

/// Stops a running server from outside of it.
#[derive(Clone)]
pub struct ShutdownHandle {
    notify: Arc<Notify>,
    ingest: Arc<IngestServer>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.notify.notify_one();
        self.ingest.unblock();
    }
}

/// A bound but not yet running server.
pub struct Server {
    state: Arc<ServerState>,
    listener: TcpListener,
    ingest: Arc<IngestServer>,
    shutdown: Arc<Notify>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_address).await?;
        let ingest = IngestServer::bind(&config.ingest_address)?;
        Ok(Self {
            state: Arc::new(ServerState::new(config)),
            listener,
            ingest: Arc::new(ingest),
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn ingest_addr(&self) -> Option<SocketAddr> {
        self.ingest.local_addr()
    }

    pub fn state(&self) -> Arc<ServerState> {
        self.state.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            notify: self.shutdown.clone(),
            ingest: self.ingest.clone(),
        }
    }

    /// Runs until the console closes, Ctrl-C, a shutdown request, or a core task
    /// fails. A core failure is reported to every client as an Exception before
    /// it is returned.
    pub async fn run(self) -> Result<()> {
        let state = self.state;
        log(
            format!(
                "Streaming chunks on {}, accepting uploads on {}",
                state.config.listen_address, state.config.ingest_address
            ),
            Info,
        );

        tokio::spawn(log_session_events(state.clone()));

        let mut accept_task = tokio::spawn(accept_loop(self.listener, state.clone()));

        let ingest = self.ingest.clone();
        let ingest_state = state.clone();
        let runtime = Handle::current();
        let mut ingest_task =
            tokio::task::spawn_blocking(move || ingest.serve(&ingest_state, &runtime));

        let mut console_task = if state.config.console_enabled {
            Some(tokio::spawn(console::run(state.clone())))
        } else {
            None
        };

        let outcome = tokio::select! {
            joined = &mut accept_task => core_task_outcome("accept loop", joined),
            joined = &mut ingest_task => core_task_outcome("chunk ingestion", joined),
            joined = async {
                match console_task.as_mut() {
                    Some(task) => task.await,
                    None => pending().await,
                }
            } => core_task_outcome("console", joined),
            _ = tokio::signal::ctrl_c() => Ok(()),
            _ = self.shutdown.notified() => Ok(()),
        };

        match &outcome {
            Ok(()) => log("Quitting...".to_owned(), Info),
            Err(err) => {
                log(format!("Server core failed: {}", err), Fatal);
                state.report_fault(&err.to_string()).await;
                sleep(FAULT_FLUSH_DELAY).await;
            }
        }

        accept_task.abort();
        if let Some(task) = console_task {
            task.abort();
        }
        self.ingest.unblock();

        outcome
    }
}

fn core_task_outcome(name: &str, joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    match joined {
        Ok(Ok(())) => {
            log(format!("{} finished", name), Debug);
            Ok(())
        }
        Ok(Err(err)) => Err(err),
        Err(join_error) if join_error.is_panic() => Err(VoxmapError::ServerError(format!(
            "{} panicked",
            name
        ))),
        Err(join_error) => Err(VoxmapError::ServerError(format!(
            "{} stopped: {}",
            name, join_error
        ))),
    }
}

/// Binds with `config` and runs until shutdown.
pub async fn run(config: ServerConfig) -> Result<()> {
    Server::bind(config).await?.run().await
}

async fn accept_loop(listener: TcpListener, state: Arc<ServerState>) -> Result<()> {
    loop {
        let (socket, addr) = listener.accept().await?;
        log(format!("New connection from: {}", addr), Debug);
        tokio::spawn(handle_connection(state.clone(), socket, addr));
    }
}

/// One task per client. Anything that goes wrong in here only ends this session.
async fn handle_connection(state: Arc<ServerState>, socket: TcpStream, addr: SocketAddr) {
    if let Err(err) = socket.set_nodelay(true) {
        log(format!("Can't set TCP_NODELAY for {}: {}", addr, err), Debug);
    }

    let (id, queue) = match state.admit(Some(addr)).await {
        Ok(admitted) => admitted,
        Err(err) => {
            log(format!("Failed to admit {}: {}", addr, err), Error);
            return;
        }
    };
    let (reader, writer) = socket.into_split();
    let codec = FrameCodec::new(state.config.max_frame_length);

    let mut writer_task: JoinHandle<()> = {
        let write_timeout = state.config.send_timeout();
        let sink = FramedWrite::new(writer, codec.clone());
        tokio::spawn(async move {
            if let Err(err) = run_writer(queue, sink, write_timeout).await {
                log(format!("Failed to write to client {}: {}", id, err), Warning);
            }
        })
    };

    match state.greet(id).await {
        Ok(replayed) => log(
            format!("Client {} greeted with {} chunks", id, replayed),
            Debug,
        ),
        Err(err) => log(format!("Failed to greet client {}: {}", id, err), Error),
    }

    let mut writer_done = false;
    let reason = tokio::select! {
        reason = read_client_frames(id, FramedRead::new(reader, codec)) => reason,
        _ = &mut writer_task => {
            writer_done = true;
            "connection closed by server".to_owned()
        }
    };
    state.hub.disconnect(id, &reason).await;

    // The writer drains what is queued and stops once the session's queue is closed
    if !writer_done && writer_task.await.is_err() {
        log(format!("Writer for client {} panicked", id), Error);
    }
}

/// Viewers don't send anything meaningful; frames are decoded and logged. A frame
/// that fails to decode closes the connection.
async fn read_client_frames(id: SessionId, mut frames: FramedRead<OwnedReadHalf, FrameCodec>) -> String {
    loop {
        match frames.next().await {
            Some(Ok(frame)) => match Packet::decode(frame) {
                Ok(packet) => log(
                    format!("Received {} packet from client {}", packet.name(), id),
                    Debug,
                ),
                Err(err) => {
                    log(
                        format!("Dropping client {} after bad packet: {}", id, err),
                        Warning,
                    );
                    return format!("protocol error: {}", err);
                }
            },
            Some(Err(err)) => return err.to_string(),
            None => return "connection closed by client".to_owned(),
        }
    }
}

async fn log_session_events(state: Arc<ServerState>) {
    let mut events = state.hub.subscribe();
    loop {
        match events.recv().await {
            Ok(SessionEvent::Connected { id, peer }) => {
                let peer = peer.map(|addr| addr.to_string()).unwrap_or_default();
                log(
                    format!(
                        "Client {} connected from {}, total clients: {}",
                        id,
                        peer,
                        state.hub.session_count().await
                    ),
                    Info,
                );
            }
            Ok(SessionEvent::Disconnected { id, reason }) => log(
                format!(
                    "Client {} disconnected ({}), total clients: {}",
                    id,
                    reason,
                    state.hub.session_count().await
                ),
                Info,
            ),
            Err(RecvError::Lagged(missed)) => {
                log(format!("Session event log skipped {} events", missed), Debug)
            }
            Err(RecvError::Closed) => break,
        }
    }
}
