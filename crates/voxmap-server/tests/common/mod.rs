use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use voxmap_common::config::ServerConfig;
use voxmap_common::types::Result;
use voxmap_protocol::{FrameCodec, Packet};
use voxmap_server::{Server, ServerState, ShutdownHandle};

pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub type Client = Framed<TcpStream, FrameCodec>;

pub struct TestServer {
    pub state: Arc<ServerState>,
    pub stream_addr: SocketAddr,
    pub ingest_addr: SocketAddr,
    shutdown: ShutdownHandle,
    task: Option<JoinHandle<Result<()>>>,
}

impl TestServer {
    pub async fn stop(mut self) -> Result<()> {
        self.shutdown.shutdown();
        match self.task.take() {
            Some(task) => task.await.unwrap(),
            None => Ok(()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // The upload thread blocks runtime shutdown until it is unblocked
        self.shutdown.shutdown();
    }
}

pub async fn start_server() -> TestServer {
    let config = ServerConfig {
        listen_address: "127.0.0.1:0".to_owned(),
        ingest_address: "127.0.0.1:0".to_owned(),
        console_enabled: false,
        send_timeout_ms: 1000,
        ..ServerConfig::default()
    };

    let server = Server::bind(config).await.unwrap();
    let state = server.state();
    let stream_addr = server.local_addr().unwrap();
    let ingest_addr = server.ingest_addr().unwrap();
    let shutdown = server.shutdown_handle();
    let task = tokio::spawn(server.run());

    TestServer {
        state,
        stream_addr,
        ingest_addr,
        shutdown,
        task: Some(task),
    }
}

pub async fn connect_client(server: &TestServer) -> Client {
    let socket = TcpStream::connect(server.stream_addr).await.unwrap();
    Framed::new(socket, FrameCodec::new(512 * 1024))
}

/// Next packet from the server, or None once the connection is closed.
pub async fn read_packet(client: &mut Client) -> Option<Packet> {
    let frame = timeout(READ_TIMEOUT, client.next())
        .await
        .expect("timed out waiting for a packet")?
        .ok()?;
    Some(Packet::decode(frame).unwrap())
}

pub async fn send_raw_frame(client: &mut Client, frame: &'static [u8]) {
    client.send(bytes::Bytes::from_static(frame)).await.unwrap();
}

/// Reads Hello, the replayed chunks and the count message. Returns the replayed
/// chunk packets.
pub async fn read_greeting(client: &mut Client) -> Vec<Packet> {
    match read_packet(client).await {
        Some(Packet::Hello { .. }) => {}
        other => panic!("expected Hello, got {:?}", other),
    }

    let mut chunks = Vec::new();
    loop {
        match read_packet(client).await {
            Some(packet @ Packet::ChunkData { .. }) => chunks.push(packet),
            Some(Packet::Message { text }) => {
                assert_eq!(text, format!("Sent {} chunk packets", chunks.len()));
                return chunks;
            }
            other => panic!("unexpected packet during greeting: {:?}", other),
        }
    }
}

/// Waits until the hub has registered `count` sessions.
pub async fn wait_for_sessions(server: &TestServer, count: usize) {
    timeout(READ_TIMEOUT, async {
        while server.state.hub.session_count().await != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("sessions never reached the expected count");
}

pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// Sends one request to the upload endpoint. Error statuses come back as replies.
pub async fn http_request(addr: SocketAddr, method: &str, target: &str, body: Vec<u8>) -> HttpReply {
    let url = format!("http://{}{}", addr, target);
    let method = method.to_owned();
    tokio::task::spawn_blocking(move || {
        let response = match ureq::request(&method, &url).timeout(READ_TIMEOUT).send_bytes(&body) {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(err) => panic!("{} {} failed: {}", method, url, err),
        };
        HttpReply {
            status: response.status(),
            body: response.into_string().unwrap(),
        }
    })
    .await
    .unwrap()
}
