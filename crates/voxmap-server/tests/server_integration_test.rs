mod common;

use common::*;
use voxmap_common::types::{ChunkCoordinate, ChunkRawBuilder, CHUNK_DATA_SIZE};
use voxmap_protocol::Packet;

fn chunk_body(color: u32) -> Vec<u8> {
    let mut builder = ChunkRawBuilder::new();
    builder.set_range(3, 4, 0, 64, color);
    builder.build().into_bytes().to_vec()
}

async fn upload(server: &TestServer, x: i32, z: i32, body: Vec<u8>) -> HttpReply {
    let target = format!("/api/set-chunk?x={}&z={}", x, z);
    http_request(server.ingest_addr, "POST", &target, body).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_late_joiner_gets_every_chunk() {
    let server = start_server().await;

    for x in 0..3 {
        let reply = upload(&server, x, -x, chunk_body(0x7f7f7f)).await;
        assert_eq!(reply.status, 200);
        assert!(reply.body.is_empty());
    }

    let mut client = connect_client(&server).await;
    let chunks = read_greeting(&mut client).await;
    assert_eq!(chunks.len(), 3);

    let mut coords: Vec<ChunkCoordinate> = chunks
        .iter()
        .map(|packet| match packet {
            Packet::ChunkData { coord, .. } => *coord,
            other => panic!("expected chunk, got {:?}", other),
        })
        .collect();
    coords.sort();
    assert_eq!(
        coords,
        vec![
            ChunkCoordinate::new(0, 0),
            ChunkCoordinate::new(1, -1),
            ChunkCoordinate::new(2, -2)
        ]
    );

    server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reupload_replaces_chunk() {
    let server = start_server().await;

    assert_eq!(upload(&server, 4, 4, chunk_body(0x111111)).await.status, 200);
    assert_eq!(upload(&server, 4, 4, chunk_body(0x222222)).await.status, 200);

    let mut client = connect_client(&server).await;
    let chunks = read_greeting(&mut client).await;
    assert_eq!(chunks.len(), 1);
    match &chunks[0] {
        Packet::ChunkData { coord, blocks } => {
            assert_eq!(*coord, ChunkCoordinate::new(4, 4));
            assert_eq!(blocks.color_at(3, 10, 4), 0x222222);
        }
        other => panic!("expected chunk, got {:?}", other),
    }

    server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_upload_is_broadcast_to_connected_clients() {
    let server = start_server().await;

    let mut first = connect_client(&server).await;
    let mut second = connect_client(&server).await;
    assert!(read_greeting(&mut first).await.is_empty());
    assert!(read_greeting(&mut second).await.is_empty());
    wait_for_sessions(&server, 2).await;

    assert_eq!(upload(&server, -1, 7, chunk_body(0x294d96)).await.status, 200);

    let a = read_packet(&mut first).await.unwrap();
    let b = read_packet(&mut second).await.unwrap();
    assert_eq!(a, b);
    match a {
        Packet::ChunkData { coord, blocks } => {
            assert_eq!(coord, ChunkCoordinate::new(-1, 7));
            assert_eq!(blocks.color_at(3, 0, 4), 0x294d96);
        }
        other => panic!("expected chunk, got {:?}", other),
    }

    server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rejected_uploads_have_no_effect() {
    let server = start_server().await;
    let addr = server.ingest_addr;

    let reply = http_request(addr, "GET", "/api/set-chunk?x=abc&z=1", Vec::new()).await;
    assert_eq!(reply.status, 400);
    assert_eq!(reply.body, "Invalid chunk coordinates");

    let reply = http_request(addr, "GET", "/api/set-chunk?x=1&z=1", Vec::new()).await;
    assert_eq!(reply.status, 405);

    let reply = http_request(addr, "POST", "/api/set-chunk?x=1&z=1", vec![0; 100]).await;
    assert_eq!(reply.status, 400);
    assert_eq!(reply.body, "Invalid chunk data");

    let reply = http_request(addr, "POST", "/api/set-chunk?x=1&z=1", vec![0; CHUNK_DATA_SIZE - 1]).await;
    assert_eq!(reply.status, 400);

    let reply = http_request(addr, "GET", "/index.html", Vec::new()).await;
    assert_eq!(reply.status, 404);

    assert_eq!(server.state.store.snapshot_size().await, 0);
    server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_session_ids_increase() {
    let server = start_server().await;

    let mut first = connect_client(&server).await;
    let first_id = match read_packet(&mut first).await {
        Some(Packet::Hello { client_id }) => client_id,
        other => panic!("expected Hello, got {:?}", other),
    };
    drop(first);
    wait_for_sessions(&server, 0).await;

    let mut second = connect_client(&server).await;
    match read_packet(&mut second).await {
        Some(Packet::Hello { client_id }) => assert_eq!(client_id, first_id + 1),
        other => panic!("expected Hello, got {:?}", other),
    }

    server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_say_reaches_clients() {
    let server = start_server().await;
    let mut client = connect_client(&server).await;
    read_greeting(&mut client).await;
    wait_for_sessions(&server, 1).await;

    let report = server.state.say("&ehello viewers").await.unwrap();
    assert_eq!(report.delivered(), 1);
    assert_eq!(
        read_packet(&mut client).await,
        Some(Packet::message("&ehello viewers"))
    );

    server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bad_frame_closes_connection() {
    let server = start_server().await;
    let mut client = connect_client(&server).await;
    read_greeting(&mut client).await;
    wait_for_sessions(&server, 1).await;

    send_raw_frame(&mut client, &[0x42, 0x00]).await;

    assert_eq!(read_packet(&mut client).await, None);
    wait_for_sessions(&server, 0).await;

    server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fault_report_reaches_clients() {
    let server = start_server().await;
    let mut client = connect_client(&server).await;
    read_greeting(&mut client).await;
    wait_for_sessions(&server, 1).await;

    server.state.report_fault("chunk store poisoned").await;

    match read_packet(&mut client).await {
        Some(Packet::Exception { text }) => {
            assert_eq!(
                voxmap_protocol::markup::strip_markup(&text),
                "Uncaught server exception: chunk store poisoned"
            );
        }
        other => panic!("expected Exception, got {:?}", other),
    }

    server.stop().await.unwrap();
}
