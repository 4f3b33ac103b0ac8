use bytes::Bytes;
use std::collections::BTreeMap;
use tokio::sync::{Mutex, RwLock};
use voxmap_common::types::{ChunkCoordinate, Result, SessionId};
use voxmap_protocol::SessionManager;

/// Last known ChunkData frame for every chunk coordinate seen so far.
///
/// Entries are never evicted; a newer upload for the same coordinate replaces the
/// older one. Frames are stored already encoded, so replay is a cheap clone.
#[derive(Default)]
pub struct ChunkStore {
    chunks: RwLock<BTreeMap<ChunkCoordinate, Bytes>>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an encoded ChunkData frame for `coord`, replacing any previous one.
    /// Returns the number of retained chunks.
    pub async fn put(&self, coord: ChunkCoordinate, frame: Bytes) -> usize {
        let mut chunks = self.chunks.write().await;
        chunks.insert(coord, frame);
        chunks.len()
    }

    pub async fn get(&self, coord: ChunkCoordinate) -> Option<Bytes> {
        self.chunks.read().await.get(&coord).cloned()
    }

    pub async fn snapshot_size(&self) -> usize {
        self.chunks.read().await.len()
    }

    /// Sends every retained chunk to one session, ordered by coordinate.
    ///
    /// Coordinates come from a snapshot, but each frame is re-read and sent while
    /// holding `publish_lock`, the lock publishers hold across store and broadcast.
    /// A chunk published during replay therefore never reaches the session ahead
    /// of an older copy. Each send is bounded by the hub's send timeout.
    pub async fn replay_to(
        &self,
        hub: &SessionManager,
        id: SessionId,
        publish_lock: &Mutex<()>,
    ) -> Result<usize> {
        let coords: Vec<ChunkCoordinate> = self.chunks.read().await.keys().copied().collect();

        let mut sent = 0;
        for coord in coords {
            let _guard = publish_lock.lock().await;
            if let Some(frame) = self.get(coord).await {
                hub.send(id, frame).await?;
                sent += 1;
            }
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;
    use voxmap_common::types::ChunkRawBuilder;
    use voxmap_common::VoxmapError;
    use voxmap_protocol::Packet;

    fn chunk_frame(x: i32, z: i32, color: u32) -> Bytes {
        let mut builder = ChunkRawBuilder::new();
        builder.set(0, 64, 0, color);
        Packet::chunk_data(ChunkCoordinate::new(x, z), builder.build()).encode()
    }

    #[tokio::test]
    async fn test_put_counts_distinct_coordinates() {
        let store = ChunkStore::new();
        assert_eq!(store.put(ChunkCoordinate::new(0, 0), chunk_frame(0, 0, 1)).await, 1);
        assert_eq!(store.put(ChunkCoordinate::new(0, 1), chunk_frame(0, 1, 1)).await, 2);
        assert_eq!(store.put(ChunkCoordinate::new(0, 0), chunk_frame(0, 0, 2)).await, 2);
        assert_eq!(store.snapshot_size().await, 2);
    }

    #[tokio::test]
    async fn test_replay_delivers_last_write_only() {
        let store = ChunkStore::new();
        let hub = SessionManager::new(16, Duration::from_millis(100));
        let coord = ChunkCoordinate::new(5, -5);
        let first = chunk_frame(5, -5, 0xaaaaaa);
        let second = chunk_frame(5, -5, 0xbbbbbb);

        store.put(coord, first).await;
        store.put(coord, second.clone()).await;

        let (id, mut queue) = hub.connect(None).await;
        assert_eq!(store.replay_to(&hub, id, &Mutex::new(())).await.unwrap(), 1);
        assert_eq!(queue.try_recv().unwrap(), second);
        assert!(queue.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_replay_order_is_stable() {
        let store = ChunkStore::new();
        let hub = SessionManager::new(16, Duration::from_millis(100));
        for (x, z) in [(3, 0), (-1, 2), (0, 0)] {
            store.put(ChunkCoordinate::new(x, z), chunk_frame(x, z, 1)).await;
        }

        let (id, mut queue) = hub.connect(None).await;
        store.replay_to(&hub, id, &Mutex::new(())).await.unwrap();

        let mut order = Vec::new();
        while let Ok(frame) = queue.try_recv() {
            match Packet::decode(frame).unwrap() {
                Packet::ChunkData { coord, .. } => order.push((coord.x, coord.z)),
                other => panic!("unexpected packet {:?}", other),
            }
        }
        assert_eq!(order, vec![(-1, 2), (0, 0), (3, 0)]);
    }

    #[tokio::test]
    async fn test_replay_to_unknown_session() {
        let store = ChunkStore::new();
        let hub = SessionManager::new(16, Duration::from_millis(100));
        store.put(ChunkCoordinate::new(0, 0), chunk_frame(0, 0, 1)).await;

        assert_matches!(
            store.replay_to(&hub, 9, &Mutex::new(())).await,
            Err(VoxmapError::UnknownSession(9))
        );
    }

    #[tokio::test]
    async fn test_replay_waits_for_publisher() {
        let store = ChunkStore::new();
        let hub = SessionManager::new(16, Duration::from_millis(100));
        let lock = Mutex::new(());
        let coord = ChunkCoordinate::new(1, 1);
        store.put(coord, chunk_frame(1, 1, 0xaaaaaa)).await;

        let (id, mut queue) = hub.connect(None).await;
        let newer = chunk_frame(1, 1, 0xbbbbbb);
        let publisher = lock.lock().await;
        let replay = store.replay_to(&hub, id, &lock);
        tokio::pin!(replay);

        // Replay is stuck behind the publisher, which swaps the frame before letting go
        assert!(tokio::time::timeout(Duration::from_millis(20), &mut replay).await.is_err());
        store.put(coord, newer.clone()).await;
        drop(publisher);

        assert_eq!(replay.await.unwrap(), 1);
        assert_eq!(queue.try_recv().unwrap(), newer);
        assert!(queue.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_replay_of_empty_store() {
        let store = ChunkStore::new();
        let hub = SessionManager::new(16, Duration::from_millis(100));
        let (id, _queue) = hub.connect(None).await;
        assert_eq!(store.replay_to(&hub, id, &Mutex::new(())).await.unwrap(), 0);
    }
}
