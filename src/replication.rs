//! Master-side replication: the registry of connected replicas, write
//! propagation, acknowledgment tracking, and the WAIT barrier.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    io::AsyncWriteExt,
    net::tcp::OwnedWriteHalf,
    sync::{Mutex, Notify, RwLock},
    time::{Instant, timeout_at},
};

use crate::resp::RespValue;

/// A canonical empty RDB snapshot (version 11), streamed to a replica
/// right after FULLRESYNC.
pub const EMPTY_RDB: &[u8] = &[
    0x52, 0x45, 0x44, 0x49, 0x53, 0x30, 0x30, 0x31, 0x31, 0xfa, 0x09, 0x72,
    0x65, 0x64, 0x69, 0x73, 0x2d, 0x76, 0x65, 0x72, 0x05, 0x37, 0x2e, 0x32,
    0x2e, 0x30, 0xfa, 0x0a, 0x72, 0x65, 0x64, 0x69, 0x73, 0x2d, 0x62, 0x69,
    0x74, 0x73, 0xc0, 0x40, 0xfa, 0x05, 0x63, 0x74, 0x69, 0x6d, 0x65, 0xc2,
    0x6d, 0x08, 0xbc, 0x65, 0xfa, 0x08, 0x75, 0x73, 0x65, 0x64, 0x2d, 0x6d,
    0x65, 0x6d, 0xc2, 0xb0, 0xc4, 0x10, 0x00, 0xfa, 0x08, 0x61, 0x6f, 0x66,
    0x2d, 0x62, 0x61, 0x73, 0x65, 0xc0, 0x00, 0xff, 0xf0, 0x6e, 0x3b, 0xfe,
    0xc0, 0xff, 0x5a, 0xa2,
];

/// The RDB payload as sent on the wire: bulk-string framing with no
/// trailing CRLF.
pub fn empty_rdb_frame() -> Vec<u8> {
    let mut frame = format!("${}\r\n", EMPTY_RDB.len()).into_bytes();
    frame.extend_from_slice(EMPTY_RDB);

    frame
}

#[derive(Debug)]
struct ReplicaRecord {
    writer: Arc<RwLock<OwnedWriteHalf>>,
    offset_acked: u64,
}

#[derive(Debug, Default)]
struct Registry {
    replicas: HashMap<String, ReplicaRecord>,
    master_offset: u64,
}

/// Shared registry of replicas hanging off this master.
///
/// `master_offset` counts every byte written to the replication stream,
/// propagated writes and GETACK probes alike, so it lines up with the
/// offsets replicas acknowledge.
#[derive(Debug, Default)]
pub struct ReplicaManager {
    registry: Mutex<Registry>,
    ack_changed: Notify,
}

impl ReplicaManager {
    pub fn new() -> Self {
        ReplicaManager::default()
    }

    /// Registers a replica after its FULLRESYNC completes. The writer is
    /// the same shared handle the connection task replies through.
    pub async fn register(&self, address: &str, writer: Arc<RwLock<OwnedWriteHalf>>) {
        {
            let mut registry = self.registry.lock().await;

            registry.replicas.insert(
                address.to_string(),
                ReplicaRecord {
                    writer,
                    offset_acked: 0,
                },
            );
        }

        // A new replica already covers offset 0, which may satisfy a
        // pending WAIT against an idle master.
        self.ack_changed.notify_waiters();
    }

    /// Drops a replica's record; its in-flight writes are abandoned.
    pub async fn remove(&self, address: &str) {
        let mut registry = self.registry.lock().await;

        if registry.replicas.remove(address).is_some() {
            // A WAIT may now be satisfiable with fewer live replicas.
            self.ack_changed.notify_waiters();
        }
    }

    pub async fn replica_count(&self) -> usize {
        self.registry.lock().await.replicas.len()
    }

    pub async fn master_offset(&self) -> u64 {
        self.registry.lock().await.master_offset
    }

    /// Records a `REPLCONF ACK <offset>` from a replica.
    pub async fn record_ack(&self, address: &str, offset: u64) {
        {
            let mut registry = self.registry.lock().await;

            if let Some(record) = registry.replicas.get_mut(address) {
                record.offset_acked = record.offset_acked.max(offset);
            }
        }

        self.ack_changed.notify_waiters();
    }

    /// Number of replicas whose acknowledged offset covers `target`.
    pub async fn acked_at_least(&self, target: u64) -> usize {
        let registry = self.registry.lock().await;

        registry
            .replicas
            .values()
            .filter(|record| record.offset_acked >= target)
            .count()
    }

    /// Fans a write command out to every replica, in master write order.
    pub async fn propagate(&self, frame: &RespValue) {
        self.send_to_all(frame.encode().as_bytes()).await;
    }

    /// Asks every replica to report its current offset.
    pub async fn request_acks(&self) {
        let frame = RespValue::command_frame(&["REPLCONF", "GETACK", "*"]);
        self.send_to_all(frame.encode().as_bytes()).await;
    }

    async fn send_to_all(&self, bytes: &[u8]) {
        let targets: Vec<(String, Arc<RwLock<OwnedWriteHalf>>)> = {
            let mut registry = self.registry.lock().await;

            if registry.replicas.is_empty() {
                return;
            }

            registry.master_offset += bytes.len() as u64;

            registry
                .replicas
                .iter()
                .map(|(address, record)| (address.clone(), Arc::clone(&record.writer)))
                .collect()
        };

        let mut dead = Vec::new();

        for (address, writer) in targets {
            let mut writer_guard = writer.write().await;

            let result = async {
                writer_guard.write_all(bytes).await?;
                writer_guard.flush().await
            }
            .await;

            if let Err(error) = result {
                eprintln!("Failed to propagate to replica {}: {}", address, error);
                dead.push(address);
            }
        }

        for address in dead {
            self.remove(&address).await;
        }
    }

    /// Blocks until `required` replicas have acknowledged everything the
    /// master had sent when the call was made, or the timeout expires.
    /// Returns the count at resolution; a timeout of `None` waits
    /// forever.
    pub async fn wait_for_acks(&self, required: usize, wait_timeout: Option<Duration>) -> usize {
        let target = self.master_offset().await;

        let acked = self.acked_at_least(target).await;
        if acked >= required {
            return acked;
        }

        self.request_acks().await;

        let deadline = wait_timeout.map(|duration| Instant::now() + duration);

        loop {
            // Arm the notification before re-checking so an ack landing
            // in between is not lost.
            let notified = self.ack_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let acked = self.acked_at_least(target).await;
            if acked >= required {
                return acked;
            }

            match deadline {
                None => notified.await,
                Some(deadline) => {
                    if timeout_at(deadline, notified).await.is_err() {
                        return self.acked_at_least(target).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::AsyncReadExt,
        net::{TcpListener, TcpStream},
    };

    use super::*;

    /// A connected socket pair; the write half goes into the manager,
    /// the returned stream plays the replica end.
    async fn socket_pair() -> (Arc<RwLock<OwnedWriteHalf>>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let replica_end = TcpStream::connect(address).await.unwrap();
        let (master_end, _) = listener.accept().await.unwrap();

        let (_, writer) = master_end.into_split();

        (Arc::new(RwLock::new(writer)), replica_end)
    }

    #[tokio::test]
    async fn test_propagate_reaches_every_replica_and_bumps_offset() {
        let manager = ReplicaManager::new();

        let (writer_a, mut replica_a) = socket_pair().await;
        let (writer_b, mut replica_b) = socket_pair().await;

        manager.register("a", writer_a).await;
        manager.register("b", writer_b).await;

        let frame = RespValue::command_frame(&["SET", "x", "y"]);
        manager.propagate(&frame).await;

        let expected = frame.encode();
        assert_eq!(manager.master_offset().await, expected.len() as u64);

        for replica in [&mut replica_a, &mut replica_b] {
            let mut received = vec![0u8; expected.len()];
            replica.read_exact(&mut received).await.unwrap();
            assert_eq!(received, expected.as_bytes());
        }
    }

    #[tokio::test]
    async fn test_propagate_with_no_replicas_keeps_offset_at_zero() {
        let manager = ReplicaManager::new();

        manager
            .propagate(&RespValue::command_frame(&["SET", "x", "y"]))
            .await;

        assert_eq!(manager.master_offset().await, 0);
    }

    #[tokio::test]
    async fn test_ack_accounting() {
        let manager = ReplicaManager::new();

        let (writer, _replica) = socket_pair().await;
        manager.register("a", writer).await;

        assert_eq!(manager.acked_at_least(0).await, 1);
        assert_eq!(manager.acked_at_least(10).await, 0);

        manager.record_ack("a", 25).await;
        assert_eq!(manager.acked_at_least(10).await, 1);

        // Stale acks never move the offset backwards.
        manager.record_ack("a", 5).await;
        assert_eq!(manager.acked_at_least(25).await, 1);
    }

    #[tokio::test]
    async fn test_wait_for_acks_returns_immediately_when_satisfied() {
        let manager = ReplicaManager::new();

        let count = manager.wait_for_acks(0, Some(Duration::from_secs(5))).await;
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_wait_for_acks_times_out_with_current_count() {
        let manager = Arc::new(ReplicaManager::new());

        let (writer, _replica) = socket_pair().await;
        manager.register("a", writer).await;

        manager
            .propagate(&RespValue::command_frame(&["SET", "x", "y"]))
            .await;

        let count = manager.wait_for_acks(1, Some(Duration::from_millis(50))).await;
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_wait_for_acks_resolves_when_ack_arrives() {
        let manager = Arc::new(ReplicaManager::new());

        let (writer, _replica) = socket_pair().await;
        manager.register("a", writer).await;

        manager
            .propagate(&RespValue::command_frame(&["SET", "x", "y"]))
            .await;

        let target = manager.master_offset().await;

        let manager_clone = Arc::clone(&manager);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            // GETACK bytes were sent after the WAIT captured its target,
            // so acking past the original offset is enough.
            manager_clone.record_ack("a", target + 100).await;
        });

        let count = manager.wait_for_acks(1, Some(Duration::from_secs(5))).await;
        assert_eq!(count, 1);
    }

    #[test]
    fn test_empty_rdb_frame_layout() {
        let frame = empty_rdb_frame();

        assert!(frame.starts_with(b"$88\r\n"));
        assert_eq!(frame.len(), 5 + EMPTY_RDB.len());
        assert!(!frame.ends_with(b"\r\n"));
    }
}
