//! Replication: the master-side handshake, write propagation, ack
//! accounting with WAIT, and a full master/replica pair end to end.

mod common;

use std::time::Duration;

use common::{TestClient, simple, spawn_master, spawn_replica_of};
use redis_lite::{replication::EMPTY_RDB, resp::RespValue};
use tokio::time::timeout;

/// Drives the replica side of the handshake by hand and returns the
/// client once it is registered as a replica.
async fn handshake_as_replica(address: std::net::SocketAddr) -> TestClient {
    let mut replica = TestClient::connect(address).await;

    assert_eq!(replica.command(&["PING"]).await, simple("PONG"));
    assert_eq!(
        replica
            .command(&["REPLCONF", "listening-port", "6380"])
            .await,
        simple("OK")
    );
    assert_eq!(
        replica.command(&["REPLCONF", "capa", "psync2"]).await,
        simple("OK")
    );

    replica.send(&["PSYNC", "?", "-1"]).await;

    let header = replica.read_frame().await;
    match header {
        RespValue::SimpleString(content) => {
            assert!(content.starts_with("FULLRESYNC "), "got {:?}", content);
        }
        other => panic!("expected FULLRESYNC, got {:?}", other),
    }

    let rdb_length = replica.consume_rdb().await;
    assert_eq!(rdb_length, EMPTY_RDB.len());

    replica
}

#[tokio::test]
async fn test_write_propagation_literal_frame() {
    let address = spawn_master().await;

    let mut replica = handshake_as_replica(address).await;
    let mut client = TestClient::connect(address).await;

    assert_eq!(client.command_encoded(&["SET", "x", "y"]).await, "+OK\r\n");

    let expected = b"*3\r\n$3\r\nSET\r\n$1\r\nx\r\n$1\r\ny\r\n";
    let received = timeout(
        Duration::from_secs(2),
        replica.read_exact_bytes(expected.len()),
    )
    .await
    .expect("replica should receive the propagated write");

    assert_eq!(received, expected);
}

#[tokio::test]
async fn test_reads_are_not_propagated() {
    let address = spawn_master().await;

    let mut replica = handshake_as_replica(address).await;
    let mut client = TestClient::connect(address).await;

    client.command(&["GET", "nothing"]).await;
    client.command(&["PING"]).await;
    client.command(&["SET", "k", "v"]).await;

    // The first thing on the replication stream is the SET, not the
    // reads that preceded it.
    let expected = b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n";
    let received = timeout(
        Duration::from_secs(2),
        replica.read_exact_bytes(expected.len()),
    )
    .await
    .expect("replica should receive the propagated write");

    assert_eq!(received, expected);
}

#[tokio::test]
async fn test_commands_inside_exec_propagate_in_order() {
    let address = spawn_master().await;

    let mut replica = handshake_as_replica(address).await;
    let mut client = TestClient::connect(address).await;

    client.command(&["MULTI"]).await;
    client.command(&["SET", "a", "1"]).await;
    client.command(&["INCR", "a"]).await;
    client.command(&["EXEC"]).await;

    let expected: &[u8] =
        b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n*2\r\n$4\r\nINCR\r\n$1\r\na\r\n";
    let received = timeout(
        Duration::from_secs(2),
        replica.read_exact_bytes(expected.len()),
    )
    .await
    .expect("replica should receive both writes");

    assert_eq!(received, expected);
}

#[tokio::test]
async fn test_wait_resolves_once_replica_acks() {
    let address = spawn_master().await;

    let mut replica = handshake_as_replica(address).await;
    let mut client = TestClient::connect(address).await;

    client.command(&["SET", "x", "y"]).await;

    let propagated = b"*3\r\n$3\r\nSET\r\n$1\r\nx\r\n$1\r\ny\r\n";
    let received = replica.read_exact_bytes(propagated.len()).await;
    assert_eq!(received, propagated);

    // WAIT triggers a GETACK probe toward the replica.
    client.send(&["WAIT", "1", "2000"]).await;

    let getack = replica.read_frame().await;
    assert_eq!(
        getack,
        RespValue::command_frame(&["REPLCONF", "GETACK", "*"])
    );

    // Ack everything received before the probe.
    replica
        .send(&["REPLCONF", "ACK", &propagated.len().to_string()])
        .await;

    let reply = timeout(Duration::from_secs(2), client.read_frame())
        .await
        .expect("WAIT should resolve after the ack");

    assert_eq!(reply, RespValue::Integer(1));
}

#[tokio::test]
async fn test_wait_zero_required_returns_immediately() {
    let address = spawn_master().await;
    let mut client = TestClient::connect(address).await;

    let reply = timeout(
        Duration::from_secs(1),
        client.command(&["WAIT", "0", "0"]),
    )
    .await
    .expect("WAIT 0 should not block");

    assert_eq!(reply, RespValue::Integer(0));
}

#[tokio::test]
async fn test_wait_times_out_with_current_count() {
    let address = spawn_master().await;

    let _replica = handshake_as_replica(address).await;
    let mut client = TestClient::connect(address).await;

    client.command(&["SET", "x", "y"]).await;

    let reply = timeout(
        Duration::from_secs(2),
        client.command(&["WAIT", "1", "100"]),
    )
    .await
    .expect("WAIT should time out on its own");

    // The fake replica never acks, so the count stays at zero.
    assert_eq!(reply, RespValue::Integer(0));
}

#[tokio::test]
async fn test_full_replica_applies_master_writes() {
    let master = spawn_master().await;
    let replica = spawn_replica_of(master).await;

    // Give the replica a moment to finish its handshake.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut master_client = TestClient::connect(master).await;
    let mut replica_client = TestClient::connect(replica).await;

    assert_eq!(
        master_client.command_encoded(&["SET", "shared", "value"]).await,
        "+OK\r\n"
    );

    // Replication is asynchronous; poll until the write lands.
    let mut last = String::new();
    for _ in 0..50 {
        last = replica_client.command_encoded(&["GET", "shared"]).await;

        if last == "$5\r\nvalue\r\n" {
            break;
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(last, "$5\r\nvalue\r\n");
}

#[tokio::test]
async fn test_replica_rejects_direct_writes_but_serves_reads() {
    let master = spawn_master().await;
    let replica = spawn_replica_of(master).await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut replica_client = TestClient::connect(replica).await;

    assert_eq!(
        replica_client.command_encoded(&["SET", "k", "v"]).await,
        "-READONLY You can't write against a read only replica.\r\n"
    );
    assert_eq!(replica_client.command_encoded(&["GET", "k"]).await, "$-1\r\n");

    let info = replica_client.command(&["INFO", "replication"]).await;
    match info {
        RespValue::BulkString(body) => {
            assert!(body.contains("role:slave"), "got {:?}", body);
        }
        other => panic!("expected a bulk string, got {:?}", other),
    }
}

#[tokio::test]
async fn test_replica_answers_getack_with_processed_offset() {
    let master = spawn_master().await;
    let replica = spawn_replica_of(master).await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut master_client = TestClient::connect(master).await;

    master_client.command(&["SET", "x", "y"]).await;

    // WAIT forces a GETACK round trip through the real replica.
    let reply = timeout(
        Duration::from_secs(3),
        master_client.command(&["WAIT", "1", "2000"]),
    )
    .await
    .expect("WAIT should resolve");

    assert_eq!(reply, RespValue::Integer(1));
}
