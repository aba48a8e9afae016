//! Shared helpers for the integration tests: servers bound to ephemeral
//! ports and a small RESP-speaking test client.

#![allow(dead_code)]

use std::net::SocketAddr;

use bytes::{Buf, BytesMut};
use redis_lite::{resp::RespValue, server::RedisServer};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

/// Starts a master server on an ephemeral port and returns its address.
pub async fn spawn_master() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let mut server = RedisServer::new(vec!["redis-lite".to_string()]).unwrap();
    server.port = address.port();

    tokio::spawn(async move {
        server.serve(listener).await;
    });

    address
}

/// Starts a replica of `master` on an ephemeral port.
pub async fn spawn_replica_of(master: SocketAddr) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let mut server = RedisServer::new(vec![
        "redis-lite".to_string(),
        "--replicaof".to_string(),
        format!("127.0.0.1 {}", master.port()),
    ])
    .unwrap();
    server.port = address.port();

    tokio::spawn(async move {
        server.serve(listener).await;
    });

    address
}

/// A client speaking raw RESP over TCP.
pub struct TestClient {
    stream: TcpStream,
    buffer: BytesMut,
}

impl TestClient {
    pub async fn connect(address: SocketAddr) -> Self {
        TestClient {
            stream: TcpStream::connect(address).await.unwrap(),
            buffer: BytesMut::with_capacity(4096),
        }
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    pub async fn send(&mut self, parts: &[&str]) {
        let frame = RespValue::command_frame(parts);
        self.send_raw(frame.encode().as_bytes()).await;
    }

    /// Reads one complete RESP frame, blocking until it is whole.
    pub async fn read_frame(&mut self) -> RespValue {
        loop {
            if let Some(frame) = RespValue::parse(&mut self.buffer).unwrap() {
                return frame;
            }

            let read = self.stream.read_buf(&mut self.buffer).await.unwrap();
            assert!(read > 0, "connection closed while waiting for a reply");
        }
    }

    /// Sends a command and returns its reply.
    pub async fn command(&mut self, parts: &[&str]) -> RespValue {
        self.send(parts).await;
        self.read_frame().await
    }

    /// Sends a command and returns the reply's wire encoding.
    pub async fn command_encoded(&mut self, parts: &[&str]) -> String {
        self.command(parts).await.encode()
    }

    /// Consumes the `$<len>\r\n<payload>` RDB framing that follows a
    /// FULLRESYNC header.
    pub async fn consume_rdb(&mut self) -> usize {
        let header_end = loop {
            if let Some(position) = self.buffer.windows(2).position(|window| window == b"\r\n") {
                break position;
            }

            let read = self.stream.read_buf(&mut self.buffer).await.unwrap();
            assert!(read > 0, "connection closed while reading RDB header");
        };

        assert_eq!(self.buffer[0], b'$', "expected bulk RDB framing");

        let length = std::str::from_utf8(&self.buffer[1..header_end])
            .unwrap()
            .parse::<usize>()
            .unwrap();

        let total = header_end + 2 + length;

        while self.buffer.len() < total {
            let read = self.stream.read_buf(&mut self.buffer).await.unwrap();
            assert!(read > 0, "connection closed while reading RDB payload");
        }

        self.buffer.advance(total);

        length
    }

    /// Reads exactly `length` raw bytes from the connection.
    pub async fn read_exact_bytes(&mut self, length: usize) -> Vec<u8> {
        while self.buffer.len() < length {
            let read = self.stream.read_buf(&mut self.buffer).await.unwrap();
            assert!(read > 0, "connection closed while reading raw bytes");
        }

        let bytes = self.buffer[..length].to_vec();
        self.buffer.advance(length);

        bytes
    }
}

pub fn bulk(content: &str) -> RespValue {
    RespValue::BulkString(content.to_string())
}

pub fn simple(content: &str) -> RespValue {
    RespValue::SimpleString(content.to_string())
}
