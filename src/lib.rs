//! A Redis-compatible server implementation in Rust.
//!
//! This crate provides a wire-compatible RESP server that supports
//! core Redis functionality including:
//!
//! - Basic key-value operations (GET, SET, INCR) with expiration
//! - List operations (LPUSH, RPUSH, LPOP, BLPOP, LRANGE, LLEN)
//! - Stream operations (XADD, XRANGE, XREAD, XINFO)
//! - Transactions (MULTI, EXEC, DISCARD)
//! - Server commands (PING, ECHO, KEYS, INFO, TYPE)
//! - Master-replica replication with offset acknowledgment (WAIT)
//! - Blocking reads with client notifications
//!
//! The server uses the Redis Serialization Protocol (RESP) for client
//! communication and supports concurrent connections through async/await
//! with Tokio.

pub mod clock;
pub mod commands;
pub mod connection;
pub mod handshake;
pub mod key_value_store;
pub mod replication;
pub mod resp;
pub mod server;
pub mod state;
