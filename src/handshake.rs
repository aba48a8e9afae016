//! Replica-side handshake against a master: PING, the two REPLCONF
//! exchanges, PSYNC, and consumption of the FULLRESYNC RDB snapshot.

use bytes::{Buf, BytesMut};
use regex::Regex;
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use crate::resp::{RespError, RespValue};

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RESP parse error: {0}")]
    Resp(#[from] RespError),
    #[error("master closed the connection")]
    ConnectionClosed,
    #[error("unexpected reply from master: {0}")]
    UnexpectedReply(String),
    #[error("invalid FULLRESYNC header")]
    InvalidFullResync,
    #[error("invalid RDB payload framing")]
    InvalidRdbPayload,
}

/// Runs the replication handshake on a fresh connection to the master.
///
/// Returns the stream together with any bytes that arrived after the
/// RDB payload; those already belong to the propagated command stream
/// and must not be dropped.
pub async fn perform_handshake(
    mut stream: TcpStream,
    listening_port: u16,
) -> Result<(TcpStream, BytesMut), HandshakeError> {
    let mut buffer = BytesMut::with_capacity(4096);

    let reply = exchange(
        &mut stream,
        &mut buffer,
        RespValue::command_frame(&["PING"]),
    )
    .await?;
    expect_simple(&reply, "PONG")?;

    let reply = exchange(
        &mut stream,
        &mut buffer,
        RespValue::command_frame(&["REPLCONF", "listening-port", &listening_port.to_string()]),
    )
    .await?;
    expect_simple(&reply, "OK")?;

    let reply = exchange(
        &mut stream,
        &mut buffer,
        RespValue::command_frame(&["REPLCONF", "capa", "psync2"]),
    )
    .await?;
    expect_simple(&reply, "OK")?;

    let reply = exchange(
        &mut stream,
        &mut buffer,
        RespValue::command_frame(&["PSYNC", "?", "-1"]),
    )
    .await?;
    validate_fullresync(&reply)?;

    consume_rdb_payload(&mut stream, &mut buffer).await?;

    Ok((stream, buffer))
}

async fn exchange(
    stream: &mut TcpStream,
    buffer: &mut BytesMut,
    command: RespValue,
) -> Result<RespValue, HandshakeError> {
    stream.write_all(command.encode().as_bytes()).await?;
    stream.flush().await?;

    read_frame(stream, buffer).await
}

async fn read_frame(
    stream: &mut TcpStream,
    buffer: &mut BytesMut,
) -> Result<RespValue, HandshakeError> {
    loop {
        if let Some(frame) = RespValue::parse(buffer)? {
            return Ok(frame);
        }

        if stream.read_buf(buffer).await? == 0 {
            return Err(HandshakeError::ConnectionClosed);
        }
    }
}

fn expect_simple(reply: &RespValue, expected: &str) -> Result<(), HandshakeError> {
    match reply {
        RespValue::SimpleString(content) if content == expected => Ok(()),
        other => Err(HandshakeError::UnexpectedReply(format!("{:?}", other))),
    }
}

fn validate_fullresync(reply: &RespValue) -> Result<(), HandshakeError> {
    let RespValue::SimpleString(content) = reply else {
        return Err(HandshakeError::UnexpectedReply(format!("{:?}", reply)));
    };

    let parts: Vec<&str> = content.split_whitespace().collect();

    if parts.len() != 3 || parts[0] != "FULLRESYNC" {
        return Err(HandshakeError::InvalidFullResync);
    }

    if !is_valid_repl_id(parts[1]) || parts[2].parse::<u64>().is_err() {
        return Err(HandshakeError::InvalidFullResync);
    }

    Ok(())
}

fn is_valid_repl_id(repl_id: &str) -> bool {
    Regex::new(r"^[a-zA-Z0-9]{40}$")
        .map(|re| re.is_match(repl_id))
        .unwrap_or(false)
}

/// Consumes the `$<len>\r\n<len bytes>` RDB framing. The payload has no
/// trailing CRLF and is not valid RESP, so it is stripped manually.
async fn consume_rdb_payload(
    stream: &mut TcpStream,
    buffer: &mut BytesMut,
) -> Result<(), HandshakeError> {
    let header_end = loop {
        if let Some(position) = buffer.windows(2).position(|window| window == b"\r\n") {
            break position;
        }

        if stream.read_buf(buffer).await? == 0 {
            return Err(HandshakeError::ConnectionClosed);
        }
    };

    let length = {
        let header = &buffer[..header_end];

        if header.first() != Some(&b'$') {
            return Err(HandshakeError::InvalidRdbPayload);
        }

        std::str::from_utf8(&header[1..])
            .map_err(|_| HandshakeError::InvalidRdbPayload)?
            .parse::<usize>()
            .map_err(|_| HandshakeError::InvalidRdbPayload)?
    };

    let total = header_end + 2 + length;

    while buffer.len() < total {
        if stream.read_buf(buffer).await? == 0 {
            return Err(HandshakeError::ConnectionClosed);
        }
    }

    buffer.advance(total);

    Ok(())
}
