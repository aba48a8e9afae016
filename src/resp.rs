//! RESP (Redis Serialization Protocol) codec.
//!
//! The parser is incremental: it consumes bytes from the front of a
//! [`BytesMut`] read buffer and yields one complete frame at a time.
//! When the buffer holds only part of a frame, nothing is consumed and
//! the caller reads more bytes from the socket before retrying.

use bytes::{Buf, BytesMut};
use thiserror::Error;

/// Bulk strings larger than this are rejected as a protocol error.
pub const MAX_BULK_LENGTH: usize = 512 * 1024 * 1024;

#[derive(Error, Debug, PartialEq)]
pub enum RespError {
    #[error("invalid UTF-8 sequence")]
    InvalidUtf8,
    #[error("unknown RESP type byte")]
    UnknownRespType,
    #[error("invalid integer")]
    InvalidInteger,
    #[error("invalid bulk string length")]
    InvalidBulkLength,
    #[error("bulk string exceeds maximum length")]
    BulkTooLarge,
    #[error("invalid bulk string terminator")]
    InvalidBulkTerminator,
    #[error("invalid array length")]
    InvalidArrayLength,
}

impl RespError {
    /// Best-effort error frame written to the client before the
    /// connection is closed.
    pub fn as_string(&self) -> String {
        RespValue::Error(format!("ERR Protocol error: {}", self)).encode()
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(String),
    NullBulkString,
    Array(Vec<RespValue>),
    NullArray,
}

impl RespValue {
    /// Attempts to parse one complete frame from the front of `buffer`.
    ///
    /// Returns `Ok(Some(frame))` and consumes exactly the frame's bytes,
    /// `Ok(None)` when the buffer ends mid-frame (nothing is consumed),
    /// or `Err` for bytes that can never become a valid frame.
    pub fn parse(buffer: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
        let mut position = 0;

        match Self::parse_at(buffer, &mut position)? {
            Some(value) => {
                buffer.advance(position);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn parse_at(input: &[u8], position: &mut usize) -> Result<Option<RespValue>, RespError> {
        let Some(line) = read_line(input, position) else {
            return Ok(None);
        };

        let Some((&type_byte, payload)) = line.split_first() else {
            return Err(RespError::UnknownRespType);
        };

        match type_byte {
            b'+' => Ok(Some(RespValue::SimpleString(as_utf8(payload)?.to_string()))),
            b'-' => Ok(Some(RespValue::Error(as_utf8(payload)?.to_string()))),
            b':' => {
                let value = as_utf8(payload)?
                    .parse::<i64>()
                    .map_err(|_| RespError::InvalidInteger)?;
                Ok(Some(RespValue::Integer(value)))
            }
            b'$' => Self::parse_bulk_string(input, position, payload),
            b'*' => Self::parse_array(input, position, payload),
            _ => Err(RespError::UnknownRespType),
        }
    }

    fn parse_bulk_string(
        input: &[u8],
        position: &mut usize,
        length_digits: &[u8],
    ) -> Result<Option<RespValue>, RespError> {
        let declared_length = as_utf8(length_digits)?
            .parse::<i64>()
            .map_err(|_| RespError::InvalidBulkLength)?;

        if declared_length == -1 {
            return Ok(Some(RespValue::NullBulkString));
        }

        if declared_length < 0 {
            return Err(RespError::InvalidBulkLength);
        }

        let length = declared_length as usize;

        if length > MAX_BULK_LENGTH {
            return Err(RespError::BulkTooLarge);
        }

        if input.len() < *position + length + 2 {
            return Ok(None);
        }

        let content = &input[*position..*position + length];

        if &input[*position + length..*position + length + 2] != b"\r\n" {
            return Err(RespError::InvalidBulkTerminator);
        }

        *position += length + 2;

        Ok(Some(RespValue::BulkString(as_utf8(content)?.to_string())))
    }

    fn parse_array(
        input: &[u8],
        position: &mut usize,
        length_digits: &[u8],
    ) -> Result<Option<RespValue>, RespError> {
        let declared_length = as_utf8(length_digits)?
            .parse::<i64>()
            .map_err(|_| RespError::InvalidArrayLength)?;

        if declared_length == -1 {
            return Ok(Some(RespValue::NullArray));
        }

        if declared_length < 0 {
            return Err(RespError::InvalidArrayLength);
        }

        let mut elements = Vec::with_capacity(declared_length as usize);

        for _ in 0..declared_length {
            match Self::parse_at(input, position)? {
                Some(element) => elements.push(element),
                None => return Ok(None),
            }
        }

        Ok(Some(RespValue::Array(elements)))
    }

    /// Encodes the value as RESP wire bytes.
    ///
    /// Simple strings and errors must not contain CR or LF; text that
    /// might is routed through [`RespValue::BulkString`] by callers.
    pub fn encode(&self) -> String {
        match self {
            RespValue::SimpleString(content) => format!("+{}\r\n", content),
            RespValue::Error(content) => format!("-{}\r\n", content),
            RespValue::Integer(value) => format!(":{}\r\n", value),
            RespValue::BulkString(content) => format!("${}\r\n{}\r\n", content.len(), content),
            RespValue::NullBulkString => "$-1\r\n".to_string(),
            RespValue::Array(elements) => {
                let mut encoded = format!("*{}\r\n", elements.len());

                for element in elements {
                    encoded.push_str(&element.encode());
                }

                encoded
            }
            RespValue::NullArray => "*-1\r\n".to_string(),
        }
    }

    /// Builds the RESP array-of-bulk-strings frame for a command, the
    /// form used by clients and by master-to-replica propagation.
    pub fn command_frame<S: AsRef<str>>(parts: &[S]) -> RespValue {
        RespValue::Array(
            parts
                .iter()
                .map(|part| RespValue::BulkString(part.as_ref().to_string()))
                .collect(),
        )
    }

    /// Encodes a flat list of strings as an array of bulk strings.
    pub fn encode_array_from_strings<S: AsRef<str>>(items: Vec<S>) -> String {
        Self::command_frame(&items).encode()
    }
}

fn read_line<'a>(input: &'a [u8], position: &mut usize) -> Option<&'a [u8]> {
    let remaining = &input[*position..];
    let terminator = remaining.windows(2).position(|window| window == b"\r\n")?;

    let line = &remaining[..terminator];
    *position += terminator + 2;

    Some(line)
}

fn as_utf8(bytes: &[u8]) -> Result<&str, RespError> {
    std::str::from_utf8(bytes).map_err(|_| RespError::InvalidUtf8)
}
