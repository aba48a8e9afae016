use thiserror::Error;

use crate::resp::RespValue;

/// Failures surfaced to the client as RESP error frames. The enum
/// message is the internal description; [`CommandError::as_string`]
/// yields the exact wire text.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum CommandError {
    #[error("unknown command {0}")]
    UnknownCommand(String),
    #[error("wrong number of arguments for {0}")]
    WrongNumberOfArguments(String),
    #[error("command frame is not an array of bulk strings")]
    InvalidCommandFrame,
    #[error("operation against a key of the wrong type")]
    WrongType,
    #[error("value is not an integer")]
    NotAnInteger,
    #[error("invalid expire time")]
    InvalidExpireTime,
    #[error("syntax error")]
    SyntaxError,
    #[error("timeout is not a float")]
    TimeoutNotFloat,
    #[error("timeout is negative")]
    TimeoutNegative,
    #[error("stream id not above top item")]
    StreamIdTooSmall,
    #[error("stream id must be greater than 0-0")]
    StreamIdZero,
    #[error("invalid stream id")]
    InvalidStreamId,
    #[error("nested MULTI")]
    MultiNested,
    #[error("EXEC without MULTI")]
    ExecWithoutMulti,
    #[error("DISCARD without MULTI")]
    DiscardWithoutMulti,
    #[error("transaction aborted")]
    ExecAborted,
    #[error("no such key")]
    NoSuchKey,
    #[error("write command on a read only replica")]
    ReadOnlyReplica,
}

impl CommandError {
    /// RESP error frame for this failure, byte-for-byte what mainline
    /// Redis replies.
    pub fn as_string(&self) -> String {
        let text = match self {
            CommandError::UnknownCommand(name) => {
                format!("ERR unknown command '{}'", name)
            }
            CommandError::WrongNumberOfArguments(name) => {
                format!("ERR wrong number of arguments for '{}' command", name)
            }
            CommandError::InvalidCommandFrame => "ERR invalid command format".to_string(),
            CommandError::WrongType => {
                "WRONGTYPE Operation against a key holding the wrong kind of value".to_string()
            }
            CommandError::NotAnInteger => {
                "ERR value is not an integer or out of range".to_string()
            }
            CommandError::InvalidExpireTime => {
                "ERR invalid expire time in 'set' command".to_string()
            }
            CommandError::SyntaxError => "ERR syntax error".to_string(),
            CommandError::TimeoutNotFloat => {
                "ERR timeout is not a float or out of range".to_string()
            }
            CommandError::TimeoutNegative => "ERR timeout is negative".to_string(),
            CommandError::StreamIdTooSmall => {
                "ERR The ID specified in XADD is equal or smaller than the target stream top item"
                    .to_string()
            }
            CommandError::StreamIdZero => {
                "ERR The ID specified in XADD must be greater than 0-0".to_string()
            }
            CommandError::InvalidStreamId => {
                "ERR Invalid stream ID specified as stream command argument".to_string()
            }
            CommandError::MultiNested => "ERR MULTI calls can not be nested".to_string(),
            CommandError::ExecWithoutMulti => "ERR EXEC without MULTI".to_string(),
            CommandError::DiscardWithoutMulti => "ERR DISCARD without MULTI".to_string(),
            CommandError::ExecAborted => {
                "EXECABORT Transaction discarded because of previous errors.".to_string()
            }
            CommandError::NoSuchKey => "ERR no such key".to_string(),
            CommandError::ReadOnlyReplica => {
                "READONLY You can't write against a read only replica.".to_string()
            }
        };

        RespValue::Error(text).encode()
    }
}
