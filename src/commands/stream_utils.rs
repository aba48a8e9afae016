use crate::{
    commands::command_error::CommandError,
    key_value_store::{StreamEntry, StreamId},
    resp::RespValue,
};

/// An XADD id argument before it is resolved against the stream.
#[derive(Debug, PartialEq)]
pub enum EntryIdSpec {
    /// `*`: wall-clock milliseconds, sequence picked by the server.
    Auto,
    /// `<ms>-*`: fixed milliseconds, next free sequence.
    AutoSequence(u64),
    /// `<ms>-<seq>` or bare `<ms>` (sequence defaults to 0).
    Explicit(StreamId),
}

pub fn parse_entry_id(raw: &str) -> Result<EntryIdSpec, CommandError> {
    if raw == "*" {
        return Ok(EntryIdSpec::Auto);
    }

    match raw.split_once('-') {
        None => {
            let ms = raw.parse::<u64>().map_err(|_| CommandError::InvalidStreamId)?;
            Ok(EntryIdSpec::Explicit(StreamId::new(ms, 0)))
        }
        Some((ms_part, seq_part)) => {
            let ms = ms_part
                .parse::<u64>()
                .map_err(|_| CommandError::InvalidStreamId)?;

            if seq_part == "*" {
                return Ok(EntryIdSpec::AutoSequence(ms));
            }

            let seq = seq_part
                .parse::<u64>()
                .map_err(|_| CommandError::InvalidStreamId)?;

            Ok(EntryIdSpec::Explicit(StreamId::new(ms, seq)))
        }
    }
}

/// XRANGE start bound: `-` is the smallest id, a bare `<ms>` starts at
/// sequence 0.
pub fn parse_range_start(raw: &str) -> Result<StreamId, CommandError> {
    if raw == "-" {
        return Ok(StreamId::ZERO);
    }

    parse_bound(raw, 0)
}

/// XRANGE end bound: `+` is the largest id, a bare `<ms>` covers the
/// whole millisecond.
pub fn parse_range_end(raw: &str) -> Result<StreamId, CommandError> {
    if raw == "+" {
        return Ok(StreamId::MAX);
    }

    parse_bound(raw, u64::MAX)
}

fn parse_bound(raw: &str, default_seq: u64) -> Result<StreamId, CommandError> {
    match raw.split_once('-') {
        None => {
            let ms = raw.parse::<u64>().map_err(|_| CommandError::InvalidStreamId)?;
            Ok(StreamId::new(ms, default_seq))
        }
        Some((ms_part, seq_part)) => {
            let ms = ms_part
                .parse::<u64>()
                .map_err(|_| CommandError::InvalidStreamId)?;
            let seq = seq_part
                .parse::<u64>()
                .map_err(|_| CommandError::InvalidStreamId)?;

            Ok(StreamId::new(ms, seq))
        }
    }
}

/// XREAD baseline: `$` means "the stream's current last id", which only
/// the executor can resolve; everything else parses like a start bound.
pub fn parse_read_baseline(raw: &str) -> Result<Option<StreamId>, CommandError> {
    if raw == "$" {
        return Ok(None);
    }

    parse_bound(raw, 0).map(Some)
}

/// Encodes one entry as `[id, [field, value, ...]]`.
pub fn encode_entry(entry: &StreamEntry) -> RespValue {
    let mut field_values = Vec::with_capacity(entry.fields.len() * 2);

    for (field, value) in &entry.fields {
        field_values.push(RespValue::BulkString(field.clone()));
        field_values.push(RespValue::BulkString(value.clone()));
    }

    RespValue::Array(vec![
        RespValue::BulkString(entry.id.to_string()),
        RespValue::Array(field_values),
    ])
}

pub fn encode_entries(entries: &[StreamEntry]) -> RespValue {
    RespValue::Array(entries.iter().map(encode_entry).collect())
}
