use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    commands::{
        command_error::CommandError,
        command_handler::CommandResult,
        stream_utils::encode_entry,
    },
    key_value_store::{DataType, KeyValueStore},
    resp::RespValue,
};

/// Handles `XINFO STREAM <key>`: length, last generated id, and the
/// first/last entries of the stream.
pub async fn xinfo(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    if arguments.len() != 2 || !arguments[0].eq_ignore_ascii_case("STREAM") {
        return Err(CommandError::SyntaxError);
    }

    let key = &arguments[1];

    let mut store_guard = store.lock().await;

    let Some(value) = store_guard.get(key) else {
        return Err(CommandError::NoSuchKey);
    };

    let DataType::Stream(ref stream) = value.data else {
        return Err(CommandError::WrongType);
    };

    let entry_or_null = |entry: Option<&crate::key_value_store::StreamEntry>| match entry {
        Some(entry) => encode_entry(entry),
        None => RespValue::NullBulkString,
    };

    let response = RespValue::Array(vec![
        RespValue::BulkString("length".to_string()),
        RespValue::Integer(stream.len() as i64),
        RespValue::BulkString("last-generated-id".to_string()),
        RespValue::BulkString(stream.last_id().to_string()),
        RespValue::BulkString("first-entry".to_string()),
        entry_or_null(stream.first_entry()),
        RespValue::BulkString("last-entry".to_string()),
        entry_or_null(stream.last_entry()),
    ]);

    Ok(CommandResult::Response(response.encode()))
}
