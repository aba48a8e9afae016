use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::{DataType, KeyValueStore},
    resp::RespValue,
};

struct GetArguments {
    key: String,
}

impl GetArguments {
    fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let mut arguments = arguments.into_iter();

        let key = arguments
            .next()
            .ok_or_else(|| CommandError::WrongNumberOfArguments("get".to_string()))?;

        Ok(Self { key })
    }
}

/// Handles the Redis GET command.
///
/// Expired keys are treated as absent; the expiry check happens inside
/// the store lookup. Reading a list or stream key is a WRONGTYPE error.
pub async fn get(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let get_arguments = GetArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;

    let response = match store_guard.get(&get_arguments.key) {
        Some(value) => match &value.data {
            DataType::String(content) => RespValue::BulkString(content.clone()),
            _ => return Err(CommandError::WrongType),
        },
        None => RespValue::NullBulkString,
    };

    Ok(CommandResult::Response(response.encode()))
}
