use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::{DataType, KeyValueStore, Value},
    resp::RespValue,
};

/// Handles the Redis INCR command.
///
/// An absent key counts as 0, so the first INCR yields 1. The stored
/// text must parse as a signed 64-bit integer; anything else (including
/// overflow) is rejected without mutating the store.
pub async fn incr(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let key = arguments
        .into_iter()
        .next()
        .ok_or_else(|| CommandError::WrongNumberOfArguments("incr".to_string()))?;

    let propagate = RespValue::command_frame(&["INCR", &key]);
    let mut store_guard = store.lock().await;

    let incremented = match store_guard.get_mut(&key) {
        Some(value) => {
            let DataType::String(ref mut content) = value.data else {
                return Err(CommandError::WrongType);
            };

            let current = content
                .parse::<i64>()
                .map_err(|_| CommandError::NotAnInteger)?;
            let incremented = current.checked_add(1).ok_or(CommandError::NotAnInteger)?;

            *content = incremented.to_string();
            incremented
        }
        None => {
            store_guard.insert(
                key,
                Value {
                    data: DataType::String("1".to_string()),
                    expiration: None,
                },
            );

            1
        }
    };

    Ok(CommandResult::Write {
        response: RespValue::Integer(incremented).encode(),
        propagate,
    })
}
