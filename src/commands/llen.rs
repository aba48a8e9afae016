use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::{DataType, KeyValueStore},
    resp::RespValue,
};

pub async fn llen(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let key = arguments
        .into_iter()
        .next()
        .ok_or_else(|| CommandError::WrongNumberOfArguments("llen".to_string()))?;

    let mut store_guard = store.lock().await;

    let length = match store_guard.get(&key) {
        Some(value) => {
            let DataType::Array(ref list) = value.data else {
                return Err(CommandError::WrongType);
            };

            list.len()
        }
        None => 0,
    };

    Ok(CommandResult::Response(
        RespValue::Integer(length as i64).encode(),
    ))
}
