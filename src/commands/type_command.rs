use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
};

pub async fn type_command(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let key = arguments
        .into_iter()
        .next()
        .ok_or_else(|| CommandError::WrongNumberOfArguments("type".to_string()))?;

    let mut store_guard = store.lock().await;

    let type_name = match store_guard.get(&key) {
        Some(value) => value.data.type_name(),
        None => "none",
    };

    Ok(CommandResult::Response(
        RespValue::SimpleString(type_name.to_string()).encode(),
    ))
}
