use std::sync::Arc;

use globset::Glob;
use tokio::sync::Mutex;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
};

/// Handles the Redis KEYS command: glob match over live keys.
pub async fn keys(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let pattern = arguments
        .into_iter()
        .next()
        .ok_or_else(|| CommandError::WrongNumberOfArguments("keys".to_string()))?;

    let matcher = Glob::new(&pattern)
        .map_err(|_| CommandError::SyntaxError)?
        .compile_matcher();

    let mut store_guard = store.lock().await;

    let mut matched: Vec<String> = store_guard
        .live_keys()
        .into_iter()
        .filter(|key| matcher.is_match(key))
        .collect();

    matched.sort();

    Ok(CommandResult::Response(RespValue::encode_array_from_strings(
        matched,
    )))
}
