use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::{DataType, KeyValueStore},
    resp::RespValue,
};

struct LpopArguments {
    key: String,
    count: Option<usize>,
}

impl LpopArguments {
    fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.is_empty() || arguments.len() > 2 {
            return Err(CommandError::WrongNumberOfArguments("lpop".to_string()));
        }

        let count = match arguments.get(1) {
            Some(raw) => Some(raw.parse::<usize>().map_err(|_| CommandError::NotAnInteger)?),
            None => None,
        };

        Ok(Self {
            key: arguments[0].clone(),
            count,
        })
    }
}

/// Handles the Redis LPOP command, with the optional count form that
/// returns an array. Popping the last element deletes the key.
pub async fn lpop(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let propagate = propagation_frame(&arguments);
    let lpop_arguments = LpopArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;

    let popped = pop_first_elements(
        &mut store_guard,
        &lpop_arguments.key,
        lpop_arguments.count.unwrap_or(1),
    )?;

    let response = match lpop_arguments.count {
        None => match popped.into_iter().next() {
            Some(element) => RespValue::BulkString(element).encode(),
            None => RespValue::NullBulkString.encode(),
        },
        Some(_) => {
            if popped.is_empty() {
                RespValue::NullArray.encode()
            } else {
                RespValue::encode_array_from_strings(popped)
            }
        }
    };

    Ok(CommandResult::Write {
        response,
        propagate,
    })
}

/// Removes up to `count` elements from the head of the list at `key`.
/// Used by LPOP and by BLPOP's immediate path.
pub fn pop_first_elements(
    store_guard: &mut KeyValueStore,
    key: &str,
    count: usize,
) -> Result<Vec<String>, CommandError> {
    let Some(value) = store_guard.get_mut(key) else {
        return Ok(Vec::new());
    };

    let DataType::Array(ref mut list) = value.data else {
        return Err(CommandError::WrongType);
    };

    let mut popped = Vec::with_capacity(count.min(list.len()));

    while popped.len() < count {
        match list.pop_front() {
            Some(element) => popped.push(element),
            None => break,
        }
    }

    if list.is_empty() {
        store_guard.remove(key);
    }

    Ok(popped)
}

/// BLPOP resolves as a propagated LPOP once it actually pops.
pub fn lpop_frame(key: &str) -> RespValue {
    RespValue::command_frame(&["LPOP", key])
}

fn propagation_frame(arguments: &[String]) -> RespValue {
    let mut parts = vec!["LPOP".to_string()];
    parts.extend(arguments.iter().cloned());

    RespValue::command_frame(&parts)
}
