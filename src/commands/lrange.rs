use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::{DataType, KeyValueStore},
    resp::RespValue,
};

struct LrangeArguments {
    key: String,
    start: i64,
    stop: i64,
}

impl LrangeArguments {
    fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 3 {
            return Err(CommandError::WrongNumberOfArguments("lrange".to_string()));
        }

        let start = arguments[1]
            .parse::<i64>()
            .map_err(|_| CommandError::NotAnInteger)?;
        let stop = arguments[2]
            .parse::<i64>()
            .map_err(|_| CommandError::NotAnInteger)?;

        Ok(Self {
            key: arguments[0].clone(),
            start,
            stop,
        })
    }
}

/// Handles the Redis LRANGE command. Indices are inclusive; negative
/// indices count back from the tail, -1 being the last element.
pub async fn lrange(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let lrange_arguments = LrangeArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;

    let elements: Vec<String> = match store_guard.get(&lrange_arguments.key) {
        Some(value) => {
            let DataType::Array(ref list) = value.data else {
                return Err(CommandError::WrongType);
            };

            let (from, to) =
                resolve_range(lrange_arguments.start, lrange_arguments.stop, list.len());

            list.iter().skip(from).take(to.saturating_sub(from)).cloned().collect()
        }
        None => Vec::new(),
    };

    Ok(CommandResult::Response(RespValue::encode_array_from_strings(
        elements,
    )))
}

/// Clamps the inclusive (start, stop) pair to half-open `[from, to)`.
fn resolve_range(start: i64, stop: i64, length: usize) -> (usize, usize) {
    let resolve = |index: i64| -> i64 {
        if index < 0 { index + length as i64 } else { index }
    };

    let from = resolve(start).max(0);
    let to = resolve(stop).min(length as i64 - 1);

    if from > to {
        return (0, 0);
    }

    (from as usize, to as usize + 1)
}
