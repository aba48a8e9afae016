use std::{sync::Arc, time::Duration};

use tokio::{sync::Mutex, time::Instant};

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::{DataType, KeyValueStore, Value},
    resp::RespValue,
};

struct SetArguments {
    key: String,
    value: String,
    expiration: Option<Instant>,
}

impl SetArguments {
    fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 2 && arguments.len() != 4 {
            return Err(CommandError::WrongNumberOfArguments("set".to_string()));
        }

        let mut expiration: Option<Instant> = None;

        if arguments.len() == 4 {
            let amount = arguments[3]
                .parse::<u64>()
                .map_err(|_| CommandError::NotAnInteger)?;

            if amount == 0 {
                return Err(CommandError::InvalidExpireTime);
            }

            let time_to_live = match arguments[2].to_uppercase().as_str() {
                "EX" => Duration::from_secs(amount),
                "PX" => Duration::from_millis(amount),
                _ => return Err(CommandError::SyntaxError),
            };

            expiration = Some(Instant::now() + time_to_live);
        }

        Ok(Self {
            key: arguments[0].clone(),
            value: arguments[1].clone(),
            expiration,
        })
    }
}

/// Handles the Redis SET command with optional EX/PX expiration.
///
/// SET is unconditional: it overwrites any existing value of any type
/// and clears a previous TTL unless a new one is supplied.
pub async fn set(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let propagate = propagation_frame(&arguments);
    let set_arguments = SetArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;
    store_guard.insert(
        set_arguments.key,
        Value {
            data: DataType::String(set_arguments.value),
            expiration: set_arguments.expiration,
        },
    );

    Ok(CommandResult::Write {
        response: RespValue::SimpleString("OK".to_string()).encode(),
        propagate,
    })
}

fn propagation_frame(arguments: &[String]) -> RespValue {
    let mut parts = vec!["SET".to_string()];
    parts.extend(arguments.iter().cloned());

    RespValue::command_frame(&parts)
}
