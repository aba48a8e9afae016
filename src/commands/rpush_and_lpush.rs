use std::{collections::VecDeque, sync::Arc};

use tokio::sync::Mutex;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::{DataType, KeyValueStore, Value},
    resp::RespValue,
    state::State,
};

struct PushArguments {
    key: String,
    elements: Vec<String>,
}

impl PushArguments {
    fn parse(arguments: Vec<String>, command_name: &str) -> Result<Self, CommandError> {
        if arguments.len() < 2 {
            return Err(CommandError::WrongNumberOfArguments(
                command_name.to_string(),
            ));
        }

        let mut arguments = arguments.into_iter();
        let key = arguments.next().unwrap_or_default();

        Ok(Self {
            key,
            elements: arguments.collect(),
        })
    }
}

/// Handles the Redis RPUSH command: appends in argument order.
pub async fn rpush(
    store: &Arc<Mutex<KeyValueStore>>,
    state: &Arc<Mutex<State>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    push(store, state, arguments, false).await
}

/// Handles the Redis LPUSH command: prepends one element at a time, so
/// the arguments end up in reverse order at the head.
pub async fn lpush(
    store: &Arc<Mutex<KeyValueStore>>,
    state: &Arc<Mutex<State>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    push(store, state, arguments, true).await
}

async fn push(
    store: &Arc<Mutex<KeyValueStore>>,
    state: &Arc<Mutex<State>>,
    arguments: Vec<String>,
    prepend: bool,
) -> Result<CommandResult, CommandError> {
    let command_name = if prepend { "LPUSH" } else { "RPUSH" };
    let propagate = propagation_frame(command_name, &arguments);
    let push_arguments = PushArguments::parse(arguments, &command_name.to_lowercase())?;

    let new_length;

    {
        let mut store_guard = store.lock().await;

        match store_guard.get_mut(&push_arguments.key) {
            Some(value) => {
                let DataType::Array(ref mut list) = value.data else {
                    return Err(CommandError::WrongType);
                };

                extend_list(list, push_arguments.elements, prepend);
                new_length = list.len();
            }
            None => {
                let mut list = VecDeque::new();
                extend_list(&mut list, push_arguments.elements, prepend);
                new_length = list.len();

                store_guard.insert(
                    push_arguments.key.clone(),
                    Value {
                        data: DataType::Array(list),
                        expiration: None,
                    },
                );
            }
        }
    }

    // Store mutation is visible before any blocked client is woken.
    let mut state_guard = state.lock().await;
    state_guard.notify_list_key(&push_arguments.key, new_length);

    Ok(CommandResult::Write {
        response: RespValue::Integer(new_length as i64).encode(),
        propagate,
    })
}

fn extend_list(list: &mut VecDeque<String>, elements: Vec<String>, prepend: bool) {
    for element in elements {
        if prepend {
            list.push_front(element);
        } else {
            list.push_back(element);
        }
    }
}

fn propagation_frame(command_name: &str, arguments: &[String]) -> RespValue {
    let mut parts = vec![command_name.to_string()];
    parts.extend(arguments.iter().cloned());

    RespValue::command_frame(&parts)
}
