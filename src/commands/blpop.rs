use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, oneshot},
    time::{Instant, timeout_at},
};

use crate::{
    commands::{
        command_error::CommandError,
        command_handler::CommandResult,
        lpop::{lpop_frame, pop_first_elements},
    },
    key_value_store::KeyValueStore,
    resp::RespValue,
    state::State,
};

#[derive(Debug)]
struct BlpopArguments {
    keys: Vec<String>,
    timeout_secs: f64,
}

impl BlpopArguments {
    fn parse(mut arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() < 2 {
            return Err(CommandError::WrongNumberOfArguments("blpop".to_string()));
        }

        let raw_timeout = arguments.pop().unwrap_or_default();
        let timeout_secs = raw_timeout
            .parse::<f64>()
            .map_err(|_| CommandError::TimeoutNotFloat)?;

        if !timeout_secs.is_finite() {
            return Err(CommandError::TimeoutNotFloat);
        }

        if timeout_secs < 0.0 {
            return Err(CommandError::TimeoutNegative);
        }

        Ok(Self {
            keys: arguments,
            timeout_secs,
        })
    }
}

/// Handles the Redis BLPOP command.
///
/// Checks the keys in argument order and pops the head of the first
/// non-empty list. When every list is empty the caller is parked as a
/// waiter on all keys; a push wakes the oldest waiter, which re-checks
/// the keys and goes back to waiting if another client won the race.
/// A timeout of 0 blocks indefinitely; expiry answers a null array.
///
/// A successful pop is forwarded to replicas as a plain LPOP.
pub async fn blpop(
    store: &Arc<Mutex<KeyValueStore>>,
    state: &Arc<Mutex<State>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let blpop_arguments = BlpopArguments::parse(arguments)?;

    let deadline = if blpop_arguments.timeout_secs > 0.0 {
        Some(Instant::now() + Duration::from_secs_f64(blpop_arguments.timeout_secs))
    } else {
        None
    };

    loop {
        if let Some(result) = try_pop_first(store, &blpop_arguments.keys).await? {
            return Ok(result);
        }

        let (waiter_id, receiver) = {
            let mut state_guard = state.lock().await;
            state_guard.register_list_waiter(&blpop_arguments.keys)
        };

        // A push may have landed between the empty check and the
        // registration; look once more before parking.
        if let Some(result) = try_pop_first(store, &blpop_arguments.keys).await? {
            let mut state_guard = state.lock().await;
            state_guard.remove_waiter(waiter_id);

            return Ok(result);
        }

        let woken = wait_for_signal(receiver, deadline).await;

        {
            let mut state_guard = state.lock().await;
            state_guard.remove_waiter(waiter_id);
        }

        if !woken {
            return Ok(CommandResult::Response(RespValue::NullArray.encode()));
        }
    }
}

async fn try_pop_first(
    store: &Arc<Mutex<KeyValueStore>>,
    keys: &[String],
) -> Result<Option<CommandResult>, CommandError> {
    let mut store_guard = store.lock().await;

    for key in keys {
        let popped = pop_first_elements(&mut store_guard, key, 1)?;

        if let Some(element) = popped.into_iter().next() {
            return Ok(Some(CommandResult::Write {
                response: RespValue::encode_array_from_strings(vec![key.clone(), element]),
                propagate: lpop_frame(key),
            }));
        }
    }

    Ok(None)
}

async fn wait_for_signal(receiver: oneshot::Receiver<()>, deadline: Option<Instant>) -> bool {
    match deadline {
        None => receiver.await.is_ok(),
        Some(deadline) => match timeout_at(deadline, receiver).await {
            Ok(result) => result.is_ok(),
            Err(_) => false,
        },
    }
}
