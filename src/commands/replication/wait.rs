use std::{sync::Arc, time::Duration};

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    replication::ReplicaManager,
    resp::RespValue,
};

struct WaitArguments {
    required: usize,
    timeout: Option<Duration>,
}

impl WaitArguments {
    fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 2 {
            return Err(CommandError::WrongNumberOfArguments("wait".to_string()));
        }

        let required = arguments[0]
            .parse::<usize>()
            .map_err(|_| CommandError::NotAnInteger)?;
        let timeout_ms = arguments[1]
            .parse::<u64>()
            .map_err(|_| CommandError::NotAnInteger)?;

        Ok(Self {
            required,
            timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
        })
    }
}

/// Handles the Redis WAIT command: parks the caller until enough
/// replicas have acknowledged the master's current offset. A required
/// count of 0 answers immediately; a timeout of 0 waits forever.
pub async fn wait(
    replicas: &Arc<ReplicaManager>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let wait_arguments = WaitArguments::parse(arguments)?;

    let acknowledged = replicas
        .wait_for_acks(wait_arguments.required, wait_arguments.timeout)
        .await;

    Ok(CommandResult::Response(
        RespValue::Integer(acknowledged as i64).encode(),
    ))
}
