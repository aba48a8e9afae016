use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    replication::ReplicaManager,
    resp::RespValue,
    server::RedisServer,
};

/// Handles PSYNC from a prospective replica.
///
/// Partial resynchronization is not kept, so any request — including
/// `PSYNC ? -1` — is answered with a FULLRESYNC header; the connection
/// then streams the empty RDB snapshot and registers the replica.
pub async fn psync(
    server: &Arc<RwLock<RedisServer>>,
    replicas: &Arc<ReplicaManager>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    if arguments.len() != 2 {
        return Err(CommandError::WrongNumberOfArguments("psync".to_string()));
    }

    arguments[1]
        .parse::<i64>()
        .map_err(|_| CommandError::NotAnInteger)?;

    let server_guard = server.read().await;

    if arguments[0] != "?" && arguments[0] != server_guard.repl_id {
        return Err(CommandError::SyntaxError);
    }

    let header = RespValue::SimpleString(format!(
        "FULLRESYNC {} {}",
        server_guard.repl_id,
        replicas.master_offset().await
    ));

    Ok(CommandResult::FullResync {
        response: header.encode(),
    })
}
