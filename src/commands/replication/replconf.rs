//! REPLCONF on the master side.
//!
//! `listening-port` and `capa` arrive during the replica handshake and
//! only need an OK. `ACK <offset>` arrives on an established replica
//! connection and is recorded without a reply. Unknown subcommands get
//! an OK for forward compatibility.

use std::sync::Arc;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    replication::ReplicaManager,
    resp::RespValue,
};

pub async fn replconf(
    replicas: &Arc<ReplicaManager>,
    client_address: &str,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let subcommand = arguments
        .first()
        .ok_or_else(|| CommandError::WrongNumberOfArguments("replconf".to_string()))?;

    if subcommand.eq_ignore_ascii_case("ACK") {
        let offset = arguments
            .get(1)
            .and_then(|raw| raw.parse::<u64>().ok())
            .ok_or(CommandError::NotAnInteger)?;

        replicas.record_ack(client_address, offset).await;

        return Ok(CommandResult::NoResponse);
    }

    Ok(CommandResult::Response(
        RespValue::SimpleString("OK".to_string()).encode(),
    ))
}
