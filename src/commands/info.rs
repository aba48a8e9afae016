use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    replication::ReplicaManager,
    resp::RespValue,
    server::{RedisRole, RedisServer},
};

/// Handles the Redis INFO command. Only the replication section carries
/// real data; asking for an unknown section yields an empty reply, the
/// way Redis does.
pub async fn info(
    server: &Arc<RwLock<RedisServer>>,
    replicas: &Arc<ReplicaManager>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    if let Some(section) = arguments.first() {
        if !section.eq_ignore_ascii_case("replication") {
            return Ok(CommandResult::Response(
                RespValue::BulkString(String::new()).encode(),
            ));
        }
    }

    let server_guard = server.read().await;

    let mut lines = vec![
        "# Replication".to_string(),
        format!("role:{}", server_guard.role.as_string()),
    ];

    if server_guard.role == RedisRole::Master {
        lines.push(format!("connected_slaves:{}", replicas.replica_count().await));
    }

    lines.push(format!("master_replid:{}", server_guard.repl_id));
    lines.push(format!(
        "master_repl_offset:{}",
        replicas.master_offset().await
    ));

    let mut body = lines.join("\r\n");
    body.push_str("\r\n");

    Ok(CommandResult::Response(RespValue::BulkString(body).encode()))
}
