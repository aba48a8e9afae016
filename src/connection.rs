//! Per-connection tasks: the client read/dispatch/reply loop (with
//! replica promotion on PSYNC) and the replica-side loop that applies a
//! master's propagated command stream.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpStream, tcp::OwnedWriteHalf},
    sync::{Mutex, RwLock},
};

use crate::{
    commands::{
        CommandDispatcher, CommandError, CommandHandler, CommandResult, DispatchResult,
        lookup_command,
    },
    key_value_store::KeyValueStore,
    replication::{ReplicaManager, empty_rdb_frame},
    resp::RespValue,
    server::{RedisRole, RedisServer},
    state::State,
};

/// Serves one client connection until it closes or a protocol error
/// forces a shutdown.
pub async fn handle_client_connection(
    stream: TcpStream,
    server: Arc<RwLock<RedisServer>>,
    replicas: Arc<ReplicaManager>,
    client_address: String,
    store: Arc<Mutex<KeyValueStore>>,
    state: Arc<Mutex<State>>,
) {
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(RwLock::new(writer));
    let mut buffer = BytesMut::with_capacity(4096);
    let mut is_replica_connection = false;

    'connection: loop {
        loop {
            let frame = match RespValue::parse(&mut buffer) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(error) => {
                    // Best-effort error reply, then drop the connection:
                    // the byte stream can no longer be trusted.
                    let _ = write_to_stream(&writer, error.as_string().as_bytes()).await;
                    break 'connection;
                }
            };

            let handled = handle_frame(
                frame,
                &server,
                &replicas,
                &client_address,
                &store,
                &state,
                &writer,
                &mut is_replica_connection,
            )
            .await;

            if handled.is_err() {
                break 'connection;
            }
        }

        match reader.read_buf(&mut buffer).await {
            Ok(0) => break,
            Ok(_) => (),
            Err(_) => break,
        }
    }

    {
        let mut state_guard = state.lock().await;
        state_guard.remove_connection(&client_address);
    }

    if is_replica_connection {
        replicas.remove(&client_address).await;
    }
}

/// Connection-fatal I/O failure while replying.
struct ConnectionClosed;

#[allow(clippy::too_many_arguments)]
async fn handle_frame(
    frame: RespValue,
    server: &Arc<RwLock<RedisServer>>,
    replicas: &Arc<ReplicaManager>,
    client_address: &str,
    store: &Arc<Mutex<KeyValueStore>>,
    state: &Arc<Mutex<State>>,
    writer: &Arc<RwLock<OwnedWriteHalf>>,
    is_replica_connection: &mut bool,
) -> Result<(), ConnectionClosed> {
    let command_handler = match CommandHandler::new(&frame) {
        Ok(handler) => handler,
        Err(error) => {
            return write_to_stream(writer, error.as_string().as_bytes()).await;
        }
    };

    if write_forbidden_on_replica(server, &command_handler).await {
        return write_to_stream(
            writer,
            CommandError::ReadOnlyReplica.as_string().as_bytes(),
        )
        .await;
    }

    let dispatch_result = match CommandDispatcher::new(client_address, Arc::clone(state))
        .dispatch_command(command_handler)
        .await
    {
        Ok(result) => result,
        Err(error) => {
            return write_to_stream(writer, error.as_string().as_bytes()).await;
        }
    };

    match dispatch_result {
        DispatchResult::ImmediateResponse(response) => {
            write_to_stream(writer, response.as_bytes()).await
        }
        DispatchResult::ExecuteSingleCommand(command) => {
            let result = command
                .handle_command(server, replicas, client_address, store, state)
                .await;

            settle_command_result(
                result,
                replicas,
                client_address,
                writer,
                is_replica_connection,
            )
            .await
        }
        DispatchResult::ExecuteTransactionCommands(commands) => {
            let mut response = format!("*{}\r\n", commands.len());

            for command in commands {
                let result = command
                    .handle_command(server, replicas, client_address, store, state)
                    .await;

                match result {
                    Ok(CommandResult::Response(reply)) => response.push_str(&reply),
                    Ok(CommandResult::Write { response: reply, propagate }) => {
                        response.push_str(&reply);
                        replicas.propagate(&propagate).await;
                    }
                    Ok(CommandResult::FullResync { response: reply }) => {
                        response.push_str(&reply);
                    }
                    Ok(CommandResult::NoResponse) => {
                        response.push_str(&RespValue::NullBulkString.encode());
                    }
                    Err(error) => response.push_str(&error.as_string()),
                }
            }

            write_to_stream(writer, response.as_bytes()).await
        }
    }
}

async fn settle_command_result(
    result: Result<CommandResult, CommandError>,
    replicas: &Arc<ReplicaManager>,
    client_address: &str,
    writer: &Arc<RwLock<OwnedWriteHalf>>,
    is_replica_connection: &mut bool,
) -> Result<(), ConnectionClosed> {
    match result {
        Ok(CommandResult::Response(response)) => {
            write_to_stream(writer, response.as_bytes()).await
        }
        Ok(CommandResult::Write { response, propagate }) => {
            write_to_stream(writer, response.as_bytes()).await?;
            replicas.propagate(&propagate).await;

            Ok(())
        }
        Ok(CommandResult::FullResync { response }) => {
            write_to_stream(writer, response.as_bytes()).await?;
            write_to_stream(writer, &empty_rdb_frame()).await?;

            replicas.register(client_address, Arc::clone(writer)).await;
            *is_replica_connection = true;

            Ok(())
        }
        Ok(CommandResult::NoResponse) => Ok(()),
        Err(error) => write_to_stream(writer, error.as_string().as_bytes()).await,
    }
}

async fn write_forbidden_on_replica(
    server: &Arc<RwLock<RedisServer>>,
    command_handler: &CommandHandler,
) -> bool {
    let is_write = lookup_command(&command_handler.name).is_some_and(|spec| spec.is_write);

    if !is_write {
        return false;
    }

    let server_guard = server.read().await;
    matches!(server_guard.role, RedisRole::Replica(_))
}

async fn write_to_stream(
    writer: &Arc<RwLock<OwnedWriteHalf>>,
    response: &[u8],
) -> Result<(), ConnectionClosed> {
    let mut writer_guard = writer.write().await;

    let result = async {
        writer_guard.write_all(response).await?;
        writer_guard.flush().await
    }
    .await;

    result.map_err(|_| ConnectionClosed)
}

/// Applies the master's propagated command stream on a replica.
///
/// Propagated writes are executed without replying; the only frames
/// answered on this connection are `REPLCONF GETACK *`, which report
/// the number of stream bytes processed before the probe arrived.
pub async fn handle_master_connection(
    master_address: &str,
    stream: TcpStream,
    leftover: BytesMut,
    server: Arc<RwLock<RedisServer>>,
    replicas: Arc<ReplicaManager>,
    store: Arc<Mutex<KeyValueStore>>,
    state: Arc<Mutex<State>>,
) {
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(RwLock::new(writer));
    let mut buffer = leftover;
    let mut processed_offset: u64 = 0;

    'feed: loop {
        loop {
            let length_before = buffer.len();

            let frame = match RespValue::parse(&mut buffer) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(error) => {
                    eprintln!("Protocol error on master connection: {}", error);
                    break 'feed;
                }
            };

            let frame_length = (length_before - buffer.len()) as u64;

            let Ok(command_handler) = CommandHandler::new(&frame) else {
                processed_offset += frame_length;
                continue;
            };

            if is_getack(&command_handler) {
                let ack = RespValue::command_frame(&[
                    "REPLCONF",
                    "ACK",
                    &processed_offset.to_string(),
                ]);

                if write_to_stream(&writer, ack.encode().as_bytes()).await.is_err() {
                    break 'feed;
                }

                processed_offset += frame_length;
                continue;
            }

            let _ = command_handler
                .handle_command(&server, &replicas, master_address, &store, &state)
                .await;

            processed_offset += frame_length;
        }

        match reader.read_buf(&mut buffer).await {
            Ok(0) => break,
            Ok(_) => (),
            Err(error) => {
                eprintln!("Lost connection to master: {}", error);
                break;
            }
        }
    }
}

fn is_getack(command_handler: &CommandHandler) -> bool {
    command_handler.name == "REPLCONF"
        && command_handler
            .arguments
            .first()
            .is_some_and(|subcommand| subcommand.eq_ignore_ascii_case("GETACK"))
}
