use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    clock,
    commands::{
        command_error::CommandError,
        command_handler::CommandResult,
        stream_utils::{EntryIdSpec, parse_entry_id},
    },
    key_value_store::{DataType, KeyValueStore, Stream, StreamId, Value},
    resp::RespValue,
    state::State,
};

struct XaddArguments {
    key: String,
    id_spec: EntryIdSpec,
    /// Flat `field value field value ...` tail, kept for propagation.
    field_arguments: Vec<String>,
}

impl XaddArguments {
    fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() < 4 || arguments[2..].len() % 2 != 0 {
            return Err(CommandError::WrongNumberOfArguments("xadd".to_string()));
        }

        let id_spec = parse_entry_id(&arguments[1])?;

        Ok(Self {
            key: arguments[0].clone(),
            id_spec,
            field_arguments: arguments[2..].to_vec(),
        })
    }

    fn fields(&self) -> Vec<(String, String)> {
        self.field_arguments
            .chunks(2)
            .map(|chunk| (chunk[0].clone(), chunk[1].clone()))
            .collect()
    }
}

/// Handles the Redis XADD command.
///
/// The id argument is a literal `ms-seq`, `ms-*` for a server-picked
/// sequence, or `*` for a wall-clock id. Whatever the form, the
/// resulting id must be strictly greater than the stream's last id;
/// violations leave the stream untouched. Replicas receive the resolved
/// id, never `*`, so masters and replicas agree on entry ids.
pub async fn xadd(
    store: &Arc<Mutex<KeyValueStore>>,
    state: &Arc<Mutex<State>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let xadd_arguments = XaddArguments::parse(arguments)?;

    let resolved_id;

    {
        let mut store_guard = store.lock().await;

        match store_guard.get_mut(&xadd_arguments.key) {
            Some(value) => {
                let DataType::Stream(ref mut stream) = value.data else {
                    return Err(CommandError::WrongType);
                };

                resolved_id = resolve_entry_id(&xadd_arguments.id_spec, stream)?;

                if !stream.append(resolved_id, xadd_arguments.fields()) {
                    return Err(CommandError::StreamIdTooSmall);
                }
            }
            None => {
                let mut stream = Stream::new();
                resolved_id = resolve_entry_id(&xadd_arguments.id_spec, &stream)?;

                if !stream.append(resolved_id, xadd_arguments.fields()) {
                    return Err(CommandError::StreamIdTooSmall);
                }

                store_guard.insert(
                    xadd_arguments.key.clone(),
                    Value {
                        data: DataType::Stream(stream),
                        expiration: None,
                    },
                );
            }
        }
    }

    {
        let mut state_guard = state.lock().await;
        state_guard.notify_stream_key(&xadd_arguments.key);
    }

    let mut propagate_parts = vec![
        "XADD".to_string(),
        xadd_arguments.key.clone(),
        resolved_id.to_string(),
    ];
    propagate_parts.extend(xadd_arguments.field_arguments.iter().cloned());

    Ok(CommandResult::Write {
        response: RespValue::BulkString(resolved_id.to_string()).encode(),
        propagate: RespValue::command_frame(&propagate_parts),
    })
}

fn resolve_entry_id(id_spec: &EntryIdSpec, stream: &Stream) -> Result<StreamId, CommandError> {
    match id_spec {
        EntryIdSpec::Explicit(id) => {
            if *id == StreamId::ZERO {
                return Err(CommandError::StreamIdZero);
            }

            Ok(*id)
        }
        EntryIdSpec::AutoSequence(ms) => {
            let seq = stream
                .next_sequence_for(*ms)
                .ok_or(CommandError::StreamIdTooSmall)?;

            Ok(StreamId::new(*ms, seq))
        }
        EntryIdSpec::Auto => {
            let wall_ms = clock::unix_ms();
            let last = stream.last_id();

            if wall_ms > last.ms {
                return Ok(StreamId::new(wall_ms, 0));
            }

            let seq = last.seq.checked_add(1).ok_or(CommandError::StreamIdTooSmall)?;

            Ok(StreamId::new(last.ms, seq))
        }
    }
}
