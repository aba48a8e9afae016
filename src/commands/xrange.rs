use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    commands::{
        command_error::CommandError,
        command_handler::CommandResult,
        stream_utils::{encode_entries, parse_range_end, parse_range_start},
    },
    key_value_store::{DataType, KeyValueStore, StreamId},
    resp::RespValue,
};

struct XrangeArguments {
    key: String,
    start: StreamId,
    end: StreamId,
}

impl XrangeArguments {
    fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 3 {
            return Err(CommandError::WrongNumberOfArguments("xrange".to_string()));
        }

        Ok(Self {
            key: arguments[0].clone(),
            start: parse_range_start(&arguments[1])?,
            end: parse_range_end(&arguments[2])?,
        })
    }
}

/// Handles the Redis XRANGE command. Both bounds are inclusive; `-` and
/// `+` are the open ends.
pub async fn xrange(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let xrange_arguments = XrangeArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;

    let response = match store_guard.get(&xrange_arguments.key) {
        Some(value) => {
            let DataType::Stream(ref stream) = value.data else {
                return Err(CommandError::WrongType);
            };

            encode_entries(stream.range(xrange_arguments.start, xrange_arguments.end))
        }
        None => RespValue::Array(vec![]),
    };

    Ok(CommandResult::Response(response.encode()))
}
