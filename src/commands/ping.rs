use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    resp::RespValue,
};

pub fn ping(arguments: Vec<String>) -> Result<CommandResult, CommandError> {
    let response = match arguments.into_iter().next() {
        Some(message) => RespValue::BulkString(message),
        None => RespValue::SimpleString("PONG".to_string()),
    };

    Ok(CommandResult::Response(response.encode()))
}
