use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    resp::RespValue,
};

pub fn echo(arguments: Vec<String>) -> Result<CommandResult, CommandError> {
    let message = arguments
        .into_iter()
        .next()
        .ok_or_else(|| CommandError::WrongNumberOfArguments("echo".to_string()))?;

    Ok(CommandResult::Response(
        RespValue::BulkString(message).encode(),
    ))
}
