use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    commands::{CommandError, CommandHandler, lookup_command},
    resp::RespValue,
    state::State,
};

/// What the connection should do with a dispatched command.
#[derive(Debug, PartialEq)]
pub enum DispatchResult {
    /// Already settled (MULTI/DISCARD acknowledgments, QUEUED, EXEC of
    /// an empty queue).
    ImmediateResponse(String),
    /// Execute now.
    ExecuteSingleCommand(CommandHandler),
    /// Run the queued transaction in order and answer with one array.
    ExecuteTransactionCommands(Vec<CommandHandler>),
}

/// Per-connection command router: owns the Normal/Queuing state machine
/// of MULTI transactions.
pub struct CommandDispatcher {
    client_address: String,
    state: Arc<Mutex<State>>,
}

impl CommandDispatcher {
    pub fn new(client_address: &str, state: Arc<Mutex<State>>) -> Self {
        CommandDispatcher {
            client_address: client_address.to_string(),
            state,
        }
    }

    /// Routes one parsed command through the transaction rules.
    ///
    /// In Queuing mode every non-control command is validated and
    /// queued; a command that fails validation poisons the queue so the
    /// following EXEC aborts. Control commands themselves are never
    /// queued.
    pub async fn dispatch_command(
        &self,
        command: CommandHandler,
    ) -> Result<DispatchResult, CommandError> {
        let is_control =
            lookup_command(&command.name).is_some_and(|spec| spec.is_transaction_control);

        if !is_control {
            let mut state_guard = self.state.lock().await;

            if !state_guard.in_transaction(&self.client_address) {
                drop(state_guard);
                command.validate()?;

                return Ok(DispatchResult::ExecuteSingleCommand(command));
            }

            if let Err(error) = command.validate() {
                state_guard.poison_transaction(&self.client_address);

                return Err(error);
            }

            state_guard
                .queue_command(&self.client_address, command)
                .map_err(|_| CommandError::ExecWithoutMulti)?;

            return Ok(DispatchResult::ImmediateResponse(
                RespValue::SimpleString("QUEUED".to_string()).encode(),
            ));
        }

        match command.name.as_str() {
            "MULTI" => {
                command.validate()?;

                let mut state_guard = self.state.lock().await;
                state_guard
                    .start_transaction(&self.client_address)
                    .map_err(|_| CommandError::MultiNested)?;

                Ok(DispatchResult::ImmediateResponse(
                    RespValue::SimpleString("OK".to_string()).encode(),
                ))
            }
            "EXEC" => {
                command.validate()?;

                let mut state_guard = self.state.lock().await;
                let transaction = state_guard
                    .take_transaction(&self.client_address)
                    .map_err(|_| CommandError::ExecWithoutMulti)?;

                if transaction.poisoned {
                    return Err(CommandError::ExecAborted);
                }

                if transaction.queued.is_empty() {
                    return Ok(DispatchResult::ImmediateResponse(
                        RespValue::Array(Vec::new()).encode(),
                    ));
                }

                Ok(DispatchResult::ExecuteTransactionCommands(transaction.queued))
            }
            "DISCARD" => {
                command.validate()?;

                let mut state_guard = self.state.lock().await;
                state_guard
                    .take_transaction(&self.client_address)
                    .map_err(|_| CommandError::DiscardWithoutMulti)?;

                Ok(DispatchResult::ImmediateResponse(
                    RespValue::SimpleString("OK".to_string()).encode(),
                ))
            }
            _ => Err(CommandError::UnknownCommand(command.name.to_lowercase())),
        }
    }
}
