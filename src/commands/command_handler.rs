use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::{
    commands::{
        blpop::blpop,
        command_error::CommandError,
        echo::echo,
        get::get,
        incr::incr,
        info::info,
        keys::keys,
        lpop::lpop,
        lrange::lrange,
        llen::llen,
        ping::ping,
        replication::{psync, replconf, wait},
        rpush_and_lpush::{lpush, rpush},
        set::set,
        type_command::type_command,
        xadd::xadd,
        xinfo::xinfo,
        xrange::xrange,
        xread::xread,
    },
    key_value_store::KeyValueStore,
    replication::ReplicaManager,
    resp::RespValue,
    server::RedisServer,
    state::State,
};

/// Outcome of executing one command on a connection.
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Encoded reply for the issuing client.
    Response(String),
    /// Reply plus the normalized frame to fan out to replicas.
    Write {
        response: String,
        propagate: RespValue,
    },
    /// PSYNC accepted: reply with the FULLRESYNC header, then the
    /// connection streams the RDB snapshot and registers the replica.
    FullResync { response: String },
    /// Nothing is written back (replica acknowledgments).
    NoResponse,
}

/// One entry of the command catalog.
#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: Option<usize>,
    pub is_write: bool,
    pub is_transaction_control: bool,
}

impl CommandSpec {
    fn accepts_arity(&self, argument_count: usize) -> bool {
        argument_count >= self.min_args
            && self.max_args.is_none_or(|max| argument_count <= max)
    }
}

const fn spec(
    name: &'static str,
    min_args: usize,
    max_args: Option<usize>,
    is_write: bool,
) -> CommandSpec {
    CommandSpec {
        name,
        min_args,
        max_args,
        is_write,
        is_transaction_control: false,
    }
}

const fn control(name: &'static str) -> CommandSpec {
    CommandSpec {
        name,
        min_args: 0,
        max_args: Some(0),
        is_write: false,
        is_transaction_control: true,
    }
}

/// Every command the server understands. Lookup is case-insensitive;
/// names are stored upper-case.
pub const COMMAND_CATALOG: &[CommandSpec] = &[
    spec("PING", 0, Some(1), false),
    spec("ECHO", 1, Some(1), false),
    spec("GET", 1, Some(1), false),
    spec("SET", 2, Some(4), true),
    spec("INCR", 1, Some(1), true),
    spec("RPUSH", 2, None, true),
    spec("LPUSH", 2, None, true),
    spec("LPOP", 1, Some(2), true),
    spec("LRANGE", 3, Some(3), false),
    spec("LLEN", 1, Some(1), false),
    spec("BLPOP", 2, None, true),
    spec("TYPE", 1, Some(1), false),
    spec("KEYS", 1, Some(1), false),
    spec("INFO", 0, Some(1), false),
    spec("XADD", 4, None, true),
    spec("XRANGE", 3, Some(3), false),
    spec("XREAD", 3, None, false),
    spec("XINFO", 2, Some(2), false),
    spec("REPLCONF", 1, None, false),
    spec("PSYNC", 2, Some(2), false),
    spec("WAIT", 2, Some(2), false),
    control("MULTI"),
    control("EXEC"),
    control("DISCARD"),
];

pub fn lookup_command(name: &str) -> Option<&'static CommandSpec> {
    COMMAND_CATALOG.iter().find(|entry| entry.name == name)
}

/// A command parsed out of a client frame: upper-cased name plus its
/// arguments as plain strings.
#[derive(Debug, PartialEq, Clone)]
pub struct CommandHandler {
    pub name: String,
    pub arguments: Vec<String>,
}

impl CommandHandler {
    /// Builds a handler from a RESP frame, which must be a non-empty
    /// array of bulk strings.
    pub fn new(input: &RespValue) -> Result<Self, CommandError> {
        let RespValue::Array(elements) = input else {
            return Err(CommandError::InvalidCommandFrame);
        };

        let name = match elements.first() {
            Some(RespValue::BulkString(name)) => name.to_uppercase(),
            _ => return Err(CommandError::InvalidCommandFrame),
        };

        let mut arguments = Vec::with_capacity(elements.len().saturating_sub(1));

        for element in &elements[1..] {
            let RespValue::BulkString(argument) = element else {
                return Err(CommandError::InvalidCommandFrame);
            };

            arguments.push(argument.clone());
        }

        Ok(Self { name, arguments })
    }

    /// Catalog lookup plus arity check, yielding the standard error
    /// replies for unknown names and bad argument counts.
    pub fn validate(&self) -> Result<&'static CommandSpec, CommandError> {
        let spec = lookup_command(&self.name)
            .ok_or_else(|| CommandError::UnknownCommand(self.name.to_lowercase()))?;

        if !spec.accepts_arity(self.arguments.len()) {
            return Err(CommandError::WrongNumberOfArguments(self.name.to_lowercase()));
        }

        Ok(spec)
    }

    /// Executes the command against the shared server state.
    ///
    /// MULTI/EXEC/DISCARD never reach this point; the dispatcher owns
    /// the transaction state machine.
    pub async fn handle_command(
        &self,
        server: &Arc<RwLock<RedisServer>>,
        replicas: &Arc<ReplicaManager>,
        client_address: &str,
        store: &Arc<Mutex<KeyValueStore>>,
        state: &Arc<Mutex<State>>,
    ) -> Result<CommandResult, CommandError> {
        match self.name.as_str() {
            "PING" => ping(self.arguments.clone()),
            "ECHO" => echo(self.arguments.clone()),
            "GET" => get(store, self.arguments.clone()).await,
            "SET" => set(store, self.arguments.clone()).await,
            "INCR" => incr(store, self.arguments.clone()).await,
            "RPUSH" => rpush(store, state, self.arguments.clone()).await,
            "LPUSH" => lpush(store, state, self.arguments.clone()).await,
            "LPOP" => lpop(store, self.arguments.clone()).await,
            "LRANGE" => lrange(store, self.arguments.clone()).await,
            "LLEN" => llen(store, self.arguments.clone()).await,
            "BLPOP" => blpop(store, state, self.arguments.clone()).await,
            "TYPE" => type_command(store, self.arguments.clone()).await,
            "KEYS" => keys(store, self.arguments.clone()).await,
            "INFO" => info(server, replicas, self.arguments.clone()).await,
            "XADD" => xadd(store, state, self.arguments.clone()).await,
            "XRANGE" => xrange(store, self.arguments.clone()).await,
            "XREAD" => xread(store, state, self.arguments.clone()).await,
            "XINFO" => xinfo(store, self.arguments.clone()).await,
            "REPLCONF" => replconf(replicas, client_address, self.arguments.clone()).await,
            "PSYNC" => psync(server, replicas, self.arguments.clone()).await,
            "WAIT" => wait(replicas, self.arguments.clone()).await,
            _ => Err(CommandError::UnknownCommand(self.name.to_lowercase())),
        }
    }
}
