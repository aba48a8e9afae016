mod blpop;
mod command_dispatcher;
mod command_error;
mod command_handler;
mod echo;
mod get;
mod incr;
mod info;
mod keys;
mod llen;
mod lpop;
mod lrange;
mod ping;
mod replication;
mod rpush_and_lpush;
mod set;
mod stream_utils;
mod type_command;
mod xadd;
mod xinfo;
mod xrange;
mod xread;

pub use command_dispatcher::{CommandDispatcher, DispatchResult};
pub use command_error::CommandError;
pub use command_handler::{CommandHandler, CommandResult, CommandSpec, lookup_command};
