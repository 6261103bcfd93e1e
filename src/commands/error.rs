//! Dispatch errors, each rendered to the client as a `-ERR ...` reply.

use crate::protocol::RespValue;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR invalid expire time in 'set' command")]
    InvalidExpireTime,

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR unknown subcommand '{0}'")]
    UnknownSubcommand(String),
}

impl From<CommandError> for RespValue {
    fn from(err: CommandError) -> Self {
        RespValue::error(err.to_string())
    }
}
