//! Command Dispatcher
//!
//! Every supported command has one row in a static table: its name, how many
//! arguments it accepts, and the function that runs it. Dispatch is a lookup
//! (ASCII case-insensitive), an arity check, then the call.
//!
//! ## Supported Commands
//!
//! | Command | Arguments | Reply |
//! |---------|-----------|-------|
//! | `PING [message]` | 0..1 | `+PONG` or bulk echo |
//! | `ECHO message` | 1 | bulk |
//! | `SET key value [PX ms \| EX s]` | 2..4 | `+OK` |
//! | `GET key` | 1 | bulk or null |
//! | `KEYS pattern` | 1 | array of bulk (only `*` matches) |
//! | `CONFIG GET param [param ...]` | 2.. | flat name/value array |
//! | `DEL key [key ...]` | 1.. | integer removed |
//! | `EXISTS key [key ...]` | 1.. | integer present |
//! | `DBSIZE` | 0 | integer |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Dispatcher                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │   lookup    │───>│ arity check │───>│  cmd_*()    │     │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘     │
//! │                                               │             │
//! │                           ┌───────────────────┴──────┐      │
//! │                           ▼                          ▼      │
//! │                    StorageEngine              ServerConfig  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::commands::error::CommandError;
use crate::config::ServerConfig;
use crate::protocol::{Command, RespValue};
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

pub type CommandResult = Result<RespValue, CommandError>;

type HandlerFn = fn(&Dispatcher, &[Bytes]) -> CommandResult;

/// One row of the command table. Argument counts exclude the command name.
#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` means unbounded
    pub max_args: Option<usize>,
    handler: HandlerFn,
}

impl CommandSpec {
    fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.is_none_or(|max| count <= max)
    }
}

static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "ping",
        min_args: 0,
        max_args: Some(1),
        handler: Dispatcher::cmd_ping,
    },
    CommandSpec {
        name: "echo",
        min_args: 1,
        max_args: Some(1),
        handler: Dispatcher::cmd_echo,
    },
    CommandSpec {
        name: "set",
        min_args: 2,
        max_args: Some(4),
        handler: Dispatcher::cmd_set,
    },
    CommandSpec {
        name: "get",
        min_args: 1,
        max_args: Some(1),
        handler: Dispatcher::cmd_get,
    },
    CommandSpec {
        name: "keys",
        min_args: 1,
        max_args: Some(1),
        handler: Dispatcher::cmd_keys,
    },
    CommandSpec {
        name: "config",
        min_args: 2,
        max_args: None,
        handler: Dispatcher::cmd_config,
    },
    CommandSpec {
        name: "del",
        min_args: 1,
        max_args: None,
        handler: Dispatcher::cmd_del,
    },
    CommandSpec {
        name: "exists",
        min_args: 1,
        max_args: None,
        handler: Dispatcher::cmd_exists,
    },
    CommandSpec {
        name: "dbsize",
        min_args: 0,
        max_args: Some(0),
        handler: Dispatcher::cmd_dbsize,
    },
];

/// Routes decoded commands to their handlers.
///
/// Cheap to clone; every connection holds its own copy sharing one store.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    storage: Arc<StorageEngine>,
    config: Arc<ServerConfig>,
}

impl Dispatcher {
    pub fn new(storage: Arc<StorageEngine>, config: Arc<ServerConfig>) -> Self {
        Self { storage, config }
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// The full command table.
    pub fn commands() -> &'static [CommandSpec] {
        COMMANDS
    }

    /// Executes a command and returns the reply, errors included.
    pub fn dispatch(&self, command: &Command) -> RespValue {
        self.try_dispatch(command).unwrap_or_else(RespValue::from)
    }

    /// Executes a command, keeping dispatch errors typed.
    pub fn try_dispatch(&self, command: &Command) -> CommandResult {
        let spec = COMMANDS
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(command.name()))
            .ok_or_else(|| CommandError::UnknownCommand(one_line(command.name())))?;

        let args = command.args();
        if !spec.accepts(args.len()) {
            return Err(CommandError::WrongArity(spec.name.to_string()));
        }

        trace!(command = spec.name, args = args.len(), "Dispatching");
        (spec.handler)(self, args)
    }

    // ========================================================================
    // Helper functions
    // ========================================================================

    /// Parses a decimal integer argument.
    fn parse_integer(arg: &Bytes) -> Result<i64, CommandError> {
        std::str::from_utf8(arg)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(CommandError::NotAnInteger)
    }

    /// Parses a strictly positive expiry amount.
    fn parse_expire(arg: &Bytes) -> Result<u64, CommandError> {
        match Self::parse_integer(arg)? {
            n if n > 0 => Ok(n as u64),
            _ => Err(CommandError::InvalidExpireTime),
        }
    }

    // ========================================================================
    // Key Commands
    // ========================================================================

    /// SET key value [PX milliseconds | EX seconds]
    fn cmd_set(&self, args: &[Bytes]) -> CommandResult {
        let key = args[0].clone();
        let value = args[1].clone();

        let ttl = match &args[2..] {
            [] => None,
            [opt, amount] if opt.eq_ignore_ascii_case(b"PX") => {
                Some(Duration::from_millis(Self::parse_expire(amount)?))
            }
            [opt, amount] if opt.eq_ignore_ascii_case(b"EX") => {
                Some(Duration::from_secs(Self::parse_expire(amount)?))
            }
            _ => return Err(CommandError::Syntax),
        };

        self.storage.set(key, value, ttl);
        Ok(RespValue::ok())
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> CommandResult {
        Ok(match self.storage.get(&args[0]) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        })
    }

    /// DEL key [key ...]
    fn cmd_del(&self, args: &[Bytes]) -> CommandResult {
        let removed = args.iter().filter(|key| self.storage.delete(key)).count();
        Ok(RespValue::integer(removed as i64))
    }

    /// EXISTS key [key ...]
    ///
    /// A key named twice counts twice.
    fn cmd_exists(&self, args: &[Bytes]) -> CommandResult {
        let present = args.iter().filter(|key| self.storage.exists(key)).count();
        Ok(RespValue::integer(present as i64))
    }

    /// KEYS pattern
    fn cmd_keys(&self, args: &[Bytes]) -> CommandResult {
        let pattern = String::from_utf8_lossy(&args[0]);
        let keys = self
            .storage
            .keys(&pattern)
            .into_iter()
            .map(RespValue::bulk_string)
            .collect();
        Ok(RespValue::array(keys))
    }

    // ========================================================================
    // Server Commands
    // ========================================================================

    /// PING [message]
    fn cmd_ping(&self, args: &[Bytes]) -> CommandResult {
        Ok(match args.first() {
            Some(message) => RespValue::bulk_string(message.clone()),
            None => RespValue::pong(),
        })
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Bytes]) -> CommandResult {
        Ok(RespValue::bulk_string(args[0].clone()))
    }

    /// CONFIG GET parameter [parameter ...]
    fn cmd_config(&self, args: &[Bytes]) -> CommandResult {
        if !args[0].eq_ignore_ascii_case(b"GET") {
            return Err(CommandError::UnknownSubcommand(one_line(
                &String::from_utf8_lossy(&args[0]),
            )));
        }

        let mut reply: Vec<RespValue> = Vec::new();
        for param in &args[1..] {
            let param = String::from_utf8_lossy(param);
            if let Some((name, value)) = self.config.get(&param) {
                // Skip a parameter already listed by an earlier argument
                let name = RespValue::bulk_string(name);
                if !reply.chunks(2).any(|pair| pair[0] == name) {
                    reply.push(name);
                    reply.push(RespValue::bulk_string(value.to_string()));
                }
            }
        }
        Ok(RespValue::array(reply))
    }

    /// DBSIZE
    fn cmd_dbsize(&self, _args: &[Bytes]) -> CommandResult {
        Ok(RespValue::integer(self.storage.len() as i64))
    }
}

/// Client text echoed inside an error reply, with CR and LF flattened to spaces.
fn one_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_dispatcher() -> Dispatcher {
        create_dispatcher_with(ServerConfig::default())
    }

    fn create_dispatcher_with(config: ServerConfig) -> Dispatcher {
        Dispatcher::new(Arc::new(StorageEngine::new()), Arc::new(config))
    }

    fn make_command(args: &[&str]) -> Command {
        Command::new(
            args[0],
            args[1..]
                .iter()
                .map(|s| Bytes::from(s.to_string()))
                .collect(),
        )
    }

    fn bulk(s: &str) -> RespValue {
        RespValue::bulk_string(Bytes::from(s.to_string()))
    }

    #[test]
    fn test_ping() {
        let dispatcher = create_dispatcher();

        let response = dispatcher.dispatch(&make_command(&["PING"]));
        assert_eq!(response.serialize(), b"+PONG\r\n");

        let response = dispatcher.dispatch(&make_command(&["PING", "hello"]));
        assert_eq!(response, bulk("hello"));
    }

    #[test]
    fn test_echo() {
        let dispatcher = create_dispatcher();

        let response = dispatcher.dispatch(&make_command(&["ECHO", "hello"]));
        assert_eq!(response.serialize(), b"$5\r\nhello\r\n");
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let dispatcher = create_dispatcher();

        assert_eq!(dispatcher.dispatch(&make_command(&["ping"])), RespValue::pong());
        assert_eq!(dispatcher.dispatch(&make_command(&["PiNg"])), RespValue::pong());
        assert_eq!(
            dispatcher.dispatch(&make_command(&["set", "k", "v", "px", "1000"])),
            RespValue::ok()
        );
    }

    #[test]
    fn test_set_get() {
        let dispatcher = create_dispatcher();

        let response = dispatcher.dispatch(&make_command(&["SET", "a", "1"]));
        assert_eq!(response, RespValue::ok());

        let response = dispatcher.dispatch(&make_command(&["GET", "a"]));
        assert_eq!(response, bulk("1"));
    }

    #[test]
    fn test_get_nonexistent() {
        let dispatcher = create_dispatcher();

        let response = dispatcher.dispatch(&make_command(&["GET", "nonexistent"]));
        assert_eq!(response.serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_set_overwrites() {
        let dispatcher = create_dispatcher();

        dispatcher.dispatch(&make_command(&["SET", "a", "1", "PX", "50"]));
        dispatcher.dispatch(&make_command(&["SET", "a", "2"]));
        std::thread::sleep(Duration::from_millis(80));

        // The second SET dropped the deadline along with the old value
        let response = dispatcher.dispatch(&make_command(&["GET", "a"]));
        assert_eq!(response, bulk("2"));
    }

    #[test]
    fn test_set_px_expires() {
        let dispatcher = create_dispatcher();

        dispatcher.dispatch(&make_command(&["SET", "a", "1", "PX", "50"]));
        assert_eq!(dispatcher.dispatch(&make_command(&["GET", "a"])), bulk("1"));

        std::thread::sleep(Duration::from_millis(80));

        let response = dispatcher.dispatch(&make_command(&["GET", "a"]));
        assert_eq!(response, RespValue::null());

        let response = dispatcher.dispatch(&make_command(&["KEYS", "*"]));
        assert_eq!(response, RespValue::array(vec![]));
    }

    #[test]
    fn test_set_ex() {
        let dispatcher = create_dispatcher();

        let response = dispatcher.dispatch(&make_command(&["SET", "a", "1", "EX", "100"]));
        assert_eq!(response, RespValue::ok());
        assert_eq!(dispatcher.dispatch(&make_command(&["GET", "a"])), bulk("1"));
    }

    #[test]
    fn test_set_option_errors() {
        let dispatcher = create_dispatcher();

        assert_eq!(
            dispatcher.try_dispatch(&make_command(&["SET", "a", "1", "PX", "soon"])),
            Err(CommandError::NotAnInteger)
        );
        assert_eq!(
            dispatcher.try_dispatch(&make_command(&["SET", "a", "1", "PX", "0"])),
            Err(CommandError::InvalidExpireTime)
        );
        assert_eq!(
            dispatcher.try_dispatch(&make_command(&["SET", "a", "1", "EX", "-5"])),
            Err(CommandError::InvalidExpireTime)
        );
        assert_eq!(
            dispatcher.try_dispatch(&make_command(&["SET", "a", "1", "PX"])),
            Err(CommandError::Syntax)
        );
        assert_eq!(
            dispatcher.try_dispatch(&make_command(&["SET", "a", "1", "NX", "1"])),
            Err(CommandError::Syntax)
        );

        // Nothing was stored by the failed attempts
        assert_eq!(dispatcher.dispatch(&make_command(&["GET", "a"])), RespValue::null());
    }

    #[test]
    fn test_binary_safe_values() {
        let dispatcher = create_dispatcher();
        let value = Bytes::from_static(b"\x00\r\n\xff");

        dispatcher.dispatch(&Command::new(
            "SET",
            vec![Bytes::from("bin"), value.clone()],
        ));
        let response = dispatcher.dispatch(&make_command(&["GET", "bin"]));
        assert_eq!(response, RespValue::bulk_string(value));
    }

    #[test]
    fn test_keys() {
        let dispatcher = create_dispatcher();

        dispatcher.dispatch(&make_command(&["SET", "k1", "v1"]));
        dispatcher.dispatch(&make_command(&["SET", "k2", "v2"]));

        let mut keys = match dispatcher.dispatch(&make_command(&["KEYS", "*"])) {
            RespValue::Array(keys) => keys,
            other => panic!("expected array, got {:?}", other),
        };
        keys.sort_by_key(|k| format!("{:?}", k));
        assert_eq!(keys, vec![bulk("k1"), bulk("k2")]);

        let response = dispatcher.dispatch(&make_command(&["KEYS", "k*"]));
        assert_eq!(response, RespValue::array(vec![]));
    }

    #[test]
    fn test_config_get() {
        let dispatcher = create_dispatcher_with(ServerConfig::new(
            Some("/tmp/redis-files".into()),
            Some("dump.rdb".into()),
        ));

        let response = dispatcher.dispatch(&make_command(&["CONFIG", "GET", "dir"]));
        assert_eq!(
            response.serialize(),
            b"*2\r\n$3\r\ndir\r\n$16\r\n/tmp/redis-files\r\n"
        );

        let response = dispatcher.dispatch(&make_command(&["config", "get", "DBFILENAME"]));
        assert_eq!(
            response,
            RespValue::array(vec![bulk("dbfilename"), bulk("dump.rdb")])
        );

        let response =
            dispatcher.dispatch(&make_command(&["CONFIG", "GET", "dir", "maxmemory", "dir"]));
        assert_eq!(
            response,
            RespValue::array(vec![bulk("dir"), bulk("/tmp/redis-files")])
        );
    }

    #[test]
    fn test_config_get_unconfigured() {
        let dispatcher = create_dispatcher();

        let response = dispatcher.dispatch(&make_command(&["CONFIG", "GET", "dir"]));
        assert_eq!(response.serialize(), b"*0\r\n");
    }

    #[test]
    fn test_config_errors() {
        let dispatcher = create_dispatcher();

        assert_eq!(
            dispatcher.try_dispatch(&make_command(&["CONFIG", "SET", "dir"])),
            Err(CommandError::UnknownSubcommand("SET".into()))
        );
        assert_eq!(
            dispatcher.try_dispatch(&make_command(&["CONFIG", "GET"])),
            Err(CommandError::WrongArity("config".into()))
        );
    }

    #[test]
    fn test_del() {
        let dispatcher = create_dispatcher();

        dispatcher.dispatch(&make_command(&["SET", "key1", "value1"]));
        dispatcher.dispatch(&make_command(&["SET", "key2", "value2"]));

        let response = dispatcher.dispatch(&make_command(&["DEL", "key1", "key2", "key3"]));
        assert_eq!(response, RespValue::integer(2));

        let response = dispatcher.dispatch(&make_command(&["DEL", "key1"]));
        assert_eq!(response, RespValue::integer(0));
    }

    #[test]
    fn test_exists() {
        let dispatcher = create_dispatcher();

        dispatcher.dispatch(&make_command(&["SET", "key1", "value1"]));

        let response = dispatcher.dispatch(&make_command(&["EXISTS", "key1"]));
        assert_eq!(response, RespValue::integer(1));

        let response = dispatcher.dispatch(&make_command(&["EXISTS", "key1", "key1", "nope"]));
        assert_eq!(response, RespValue::integer(2));
    }

    #[test]
    fn test_dbsize() {
        let dispatcher = create_dispatcher();

        let response = dispatcher.dispatch(&make_command(&["DBSIZE"]));
        assert_eq!(response, RespValue::integer(0));

        dispatcher.dispatch(&make_command(&["SET", "key1", "value1"]));
        dispatcher.dispatch(&make_command(&["SET", "key2", "value2"]));

        let response = dispatcher.dispatch(&make_command(&["DBSIZE"]));
        assert_eq!(response, RespValue::integer(2));
    }

    #[test]
    fn test_unknown_command() {
        let dispatcher = create_dispatcher();

        let response = dispatcher.dispatch(&make_command(&["FLUSHALL"]));
        assert_eq!(
            response.serialize(),
            b"-ERR unknown command 'FLUSHALL'\r\n"
        );
    }

    #[test]
    fn test_client_text_in_errors_stays_on_one_line() {
        let dispatcher = create_dispatcher();

        let response = dispatcher.dispatch(&make_command(&["X\r\n+OK"]));
        assert_eq!(response.serialize(), b"-ERR unknown command 'X  +OK'\r\n");

        let response = dispatcher.dispatch(&make_command(&["CONFIG", "A\r\n:1", "x"]));
        assert_eq!(
            response,
            RespValue::error("ERR unknown subcommand 'A  :1'")
        );
        let wire = response.serialize();
        assert_eq!(wire.windows(2).filter(|w| *w == b"\r\n").count(), 1);
    }

    #[test]
    fn test_wrong_arity() {
        let dispatcher = create_dispatcher();

        let cases: &[&[&str]] = &[
            &["GET"],
            &["GET", "a", "b"],
            &["ECHO"],
            &["PING", "a", "b"],
            &["SET", "a"],
            &["SET", "a", "1", "PX", "10", "extra"],
            &["DBSIZE", "x"],
            &["DEL"],
        ];
        for args in cases {
            let err = dispatcher.try_dispatch(&make_command(args)).unwrap_err();
            assert_eq!(
                err,
                CommandError::WrongArity(args[0].to_ascii_lowercase()),
                "{:?}",
                args
            );
        }

        let response = dispatcher.dispatch(&make_command(&["get"]));
        assert_eq!(
            response,
            RespValue::error("ERR wrong number of arguments for 'get' command")
        );
    }

    #[test]
    fn test_command_table_is_consistent() {
        for (i, spec) in Dispatcher::commands().iter().enumerate() {
            assert_eq!(spec.name, spec.name.to_ascii_lowercase());
            assert!(spec.max_args.is_none_or(|max| max >= spec.min_args));
            assert!(Dispatcher::commands()[..i]
                .iter()
                .all(|other| other.name != spec.name));
        }
    }
}
