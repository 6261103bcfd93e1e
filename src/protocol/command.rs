//! Command Decoding
//!
//! Turns a complete [`Frame`] into a [`Command`]: a name plus its ordered,
//! binary-safe arguments. The name is kept exactly as the client sent it;
//! the dispatcher compares it case-insensitively.

use crate::protocol::parser::{Frame, ProtocolError, ProtocolResult};
use crate::protocol::types::RespValue;
use bytes::Bytes;

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<Bytes>,
}

impl Command {
    /// Builds a command from a name and its arguments.
    pub fn new(name: impl Into<String>, args: Vec<Bytes>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Decodes a complete frame.
    ///
    /// Fails with [`ProtocolError::EmptyCommand`] for a zero-argument frame and
    /// [`ProtocolError::InvalidUtf8`] if the name is not UTF-8. Arguments are
    /// passed through untouched.
    ///
    /// # Example
    ///
    /// ```
    /// use emberkv::protocol::Command;
    /// use bytes::Bytes;
    ///
    /// let frame = vec![Bytes::from("get"), Bytes::from("user:1")];
    /// let cmd = Command::from_frame(frame).unwrap();
    /// assert_eq!(cmd.name(), "get");
    /// assert_eq!(cmd.args(), &[Bytes::from("user:1")]);
    /// ```
    pub fn from_frame(frame: Frame) -> ProtocolResult<Self> {
        let mut parts = frame.into_iter();
        let name = parts.next().ok_or(ProtocolError::EmptyCommand)?;
        let name = String::from_utf8(name.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)?;

        Ok(Self {
            name,
            args: parts.collect(),
        })
    }

    /// The command name, case preserved.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments after the name.
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Returns the request frame for this command (name first).
    pub fn to_frame(&self) -> Frame {
        std::iter::once(Bytes::from(self.name.clone()))
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Encodes the command in request wire form: an array of bulk strings.
    pub fn encode(&self) -> Vec<u8> {
        let parts = self
            .to_frame()
            .into_iter()
            .map(RespValue::BulkString)
            .collect();
        RespValue::array(parts).serialize()
    }
}
