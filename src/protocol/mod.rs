//! RESP Protocol Implementation
//!
//! ## Modules
//!
//! - `parser`: [`FrameReader`], which reassembles request frames from a byte stream
//! - `command`: [`Command`], the decoded name + arguments of one frame
//! - `types`: [`RespValue`], the replies and their wire encoding
//!
//! ## Example
//!
//! ```
//! use emberkv::protocol::{Command, FrameReader, RespValue};
//! use bytes::Bytes;
//!
//! let mut reader = FrameReader::new();
//! reader.feed(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
//! let frame = reader.next_frame().unwrap().unwrap();
//! let command = Command::from_frame(frame).unwrap();
//! assert_eq!(command.name(), "GET");
//!
//! let reply = RespValue::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(reply.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod command;
pub mod parser;
pub mod types;

pub use command::Command;
pub use parser::{Frame, FrameReader, ProtocolError, ProtocolResult};
pub use types::RespValue;
