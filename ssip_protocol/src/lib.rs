//! # SSIP Protocol
//!
//! Wire codec for SSIP, the line-oriented text protocol spoken by
//! speech-dispatcher (<https://freebsoft.org/doc/speechd/ssip.html>).
//!
//! This crate only covers framing:
//! - Server replies are sequences of CRLF lines starting with a 3-digit
//!   code and a delimiter (`-` = more lines follow, space = final line).
//! - Client commands are single CRLF lines; speak payload bodies are sent
//!   line by line with a leading dot doubled, terminated by a lone `.`.
//!
//! Session handling (background reads, event demultiplexing, the command
//! surface) lives in the `speechd_client` crate.
//!
//! ## Example
//!
//! ```rust
//! use ssip_protocol::{FrameReader, FrameWriter};
//! use std::io::Cursor;
//!
//! # fn main() -> Result<(), ssip_protocol::ProtocolError> {
//! let mut reader = FrameReader::new(Cursor::new("225-42\r\n225 OK\r\n".to_string()));
//! let reply = reader.read_message()?;
//! assert_eq!(reply.code, 225);
//! assert_eq!(reply.lines, vec!["42", "OK"]);
//!
//! let mut writer = FrameWriter::new(Vec::new());
//! writer.write_line("speak")?;
//! writer.write_speak_line(".leading dot gets doubled")?;
//! writer.write_line(".")?;
//! # Ok(())
//! # }
//! ```

pub mod protocol;

// Re-export commonly used types
pub use protocol::{FrameReader, FrameWriter, ProtocolError, ServerMessage, EVENT_BAND, SUCCESS_BAND};
