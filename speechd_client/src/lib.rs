//! # speechd_client
//!
//! Client sessions for speech-dispatcher, the common speech synthesis
//! server on free desktops. Talks SSIP (see the `ssip_protocol` crate for
//! the wire layer) over the dispatcher's unix socket or TCP port.
//!
//! A [`SpeechdSession`] owns one connection. A background thread reads the
//! socket and splits server traffic into command replies and asynchronous
//! event notifications; commands from any number of threads serialize on
//! an internal lock, so every caller gets the reply to its own command.
//! [`SpeechdSession::speak`] returns a [`PendingMessage`] that can be
//! waited on until the utterance is spoken or canceled.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use speechd_client::SpeechdSession;
//!
//! # fn main() -> Result<(), speechd_client::ClientError> {
//! // Connect using SPEECHD_ADDRESS / the default per-user socket.
//! let session = SpeechdSession::open()?;
//! session.set_client_name("user", "demo", "main")?;
//!
//! // Needed for wait() below; without notifications the terminal event
//! // never arrives.
//! session.set_event_notifications(true)?;
//!
//! session.set_rate(20)?;
//! let pending = session.speak("Hello from Rust")?;
//! let spoken = pending.wait()?;
//! println!("message {} finished (spoken: {})", pending.id(), spoken);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;

// Re-export commonly used types
pub use client::SpeechdSession;
pub use config::{ConfigError, SpeechdAddress, Stream};
pub use error::{ClientError, Result};
pub use events::{EventCode, PendingMessage};
pub use ssip_protocol::{ProtocolError, ServerMessage};
