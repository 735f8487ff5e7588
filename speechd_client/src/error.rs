use crate::config::ConfigError;
use ssip_protocol::ProtocolError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The server answered the command with a code outside the 2xx band.
    /// Local to the one call; the session stays usable.
    #[error("Server rejected command: {code} {details:?}")]
    Rejected { code: u16, details: Vec<String> },

    /// The background reader hit a terminal error. Sticky: every later
    /// command on this session fails with it.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Server reply did not carry a message id")]
    MissingMessageId,
}
