//! Locating the speech-dispatcher socket.
//!
//! Addresses use speechd's own spec format: `unix_socket:<path>` or
//! `inet_socket:<host:port>`, with the target optional in both cases.
//! `SPEECHD_ADDRESS` overrides the default, which is the per-user socket
//! under `$XDG_RUNTIME_DIR`.

use log::debug;
use std::env;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid speechd address specification: {0:?}")]
    InvalidAddress(String),
}

/// Environment variable holding the address spec, as used by speechd
/// itself.
pub const ADDRESS_ENV_VAR: &str = "SPEECHD_ADDRESS";

const DEFAULT_INET_ADDR: &str = "127.0.0.1:6560";

/// Where to reach the speech server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechdAddress {
    /// Unix domain socket path.
    UnixSocket(PathBuf),
    /// TCP `host:port`.
    Inet(String),
}

impl SpeechdAddress {
    /// Parse a speechd address spec (`unix_socket:<path>` or
    /// `inet_socket:<host:port>`; the part after the method is optional
    /// and falls back to the default for that method).
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let (method, target) = match spec.split_once(':') {
            Some((method, target)) => (method, Some(target)),
            None => (spec, None),
        };
        let target = target.filter(|t| !t.is_empty());

        match method {
            "unix_socket" => Ok(match target {
                Some(path) => SpeechdAddress::UnixSocket(PathBuf::from(path)),
                None => SpeechdAddress::UnixSocket(default_socket_path()),
            }),
            "inet_socket" => Ok(SpeechdAddress::Inet(
                target.unwrap_or(DEFAULT_INET_ADDR).to_string(),
            )),
            _ => Err(ConfigError::InvalidAddress(spec.to_string())),
        }
    }

    /// Address the current environment says to use: `SPEECHD_ADDRESS` if
    /// set, otherwise the default per-user socket.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var(ADDRESS_ENV_VAR) {
            Ok(spec) => Self::parse(&spec),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Connect the matching transport.
    pub fn connect(&self) -> io::Result<Stream> {
        match self {
            SpeechdAddress::UnixSocket(path) => {
                debug!("Connecting to unix socket {}", path.display());
                UnixStream::connect(path).map(Stream::Unix)
            }
            SpeechdAddress::Inet(addr) => {
                debug!("Connecting to tcp address {}", addr);
                TcpStream::connect(addr.as_str()).map(Stream::Tcp)
            }
        }
    }
}

impl Default for SpeechdAddress {
    fn default() -> Self {
        SpeechdAddress::UnixSocket(default_socket_path())
    }
}

impl std::fmt::Display for SpeechdAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeechdAddress::UnixSocket(path) => write!(f, "unix_socket:{}", path.display()),
            SpeechdAddress::Inet(addr) => write!(f, "inet_socket:{}", addr),
        }
    }
}

fn default_socket_path() -> PathBuf {
    let runtime_dir = env::var("XDG_RUNTIME_DIR").unwrap_or_default();
    Path::new(&runtime_dir).join("speech-dispatcher/speechd.sock")
}

/// One connected transport, unix or TCP. Both sides only need byte-stream
/// semantics plus clone (for the reader thread) and shutdown.
#[derive(Debug)]
pub enum Stream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Stream {
    pub fn try_clone(&self) -> io::Result<Stream> {
        match self {
            Stream::Unix(s) => s.try_clone().map(Stream::Unix),
            Stream::Tcp(s) => s.try_clone().map(Stream::Tcp),
        }
    }

    /// Shut both directions down, unblocking a reader on the other clone.
    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            Stream::Unix(s) => s.shutdown(Shutdown::Both),
            Stream::Tcp(s) => s.shutdown(Shutdown::Both),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Unix(s) => s.read(buf),
            Stream::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Unix(s) => s.write(buf),
            Stream::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Unix(s) => s.flush(),
            Stream::Tcp(s) => s.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unix_socket_with_path() {
        assert_eq!(
            SpeechdAddress::parse("unix_socket:/run/user/1000/speechd.sock").unwrap(),
            SpeechdAddress::UnixSocket(PathBuf::from("/run/user/1000/speechd.sock"))
        );
    }

    #[test]
    fn test_parse_inet_socket_with_host_and_port() {
        assert_eq!(
            SpeechdAddress::parse("inet_socket:10.0.0.2:6560").unwrap(),
            SpeechdAddress::Inet("10.0.0.2:6560".to_string())
        );
    }

    #[test]
    fn test_parse_inet_socket_without_target_uses_default() {
        assert_eq!(
            SpeechdAddress::parse("inet_socket").unwrap(),
            SpeechdAddress::Inet("127.0.0.1:6560".to_string())
        );
        assert_eq!(
            SpeechdAddress::parse("inet_socket:").unwrap(),
            SpeechdAddress::Inet("127.0.0.1:6560".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_unknown_method() {
        assert!(matches!(
            SpeechdAddress::parse("carrier_pigeon:coop"),
            Err(ConfigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_display_round_trips() {
        let addr = SpeechdAddress::parse("inet_socket:localhost:6560").unwrap();
        assert_eq!(
            SpeechdAddress::parse(&addr.to_string()).unwrap(),
            addr
        );
    }
}
