use std::io;

use thiserror::Error;

/// Error type for mctools.
#[derive(Error, Debug)]
pub enum McError {
    /// IO error
    #[error("{0}")]
    Io(#[from] io::Error),
    /// Serialization or deserialization error on the client codec.
    #[error("{0}")]
    Serde(#[from] serde_json::Error),
    /// Malformed `host[:port]` string.
    #[error("Invalid format for host string: '{0}'")]
    AddressFormat(String),
    /// Socket-level failure while establishing the connection.
    #[error("Connection error: {0}")]
    Connection(io::Error),
    /// The connection dropped mid-command. "Broken pipe" is confusing,
    /// so this displays as "Connection refused" instead.
    #[error("Could not connect to {host}:{port}: Connection refused")]
    ConnectionReset {
        /// Host the command was talking to.
        host: String,
        /// Port the command was talking to.
        port: u16,
    },
    /// Operation name the exerciser does not know.
    #[error("Unknown op '{0}'")]
    UnknownOperation(String),
    /// Durability level outside the defined range (0-3).
    #[error("Invalid durability level: {0}")]
    InvalidDurability(u8),
    /// Missing or malformed positional argument for a command.
    #[error("{0}")]
    Argument(String),
    /// Error status reported by the server.
    #[error("{0}")]
    Server(String),
}

impl McError {
    /// Whether this error means the peer dropped the connection mid-command:
    /// a broken pipe or reset on write, or the stream ending where a
    /// response was expected.
    pub fn is_connection_drop(&self) -> bool {
        fn dropped(kind: io::ErrorKind) -> bool {
            matches!(
                kind,
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::UnexpectedEof
            )
        }
        match self {
            McError::Io(e) | McError::Connection(e) => dropped(e.kind()),
            McError::Serde(e) => e.is_eof() || e.io_error_kind().map_or(false, dropped),
            _ => false,
        }
    }

    /// Rewrite a connection drop as `ConnectionReset` for the given peer;
    /// any other error passes through unchanged.
    pub fn remap_connection_drop(self, host: &str, port: u16) -> McError {
        if self.is_connection_drop() {
            McError::ConnectionReset {
                host: host.to_string(),
                port,
            }
        } else {
            self
        }
    }
}

/// Custom result type for McError
pub type Result<T> = std::result::Result<T, McError>;
