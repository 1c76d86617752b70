use thiserror::Error;

/// Errors raised by the protocol engine and its collaborators
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed local configuration file
    #[error("Config error: {0}")]
    Config(String),

    /// Transport connect/read/write failure
    #[error("Connection error: {0}")]
    Connection(#[source] std::io::Error),

    #[error("Name is {len} bytes long, at most {max} bytes fit the name field")]
    NameTooLong { len: usize, max: usize },

    #[error("Public key must be exactly {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Payload of {0} bytes does not fit the payload size field")]
    PayloadTooLarge(usize),

    #[error("File needs {chunks} chunks, at most {max} fit the packet counter")]
    FileTooLarge { chunks: usize, max: usize },

    #[error("Truncated buffer: needed {needed} bytes at offset {offset}, {available} available")]
    TruncatedBuffer {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Response {code} carries no {field}")]
    WrongVariant { code: u16, field: &'static str },

    #[error("Unknown response code {0}")]
    UnknownResponseCode(u16),

    #[error("Registration failed after {0} attempts")]
    RegistrationFailed(usize),

    #[error("Key exchange failed after {0} attempts")]
    KeyExchangeFailed(usize),

    #[error("Server refused reconnection {0} times")]
    ReconnectionRefused(usize),

    #[error("Session key of {0} bytes is not a valid AES key")]
    InvalidSessionKey(usize),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server checksum did not match after {0} attempts, transfer aborted")]
    ChecksumMismatchExhausted(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
