use std::{error::Error, fmt::Display};

use mqtt_core::err::{DecodeError, EncodeError};

/// The broker/session-layer error taxonomy (see the codec-layer
/// `DecodeError`/`EncodeError` in `mqtt_core::err`). Every variant here is
/// session-terminating: the owning session is torn down and its cleanup
/// runs, but the broker itself keeps serving other connections.
#[derive(Debug)]
pub struct ServerError {
    kind: ErrorKind,
    message: String,
}

impl ServerError {
    pub fn new(kind: ErrorKind, message: String) -> Self {
        return Self { kind, message };
    }

    pub fn kind(&self) -> &ErrorKind {
        return &self.kind;
    }
}

impl Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for ServerError {}

#[derive(Debug)]
pub enum ErrorKind {
    Io,
    MalformedPacket,
    ProtocolViolation,
    Unsupported,
}

impl From<std::io::Error> for ServerError {
    fn from(value: std::io::Error) -> Self {
        return Self {
            message: value.to_string(),
            kind: ErrorKind::Io,
        };
    }
}

impl From<DecodeError> for ServerError {
    fn from(value: DecodeError) -> Self {
        return Self {
            message: value.to_string(),
            kind: ErrorKind::MalformedPacket,
        };
    }
}

impl From<EncodeError> for ServerError {
    fn from(value: EncodeError) -> Self {
        return Self {
            message: value.to_string(),
            kind: ErrorKind::MalformedPacket,
        };
    }
}
