use std::{error::Error, fmt::Display};

#[derive(Debug, Clone)]
pub struct EncodeError {
    kind: EncodeErrorKind,
    message: String,
}

impl EncodeError {
    pub fn new(kind: EncodeErrorKind, message: String) -> Self {
        return Self { kind, message };
    }

    pub fn kind(&self) -> EncodeErrorKind {
        return self.kind;
    }
}

impl Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for EncodeError {}

#[derive(Clone, Debug, Copy, PartialEq)]
pub enum EncodeErrorKind {
    OversizedPayload,
}

impl Error for DecodeError {}

#[derive(Debug, Clone)]
pub struct DecodeError {
    kind: DecodeErrorKind,
    message: String,
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl DecodeError {
    pub fn new(kind: DecodeErrorKind, message: String) -> Self {
        return Self { kind, message };
    }

    pub fn kind(&self) -> DecodeErrorKind {
        return self.kind;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DecodeErrorKind {
    FlagBits,
    PacketType,
    QoS,
    Utf8ParseError,
    MalformedLength,
    MalformedTopicName,
    InvalidProtocol,
    InvalidReturnCode,
    ImproperDisconnect,
    ProtocolError,
}
