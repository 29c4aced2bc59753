use bytes::{Buf, Bytes};

use crate::{
    err::{DecodeError, DecodeErrorKind},
    io::decode_utf8,
    packet::FixedHeader,
};

/// The first packet a client sends after opening a connection. The broker
/// only ever decodes this packet; it never encodes one.
#[derive(PartialEq, Clone, Debug)]
pub struct ConnectPacket {
    protocol_name: String,
    protocol_level: u8,
    connect_flags: u8,
    keep_alive: u16,
    client_id: String,
}

impl ConnectPacket {
    pub fn decode(f_header: FixedHeader, bytes: &mut Bytes) -> Result<Self, DecodeError> {
        if f_header.flags.as_byte() != 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::FlagBits,
                String::from("CONNECT packets must have a flags nibble of 0."),
            ));
        }

        let start_remaining = bytes.remaining();

        let protocol_name = decode_utf8(bytes)?;

        if bytes.remaining() < 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("CONNECT packet ended before protocol level and connect flags."),
            ));
        }

        let protocol_level = bytes.get_u8();
        let connect_flags = bytes.get_u8();

        if bytes.remaining() < 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("CONNECT packet ended before the keep-alive field."),
            ));
        }

        let keep_alive = bytes.get_u16();

        let client_id = decode_utf8(bytes)?;

        let consumed = start_remaining - bytes.remaining();

        if consumed != f_header.rest_len() {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                format!(
                    "CONNECT packet's consumed byte count ({consumed}) did not match the declared remaining length ({}).",
                    f_header.rest_len()
                ),
            ));
        }

        return Ok(Self {
            protocol_name,
            protocol_level,
            connect_flags,
            keep_alive,
            client_id,
        });
    }

    pub fn protocol_name(&self) -> &str {
        return &self.protocol_name;
    }

    pub fn protocol_level(&self) -> u8 {
        return self.protocol_level;
    }

    pub fn connect_flags(&self) -> u8 {
        return self.connect_flags;
    }

    pub fn keep_alive(&self) -> u16 {
        return self.keep_alive;
    }

    pub fn client_id(&self) -> &str {
        return &self.client_id;
    }
}
