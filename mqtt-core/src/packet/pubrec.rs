use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    err::{DecodeError, DecodeErrorKind},
    packet::{FixedHeader, PacketType},
};

/// Second packet of the QoS 2 exchange: acknowledges receipt of a PUBLISH
/// and hands delivery over to the PUBREL/PUBCOMP handshake.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct PubRecPacket {
    id: u16,
}

impl PubRecPacket {
    pub fn new(id: u16) -> Self {
        return Self { id };
    }

    pub fn decode(f_header: FixedHeader, bytes: &mut Bytes) -> Result<Self, DecodeError> {
        if f_header.rest_len() != 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("PUBREC packets can only contain a packet id."),
            ));
        }

        let id = bytes.get_u16();
        return Ok(Self { id });
    }

    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::with_capacity(4);

        bytes.put_u8(PacketType::PUBREC as u8);
        bytes.put_u8(2);
        bytes.put_u16(self.id);
        return bytes.into();
    }

    pub fn id(&self) -> u16 {
        return self.id;
    }
}
