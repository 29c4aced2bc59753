use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    err::{DecodeError, DecodeErrorKind},
    packet::{FixedHeader, PacketType},
};

/// Third packet of the QoS 2 exchange. The broker releases its delivery
/// hold on receipt of this packet and forwards it on to PUBCOMP.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct PubRelPacket {
    id: u16,
}

impl PubRelPacket {
    pub fn new(id: u16) -> Self {
        return Self { id };
    }

    pub fn decode(f_header: FixedHeader, bytes: &mut Bytes) -> Result<Self, DecodeError> {
        if f_header.rest_len() != 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("PUBREL packets can only contain a packet id."),
            ));
        }

        let id = bytes.get_u16();
        return Ok(Self { id });
    }

    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::with_capacity(4);

        // flag nibble must be 0b0010 for PUBREL.
        bytes.put_u8(PacketType::PUBREL as u8 | 2);
        bytes.put_u8(2);
        bytes.put_u16(self.id);
        return bytes.into();
    }

    pub fn id(&self) -> u16 {
        return self.id;
    }
}
