use bytes::{Buf, Bytes};

mod connack;
mod connect;
mod disconnect;
mod pingreq;
mod pingresp;
mod puback;
mod pubcomp;
mod publish;
mod pubrec;
mod pubrel;
mod suback;
mod subscribe;

pub use connack::ConnAckPacket;
pub use connect::ConnectPacket;
pub use disconnect::DisconnectPacket;
pub use pingreq::PingReqPacket;
pub use pingresp::PingRespPacket;
pub use puback::PubAckPacket;
pub use pubcomp::PubCompPacket;
pub use publish::PublishPacket;
pub use pubrec::PubRecPacket;
pub use pubrel::PubRelPacket;
pub use suback::SubAckPacket;
pub use subscribe::{SubscribePacket, TopicSubscription};

use crate::err::{DecodeError, DecodeErrorKind, EncodeError};
use crate::io::decode_packet_length;

const PACKET_TYPE_BITS: u8 = 0b1111_0000;
const PACKET_FLAG_BITS: u8 = 0b0000_1111;

pub trait Encode {
    fn encode(&self) -> Result<Bytes, EncodeError>;
}

pub trait Decode<T, E> {
    fn decode(fixed_header: FixedHeader, bytes: &mut Bytes) -> Result<T, E>;
}

/// The 11 control packet kinds this broker reads or writes. UNSUBSCRIBE and
/// UNSUBACK are not modeled: the broker never handles an UNSUBSCRIBE request.
#[derive(PartialEq, Debug, Clone)]
pub enum MqttPacket {
    ConnAck(ConnAckPacket),
    Connect(ConnectPacket),
    Disconnect(DisconnectPacket),
    PingReq(PingReqPacket),
    PingResp(PingRespPacket),
    PubAck(PubAckPacket),
    PubComp(PubCompPacket),
    Publish(PublishPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    SubAck(SubAckPacket),
    Subscribe(SubscribePacket),
}

impl MqttPacket {
    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        return match self {
            Self::ConnAck(packet) => Ok(packet.encode()),
            Self::Connect(packet) => packet.encode(),
            Self::Disconnect(packet) => Ok(packet.encode()),
            Self::PingReq(packet) => Ok(packet.encode()),
            Self::PingResp(packet) => Ok(packet.encode()),
            Self::PubAck(packet) => Ok(packet.encode()),
            Self::PubComp(packet) => Ok(packet.encode()),
            Self::Publish(packet) => packet.encode(),
            Self::PubRel(packet) => Ok(packet.encode()),
            Self::PubRec(packet) => Ok(packet.encode()),
            Self::SubAck(packet) => packet.encode(),
            Self::Subscribe(packet) => packet.encode(),
        };
    }
}

/// Decodes a whole frame (as produced by [`crate::io::read_frame`]) into a
/// tagged packet. Reads byte 0 to derive the type, as the fixed header
/// contract requires, then hands the rest of the buffer to the per-type parser.
pub fn decode_mqtt_packet(mut bytes: Bytes) -> Result<MqttPacket, DecodeError> {
    let f_header = FixedHeader::decode(&mut bytes)?;
    bytes.advance(f_header.header_len);
    return MqttPacket::decode(f_header, &mut bytes);
}

impl Decode<MqttPacket, DecodeError> for MqttPacket {
    fn decode(f_header: FixedHeader, bytes: &mut Bytes) -> Result<Self, DecodeError> {
        return match f_header.type_ {
            PacketType::CONNACK => Ok(Self::ConnAck(ConnAckPacket::decode(bytes)?)),
            PacketType::CONNECT => Ok(Self::Connect(ConnectPacket::decode(f_header, bytes)?)),
            PacketType::DISCONNECT => Ok(Self::Disconnect(DisconnectPacket::decode(f_header)?)),
            PacketType::PINGREQ => Ok(Self::PingReq(PingReqPacket::decode(f_header)?)),
            PacketType::PINGRESP => Ok(Self::PingResp(PingRespPacket::decode(f_header)?)),
            PacketType::PUBACK => Ok(Self::PubAck(PubAckPacket::decode(f_header, bytes)?)),
            PacketType::PUBCOMP => Ok(Self::PubComp(PubCompPacket::decode(f_header, bytes)?)),
            PacketType::PUBLISH => Ok(Self::Publish(PublishPacket::decode(f_header, bytes)?)),
            PacketType::PUBREL => Ok(Self::PubRel(PubRelPacket::decode(f_header, bytes)?)),
            PacketType::PUBREC => Ok(Self::PubRec(PubRecPacket::decode(f_header, bytes)?)),
            PacketType::SUBACK => Ok(Self::SubAck(SubAckPacket::decode(bytes)?)),
            PacketType::SUBSCRIBE => Ok(Self::Subscribe(SubscribePacket::decode(f_header, bytes)?)),
        };
    }
}

#[derive(Copy, Clone, Debug)]
pub struct FixedHeader {
    pub type_: PacketType,
    pub flags: HeaderFlags,
    pub rest_len: usize,
    pub header_len: usize,
}

impl FixedHeader {
    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::new(
                DecodeErrorKind::ImproperDisconnect,
                String::from("Received packet of length zero."),
            ));
        }

        let type_byte = bytes[0];
        let type_ = PacketType::try_from(type_byte)?;
        let flags = HeaderFlags::try_from((type_, type_byte))?;

        let rest = bytes.slice(1..);
        let (len_len, rest_len) = decode_packet_length(&rest)?;

        return Ok(Self {
            type_,
            flags,
            header_len: len_len + 1,
            rest_len,
        });
    }

    pub fn header_len(&self) -> usize {
        return self.header_len;
    }

    pub fn rest_len(&self) -> usize {
        return self.rest_len;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct HeaderFlags {
    byte: u8,
}

impl HeaderFlags {
    pub fn as_byte(&self) -> u8 {
        return self.byte;
    }
}

impl TryFrom<(PacketType, u8)> for HeaderFlags {
    type Error = DecodeError;
    fn try_from((type_, byte): (PacketType, u8)) -> Result<Self, DecodeError> {
        match type_ {
            PacketType::PUBLISH => {
                // all bit values are available to be written to.
            }
            PacketType::PUBREL | PacketType::SUBSCRIBE => {
                if byte & PACKET_FLAG_BITS != 2 {
                    return Err(DecodeError::new(
                        DecodeErrorKind::FlagBits,
                        format!(
                            "Invalid flag bits: {} for packet type: {}, byte must be == 2 for packet type {type_}.",
                            byte, type_
                        ),
                    ));
                }
            }
            _ => {
                if byte & PACKET_FLAG_BITS != 0 {
                    return Err(DecodeError::new(
                        DecodeErrorKind::FlagBits,
                        format!(
                            "Invalid flag bits: {} for packet type: {}, bits must be == 0 for packet type {type_}.",
                            byte, type_
                        ),
                    ));
                }
            }
        }
        return Ok(Self {
            byte: byte & PACKET_FLAG_BITS,
        });
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum PacketType {
    CONNECT = 0b0001_0000,
    CONNACK = 0b0010_0000,
    PUBLISH = 0b0011_0000,
    PUBACK = 0b0100_0000,
    PUBREC = 0b0101_0000,
    PUBREL = 0b0110_0000,
    PUBCOMP = 0b0111_0000,
    SUBSCRIBE = 0b1000_0000,
    SUBACK = 0b1001_0000,
    PINGREQ = 0b1100_0000,
    PINGRESP = 0b1101_0000,
    DISCONNECT = 0b1110_0000,
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;
    fn try_from(value: u8) -> Result<Self, DecodeError> {
        let out = match value & PACKET_TYPE_BITS {
            0x10 => Self::CONNECT,
            0x20 => Self::CONNACK,
            0x30 => Self::PUBLISH,
            0x40 => Self::PUBACK,
            0x50 => Self::PUBREC,
            0x60 => Self::PUBREL,
            0x70 => Self::PUBCOMP,
            0x80 => Self::SUBSCRIBE,
            0x90 => Self::SUBACK,
            0xC0 => Self::PINGREQ,
            0xD0 => Self::PINGRESP,
            0xE0 => Self::DISCONNECT,
            _ => {
                return Err(DecodeError::new(
                    DecodeErrorKind::PacketType,
                    format!("Packet type {} is not a valid or supported packet.", value >> 4),
                ))
            }
        };
        return Ok(out);
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PacketType::{:?}", self)
    }
}
