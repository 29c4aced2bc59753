use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::err::{DecodeError, DecodeErrorKind, EncodeError, EncodeErrorKind};

/*
 * MQTT v3.1.1 standard, Remaining length field on the fixed header can be at
 * most 4 bytes.
 */
const MAX_LEN: usize = (128u64).pow(4) as usize;

pub fn encode_packet_length(bytes: &mut BytesMut, mut len: usize) -> Result<usize, EncodeError> {
    if len >= MAX_LEN {
        return Err(EncodeError::new(
            EncodeErrorKind::OversizedPayload,
            format!(
                "Packet payload exceeded max length of 127^4, found length {}",
                len
            ),
        ));
    }

    let mut num_bytes = 0;

    loop {
        let mut d: u8 = (len % 128) as u8;

        len /= 128;

        if len > 0 {
            d |= 128;
        }

        bytes.put_u8(d);

        num_bytes += 1;

        if len == 0 {
            break;
        }
    }

    return Ok(num_bytes);
}

pub fn encode_utf8(bytes: &mut BytesMut, val: &str) -> Result<(), EncodeError> {
    return encode_bytes(bytes, val.as_bytes());
}

pub fn encode_bytes(bytes: &mut BytesMut, val: &[u8]) -> Result<(), EncodeError> {
    let len = val.len() as u16;

    bytes.put_slice(&len.to_be_bytes());
    bytes.put_slice(val);

    return Ok(());
}

pub fn decode_utf8(bytes: &mut Bytes) -> Result<String, DecodeError> {
    let len = decode_u16_len(bytes)?;

    let string = String::from_utf8(bytes.slice(0..len as usize).to_vec());

    bytes.advance(len as usize);

    match string {
        Ok(string) => return Ok(string),
        Err(e) => {
            return Err(DecodeError::new(
                DecodeErrorKind::Utf8ParseError,
                e.to_string(),
            ))
        }
    }
}

pub fn decode_u16_len(bytes: &mut Bytes) -> Result<u16, DecodeError> {
    if bytes.remaining() < 2 {
        return Err(DecodeError::new(
            DecodeErrorKind::MalformedLength,
            String::from("Attempted to read a length prefix with fewer than 2 bytes remaining"),
        ));
    }

    let len = bytes.get_u16();

    if len as usize > bytes.len() {
        return Err(DecodeError::new(
            DecodeErrorKind::MalformedLength,
            format!(
                "Attempted invalid memory access, packet remaining length: {}, encoded length: {len}",
                bytes.len()
            ),
        ));
    }

    return Ok(len);
}

/// Decodes the remaining-length varint starting at `bytes[0]`. Does NOT advance
/// the buffer; returns (bytes consumed by the varint, decoded remaining length).
pub fn decode_packet_length(bytes: &Bytes) -> Result<(usize, usize), DecodeError> {
    let mut mult: usize = 1;
    let mut len: usize = 0;

    for i in 0..4 {
        if i >= bytes.len() {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("Buffer ended before the remaining-length varint completed"),
            ));
        }

        let c = bytes[i];

        len += (c as usize & 127) * mult;
        mult *= 128;

        if (c & 128) == 0 {
            return Ok((i + 1, len));
        }
    }

    return Err(DecodeError::new(
        DecodeErrorKind::MalformedLength,
        format!(
            "Packet payload exceeded max length of 127^4, found length {}",
            len
        ),
    ));
}


use tokio::io::{self, AsyncRead, AsyncReadExt};

/// Reads one whole MQTT control packet's bytes (fixed header + remaining-length
/// varint + variable header/payload) off of `stream`. A single `read` may not
/// yield a whole frame, and a single TCP segment may carry several frames; this
/// reads exactly the bytes belonging to one frame and leaves the rest for the
/// next call.
///
/// Returns `Ok(None)` on a clean EOF before any byte of a new frame was read.
/// An EOF in the middle of a frame surfaces as an `io::Error` of kind
/// `UnexpectedEof`.
pub async fn read_frame<S: AsyncRead + Unpin>(stream: &mut S) -> io::Result<Option<Bytes>> {
    let type_byte = match read_u8_or_eof(stream).await? {
        Some(byte) => byte,
        None => return Ok(None),
    };

    let mut len_bytes = Vec::with_capacity(4);
    let mut mult: usize = 1;
    let mut remaining_length: usize = 0;

    loop {
        let byte = stream.read_u8().await?;
        len_bytes.push(byte);
        remaining_length += (byte as usize & 127) * mult;
        mult *= 128;

        if (byte & 128) == 0 {
            break;
        }

        if len_bytes.len() == 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "remaining-length varint exceeded 4 bytes",
            ));
        }
    }

    let mut frame = BytesMut::with_capacity(1 + len_bytes.len() + remaining_length);
    frame.put_u8(type_byte);
    frame.put_slice(&len_bytes);

    let mut payload = vec![0u8; remaining_length];
    stream.read_exact(&mut payload).await?;
    frame.put_slice(&payload);

    return Ok(Some(frame.freeze()));
}

async fn read_u8_or_eof<S: AsyncRead + Unpin>(stream: &mut S) -> io::Result<Option<u8>> {
    let mut buf = [0u8; 1];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    return Ok(Some(buf[0]));
}
