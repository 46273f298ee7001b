//! Transport message model and wire codec.
//!
//! Messages are the application-layer units exchanged over the transport
//! connection. Payload bytes are opaque IP packets; the bridge never
//! interprets them beyond address-family classification.
//!
//! ## Wire Format
//!
//! One frame per message:
//! ```text
//! [tag:u8] [length:u32 BE] [payload:bytes]
//! ```
//!
//! The wire contract carries more tags than this client consumes;
//! well-framed frames with an unrecognized tag decode to
//! [`Message::Unsupported`] so the inbound pump can drop them with a log
//! line instead of tearing the stream down.

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Frame header size: tag byte plus big-endian payload length.
const HEADER_LEN: usize = 5;

/// Maximum payload size. IP packets never exceed 64 KiB; anything larger
/// indicates a corrupted stream.
pub const MAX_PAYLOAD: usize = 64 * 1024;

pub const TAG_IPV4_DATA: u8 = 0x01;
pub const TAG_IPV6_DATA: u8 = 0x02;
pub const TAG_ADDRESS_ASSIGN_V4: u8 = 0x03;
pub const TAG_ADDRESS_ASSIGN_V6: u8 = 0x04;

/// An application message exchanged over the transport connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// An opaque IPv4 packet.
    Ipv4Data(Bytes),
    /// An opaque IPv6 packet.
    Ipv6Data(Bytes),
    /// Server-granted IPv4 address for this session.
    AddressAssignV4(Ipv4Addr),
    /// Server-granted IPv6 address for this session.
    AddressAssignV6(Ipv6Addr),
    /// Well-framed message with a tag this client does not consume.
    Unsupported { tag: u8 },
}

impl Message {
    /// Wire tag of this message.
    pub fn tag(&self) -> u8 {
        match self {
            Message::Ipv4Data(_) => TAG_IPV4_DATA,
            Message::Ipv6Data(_) => TAG_IPV6_DATA,
            Message::AddressAssignV4(_) => TAG_ADDRESS_ASSIGN_V4,
            Message::AddressAssignV6(_) => TAG_ADDRESS_ASSIGN_V6,
            Message::Unsupported { tag } => *tag,
        }
    }

    /// Encode this message into a single wire frame.
    pub fn encode(&self) -> Bytes {
        match self {
            Message::Ipv4Data(payload) => frame(TAG_IPV4_DATA, payload),
            Message::Ipv6Data(payload) => frame(TAG_IPV6_DATA, payload),
            Message::AddressAssignV4(address) => frame(TAG_ADDRESS_ASSIGN_V4, &address.octets()),
            Message::AddressAssignV6(address) => frame(TAG_ADDRESS_ASSIGN_V6, &address.octets()),
            Message::Unsupported { tag } => frame(*tag, &[]),
        }
    }

    /// Decode one message from the front of `buf`.
    ///
    /// Returns `Ok(None)` when the buffer does not yet hold a complete
    /// frame. On success the frame bytes are consumed from `buf`.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Message>> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let length = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        if length > MAX_PAYLOAD {
            return Err(Error::anomaly(format!(
                "frame length {length} exceeds {MAX_PAYLOAD} byte limit"
            )));
        }
        if buf.len() < HEADER_LEN + length {
            return Ok(None);
        }

        let tag = buf[0];
        buf.advance(HEADER_LEN);
        let payload = buf.split_to(length).freeze();

        let message = match tag {
            TAG_IPV4_DATA => Message::Ipv4Data(payload),
            TAG_IPV6_DATA => Message::Ipv6Data(payload),
            TAG_ADDRESS_ASSIGN_V4 => {
                let octets: [u8; 4] = payload.as_ref().try_into().map_err(|_| {
                    Error::anomaly(format!("IPv4 assignment with {} payload bytes", payload.len()))
                })?;
                Message::AddressAssignV4(Ipv4Addr::from(octets))
            }
            TAG_ADDRESS_ASSIGN_V6 => {
                let octets: [u8; 16] = payload.as_ref().try_into().map_err(|_| {
                    Error::anomaly(format!("IPv6 assignment with {} payload bytes", payload.len()))
                })?;
                Message::AddressAssignV6(Ipv6Addr::from(octets))
            }
            tag => Message::Unsupported { tag },
        };
        Ok(Some(message))
    }
}

fn frame(tag: u8, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u8(tag);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}
