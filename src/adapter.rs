//! Local packet interface seam.
//!
//! The virtual network device is provisioned outside this crate; the
//! bridge reaches it through the [`PacketInterface`] trait.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Address family of a raw IP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
    /// Any other IP version nibble. Dropped by the outbound pump.
    Unknown(u8),
}

impl AddressFamily {
    /// Classify a raw packet by its IP version nibble.
    pub fn of_packet(payload: &[u8]) -> Self {
        let version = payload.first().map(|b| (b >> 4) & 0x0F).unwrap_or(0);
        match version {
            4 => AddressFamily::Ipv4,
            6 => AddressFamily::Ipv6,
            other => AddressFamily::Unknown(other),
        }
    }
}

/// A raw IP packet together with its address family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedPacket {
    pub payload: Bytes,
    pub family: AddressFamily,
}

impl TaggedPacket {
    pub fn new(payload: Bytes, family: AddressFamily) -> Self {
        Self { payload, family }
    }

    /// Tag a raw packet with the family read from its version nibble.
    pub fn classify(payload: Bytes) -> Self {
        let family = AddressFamily::of_packet(&payload);
        Self { payload, family }
    }
}

/// The local virtual network device abstraction.
#[async_trait]
pub trait PacketInterface: Send + Sync {
    /// Read the next batch of packets from the device.
    ///
    /// Suspends until at least one packet is available. An error means
    /// the interface is closed and the caller should stop pumping.
    async fn read_batch(&self) -> Result<Vec<TaggedPacket>>;

    /// Inject packets back into the OS networking stack.
    async fn write_batch(&self, packets: Vec<TaggedPacket>) -> Result<()>;
}
