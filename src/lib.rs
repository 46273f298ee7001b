//! Tunneling core of a personal VPN client.
//!
//! Moves IP traffic between a local virtual network interface and a
//! remote server through an obfuscated, message-oriented transport,
//! tracking the connection's lifecycle along the way. Two pieces do the
//! work: the lifecycle machine ([`VpnClient`]) which gates connect and
//! disconnect requests, and the packet/message bridge
//! ([`bridge::TunnelBridge`]) which runs one pump per direction for the
//! lifetime of a session.
//!
//! The graphical front-end, the obfuscation protocol, and OS interface
//! provisioning live outside this crate and are reached through the
//! [`ConnectAnimation`], [`TransportDialer`] and [`PacketInterface`]
//! seams.

pub mod adapter;
pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod session;
pub mod status;
pub mod transport;

// Re-export main types
pub use adapter::{AddressFamily, PacketInterface, TaggedPacket};
pub use bridge::{AddressAssignment, TunnelBridge, TunnelStats};
pub use client::VpnClient;
pub use config::{ClientConfig, ServerEndpoint, TransportMode, DEFAULT_PORT};
pub use error::{Error, Result};
pub use message::Message;
pub use session::{status_description, ConnectionStage, ConnectionState, SessionHandle};
pub use status::{ConnectAnimation, NoAnimation, StatusReporter, StatusUpdate};
pub use transport::{TcpDialer, TcpTransport, TransportConnection, TransportDialer};
