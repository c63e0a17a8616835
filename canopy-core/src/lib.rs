//! Canopy broadcast-tree protocol reference implementation.
//! Host-driven: no I/O; host passes events and receives actions.

pub mod liveness;
pub mod node;
pub mod protocol;
pub mod wire;

pub use liveness::{PeerRecord, PeerTable, MISS_THRESHOLD};
pub use node::{Action, Node, Parentage};
pub use protocol::Packet;
pub use wire::{decode_packet, encode_packet, PacketDecodeError, PacketEncodeError};
