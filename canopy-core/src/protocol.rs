//! Canopy wire protocol: the six packet types of the broadcast tree.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// All wire packet types. Encoding is bincode; one UDP datagram carries one
/// packet (see wire module).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    /// Attach to the receiver, or refresh liveness. Doubles as the ping.
    Connect,
    /// Sever the relationship with the receiver.
    Disconnect,
    /// Liveness confirmation for a previously received packet.
    Ack,
    /// Chat payload: originator's display name and the message body.
    Text { name: String, body: String },
    /// The receiver must drop its parent link and become a root.
    Root,
    /// Redirect: the receiver's replacement parent address. Only honored
    /// when sent by the current parent.
    Parent { new_parent: SocketAddr },
}

impl Packet {
    /// Type tag for logs and classification.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Connect => "CONNECT",
            Packet::Disconnect => "DISCONNECT",
            Packet::Ack => "ACK",
            Packet::Text { .. } => "TEXT",
            Packet::Root => "ROOT",
            Packet::Parent { .. } => "PARENT",
        }
    }
}
