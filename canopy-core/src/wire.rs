//! Datagram codec: bincode payload, one packet per datagram, size-capped.

use crate::protocol::Packet;

/// Largest datagram we will produce or accept.
pub const MAX_DATAGRAM_LEN: usize = 64 * 1024;

/// Encode a packet into a single datagram payload.
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, PacketEncodeError> {
    let payload = bincode::serialize(packet).map_err(PacketEncodeError::Encode)?;
    if payload.len() > MAX_DATAGRAM_LEN {
        return Err(PacketEncodeError::TooLarge);
    }
    Ok(payload)
}

/// Error encoding a packet (bincode or size limit).
#[derive(Debug, thiserror::Error)]
pub enum PacketEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("packet too large")]
    TooLarge,
}

/// Decode one packet from a received datagram.
pub fn decode_packet(bytes: &[u8]) -> Result<Packet, PacketDecodeError> {
    if bytes.len() > MAX_DATAGRAM_LEN {
        return Err(PacketDecodeError::TooLarge);
    }
    bincode::deserialize(bytes).map_err(PacketDecodeError::Decode)
}

/// Error decoding a datagram (size limit or bincode failure).
#[derive(Debug, thiserror::Error)]
pub enum PacketDecodeError {
    #[error("datagram too large")]
    TooLarge,
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_text() {
        let packet = Packet::Text {
            name: "alice".into(),
            body: "hello tree".into(),
        };
        let bytes = encode_packet(&packet).unwrap();
        let decoded = decode_packet(&bytes).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn roundtrip_parent_address() {
        let addr = "192.168.1.7:45750".parse().unwrap();
        let packet = Packet::Parent { new_parent: addr };
        let bytes = encode_packet(&packet).unwrap();
        match decode_packet(&bytes).unwrap() {
            Packet::Parent { new_parent } => assert_eq!(new_parent, addr),
            other => panic!("expected PARENT, got {}", other.kind()),
        }
    }

    #[test]
    fn control_packets_are_small() {
        for packet in [Packet::Connect, Packet::Disconnect, Packet::Ack, Packet::Root] {
            let bytes = encode_packet(&packet).unwrap();
            assert!(bytes.len() <= 8, "{} unexpectedly large", packet.kind());
        }
    }

    #[test]
    fn garbage_rejected() {
        assert!(matches!(
            decode_packet(&[0xff; 16]),
            Err(PacketDecodeError::Decode(_))
        ));
    }

    #[test]
    fn oversized_rejected() {
        let blob = vec![0u8; MAX_DATAGRAM_LEN + 1];
        assert!(matches!(
            decode_packet(&blob),
            Err(PacketDecodeError::TooLarge)
        ));
        let packet = Packet::Text {
            name: "a".into(),
            body: "x".repeat(MAX_DATAGRAM_LEN),
        };
        assert!(matches!(
            encode_packet(&packet),
            Err(PacketEncodeError::TooLarge)
        ));
    }
}
