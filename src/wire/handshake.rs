//! The fixed-size handshake frame that opens every peer connection.

use crate::{PeerId, Sha1Hash};

/// The protocol string every BitTorrent v1 handshake advertises.
pub(crate) const PROTOCOL_STRING: &str = "BitTorrent protocol";

/// The handshake message.
///
/// On the wire this is `[pstrlen][pstr][8 reserved bytes][info_hash][peer_id]`,
/// 68 bytes total when `pstr` is the standard 19 byte protocol string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Handshake {
    /// The protocol string, normally `b"BitTorrent protocol"`.
    pub prot: Vec<u8>,
    pub info_hash: Sha1Hash,
    pub peer_id: PeerId,
}

impl Handshake {
    /// Builds a handshake carrying the standard protocol string.
    pub fn new(info_hash: Sha1Hash, peer_id: PeerId) -> Self {
        Self {
            prot: PROTOCOL_STRING.as_bytes().to_vec(),
            info_hash,
            peer_id,
        }
    }
}
