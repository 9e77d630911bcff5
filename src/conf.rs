//! This module defines the types used to configure the engine.

use std::time::Duration;

use rand::Rng;

use crate::PeerId;

/// The fixed, arbitrary port this client announces to the tracker.
///
/// The client never listens for incoming connections (see the crate's
/// Non-goals around seeding), so the value has no meaning beyond being a
/// well-formed, unprivileged port number.
pub const ANNOUNCE_PORT: u16 = 51413;

/// The global configuration for a download.
///
/// The session's peer id lives on [`crate::Metainfo`] (generated once per
/// parsed torrent and reused for both the tracker announce and every peer
/// handshake), not here, so there's only one id per run rather than two.
#[derive(Clone, Debug)]
pub struct Conf {
    /// How long to wait for the TCP connect to a peer before giving up.
    pub connect_timeout: Duration,
    /// How long to wait, in total, for the handshake and the peer's
    /// initial bitfield to arrive before giving up.
    pub handshake_timeout: Duration,
    /// How long a single piece download may take, from the first request to
    /// the last block, before the piece is requeued and the peer session
    /// abandoned.
    pub piece_timeout: Duration,
}

impl Conf {
    /// Returns a configuration with the default timeouts.
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            handshake_timeout: Duration::from_secs(3),
            piece_timeout: Duration::from_secs(45),
        }
    }
}

impl Default for Conf {
    fn default() -> Self {
        Self::new()
    }
}

/// Generates a random 20 byte peer id.
///
/// Real clients prefix this with a client identifier (see BEP 20); since
/// this core never needs to be recognized as a particular implementation by
/// other peers, a plain random string is enough.
pub fn generate_peer_id() -> PeerId {
    let mut id = [0u8; 20];
    rand::thread_rng().fill(&mut id);
    id
}
