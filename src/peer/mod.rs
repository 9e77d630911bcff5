//! A single peer connection: handshake, bitfield exchange, and the
//! primitives used to send and receive messages afterwards.

mod session;

pub(crate) use session::PeerSession;
