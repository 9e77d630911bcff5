//! The wire codec: the 68 byte handshake frame and the length-prefixed
//! message frames that follow it.

mod codec;
mod handshake;
mod message;

pub(crate) use codec::{HandshakeCodec, PeerCodec};
pub(crate) use handshake::{Handshake, PROTOCOL_STRING};
pub(crate) use message::{Message, MessageId};
