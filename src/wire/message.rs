//! The length-prefixed messages exchanged after the handshake.

use crate::{Bitfield, BlockInfo, PieceIndex};

/// The id byte identifying a message's type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl MessageId {
    pub fn from_u8(b: u8) -> Option<Self> {
        use MessageId::*;
        Some(match b {
            0 => Choke,
            1 => Unchoke,
            2 => Interested,
            3 => NotInterested,
            4 => Have,
            5 => Bitfield,
            6 => Request,
            7 => Piece,
            8 => Cancel,
            _ => return None,
        })
    }
}

/// A single peer protocol message.
///
/// A zero-length frame has no id byte and decodes to [`Message::KeepAlive`];
/// the caller is expected to tolerate it by doing nothing.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: PieceIndex },
    Bitfield(Bitfield),
    Request(BlockInfo),
    /// The wire calls this message `piece`; we call it `Block` to avoid
    /// clashing with the `piece` (whole, hashed unit) vocabulary used
    /// everywhere else in the crate.
    Block {
        piece_index: PieceIndex,
        offset: u32,
        data: Vec<u8>,
    },
    Cancel(BlockInfo),
    /// A message with an id outside 0..=8 (e.g. an extension protocol
    /// message). Preserved rather than rejected, so callers can ignore
    /// ids they don't recognize instead of treating them as errors.
    Unknown { id: u8, payload: Vec<u8> },
}
