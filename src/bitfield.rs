//! Piece-availability bitset.
//!
//! [`crate::Bitfield`] is a type alias for `BitVec<Msb0, u8>`, which already
//! gives us the wire's bit ordering for free: bit `i` of the underlying byte
//! string is bit `i` of the vector, most significant bit first. This module
//! adds an out-of-range-safe `has` and a `mark_have` that never panics on
//! indices past the end.

use crate::{Bitfield, PieceIndex};

/// Operations a peer's piece-availability bitfield supports.
pub trait BitfieldExt {
    /// Returns whether the peer claims to have the piece at `index`.
    ///
    /// Indices past the end of the bitfield are treated as absent rather
    /// than raising an error, since a peer's raw bitfield may be shorter
    /// than the torrent's piece count in malformed or truncated messages.
    fn has(&self, index: PieceIndex) -> bool;

    /// Records that the peer now has the piece at `index`, growing the
    /// bitfield if necessary so the index is always in range afterwards.
    fn mark_have(&mut self, index: PieceIndex);
}

impl BitfieldExt for Bitfield {
    fn has(&self, index: PieceIndex) -> bool {
        self.get(index).map(|bit| *bit).unwrap_or(false)
    }

    fn mark_have(&mut self, index: PieceIndex) {
        if index >= self.len() {
            self.resize(index + 1, false);
        }
        self.set(index, true);
    }
}
