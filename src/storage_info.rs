//! Piece-size bookkeeping derived from a torrent's metainfo: piece count,
//! nominal and last piece length, and the byte offset of each piece in the
//! assembled output.

use crate::error::{Error, Result};
use crate::metainfo::Metainfo;
use crate::PieceIndex;

/// Derived, easy-to-query storage facts about a torrent.
#[derive(Clone, Copy, Debug)]
pub struct StorageInfo {
    /// The number of pieces in the torrent.
    pub piece_count: usize,
    /// The nominal length of a piece.
    pub piece_len: u32,
    /// The length of the last piece, which may be shorter than
    /// `piece_len` if the file length isn't an exact multiple of it.
    pub last_piece_len: u32,
    /// The total length of the file.
    pub total_len: u64,
}

impl StorageInfo {
    /// Derives storage facts from a torrent's metainfo.
    pub fn new(metainfo: &Metainfo) -> Self {
        let piece_count = metainfo.pieces.len();
        let piece_len = metainfo.piece_length;
        let last_piece_len =
            metainfo.length - piece_len as u64 * (piece_count - 1) as u64;
        Self {
            piece_count,
            piece_len,
            last_piece_len: last_piece_len as u32,
            total_len: metainfo.length,
        }
    }

    /// Returns the length of the piece at `index`.
    pub fn piece_len(&self, index: PieceIndex) -> Result<u32> {
        if index == self.piece_count - 1 {
            Ok(self.last_piece_len)
        } else if index < self.piece_count - 1 {
            Ok(self.piece_len)
        } else {
            Err(Error::InvalidPieceIndex)
        }
    }

    /// Returns the byte offset in the assembled output at which the piece
    /// at `index` starts.
    pub fn piece_offset(&self, index: PieceIndex) -> u64 {
        index as u64 * self.piece_len as u64
    }
}
