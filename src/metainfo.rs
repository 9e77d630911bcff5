//! Parsing of the bencoded `.torrent` metainfo file into the input contract
//! the rest of the crate works with: a `serde_bencode`-derived raw shape
//! plus a `sha1` digest of the re-encoded `info` dictionary.

use sha1::{Digest, Sha1};

use crate::conf::generate_peer_id;
use crate::error::{Error, Result};
use crate::{PeerId, Sha1Hash};

/// The parsed, single-file metainfo a download is run against: everything
/// the swarm coordinator, tracker client and peer sessions need to know
/// about the torrent, plus the locally generated peer id for this session.
#[derive(Debug, Clone)]
pub struct Metainfo {
    /// The tracker's announce URL.
    pub announce: String,
    /// SHA-1 digest of the bencoded `info` dictionary, exactly as
    /// re-encoded with its keys in sorted order.
    pub info_hash: Sha1Hash,
    /// The suggested file name.
    pub name: String,
    /// The total length of the file, in bytes.
    pub length: u64,
    /// The nominal length of a piece, in bytes. The final piece may be
    /// shorter.
    pub piece_length: u32,
    /// The ordered SHA-1 digests, one per piece.
    pub pieces: Vec<Sha1Hash>,
    /// The 20 byte peer id randomly generated for this download session.
    pub peer_id: PeerId,
}

impl Metainfo {
    /// Parses a metainfo file's raw bytes into a [`Metainfo`].
    ///
    /// Generates a fresh random peer id for the session as a side effect.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let raw: RawMetainfo = serde_bencode::from_bytes(buf)?;

        if raw.info.pieces.len() % 20 != 0 {
            return Err(Error::InvalidMetainfo(
                "pieces is not a multiple of 20 bytes",
            ));
        }
        if raw.info.length == 0 {
            return Err(Error::InvalidMetainfo("length must be non-zero"));
        }
        if raw.info.piece_length == 0 {
            return Err(Error::InvalidMetainfo("piece length must be non-zero"));
        }

        let actual_piece_count = raw.info.pieces.len() / 20;
        let expected_piece_count = ((raw.info.length + raw.info.piece_length - 1)
            / raw.info.piece_length) as usize;
        if actual_piece_count == 0 || actual_piece_count != expected_piece_count {
            return Err(Error::InvalidMetainfo(
                "pieces count doesn't match ceil(length / piece length)",
            ));
        }

        let pieces = raw
            .info
            .pieces
            .chunks_exact(20)
            .map(|chunk| {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect();

        let info_hash = raw.info.hash()?;

        Ok(Self {
            announce: raw.announce,
            info_hash,
            name: raw.info.name,
            length: raw.info.length,
            piece_length: raw.info.piece_length as u32,
            pieces,
            peer_id: generate_peer_id(),
        })
    }
}

/// The raw bencoded metainfo shape, used only to parse the file and compute
/// the info hash.
#[derive(Debug, Deserialize)]
struct RawMetainfo {
    announce: String,
    info: RawInfo,
}

/// The raw `info` dictionary.
///
/// Field declaration order matters here: `serde_bencode` serializes struct
/// fields in the order they're declared, and the info hash must be computed
/// over the dictionary with its keys in sorted byte-string order --
/// `length` < `name` < `piece length` < `pieces` -- which is exactly the
/// order below.
#[derive(Debug, Serialize, Deserialize)]
struct RawInfo {
    length: u64,
    name: String,
    #[serde(rename = "piece length")]
    piece_length: u64,
    #[serde(with = "serde_bytes")]
    pieces: Vec<u8>,
}

impl RawInfo {
    fn hash(&self) -> Result<Sha1Hash> {
        let bytes = serde_bencode::to_bytes(self)?;
        let digest = Sha1::digest(&bytes);
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&digest);
        Ok(hash)
    }
}
