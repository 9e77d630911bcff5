//! Crate-wide error type: a plain enum with a hand-written `Display` and
//! the usual `From` conversions.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// An IO error occurred on a socket or file.
    Io(std::io::Error),
    /// The metainfo file or a tracker response could not be parsed as
    /// bencode, or didn't have the shape we expected.
    Bencode(serde_bencode::Error),
    /// The tracker HTTP request itself failed (connection, TLS, etc).
    Http(reqwest::Error),
    /// A deadline (connect, handshake, or piece download) elapsed.
    Timeout(&'static str),
    /// The metainfo file was missing a required field or had a field of the
    /// wrong shape (e.g. `pieces` not a multiple of 20 bytes).
    InvalidMetainfo(&'static str),
    /// The tracker's response was structurally a valid bencode dictionary,
    /// but not one we could use (e.g. `peers` missing, or not a multiple of
    /// 6 bytes).
    MalformedTrackerResponse(&'static str),
    /// `pstrlen` in a handshake frame was 0.
    InvalidHandshake,
    /// The peer's handshake carried an info hash that didn't match ours.
    InfoHashMismatch,
    /// The first message after the handshake wasn't a bitfield.
    ExpectedBitfield,
    /// A `piece` message was shorter than the 8-byte index+begin prefix, or
    /// carried an index that didn't match the piece being downloaded.
    ProtocolViolation(&'static str),
    /// A piece index was out of the torrent's range.
    InvalidPieceIndex,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::Bencode(e) => write!(f, "bencode error: {}", e),
            Error::Http(e) => write!(f, "http error: {}", e),
            Error::Timeout(op) => write!(f, "timed out during {}", op),
            Error::InvalidMetainfo(why) => write!(f, "invalid metainfo: {}", why),
            Error::MalformedTrackerResponse(why) => {
                write!(f, "malformed tracker response: {}", why)
            }
            Error::InvalidHandshake => write!(f, "invalid handshake"),
            Error::InfoHashMismatch => {
                write!(f, "peer's info hash doesn't match ours")
            }
            Error::ExpectedBitfield => {
                write!(f, "expected bitfield as first message")
            }
            Error::ProtocolViolation(why) => write!(f, "protocol violation: {}", why),
            Error::InvalidPieceIndex => write!(f, "invalid piece index"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Bencode(e) => Some(e),
            Error::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_bencode::Error> for Error {
    fn from(e: serde_bencode::Error) -> Self {
        Error::Bencode(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout("deadline")
    }
}
