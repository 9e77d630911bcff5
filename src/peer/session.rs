use std::io;
use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{Framed, FramedParts};

use crate::conf::Conf;
use crate::error::{Error, Result};
use crate::wire::{Handshake, HandshakeCodec, Message, PeerCodec};
use crate::{Bitfield, BlockInfo, PeerId, PieceIndex, Sha1Hash};

/// An open connection to a single peer, past the handshake.
///
/// Holds the peer's announced bitfield and the framed socket used to
/// exchange messages. Connecting enforces the handshake deadline from
/// [`Conf`] and requires the peer's first message to be a bitfield, per
/// the usual BitTorrent v1 connection sequence.
///
/// Generic over the underlying byte stream so tests can drive a session
/// over an in-memory duplex pipe instead of a real [`TcpStream`]; outside
/// tests `S` is always `TcpStream`.
pub(crate) struct PeerSession<S = TcpStream> {
    framed: Framed<S, PeerCodec>,
    pub bitfield: Bitfield,
    /// Whether the remote peer is currently choking us. Starts `true` and
    /// is updated by whichever caller reads `choke`/`unchoke` messages off
    /// [`PeerSession::read`].
    pub choked: bool,
}

impl PeerSession<TcpStream> {
    /// Connects to `addr`, performs the handshake, and waits for the
    /// peer's initial bitfield.
    pub(crate) async fn connect(
        addr: SocketAddr,
        info_hash: Sha1Hash,
        client_id: PeerId,
        conf: &Conf,
    ) -> Result<Self> {
        info!("connecting to peer {}", addr);
        let stream = timeout(conf.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Timeout("connect"))??;
        info!("connected to peer {}", addr);

        // the handshake and the wait for the peer's initial bitfield share
        // a single deadline: spec.md's "read remote handshake within 3
        // seconds total" covers the whole opening exchange, not each leg
        // of it separately.
        let (framed, bitfield) = timeout(
            conf.handshake_timeout,
            handshake_and_await_bitfield(stream, info_hash, client_id, addr),
        )
        .await
        .map_err(|_| Error::Timeout("handshake"))??;

        info!("peer {} session ready, bitfield received", addr);

        Ok(Self {
            framed,
            bitfield,
            choked: true,
        })
    }
}

async fn handshake_and_await_bitfield<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    info_hash: Sha1Hash,
    client_id: PeerId,
    addr: SocketAddr,
) -> Result<(Framed<S, PeerCodec>, Bitfield)> {
    let mut handshake_framed = Framed::new(stream, HandshakeCodec);

    debug!("sending handshake to peer {}", addr);
    handshake_framed
        .send(Handshake::new(info_hash, client_id))
        .await?;

    let peer_handshake = handshake_framed
        .next()
        .await
        .ok_or(Error::InvalidHandshake)??;
    debug!("received handshake from peer {}", addr);

    if peer_handshake.info_hash != info_hash {
        warn!("peer {} handshake carries a mismatched info hash", addr);
        return Err(Error::InfoHashMismatch);
    }

    let old_parts = handshake_framed.into_parts();
    let mut new_parts = FramedParts::new(old_parts.io, PeerCodec);
    new_parts.read_buf = old_parts.read_buf;
    new_parts.write_buf = old_parts.write_buf;
    let mut framed = Framed::from_parts(new_parts);

    let first = framed.next().await.ok_or(Error::ExpectedBitfield)??;

    let bitfield = match first {
        Message::Bitfield(bitfield) => bitfield,
        _ => {
            warn!("peer {} didn't send a bitfield as its first message", addr);
            return Err(Error::ExpectedBitfield);
        }
    };

    Ok((framed, bitfield))
}

impl<S: AsyncRead + AsyncWrite + Unpin> PeerSession<S> {
    /// Builds a session directly from an already-open stream and a given
    /// bitfield, skipping the handshake. Only used by tests driving the
    /// piece downloader over an in-memory duplex pipe.
    #[cfg(test)]
    pub(crate) fn new_for_test(stream: S, bitfield: Bitfield, choked: bool) -> Self {
        Self {
            framed: Framed::new(stream, PeerCodec),
            bitfield,
            choked,
        }
    }

    pub(crate) async fn send_unchoke(&mut self) -> Result<()> {
        debug!("sending unchoke");
        self.framed.send(Message::Unchoke).await.map_err(Error::Io)
    }

    pub(crate) async fn send_interested(&mut self) -> Result<()> {
        debug!("sending interested");
        self.framed.send(Message::Interested).await.map_err(Error::Io)
    }

    pub(crate) async fn send_have(&mut self, piece_index: PieceIndex) -> Result<()> {
        debug!("sending have({})", piece_index);
        self.framed
            .send(Message::Have { piece_index })
            .await
            .map_err(Error::Io)
    }

    pub(crate) async fn send_request(&mut self, block: BlockInfo) -> Result<()> {
        debug!(
            "sending request(index={}, begin={}, length={})",
            block.piece_index, block.offset, block.len
        );
        self.framed.send(Message::Request(block)).await.map_err(Error::Io)
    }

    /// Reads the next message, blocking until one arrives or the
    /// connection closes.
    pub(crate) async fn read(&mut self) -> Result<Message> {
        match self.framed.next().await {
            Some(msg) => msg.map_err(Error::Io),
            None => Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed the connection",
            ))),
        }
    }
}
