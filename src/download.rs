//! The per-piece download routine layered on top of an established peer
//! session: issues block requests with bounded in-flight pipelining and
//! accumulates the reassembled piece buffer.

use std::time::Duration;

use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use crate::bitfield::BitfieldExt;
use crate::error::{Error, Result};
use crate::peer::PeerSession;
use crate::queue::PieceJob;
use crate::wire::Message;
use crate::{block_len, BlockInfo, BLOCK_LEN, MAX_BACKLOG};

/// Downloads a single piece over an already-handshaken session.
///
/// On any error the piece is left half-downloaded and it's the caller's
/// responsibility to requeue `job` and treat the session as unusable.
/// The whole download, from the first request to the last block, is
/// bounded by `piece_timeout`.
pub(crate) async fn download_piece<S: AsyncRead + AsyncWrite + Unpin>(
    session: &mut PeerSession<S>,
    job: PieceJob,
    piece_timeout: Duration,
) -> Result<Vec<u8>> {
    timeout(piece_timeout, download_piece_inner(session, job))
        .await
        .map_err(|_| Error::Timeout("piece download"))?
}

async fn download_piece_inner<S: AsyncRead + AsyncWrite + Unpin>(
    session: &mut PeerSession<S>,
    job: PieceJob,
) -> Result<Vec<u8>> {
    debug!("starting download of piece {}", job.index);
    let mut buffer = vec![0u8; job.len as usize];
    let mut downloaded: u32 = 0;
    let mut requested: u32 = 0;
    let mut backlog: usize = 0;

    while downloaded < job.len {
        while !session.choked && backlog < MAX_BACKLOG && requested < job.len {
            let len = block_len(job.len, (requested / BLOCK_LEN) as usize);
            session
                .send_request(BlockInfo {
                    piece_index: job.index,
                    offset: requested,
                    len,
                })
                .await?;
            requested += len;
            backlog += 1;
        }

        let msg = session.read().await?;

        match msg {
            Message::KeepAlive => trace!("received keep-alive"),
            Message::Unchoke => {
                trace!("peer unchoked us");
                session.choked = false;
            }
            Message::Choke => {
                trace!("peer choked us");
                session.choked = true;
            }
            Message::Have { piece_index } => session.bitfield.mark_have(piece_index),
            Message::Block {
                piece_index,
                offset,
                data,
            } => {
                if piece_index != job.index {
                    return Err(Error::ProtocolViolation(
                        "piece message index doesn't match the piece being downloaded",
                    ));
                }
                let begin = offset as usize;
                let end = begin
                    .checked_add(data.len())
                    .ok_or(Error::ProtocolViolation("piece block offset overflows"))?;
                if end > buffer.len() {
                    return Err(Error::ProtocolViolation(
                        "piece block extends past the piece length",
                    ));
                }
                buffer[begin..end].copy_from_slice(&data);
                downloaded += data.len() as u32;
                backlog = backlog.saturating_sub(1);
                trace!(
                    "received block for piece {} at offset {} ({}/{} bytes)",
                    job.index,
                    offset,
                    downloaded,
                    job.len
                );
            }
            // requests, cancels, bitfields mid-download, and unrecognized
            // ids are all ignored here
            _ => {}
        }
    }

    debug!("piece {} complete", job.index);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use futures::{SinkExt, StreamExt};
    use tokio_util::codec::Framed;

    use crate::wire::PeerCodec;

    use super::*;

    #[test]
    fn block_len_matches_request_sizing_used_above() {
        // sanity check that the block-sizing helper used by the request
        // loop agrees with the piece length arithmetic it's driven by
        assert_eq!(block_len(20000, 0), BLOCK_LEN);
        assert_eq!(block_len(20000, 1), 20000 - BLOCK_LEN);
    }

    /// Plays the other end of the wire: unchokes immediately, then answers
    /// every request with the matching slice of `data`.
    async fn serve_requests(stream: tokio::io::DuplexStream, data: Vec<u8>) {
        let mut framed = Framed::new(stream, PeerCodec);
        framed.send(Message::Unchoke).await.unwrap();
        while let Some(Ok(msg)) = framed.next().await {
            if let Message::Request(block) = msg {
                let begin = block.offset as usize;
                let end = begin + block.len as usize;
                framed
                    .send(Message::Block {
                        piece_index: block.piece_index,
                        offset: block.offset,
                        data: data[begin..end].to_vec(),
                    })
                    .await
                    .unwrap();
            }
        }
    }

    #[tokio::test]
    async fn reassembles_a_piece_spanning_multiple_blocks() {
        // two blocks: one full BLOCK_LEN and a short remainder, exercising
        // the pipelined request loop across more than one in-flight request
        let piece_len = BLOCK_LEN + 10;
        let data: Vec<u8> = (0..piece_len).map(|i| (i % 256) as u8).collect();

        let (client, peer) = tokio::io::duplex(256 * 1024);
        tokio::spawn(serve_requests(peer, data.clone()));

        let mut session = PeerSession::new_for_test(client, crate::Bitfield::new(), true);
        let job = PieceJob {
            index: 3,
            expected_hash: [0; 20],
            len: piece_len,
        };

        let buffer = download_piece_inner(&mut session, job).await.unwrap();
        assert_eq!(buffer, data);
    }

    #[tokio::test]
    async fn rejects_a_block_for_the_wrong_piece() {
        let (client, peer) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            let mut framed = Framed::new(peer, PeerCodec);
            framed.send(Message::Unchoke).await.unwrap();
            if let Some(Ok(Message::Request(block))) = framed.next().await {
                framed
                    .send(Message::Block {
                        piece_index: block.piece_index + 1,
                        offset: block.offset,
                        data: vec![0u8; block.len as usize],
                    })
                    .await
                    .unwrap();
            }
        });

        let mut session = PeerSession::new_for_test(client, crate::Bitfield::new(), true);
        let job = PieceJob {
            index: 3,
            expected_hash: [0; 20],
            len: 20,
        };

        let err = download_piece_inner(&mut session, job).await.unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn honors_choke_before_the_peer_unchokes() {
        // the peer stays silent for a beat, then unchokes and serves the
        // single block; the request loop must wait rather than send while
        // still choked
        let data = vec![7u8; 20];
        let (client, peer) = tokio::io::duplex(64 * 1024);
        tokio::spawn(serve_requests(peer, data.clone()));

        let mut session = PeerSession::new_for_test(client, crate::Bitfield::new(), true);
        assert!(session.choked);
        let job = PieceJob {
            index: 0,
            expected_hash: [0; 20],
            len: 20,
        };

        let buffer = download_piece_inner(&mut session, job).await.unwrap();
        assert_eq!(buffer, data);
        assert!(!session.choked);
    }
}
