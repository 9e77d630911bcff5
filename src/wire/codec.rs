//! `tokio_util::codec::{Encoder, Decoder}` implementations for the
//! handshake frame and the peer message frames.

use std::convert::TryInto;
use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::handshake::Handshake;
use super::message::{Message, MessageId};
use crate::{Bitfield, BlockInfo};

/// Codec for the 68 byte handshake frame, used only for the single
/// handshake exchange at the start of a peer connection. The connection
/// switches over to [`PeerCodec`] immediately after.
pub(crate) struct HandshakeCodec;

impl Encoder<Handshake> for HandshakeCodec {
    type Error = io::Error;

    fn encode(&mut self, handshake: Handshake, buf: &mut BytesMut) -> io::Result<()> {
        let Handshake {
            prot,
            info_hash,
            peer_id,
        } = handshake;
        buf.reserve(1 + prot.len() + 48);
        buf.put_u8(prot.len() as u8);
        buf.put_slice(&prot);
        buf.put_slice(&[0u8; 8]);
        buf.put_slice(&info_hash);
        buf.put_slice(&peer_id);
        Ok(())
    }
}

impl Decoder for HandshakeCodec {
    type Item = Handshake;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Handshake>> {
        if buf.is_empty() {
            return Ok(None);
        }

        let prot_len = buf[0] as usize;
        if prot_len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "handshake pstrlen is 0",
            ));
        }

        // 1 byte pstrlen + pstr + 8 reserved + 20 info_hash + 20 peer_id
        let total_len = 1 + prot_len + 48;
        if buf.len() < total_len {
            return Ok(None);
        }

        let mut frame = buf.split_to(total_len);
        frame.advance(1);
        let prot = frame.split_to(prot_len).to_vec();
        frame.advance(8);
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&frame.split_to(20));
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&frame[..20]);

        Ok(Some(Handshake {
            prot,
            info_hash,
            peer_id,
        }))
    }
}

/// Codec for the length-prefixed messages exchanged after the handshake.
pub(crate) struct PeerCodec;

impl Encoder<Message> for PeerCodec {
    type Error = io::Error;

    fn encode(&mut self, msg: Message, buf: &mut BytesMut) -> io::Result<()> {
        match msg {
            Message::KeepAlive => {
                buf.put_u32(0);
            }
            Message::Choke => put_id_only(buf, MessageId::Choke),
            Message::Unchoke => put_id_only(buf, MessageId::Unchoke),
            Message::Interested => put_id_only(buf, MessageId::Interested),
            Message::NotInterested => put_id_only(buf, MessageId::NotInterested),
            Message::Have { piece_index } => {
                buf.put_u32(5);
                buf.put_u8(MessageId::Have as u8);
                buf.put_u32(piece_index as u32);
            }
            Message::Bitfield(bitfield) => {
                let bytes = bitfield.into_vec();
                buf.put_u32(1 + bytes.len() as u32);
                buf.put_u8(MessageId::Bitfield as u8);
                buf.put_slice(&bytes);
            }
            Message::Request(block) => put_block_info(buf, MessageId::Request, &block),
            Message::Cancel(block) => put_block_info(buf, MessageId::Cancel, &block),
            Message::Block {
                piece_index,
                offset,
                data,
            } => {
                buf.put_u32(1 + 4 + 4 + data.len() as u32);
                buf.put_u8(MessageId::Piece as u8);
                buf.put_u32(piece_index as u32);
                buf.put_u32(offset);
                buf.put_slice(&data);
            }
            Message::Unknown { id, payload } => {
                buf.put_u32(1 + payload.len() as u32);
                buf.put_u8(id);
                buf.put_slice(&payload);
            }
        }
        Ok(())
    }
}

fn put_id_only(buf: &mut BytesMut, id: MessageId) {
    buf.put_u32(1);
    buf.put_u8(id as u8);
}

fn put_block_info(buf: &mut BytesMut, id: MessageId, block: &BlockInfo) {
    buf.put_u32(1 + 12);
    buf.put_u8(id as u8);
    buf.put_u32(block.piece_index as u32);
    buf.put_u32(block.offset);
    buf.put_u32(block.len);
}

impl Decoder for PeerCodec {
    type Item = Message;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Message>> {
        if buf.len() < 4 {
            return Ok(None);
        }

        let length = u32::from_be_bytes(buf[..4].try_into().unwrap()) as usize;
        if length == 0 {
            buf.advance(4);
            return Ok(Some(Message::KeepAlive));
        }

        if buf.len() < 4 + length {
            // make sure we have room to read the rest of the frame once it
            // arrives
            buf.reserve(4 + length - buf.len());
            return Ok(None);
        }

        buf.advance(4);
        let frame = buf.split_to(length);
        let id = frame[0];
        let payload = &frame[1..];

        let msg = match MessageId::from_u8(id) {
            Some(MessageId::Choke) => Message::Choke,
            Some(MessageId::Unchoke) => Message::Unchoke,
            Some(MessageId::Interested) => Message::Interested,
            Some(MessageId::NotInterested) => Message::NotInterested,
            Some(MessageId::Have) => {
                if payload.len() != 4 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "have payload must be exactly 4 bytes",
                    ));
                }
                let piece_index =
                    u32::from_be_bytes(payload.try_into().unwrap()) as usize;
                Message::Have { piece_index }
            }
            Some(MessageId::Bitfield) => {
                Message::Bitfield(Bitfield::from_vec(payload.to_vec()))
            }
            Some(MessageId::Request) => {
                Message::Request(parse_block_info(payload)?)
            }
            Some(MessageId::Cancel) => Message::Cancel(parse_block_info(payload)?),
            Some(MessageId::Piece) => {
                if payload.len() < 8 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "piece payload shorter than 8 bytes",
                    ));
                }
                let piece_index =
                    u32::from_be_bytes(payload[0..4].try_into().unwrap()) as usize;
                let offset = u32::from_be_bytes(payload[4..8].try_into().unwrap());
                let data = payload[8..].to_vec();
                Message::Block {
                    piece_index,
                    offset,
                    data,
                }
            }
            None => Message::Unknown {
                id,
                payload: payload.to_vec(),
            },
        };

        Ok(Some(msg))
    }
}

fn parse_block_info(payload: &[u8]) -> io::Result<BlockInfo> {
    if payload.len() != 12 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "request/cancel payload must be exactly 12 bytes",
        ));
    }
    let piece_index = u32::from_be_bytes(payload[0..4].try_into().unwrap()) as usize;
    let offset = u32::from_be_bytes(payload[4..8].try_into().unwrap());
    let len = u32::from_be_bytes(payload[8..12].try_into().unwrap());
    Ok(BlockInfo {
        piece_index,
        offset,
        len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(mut buf: BytesMut) -> Message {
        PeerCodec.decode(&mut buf).unwrap().unwrap()
    }

    #[test]
    fn keep_alive_decodes_to_null_message() {
        let buf = BytesMut::from(&[0x00, 0x00, 0x00, 0x00][..]);
        assert_eq!(decode_all(buf), Message::KeepAlive);
    }

    #[test]
    fn unchoke_decodes_with_empty_payload() {
        let buf = BytesMut::from(&[0x00, 0x00, 0x00, 0x01, 0x01][..]);
        assert_eq!(decode_all(buf), Message::Unchoke);
    }

    #[test]
    fn request_encodes_to_spec_bytes() {
        let mut buf = BytesMut::new();
        PeerCodec
            .encode(
                Message::Request(BlockInfo {
                    piece_index: 7,
                    offset: 16384,
                    len: 16384,
                }),
                &mut buf,
            )
            .unwrap();

        let expected: [u8; 17] = [
            0x00, 0x00, 0x00, 0x0D, 0x06, 0x00, 0x00, 0x00, 0x07, 0x00, 0x00, 0x40,
            0x00, 0x00, 0x00, 0x40, 0x00,
        ];
        assert_eq!(&buf[..], &expected[..]);
    }

    #[test]
    fn round_trips_have_interested_and_request() {
        for msg in [
            Message::Unchoke,
            Message::Interested,
            Message::Have { piece_index: 42 },
            Message::Request(BlockInfo {
                piece_index: 3,
                offset: 32768,
                len: 16384,
            }),
        ] {
            let mut buf = BytesMut::new();
            PeerCodec.encode(msg.clone(), &mut buf).unwrap();
            let decoded = PeerCodec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn short_piece_payload_is_a_protocol_error() {
        // length=4 (id + 3 bytes), id=7 (piece), only 3 payload bytes
        let buf = BytesMut::from(&[0x00, 0x00, 0x00, 0x04, 0x07, 0x01, 0x02, 0x03][..]);
        let mut buf = buf;
        assert!(PeerCodec.decode(&mut buf).is_err());
    }

    #[test]
    fn unknown_id_decodes_without_erroring() {
        let buf = BytesMut::from(&[0x00, 0x00, 0x00, 0x02, 0x14, 0xFF][..]);
        let mut buf = buf;
        let msg = PeerCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            msg,
            Message::Unknown {
                id: 0x14,
                payload: vec![0xFF]
            }
        );
    }
}
