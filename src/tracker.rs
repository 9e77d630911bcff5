//! HTTP tracker client: announces this download and decodes the compact
//! peer list from the response.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use log::{debug, info};
use percent_encoding::{percent_encode, NON_ALPHANUMERIC};
use url::Url;

use crate::conf::ANNOUNCE_PORT;
use crate::error::{Error, Result};
use crate::metainfo::Metainfo;

/// Announces to the tracker named in `metainfo.announce` and returns the
/// peers from its compact peer list.
pub(crate) async fn announce(
    http: &reqwest::Client,
    metainfo: &Metainfo,
) -> Result<Vec<SocketAddr>> {
    let url = announce_url(metainfo)?;
    info!("announcing to tracker {}", metainfo.announce);
    let body = http.get(url).send().await?.bytes().await?;
    debug!("tracker responded with {} bytes", body.len());
    let raw: RawResponse = serde_bencode::from_bytes(&body)?;

    if raw.failure_reason.is_some() {
        return Err(Error::MalformedTrackerResponse(
            "tracker returned a failure reason",
        ));
    }

    let peers = raw
        .peers
        .ok_or(Error::MalformedTrackerResponse("response is missing peers"))?;
    parse_compact_peers(peers.as_slice())
}

/// Builds the announce URL. `info_hash` and `peer_id` are percent-encoded
/// ourselves rather than through [`Url`]'s own query builder, since
/// neither is necessarily valid UTF-8; [`Url::set_query`] takes the
/// pre-encoded string as-is instead of re-encoding it.
fn announce_url(metainfo: &Metainfo) -> Result<Url> {
    let mut url = Url::parse(&metainfo.announce)
        .map_err(|_| Error::InvalidMetainfo("announce is not a valid URL"))?;
    let info_hash = percent_encode(&metainfo.info_hash, NON_ALPHANUMERIC);
    let peer_id = percent_encode(&metainfo.peer_id, NON_ALPHANUMERIC);
    let query = format!(
        "info_hash={info_hash}&peer_id={peer_id}&port={port}&\
         uploaded=0&downloaded=0&compact=1&left={left}",
        info_hash = info_hash,
        peer_id = peer_id,
        port = ANNOUNCE_PORT,
        left = metainfo.length,
    );
    url.set_query(Some(&query));
    Ok(url)
}

/// Parses a tracker's compact peer list: 4 bytes of IPv4 address followed
/// by a 2 byte big-endian port, repeated once per peer.
fn parse_compact_peers(bytes: &[u8]) -> Result<Vec<SocketAddr>> {
    if bytes.len() % 6 != 0 {
        return Err(Error::MalformedTrackerResponse(
            "compact peer list length is not a multiple of 6",
        ));
    }
    Ok(bytes
        .chunks_exact(6)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddr::new(IpAddr::V4(ip), port)
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    peers: Option<serde_bytes::ByteBuf>,
    #[serde(rename = "failure reason")]
    #[serde(default)]
    failure_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metainfo(announce: &str) -> Metainfo {
        Metainfo {
            announce: announce.into(),
            info_hash: [0x11; 20],
            name: "file".into(),
            length: 1024,
            piece_length: 256,
            pieces: vec![[0; 20]; 4],
            peer_id: [0x22; 20],
        }
    }

    #[test]
    fn decode_compact_peers_matches_spec_scenario() {
        let bytes = [0x7F, 0x00, 0x00, 0x01, 0x1A, 0xE1];
        let peers = parse_compact_peers(&bytes).unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0], "127.0.0.1:6881".parse().unwrap());
    }

    #[test]
    fn decode_rejects_length_not_multiple_of_6() {
        let bytes = [0x7F, 0x00, 0x00, 0x01, 0x1A];
        assert!(parse_compact_peers(&bytes).is_err());
    }

    #[test]
    fn announce_url_includes_percent_encoded_info_hash() {
        let meta = metainfo("http://tracker.local/announce");
        let url = announce_url(&meta).unwrap().to_string();
        assert!(url.starts_with("http://tracker.local/announce?info_hash=%11%11%11"));
        assert!(url.contains("compact=1"));
        assert!(url.contains(&format!("left={}", meta.length)));
    }

    #[test]
    fn announce_url_rejects_unparseable_announce() {
        let meta = metainfo("not a url");
        assert!(announce_url(&meta).is_err());
    }

    #[tokio::test]
    async fn announce_parses_compact_peers_from_mocked_tracker() {
        let peer_bytes = [10, 0, 0, 1, 0x1A, 0xE1];
        let mut body = format!("d5:peers{}:", peer_bytes.len()).into_bytes();
        body.extend_from_slice(&peer_bytes);
        body.push(b'e');

        let _mock = mockito::mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_body(body)
            .create();

        let meta = metainfo(&mockito::server_url());
        let http = reqwest::Client::new();
        let peers = announce(&http, &meta).await.unwrap();
        assert_eq!(peers, vec!["10.0.0.1:6881".parse().unwrap()]);
    }
}
