//! Facts about the torrent shared read-only across every peer worker.

use crate::metainfo::Metainfo;
use crate::storage_info::StorageInfo;
use crate::{PeerId, Sha1Hash};

/// Immutable per-download state handed to every worker.
pub(crate) struct SharedStatus {
    pub info_hash: Sha1Hash,
    pub client_id: PeerId,
    pub storage: StorageInfo,
}

impl SharedStatus {
    pub(crate) fn new(metainfo: &Metainfo) -> Self {
        Self {
            info_hash: metainfo.info_hash,
            client_id: metainfo.peer_id,
            storage: StorageInfo::new(metainfo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metainfo() -> Metainfo {
        Metainfo {
            announce: "http://tracker.local".into(),
            info_hash: [3; 20],
            name: "file".into(),
            length: 40,
            piece_length: 10,
            pieces: vec![[0; 20]; 4],
            peer_id: [9; 20],
        }
    }

    #[test]
    fn carries_info_hash_and_client_id_from_metainfo() {
        let meta = metainfo();
        let status = SharedStatus::new(&meta);
        assert_eq!(status.info_hash, [3; 20]);
        assert_eq!(status.client_id, [9; 20]);
        assert_eq!(status.storage.piece_count, 4);
    }
}
