//! Piece integrity checking: hashing a completed piece buffer and
//! comparing it against the digest named in the metainfo.

use sha1::{Digest, Sha1};

use crate::Sha1Hash;

/// Returns whether `data`'s SHA-1 digest matches `expected`.
pub fn verify_piece(data: &[u8], expected: &Sha1Hash) -> bool {
    let digest = Sha1::digest(data);
    digest.as_slice() == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_data_passes() {
        let data = vec![0x61u8; 16384];
        let digest = Sha1::digest(&data);
        let mut expected = [0u8; 20];
        expected.copy_from_slice(&digest);
        assert!(verify_piece(&data, &expected));
    }

    #[test]
    fn single_flipped_byte_fails() {
        let mut data = vec![0x61u8; 16384];
        let digest = Sha1::digest(&data);
        let mut expected = [0u8; 20];
        expected.copy_from_slice(&digest);

        data[0] = 0x62;
        assert!(!verify_piece(&data, &expected));
    }
}
