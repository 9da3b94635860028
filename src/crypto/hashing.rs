// This file is used to hash image bytes into a content hash.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::crypto::eth::keccak256;
use crate::domain::error::Error;
use crate::domain::model::{ContentHash, ImageAsset};

/// Hashes raw bytes into a [`ContentHash`]. Identical bytes always give identical hashes.
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    ContentHash::from_digest(digest)
}

pub fn hash_asset(asset: &ImageAsset) -> ContentHash {
    hash_bytes(asset.bytes())
}

/// Hashes the payload of a `data:<mime>;base64,<payload>` URL.
///
/// The digest covers the decoded bytes, so it matches [`hash_bytes`] over the
/// original file.
pub fn hash_data_url(data_url: &str) -> Result<ContentHash, Error> {
    let (_, bytes) = decode_data_url(data_url)?;
    Ok(hash_bytes(&bytes))
}

/// Splits a base64 data URL into its media type and decoded bytes.
pub fn decode_data_url(data_url: &str) -> Result<(String, Vec<u8>), Error> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| Error::HashComputationFailed("not a data URL".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::HashComputationFailed("data URL has no payload".to_string()))?;
    let media_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| Error::HashComputationFailed("data URL is not base64 encoded".to_string()))?;
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::HashComputationFailed(format!("undecodable payload: {}", e)))?;
    Ok((media_type.to_string(), bytes))
}

/// The 32 bytes a wallet signs for a hash: keccak-256 of the hash's `0x` string.
pub fn signing_payload(hash: &ContentHash) -> [u8; 32] {
    keccak256(hash.to_string().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        assert_eq!(
            hash_bytes(b"abc").to_string(),
            "0xba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn data_url_matches_raw_bytes() {
        let bytes = b"\x89PNG\r\n\x1a\nfake image body";
        let url = format!("data:image/png;base64,{}", STANDARD.encode(bytes));
        assert_eq!(hash_data_url(&url).unwrap(), hash_bytes(bytes));
    }

    #[test]
    fn malformed_data_urls_are_reported() {
        for bad in [
            "image/png;base64,AAAA",
            "data:image/png;base64",
            "data:image/png,AAAA",
            "data:image/png;base64,***",
        ] {
            assert!(
                matches!(hash_data_url(bad), Err(Error::HashComputationFailed(_))),
                "{bad} should fail"
            );
        }
    }

    #[test]
    fn signing_payload_depends_on_hash() {
        assert_ne!(
            signing_payload(&hash_bytes(b"a")),
            signing_payload(&hash_bytes(b"b"))
        );
    }
}
