//! Value types shared by the registration and verification workflows.

use primitive_types::{H160, H256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::crypto::eth;
use crate::domain::error::Error;

/// An image captured from a drop, a file picker or a camera.
///
/// The bytes are shared, never mutated: a new capture means a new asset.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageAsset {
    bytes: Arc<[u8]>,
    media_type: String,
    file_name: String,
}

impl ImageAsset {
    /// Builds an asset, rejecting empty files and anything that is not `image/*`.
    pub fn new(
        bytes: impl Into<Vec<u8>>,
        media_type: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Result<Self, Error> {
        let bytes = bytes.into();
        let media_type = media_type.into();
        let file_name = file_name.into();

        if !media_type.to_ascii_lowercase().starts_with("image/") {
            return Err(Error::InvalidAsset(format!(
                "{} has media type '{}'",
                file_name, media_type
            )));
        }
        if bytes.is_empty() {
            return Err(Error::InvalidAsset(format!("{} is empty", file_name)));
        }

        Ok(Self {
            bytes: bytes.into(),
            media_type,
            file_name,
        })
    }

    /// Reads an image from disk, guessing its media type from the extension.
    pub async fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::InvalidAsset(format!("Error reading file {}: {}", path.display(), e)))?;
        let media_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::new(bytes, media_type, file_name)
    }

    /// Builds an asset from a `data:<mime>;base64,<payload>` URL.
    pub fn from_data_url(data_url: &str, file_name: impl Into<String>) -> Result<Self, Error> {
        let (media_type, bytes) = crate::crypto::hashing::decode_data_url(data_url)?;
        Self::new(bytes, media_type, file_name)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> Arc<[u8]> {
        self.bytes.clone()
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAsset")
            .field("file_name", &self.file_name)
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Parses `0x`-prefixed hex of an exact byte length.
fn parse_prefixed_hex(s: &str, len: usize, what: &str) -> Result<Vec<u8>, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or_else(|| format!("{} must start with 0x", what))?;
    let bytes = hex::decode(digits).map_err(|e| format!("{} is not valid hex: {}", what, e))?;
    if bytes.len() != len {
        return Err(format!(
            "{} must be {} bytes, got {}",
            what,
            len,
            bytes.len()
        ));
    }
    Ok(bytes)
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

/// SHA-256 digest of an image, rendered as `0x` + 64 lowercase hex chars.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(H256);

impl ContentHash {
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(H256::from(digest))
    }

    pub fn as_h256(&self) -> H256 {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_fixed_bytes()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0.as_bytes()))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self)
    }
}

impl FromStr for ContentHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = parse_prefixed_hex(s.trim(), 32, "content hash")?;
        Ok(Self(H256::from_slice(&bytes)))
    }
}

string_serde!(ContentHash);

/// A 20-byte account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(H160);

impl Address {
    pub const ZERO: Address = Address(H160([0u8; 20]));

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(H160(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        self.0.as_fixed_bytes()
    }

    /// The registry answers with the zero address for hashes nobody registered.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// EIP-55 mixed-case rendering.
    pub fn to_checksum(&self) -> String {
        eth::to_checksum_address(self.as_bytes())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0.as_bytes()))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = parse_prefixed_hex(s.trim(), 20, "address")?;
        Ok(Self(H160::from_slice(&bytes)))
    }
}

string_serde!(Address);

/// Content identifier returned by the storage network.
///
/// Opaque: it cannot be derived from the [`ContentHash`] and is only known
/// after a successful upload.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageReference(String);

impl StorageReference {
    pub fn new(cid: impl Into<String>) -> Self {
        Self(cid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `https://<gateway>/ipfs/<cid>`
    pub fn gateway_url(&self, gateway: &str) -> String {
        format!(
            "https://{}/ipfs/{}",
            gateway.trim_start_matches("https://").trim_end_matches('/'),
            self.0
        )
    }
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageReference({})", self.0)
    }
}

/// The connected account and the chain it was on when confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletIdentity {
    pub address: Address,
    pub chain_id: u64,
}

/// Recoverable ECDSA signature, `r || s || v` with `v` in {27, 28}.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 65]);

impl Signature {
    pub fn from_bytes(bytes: [u8; 65]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    /// Recovery id normalised to 0 or 1. Accepts legacy (27/28) and raw (0/1) `v`.
    pub fn recovery_id(&self) -> Option<u8> {
        match self.0[64] {
            0 | 27 => Some(0),
            1 | 28 => Some(1),
            _ => None,
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self)
    }
}

impl FromStr for Signature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = parse_prefixed_hex(s.trim(), 65, "signature")?;
        let mut out = [0u8; 65];
        out.copy_from_slice(&bytes);
        // Some wallets return a raw recovery id; ecrecover wants 27/28.
        if out[64] < 27 {
            out[64] += 27;
        }
        Ok(Self(out))
    }
}

string_serde!(Signature);

/// A registration the chain has confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub hash: ContentHash,
    pub cid: StorageReference,
    pub signature: Signature,
    pub registrant: Address,
    /// `0x`-prefixed transaction hash.
    pub transaction_hash: String,
    pub block_number: u64,
}

/// Result of asking the registry who registered a hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "registrant", rename_all = "snake_case")]
pub enum LookupOutcome {
    Unregistered,
    RegisteredBy(Address),
}

impl LookupOutcome {
    /// Maps the registry's raw answer; the zero address means "not registered".
    pub fn from_registrar(address: Address) -> Self {
        if address.is_zero() {
            Self::Unregistered
        } else {
            Self::RegisteredBy(address)
        }
    }

    pub fn registrant(&self) -> Option<Address> {
        match self {
            Self::Unregistered => None,
            Self::RegisteredBy(a) => Some(*a),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Unregistered => "Image is not registered.".to_string(),
            Self::RegisteredBy(a) => format!("Image is already registered by {}", a.to_checksum()),
        }
    }
}

/// Human-readable identity attached to an address by the identity-lookup service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub address: Address,
    /// Primary ENS-style domain, if the address resolves to one.
    pub domain_name: Option<String>,
    pub socials: Vec<SocialProfile>,
}

impl Profile {
    pub fn is_empty(&self) -> bool {
        self.domain_name.is_none() && self.socials.is_empty()
    }

    /// Best short label for display: the domain, else the first social profile name.
    pub fn display_name(&self) -> Option<&str> {
        self.domain_name
            .as_deref()
            .or_else(|| self.socials.iter().find_map(|s| s.profile_name.as_deref()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialProfile {
    pub dapp_name: Option<String>,
    pub profile_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_asset_rejects_non_images() {
        let err = ImageAsset::new(vec![1, 2, 3], "text/plain", "notes.txt").unwrap_err();
        assert!(matches!(err, Error::InvalidAsset(_)));
    }

    #[test]
    fn image_asset_rejects_empty_files() {
        let err = ImageAsset::new(Vec::new(), "image/png", "empty.png").unwrap_err();
        assert!(matches!(err, Error::InvalidAsset(_)));
    }

    #[test]
    fn content_hash_parses_its_own_rendering() {
        let hash = ContentHash::from_digest([0xab; 32]);
        let rendered = hash.to_string();
        assert_eq!(rendered.len(), 66);
        assert_eq!(rendered.parse::<ContentHash>().unwrap(), hash);
    }

    #[test]
    fn content_hash_requires_prefix_and_length() {
        assert!("ab".repeat(32).parse::<ContentHash>().is_err());
        assert!("0xabcd".parse::<ContentHash>().is_err());
    }

    #[test]
    fn zero_registrar_means_unregistered() {
        assert_eq!(LookupOutcome::from_registrar(Address::ZERO), LookupOutcome::Unregistered);
        let a: Address = "0x00000000000000000000000000000000000000ab".parse().unwrap();
        assert_eq!(LookupOutcome::from_registrar(a), LookupOutcome::RegisteredBy(a));
    }

    #[test]
    fn lookup_messages() {
        assert_eq!(LookupOutcome::Unregistered.message(), "Image is not registered.");
        let a: Address = "0xabcd000000000000000000000000000000000001".parse().unwrap();
        let msg = LookupOutcome::RegisteredBy(a).message();
        assert!(msg.starts_with("Image is already registered by 0x"));
        assert!(msg.to_lowercase().ends_with("abcd000000000000000000000000000000000001"));
    }

    #[test]
    fn gateway_url_format() {
        let cid = StorageReference::new("QmTest");
        assert_eq!(
            cid.gateway_url("gateway.lighthouse.storage"),
            "https://gateway.lighthouse.storage/ipfs/QmTest"
        );
    }

    #[test]
    fn signature_recovery_id_accepts_both_conventions() {
        let mut raw = [0u8; 65];
        raw[64] = 28;
        assert_eq!(Signature::from_bytes(raw).recovery_id(), Some(1));
        raw[64] = 0;
        assert_eq!(Signature::from_bytes(raw).recovery_id(), Some(0));
        raw[64] = 5;
        assert_eq!(Signature::from_bytes(raw).recovery_id(), None);
    }

    #[test]
    fn parsed_signature_uses_legacy_v() {
        let raw = format!("0x{}00", "11".repeat(64));
        let sig: Signature = raw.parse().unwrap();
        assert_eq!(sig.as_bytes()[64], 27);
        let sig: Signature = format!("0x{}1c", "11".repeat(64)).parse().unwrap();
        assert_eq!(sig.as_bytes()[64], 28);
    }

    #[test]
    fn data_url_asset_keeps_media_type() {
        let asset = ImageAsset::from_data_url("data:image/gif;base64,R0lGODlh", "anim.gif").unwrap();
        assert_eq!(asset.media_type(), "image/gif");
        assert_eq!(asset.bytes(), b"GIF89a");
    }

    #[test]
    fn data_url_asset_rejects_non_images_and_empty_payloads() {
        let text = ImageAsset::from_data_url("data:text/plain;base64,aGVsbG8=", "notes.txt").unwrap_err();
        assert!(matches!(text, Error::InvalidAsset(_)));
        let empty = ImageAsset::from_data_url("data:image/png;base64,", "blank.png").unwrap_err();
        assert!(matches!(empty, Error::InvalidAsset(_)));
    }
}
