//! ABI encoding for the image registry contract.
//!
//! ```solidity
//! function registerImage(bytes32 imageHash, string ipfsHash, bytes signature) external;
//! function getImageRegistrar(bytes32 imageHash) external view returns (address);
//! ```

use crate::crypto::eth::keccak256;
use crate::domain::model::{Address, ContentHash, Signature, StorageReference};

pub const REGISTER_IMAGE: &str = "registerImage(bytes32,string,bytes)";
pub const GET_IMAGE_REGISTRAR: &str = "getImageRegistrar(bytes32)";
pub const ERROR_STRING: &str = "Error(string)";
pub const PANIC_UINT: &str = "Panic(uint256)";

pub fn selector(signature: &str) -> [u8; 4] {
    let digest = keccak256(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

fn word_from_usize(value: usize) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&(value as u64).to_be_bytes());
    word
}

/// Length-prefixed, right-padded dynamic value.
fn encode_dynamic(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&word_from_usize(bytes.len()));
    out.extend_from_slice(bytes);
    let padding = (32 - bytes.len() % 32) % 32;
    out.extend(std::iter::repeat(0u8).take(padding));
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(32) * 32
}

pub fn encode_register_image(hash: &ContentHash, cid: &StorageReference, signature: &Signature) -> Vec<u8> {
    let cid_bytes = cid.as_str().as_bytes();
    let sig_bytes = signature.as_bytes();

    // Three head slots, then the two tails.
    let cid_offset = 3 * 32;
    let sig_offset = cid_offset + 32 + padded_len(cid_bytes.len());

    let mut out = Vec::with_capacity(4 + sig_offset + 32 + padded_len(sig_bytes.len()));
    out.extend_from_slice(&selector(REGISTER_IMAGE));
    out.extend_from_slice(hash.as_bytes());
    out.extend_from_slice(&word_from_usize(cid_offset));
    out.extend_from_slice(&word_from_usize(sig_offset));
    encode_dynamic(&mut out, cid_bytes);
    encode_dynamic(&mut out, sig_bytes);
    out
}

pub fn encode_get_image_registrar(hash: &ContentHash) -> Vec<u8> {
    let mut out = Vec::with_capacity(36);
    out.extend_from_slice(&selector(GET_IMAGE_REGISTRAR));
    out.extend_from_slice(hash.as_bytes());
    out
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed ABI data: {0}")]
pub struct AbiError(pub String);

fn word(data: &[u8], index: usize) -> Result<&[u8], AbiError> {
    data.get(index * 32..(index + 1) * 32)
        .ok_or_else(|| AbiError(format!("missing word {}", index)))
}

fn word_to_usize(word: &[u8]) -> Result<usize, AbiError> {
    if word[..24].iter().any(|b| *b != 0) {
        return Err(AbiError("offset or length out of range".to_string()));
    }
    let mut be = [0u8; 8];
    be.copy_from_slice(&word[24..]);
    usize::try_from(u64::from_be_bytes(be)).map_err(|e| AbiError(e.to_string()))
}

/// Reads a dynamic `bytes`/`string` whose offset sits in head slot `slot`.
fn decode_dynamic(data: &[u8], slot: usize) -> Result<Vec<u8>, AbiError> {
    let offset = word_to_usize(word(data, slot)?)?;
    let start = offset
        .checked_add(32)
        .ok_or_else(|| AbiError("dynamic offset out of range".to_string()))?;
    let len_word = data
        .get(offset..start)
        .ok_or_else(|| AbiError("dynamic offset past end".to_string()))?;
    let end = start
        .checked_add(word_to_usize(len_word)?)
        .ok_or_else(|| AbiError("dynamic length out of range".to_string()))?;
    data.get(start..end)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| AbiError("dynamic length past end".to_string()))
}

pub fn decode_address(data: &[u8]) -> Result<Address, AbiError> {
    let w = word(data, 0)?;
    if w[..12].iter().any(|b| *b != 0) {
        return Err(AbiError("address word has dirty high bytes".to_string()));
    }
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&w[12..]);
    Ok(Address::from_bytes(bytes))
}

/// A decoded `registerImage` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterImageCall {
    pub hash: ContentHash,
    pub cid: StorageReference,
    pub signature: Vec<u8>,
}

pub fn decode_register_image(calldata: &[u8]) -> Result<RegisterImageCall, AbiError> {
    if calldata.get(..4) != Some(&selector(REGISTER_IMAGE)[..]) {
        return Err(AbiError("not a registerImage call".to_string()));
    }
    let args = &calldata[4..];
    let mut hash = [0u8; 32];
    hash.copy_from_slice(word(args, 0)?);
    let cid = String::from_utf8(decode_dynamic(args, 1)?).map_err(|e| AbiError(e.to_string()))?;
    let signature = decode_dynamic(args, 2)?;
    Ok(RegisterImageCall {
        hash: ContentHash::from_digest(hash),
        cid: StorageReference::new(cid),
        signature,
    })
}

/// `Error(string)` revert payload for `reason`.
pub fn encode_error_string(reason: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&selector(ERROR_STRING));
    out.extend_from_slice(&word_from_usize(32));
    encode_dynamic(&mut out, reason.as_bytes());
    out
}

/// Turns revert data into a readable reason, if it follows a known shape.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let (head, rest) = (data.get(..4)?, data.get(4..)?);
    if head == selector(ERROR_STRING) {
        let bytes = decode_dynamic(rest, 0).ok()?;
        return String::from_utf8(bytes).ok();
    }
    if head == selector(PANIC_UINT) {
        let code = word(rest, 0).ok()?;
        let trimmed = hex::encode(code);
        let trimmed = trimmed.trim_start_matches('0');
        return Some(format!("panic code 0x{}", if trimmed.is_empty() { "0" } else { trimmed }));
    }
    None
}

pub fn decode_hex(data: &str) -> Result<Vec<u8>, AbiError> {
    hex::decode(data.trim_start_matches("0x")).map_err(|e| AbiError(e.to_string()))
}

pub fn encode_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}
