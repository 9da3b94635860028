//! Ethereum-flavoured primitives: keccak-256, EIP-191 personal messages,
//! signer recovery and EIP-55 address rendering.

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};

use crate::domain::model::{Address, ContentHash, Signature};

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Digest a wallet actually signs for `personal_sign(message)`.
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n");
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

pub fn address_from_public_key(key: &PublicKey) -> Address {
    let uncompressed = key.serialize_uncompressed();
    let digest = keccak256(&uncompressed[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[12..]);
    Address::from_bytes(bytes)
}

pub fn address_from_secret_key(key: &SecretKey) -> Address {
    let secp = Secp256k1::signing_only();
    address_from_public_key(&PublicKey::from_secret_key(&secp, key))
}

/// Signs `message` the way `personal_sign` does. `v` is 27 or 28.
pub fn sign_personal_message(key: &SecretKey, message: &[u8]) -> Signature {
    let secp = Secp256k1::signing_only();
    let digest = Message::from_digest(personal_message_hash(message));
    let (recovery_id, compact) = secp
        .sign_ecdsa_recoverable(&digest, key)
        .serialize_compact();

    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&compact);
    out[64] = 27 + recovery_id.to_i32() as u8;
    Signature::from_bytes(out)
}

/// Recovers the account that produced `signature` over `personal_sign(message)`.
pub fn recover_personal_signer(message: &[u8], signature: &Signature) -> Result<Address, String> {
    let recovery = signature
        .recovery_id()
        .ok_or_else(|| format!("unsupported recovery byte {}", signature.as_bytes()[64]))?;
    let recovery_id = RecoveryId::from_i32(i32::from(recovery)).map_err(|e| e.to_string())?;
    let recoverable = RecoverableSignature::from_compact(&signature.as_bytes()[..64], recovery_id)
        .map_err(|e| format!("malformed signature: {}", e))?;

    let secp = Secp256k1::verification_only();
    let digest = Message::from_digest(personal_message_hash(message));
    let key = secp
        .recover_ecdsa(&digest, &recoverable)
        .map_err(|e| format!("signature does not recover: {}", e))?;
    Ok(address_from_public_key(&key))
}

/// Checks that `signature` is `address`'s signature over the registration payload of `hash`.
pub fn verify_registration_signature(
    hash: &ContentHash,
    signature: &Signature,
    address: &Address,
) -> bool {
    let payload = crate::crypto::hashing::signing_payload(hash);
    matches!(recover_personal_signer(&payload, signature), Ok(signer) if signer == *address)
}

pub fn to_checksum_address(bytes: &[u8; 20]) -> String {
    let lower = hex::encode(bytes);
    let digest = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            digest[i / 2] >> 4
        } else {
            digest[i / 2] & 0x0f
        };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Generates a fresh secret key from the thread RNG.
pub fn random_secret_key() -> SecretKey {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    loop {
        let candidate = rng.gen::<[u8; 32]>();
        if let Ok(key) = SecretKey::from_slice(&candidate) {
            return key;
        }
    }
}
