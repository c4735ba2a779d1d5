//! Hashing and signature primitives.
//!
//! The chain uses a single hash (SHA-256) and a single live signature scheme
//! (Ed25519). Public keys carry an algorithm tag so new schemes can be added
//! by soft fork: signatures under an unrecognized tag verify vacuously, and
//! the strict check (used for relay-grade validation) rejects them. The
//! `Entropy` tag marks keys that must never sign; it exists to represent
//! provably burned or compromised keys.

use crate::encoding::{
    decode_byte_vec, encode_byte_slice, encode_u8, CanonicalDecode, CanonicalEncode, Decoder,
};
use crate::error::{Result, TransactionError};
use crate::types::Hash;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const PUBLIC_KEY_SIZE: usize = 32;
pub const SIGNATURE_SIZE: usize = 64;

pub fn hash_bytes(bytes: &[u8]) -> Hash {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Hash the concatenation of several byte strings. Callers are responsible
/// for framing: every use site feeds fixed-width or length-prefixed parts.
pub fn hash_all(parts: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Hash of an object's canonical encoding. The sole notion of object identity.
pub fn hash_object<T: CanonicalEncode>(obj: &T) -> Hash {
    hash_bytes(&obj.canonical_bytes())
}

/// Signature algorithm tag carried inside a public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// Never valid for signing. Outputs locked to an entropy key are burned.
    Entropy,
    Ed25519,
    /// Reserved for soft-forked schemes this node does not know.
    Unknown(u8),
}

impl SignatureAlgorithm {
    pub fn to_byte(self) -> u8 {
        match self {
            SignatureAlgorithm::Entropy => 0,
            SignatureAlgorithm::Ed25519 => 1,
            SignatureAlgorithm::Unknown(b) => b,
        }
    }

    pub fn from_byte(b: u8) -> SignatureAlgorithm {
        match b {
            0 => SignatureAlgorithm::Entropy,
            1 => SignatureAlgorithm::Ed25519,
            other => SignatureAlgorithm::Unknown(other),
        }
    }
}

/// Algorithm-tagged public key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    pub algorithm: SignatureAlgorithm,
    pub key: Vec<u8>,
}

impl PublicKey {
    pub fn ed25519(key: [u8; PUBLIC_KEY_SIZE]) -> PublicKey {
        PublicKey {
            algorithm: SignatureAlgorithm::Ed25519,
            key: key.to_vec(),
        }
    }

    pub fn from_signing_key(sk: &SigningKey) -> PublicKey {
        PublicKey::ed25519(sk.verifying_key().to_bytes())
    }
}

impl CanonicalEncode for PublicKey {
    fn encode(&self, buf: &mut Vec<u8>) {
        encode_u8(buf, self.algorithm.to_byte());
        encode_byte_slice(buf, &self.key);
    }
}

impl CanonicalDecode for PublicKey {
    fn decode(dec: &mut Decoder<'_>) -> Result<PublicKey> {
        let algorithm = SignatureAlgorithm::from_byte(dec.read_u8()?);
        let key = decode_byte_vec(dec)?;
        Ok(PublicKey { algorithm, key })
    }
}

/// Sign a 32-byte hash with the secret key matching `public_key`.
pub fn sign_hash(
    public_key: &PublicKey,
    secret_key: &SigningKey,
    hash: &Hash,
) -> std::result::Result<Vec<u8>, TransactionError> {
    match public_key.algorithm {
        SignatureAlgorithm::Entropy => Err(TransactionError::EntropyKey),
        SignatureAlgorithm::Ed25519 => Ok(secret_key.sign(hash).to_bytes().to_vec()),
        // Unrecognized algorithms produce no signature; verification of the
        // empty signature passes vacuously for the same tag.
        SignatureAlgorithm::Unknown(_) => Ok(Vec::new()),
    }
}

/// Verify a signature over a 32-byte hash.
pub fn verify_hash(
    public_key: &PublicKey,
    hash: &Hash,
    signature: &[u8],
) -> std::result::Result<(), TransactionError> {
    match public_key.algorithm {
        SignatureAlgorithm::Entropy => Err(TransactionError::EntropyKey),
        SignatureAlgorithm::Ed25519 => {
            let key_bytes: [u8; PUBLIC_KEY_SIZE] = public_key
                .key
                .as_slice()
                .try_into()
                .map_err(|_| TransactionError::InvalidPublicKeySize)?;
            let verifying_key = VerifyingKey::from_bytes(&key_bytes)
                .map_err(|_| TransactionError::InvalidSignature)?;
            let sig_bytes: [u8; SIGNATURE_SIZE] = signature
                .try_into()
                .map_err(|_| TransactionError::InvalidSignatureSize)?;
            let signature = Signature::from_bytes(&sig_bytes);
            verifying_key
                .verify(hash, &signature)
                .map_err(|_| TransactionError::InvalidSignature)
        }
        // Assume validity so new schemes can be introduced by soft fork.
        SignatureAlgorithm::Unknown(_) => Ok(()),
    }
}

/// Relay-grade key/signature shape check. Accepts the entropy tag (the burn
/// is enforced at sign/verify time), rejects unrecognized algorithms and
/// mis-sized Ed25519 material.
pub fn strict_signature_check(
    public_key: &PublicKey,
    signature: &[u8],
) -> std::result::Result<(), TransactionError> {
    match public_key.algorithm {
        SignatureAlgorithm::Entropy => Ok(()),
        SignatureAlgorithm::Ed25519 => {
            if public_key.key.len() != PUBLIC_KEY_SIZE {
                return Err(TransactionError::InvalidPublicKeySize);
            }
            if signature.len() != SIGNATURE_SIZE {
                return Err(TransactionError::InvalidSignatureSize);
            }
            Ok(())
        }
        SignatureAlgorithm::Unknown(_) => Err(TransactionError::UnknownSignatureAlgorithm),
    }
}
