//! Input locks: the pluggable primitives that guard spending an output.
//!
//! Every output is owned by an unlock hash, the type-tagged hash of a lock's
//! *condition* (the static half, chosen by the sender). To spend, the input
//! carries the condition together with a *fulfillment* (the dynamic half,
//! produced by the spender). All lock types serialize through the same
//! `(type, condition bytes, fulfillment bytes)` wire form, so an unlock hash
//! computes identically whether or not a node understands the type. That is
//! the property that lets soft forks introduce new lock types: legacy nodes
//! carry the raw bytes verbatim, agree on output ownership, and accept the
//! spend, while upgraded nodes enforce the new rules.
//!
//! Two lock types are built in: single-signature (0x01) and the hashed
//! timelock contract used for cross-chain atomic swaps (0x02).

use crate::crypto::{
    self, hash_bytes, PublicKey, SignatureAlgorithm,
};
use crate::encoding::{
    decode_byte_vec, encode_byte_slice, encode_u8, encode_u64, from_canonical_bytes,
    CanonicalDecode, CanonicalEncode, Decoder,
};
use crate::error::{ConsensusError, Result, TransactionError};
use crate::transaction::Transaction;
use crate::types::{Hash, Timestamp};
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One-byte tag naming a lock type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnlockType(pub u8);

/// The nil type: no lock at all. Its unlock hash is all zero.
pub const UNLOCK_TYPE_NIL: UnlockType = UnlockType(0x00);
pub const UNLOCK_TYPE_SINGLE_SIGNATURE: UnlockType = UnlockType(0x01);
pub const UNLOCK_TYPE_ATOMIC_SWAP: UnlockType = UnlockType(0x02);

/// Type-tagged hash of a lock condition; the canonical owner identifier of
/// an output.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct UnlockHash {
    pub unlock_type: UnlockType,
    pub hash: Hash,
}

impl UnlockHash {
    pub fn new(unlock_type: UnlockType, hash: Hash) -> UnlockHash {
        UnlockHash { unlock_type, hash }
    }

    /// The nil unlock hash: all zero regardless of any condition payload.
    pub fn nil() -> UnlockHash {
        UnlockHash {
            unlock_type: UNLOCK_TYPE_NIL,
            hash: [0u8; 32],
        }
    }
}

impl Default for UnlockHash {
    fn default() -> UnlockHash {
        UnlockHash::nil()
    }
}

impl fmt::Display for UnlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{}", self.unlock_type.0, hex::encode(self.hash))
    }
}

impl CanonicalEncode for UnlockHash {
    fn encode(&self, buf: &mut Vec<u8>) {
        encode_u8(buf, self.unlock_type.0);
        buf.extend_from_slice(&self.hash);
    }
}

impl CanonicalDecode for UnlockHash {
    fn decode(dec: &mut Decoder<'_>) -> Result<UnlockHash> {
        Ok(UnlockHash {
            unlock_type: UnlockType(dec.read_u8()?),
            hash: dec.read_hash()?,
        })
    }
}

/// 32-byte pre-image used as the secret of an atomic swap contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicSwapSecret(pub [u8; 32]);

/// SHA-256 image of an atomic swap secret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicSwapHashedSecret(pub [u8; 32]);

impl AtomicSwapSecret {
    pub fn hashed(&self) -> AtomicSwapHashedSecret {
        AtomicSwapHashedSecret(hash_bytes(&self.0))
    }
}

/// Static half of an atomic swap: who may claim, who may refund, the hashed
/// secret gating the claim, and the deadline separating the two phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicSwapCondition {
    pub sender: UnlockHash,
    pub receiver: UnlockHash,
    pub hashed_secret: AtomicSwapHashedSecret,
    pub timelock: Timestamp,
}

impl CanonicalEncode for AtomicSwapCondition {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.sender.encode(buf);
        self.receiver.encode(buf);
        buf.extend_from_slice(&self.hashed_secret.0);
        encode_u64(buf, self.timelock);
    }
}

impl CanonicalDecode for AtomicSwapCondition {
    fn decode(dec: &mut Decoder<'_>) -> Result<AtomicSwapCondition> {
        Ok(AtomicSwapCondition {
            sender: UnlockHash::decode(dec)?,
            receiver: UnlockHash::decode(dec)?,
            hashed_secret: AtomicSwapHashedSecret(dec.read_hash()?),
            timelock: dec.read_u64_le()?,
        })
    }
}

/// Dynamic half of an atomic swap: the claiming or refunding key, its
/// signature, and (in the claim phase) the revealed secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicSwapFulfillment {
    pub public_key: PublicKey,
    pub signature: Vec<u8>,
    pub secret: AtomicSwapSecret,
}

impl CanonicalEncode for AtomicSwapFulfillment {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.public_key.encode(buf);
        encode_byte_slice(buf, &self.signature);
        buf.extend_from_slice(&self.secret.0);
    }
}

impl CanonicalDecode for AtomicSwapFulfillment {
    fn decode(dec: &mut Decoder<'_>) -> Result<AtomicSwapFulfillment> {
        Ok(AtomicSwapFulfillment {
            public_key: PublicKey::decode(dec)?,
            signature: decode_byte_vec(dec)?,
            secret: AtomicSwapSecret(dec.read_hash()?),
        })
    }
}

/// Single-signature lock: the condition is a public key, the fulfillment a
/// signature over the input signature hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleSignatureInputLock {
    pub public_key: PublicKey,
    pub signature: Vec<u8>,
}

/// Atomic swap lock, condition and fulfillment halves together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicSwapInputLock {
    pub condition: AtomicSwapCondition,
    pub fulfillment: AtomicSwapFulfillment,
}

/// A lock of a type this node does not recognize. Condition and fulfillment
/// bytes are carried verbatim so the unlock hash and re-encoding are stable.
/// Unknown locks always unlock and never pass the strict check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownInputLock {
    pub unlock_type: UnlockType,
    pub condition: Vec<u8>,
    pub fulfillment: Vec<u8>,
}

/// Key material accepted by [`InputLockProxy::lock`].
pub enum UnlockKey<'a> {
    SingleSignature(&'a SigningKey),
    AtomicSwapClaim(&'a AtomicSwapClaimKey),
    AtomicSwapRefund(&'a AtomicSwapRefundKey),
}

/// Claim-side key of an atomic swap: held by the receiver, carries the secret.
pub struct AtomicSwapClaimKey {
    pub public_key: PublicKey,
    pub secret_key: SigningKey,
    pub secret: AtomicSwapSecret,
}

/// Refund-side key of an atomic swap: held by the original sender.
pub struct AtomicSwapRefundKey {
    pub public_key: PublicKey,
    pub secret_key: SigningKey,
}

/// An input lock of any type, known or unknown. All variants share one wire
/// form (`type`, length-prefixed condition, length-prefixed fulfillment) and
/// therefore one unlock-hash derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputLockProxy {
    Nil,
    SingleSignature(SingleSignatureInputLock),
    AtomicSwap(AtomicSwapInputLock),
    Unknown(UnknownInputLock),
}

impl InputLockProxy {
    /// Fresh single-signature lock for `public_key`, not yet signed.
    pub fn single_signature(public_key: PublicKey) -> InputLockProxy {
        InputLockProxy::SingleSignature(SingleSignatureInputLock {
            public_key,
            signature: Vec::new(),
        })
    }

    /// Fresh atomic swap lock with an empty fulfillment.
    pub fn atomic_swap(condition: AtomicSwapCondition) -> InputLockProxy {
        InputLockProxy::AtomicSwap(AtomicSwapInputLock {
            condition,
            fulfillment: AtomicSwapFulfillment {
                public_key: PublicKey {
                    algorithm: SignatureAlgorithm::Entropy,
                    key: Vec::new(),
                },
                signature: Vec::new(),
                secret: AtomicSwapSecret::default(),
            },
        })
    }

    pub fn unlock_type(&self) -> UnlockType {
        match self {
            InputLockProxy::Nil => UNLOCK_TYPE_NIL,
            InputLockProxy::SingleSignature(_) => UNLOCK_TYPE_SINGLE_SIGNATURE,
            InputLockProxy::AtomicSwap(_) => UNLOCK_TYPE_ATOMIC_SWAP,
            InputLockProxy::Unknown(u) => u.unlock_type,
        }
    }

    /// Canonical bytes of the condition half.
    pub fn condition_bytes(&self) -> Vec<u8> {
        match self {
            InputLockProxy::Nil => Vec::new(),
            InputLockProxy::SingleSignature(ss) => ss.public_key.canonical_bytes(),
            InputLockProxy::AtomicSwap(swap) => swap.condition.canonical_bytes(),
            InputLockProxy::Unknown(u) => u.condition.clone(),
        }
    }

    /// Canonical bytes of the fulfillment half.
    pub fn fulfillment_bytes(&self) -> Vec<u8> {
        match self {
            InputLockProxy::Nil => Vec::new(),
            InputLockProxy::SingleSignature(ss) => ss.signature.clone(),
            InputLockProxy::AtomicSwap(swap) => swap.fulfillment.canonical_bytes(),
            InputLockProxy::Unknown(u) => u.fulfillment.clone(),
        }
    }

    /// Owner identifier derived from the condition. Computed over the raw
    /// condition bytes, so it is identical on nodes that do not know the
    /// lock type.
    pub fn unlock_hash(&self) -> UnlockHash {
        if let InputLockProxy::Nil = self {
            return UnlockHash::nil();
        }
        UnlockHash::new(self.unlock_type(), hash_bytes(&self.condition_bytes()))
    }

    /// Produce the fulfillment in place, then self-verify by unlocking.
    pub fn lock(
        &mut self,
        input_index: u64,
        tx: &Transaction,
        now: Timestamp,
        key: &UnlockKey<'_>,
    ) -> Result<()> {
        match (&mut *self, key) {
            (InputLockProxy::Nil, _) => {
                return Err(ConsensusError::Transaction(TransactionError::NilInputLock))
            }
            (InputLockProxy::SingleSignature(ss), UnlockKey::SingleSignature(sk)) => {
                if !ss.signature.is_empty() {
                    return Err(ConsensusError::Transaction(TransactionError::AlreadyLocked));
                }
                let sig_hash = tx.input_sig_hash(input_index, &[]);
                ss.signature = crypto::sign_hash(&ss.public_key, sk, &sig_hash)
                    .map_err(ConsensusError::Transaction)?;
            }
            (InputLockProxy::AtomicSwap(swap), UnlockKey::AtomicSwapClaim(claim)) => {
                if !swap.fulfillment.signature.is_empty() {
                    return Err(ConsensusError::Transaction(TransactionError::AlreadyLocked));
                }
                if now > swap.condition.timelock {
                    return Err(ConsensusError::Transaction(TransactionError::SwapExpired));
                }
                if claim.secret.hashed() != swap.condition.hashed_secret {
                    return Err(ConsensusError::Transaction(TransactionError::InvalidPreImage));
                }
                swap.fulfillment.secret = claim.secret;
                swap.fulfillment.public_key = claim.public_key.clone();
                let sig_hash = tx.input_sig_hash(input_index, &[&claim.secret.0]);
                swap.fulfillment.signature =
                    crypto::sign_hash(&claim.public_key, &claim.secret_key, &sig_hash)
                        .map_err(ConsensusError::Transaction)?;
            }
            (InputLockProxy::AtomicSwap(swap), UnlockKey::AtomicSwapRefund(refund)) => {
                if !swap.fulfillment.signature.is_empty() {
                    return Err(ConsensusError::Transaction(TransactionError::AlreadyLocked));
                }
                if now <= swap.condition.timelock {
                    return Err(ConsensusError::Transaction(TransactionError::SwapNotExpired));
                }
                swap.fulfillment.public_key = refund.public_key.clone();
                let sig_hash = tx.input_sig_hash(input_index, &[]);
                swap.fulfillment.signature =
                    crypto::sign_hash(&refund.public_key, &refund.secret_key, &sig_hash)
                        .map_err(ConsensusError::Transaction)?;
            }
            (InputLockProxy::Unknown(_), _) => {
                // Locking is a no-op for an unknown type.
                return Ok(());
            }
            _ => return Err(ConsensusError::Transaction(TransactionError::WrongKeyType)),
        }
        // Validate the locking was done correctly.
        self.unlock(input_index, tx, now)
            .map_err(ConsensusError::Transaction)
    }

    /// Check whether this lock opens within the given transaction context.
    pub fn unlock(
        &self,
        input_index: u64,
        tx: &Transaction,
        now: Timestamp,
    ) -> std::result::Result<(), TransactionError> {
        match self {
            InputLockProxy::Nil => Err(TransactionError::NilInputLock),
            InputLockProxy::SingleSignature(ss) => {
                let sig_hash = tx.input_sig_hash(input_index, &[]);
                crypto::verify_hash(&ss.public_key, &sig_hash, &ss.signature)
            }
            InputLockProxy::AtomicSwap(swap) => {
                let claimant =
                    single_signature_unlock_hash(&swap.fulfillment.public_key);
                if now <= swap.condition.timelock {
                    // Claim phase: only the receiver, and only with the secret.
                    if claimant != swap.condition.receiver {
                        return Err(TransactionError::InvalidRedeemer);
                    }
                    let sig_hash =
                        tx.input_sig_hash(input_index, &[&swap.fulfillment.secret.0]);
                    crypto::verify_hash(
                        &swap.fulfillment.public_key,
                        &sig_hash,
                        &swap.fulfillment.signature,
                    )?;
                    if swap.fulfillment.secret.hashed() != swap.condition.hashed_secret {
                        return Err(TransactionError::InvalidPreImage);
                    }
                    Ok(())
                } else {
                    // Refund phase: only the original sender; secret ignored.
                    if claimant != swap.condition.sender {
                        return Err(TransactionError::InvalidRedeemer);
                    }
                    let sig_hash = tx.input_sig_hash(input_index, &[]);
                    crypto::verify_hash(
                        &swap.fulfillment.public_key,
                        &sig_hash,
                        &swap.fulfillment.signature,
                    )
                }
            }
            // Unlocking always passes for an unknown type.
            InputLockProxy::Unknown(_) => Ok(()),
        }
    }

    /// Relay-grade check: every condition and fulfillment must be of a known,
    /// well-formed shape. Fails for unknown lock types.
    pub fn strict_check(&self) -> std::result::Result<(), TransactionError> {
        match self {
            InputLockProxy::Nil => Err(TransactionError::NilInputLock),
            InputLockProxy::SingleSignature(ss) => {
                crypto::strict_signature_check(&ss.public_key, &ss.signature)
            }
            InputLockProxy::AtomicSwap(swap) => crypto::strict_signature_check(
                &swap.fulfillment.public_key,
                &swap.fulfillment.signature,
            ),
            InputLockProxy::Unknown(_) => Err(TransactionError::UnknownInputLock),
        }
    }
}

impl CanonicalEncode for InputLockProxy {
    fn encode(&self, buf: &mut Vec<u8>) {
        encode_u8(buf, self.unlock_type().0);
        if let InputLockProxy::Nil = self {
            return;
        }
        encode_byte_slice(buf, &self.condition_bytes());
        encode_byte_slice(buf, &self.fulfillment_bytes());
    }
}

/// Unlock hash a public key would have under a single-signature lock. Used
/// by atomic swaps to bind fulfilling keys to the contract's parties.
pub fn single_signature_unlock_hash(public_key: &PublicKey) -> UnlockHash {
    UnlockHash::new(
        UNLOCK_TYPE_SINGLE_SIGNATURE,
        hash_bytes(&public_key.canonical_bytes()),
    )
}

/// Builds a lock instance of a registered type from its wire halves.
pub type InputLockConstructor =
    fn(unlock_type: UnlockType, condition: &[u8], fulfillment: &[u8]) -> Result<InputLockProxy>;

/// The set of lock types this node understands, fixed at consensus-set
/// construction. Soft forks register additional types before the set is
/// built; afterwards the registry is never mutated.
#[derive(Clone)]
pub struct InputLockRegistry {
    constructors: BTreeMap<u8, InputLockConstructor>,
}

impl InputLockRegistry {
    /// Registry with no known types; every non-nil lock decodes as unknown.
    pub fn empty() -> InputLockRegistry {
        InputLockRegistry {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry with the standard built-in lock types.
    pub fn standard() -> InputLockRegistry {
        let mut registry = InputLockRegistry::empty();
        registry.register(UNLOCK_TYPE_SINGLE_SIGNATURE, construct_single_signature);
        registry.register(UNLOCK_TYPE_ATOMIC_SWAP, construct_atomic_swap);
        registry
    }

    pub fn register(&mut self, unlock_type: UnlockType, constructor: InputLockConstructor) {
        self.constructors.insert(unlock_type.0, constructor);
    }

    pub fn unregister(&mut self, unlock_type: UnlockType) {
        self.constructors.remove(&unlock_type.0);
    }

    /// Decode a proxy from the shared wire form, falling back to the
    /// byte-preserving unknown lock for unregistered types.
    pub fn decode_proxy(&self, dec: &mut Decoder<'_>) -> Result<InputLockProxy> {
        let unlock_type = UnlockType(dec.read_u8()?);
        if unlock_type == UNLOCK_TYPE_NIL {
            return Ok(InputLockProxy::Nil);
        }
        let condition = decode_byte_vec(dec)?;
        let fulfillment = decode_byte_vec(dec)?;
        match self.constructors.get(&unlock_type.0) {
            Some(constructor) => constructor(unlock_type, &condition, &fulfillment),
            None => Ok(InputLockProxy::Unknown(UnknownInputLock {
                unlock_type,
                condition,
                fulfillment,
            })),
        }
    }
}

impl Default for InputLockRegistry {
    fn default() -> InputLockRegistry {
        InputLockRegistry::standard()
    }
}

fn construct_single_signature(
    _unlock_type: UnlockType,
    condition: &[u8],
    fulfillment: &[u8],
) -> Result<InputLockProxy> {
    let public_key: PublicKey = from_canonical_bytes(condition)?;
    Ok(InputLockProxy::SingleSignature(SingleSignatureInputLock {
        public_key,
        signature: fulfillment.to_vec(),
    }))
}

fn construct_atomic_swap(
    _unlock_type: UnlockType,
    condition: &[u8],
    fulfillment: &[u8],
) -> Result<InputLockProxy> {
    Ok(InputLockProxy::AtomicSwap(AtomicSwapInputLock {
        condition: from_canonical_bytes(condition)?,
        fulfillment: from_canonical_bytes(fulfillment)?,
    }))
}
