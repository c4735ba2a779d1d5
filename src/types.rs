//! Primitive identifier and scalar types shared across the consensus core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Height of a block within the canonical chain; the genesis block is at height 0.
pub type BlockHeight = u64;

/// A 16-byte ASCII tag used to domain-separate the hashes that derive object
/// identifiers. Two objects with identical encodings but different parent
/// kinds can never collide on their IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Specifier(pub [u8; 16]);

impl Specifier {
    /// Build a specifier from an ASCII literal, zero-padded to 16 bytes.
    pub const fn new(tag: &str) -> Specifier {
        let bytes = tag.as_bytes();
        let mut out = [0u8; 16];
        let mut i = 0;
        while i < bytes.len() && i < 16 {
            out[i] = bytes[i];
            i += 1;
        }
        Specifier(out)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
            Serialize, Deserialize,
        )]
        pub struct $name(pub Hash);

        impl $name {
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

id_type! {
    /// Identifier of a block: the hash of its canonical header fields.
    BlockID
}
id_type! {
    /// Identifier of a transaction within the chain.
    TransactionID
}
id_type! {
    /// Identifier of an output of unspecified kind, used where coin and
    /// blockstake outputs share bookkeeping.
    OutputID
}
id_type! {
    /// Identifier of an unspent coin output.
    CoinOutputID
}
id_type! {
    /// Identifier of an unspent blockstake output.
    BlockStakeOutputID
}
id_type! {
    /// Identifier of a file contract. Reserved for the contract subsystem of
    /// the host chain; the consensus core only derives and transports it.
    FileContractID
}
