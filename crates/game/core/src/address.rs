//! Deterministic addressing for ledger state.
//!
//! Every piece of ledger state the client caches is keyed by an
//! [`EntityAddress`]. Addresses are derived from domain keys (agent + avatar
//! index, arena championship + round, ...) so the same logical entity always
//! maps to the same address on every client.

use core::fmt;
use core::str::FromStr;

use sha2::{Digest, Sha256};

/// Length of an address in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Opaque, stable identifier for a piece of ledger state.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityAddress([u8; ADDRESS_LEN]);

impl EntityAddress {
    /// The all-zero address, used as the root for globally shared entities.
    pub const ZERO: Self = Self([0u8; ADDRESS_LEN]);

    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Derives a child address from `base` and a domain key.
    ///
    /// The result is the first 20 bytes of `SHA-256(base || key)`.
    pub fn derive(base: &EntityAddress, key: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(base.0);
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&digest[..ADDRESS_LEN]);
        Self(bytes)
    }

    /// Address of a globally shared entity identified by `key`.
    pub fn shared(key: &str) -> Self {
        Self::derive(&Self::ZERO, key)
    }

    /// Address of the avatar stored in `index` of `agent`'s avatar slots.
    pub fn avatar(agent: &EntityAddress, index: u8) -> Self {
        Self::derive(agent, &format!("avatar-state-{index}"))
    }

    /// Address of the shared market board.
    pub fn market() -> Self {
        Self::shared("market")
    }

    /// Address of the shared stage ranking board.
    pub fn ranking() -> Self {
        Self::shared("ranking")
    }

    /// Address of a time-windowed arena bucket.
    pub fn arena(championship: u32, round: u32) -> Self {
        Self::shared(&format!("arena-{championship}-{round}"))
    }
}

impl fmt::Display for EntityAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for EntityAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityAddress({self})")
    }
}

/// Error returned when parsing an address from hex.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("expected {ADDRESS_LEN} bytes, found {0}")]
    InvalidLength(usize),
}

impl FromStr for EntityAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let decoded =
            hex::decode(trimmed).map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
        let bytes: [u8; ADDRESS_LEN] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| AddressParseError::InvalidLength(decoded.len()))?;
        Ok(Self(bytes))
    }
}
