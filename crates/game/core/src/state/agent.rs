use std::collections::BTreeMap;

use crate::address::EntityAddress;

/// Account-level state owned by a signer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentState {
    /// Spendable currency balance.
    pub gold: u64,
    /// Avatar slot index → avatar address.
    pub avatars: BTreeMap<u8, EntityAddress>,
}

impl AgentState {
    pub fn with_gold(gold: u64) -> Self {
        Self {
            gold,
            avatars: BTreeMap::new(),
        }
    }
}
