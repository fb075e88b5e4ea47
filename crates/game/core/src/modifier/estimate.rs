//! Block-height estimate for speculative crafting slots.
//!
//! When a combination is submitted the UI wants to show the slot as occupied
//! right away, but the real unlock block is only known once the ledger
//! includes the action. The estimate below guesses it from the last observed
//! tip and is always marked `estimated`; the confirm path replaces it with the
//! authoritative slot.

use std::time::Duration;

use crate::state::{BlockIndex, Equipment, SlotState};

/// Bounded guess of the block at which a pending combination unlocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnlockEstimate {
    /// Expected wall-clock time between blocks.
    pub block_interval: Duration,
    /// Blocks added on top of the required duration to cover inclusion delay.
    pub safety_margin_blocks: u64,
    /// Upper bound on `required + margin`; guesses never exceed this distance.
    pub max_estimate_blocks: u64,
}

impl Default for UnlockEstimate {
    fn default() -> Self {
        Self {
            block_interval: Duration::from_secs(8),
            safety_margin_blocks: 10,
            max_estimate_blocks: 7_200,
        }
    }
}

impl UnlockEstimate {
    /// Estimated unlock block for a combination needing `required_blocks`,
    /// submitted while the ledger tip is `tip`.
    pub fn unlock_block(&self, tip: BlockIndex, required_blocks: u64) -> BlockIndex {
        let distance = required_blocks
            .saturating_add(self.safety_margin_blocks)
            .min(self.max_estimate_blocks);
        tip.saturating_add(distance)
    }

    /// Speculative slot state for a pending combination.
    pub fn slot(
        &self,
        tip: BlockIndex,
        required_blocks: u64,
        result: Option<Equipment>,
    ) -> SlotState {
        SlotState {
            unlock_block_index: self.unlock_block(tip, required_blocks),
            estimated: true,
            result,
        }
    }

    /// Approximate wall-clock time until `unlock` given the current `tip`.
    pub fn eta(&self, tip: BlockIndex, unlock: BlockIndex) -> Duration {
        let blocks = unlock.saturating_sub(tip);
        self.block_interval
            .saturating_mul(u32::try_from(blocks).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_adds_margin_and_is_bounded() {
        let estimate = UnlockEstimate {
            block_interval: Duration::from_secs(10),
            safety_margin_blocks: 5,
            max_estimate_blocks: 100,
        };

        assert_eq!(estimate.unlock_block(1_000, 20), 1_025);
        assert_eq!(estimate.unlock_block(1_000, 5_000), 1_100);

        let slot = estimate.slot(1_000, 20, None);
        assert!(slot.estimated);
        assert_eq!(slot.unlock_block_index, 1_025);
    }

    #[test]
    fn eta_uses_block_interval() {
        let estimate = UnlockEstimate::default();
        assert_eq!(estimate.eta(100, 110), Duration::from_secs(80));
        assert_eq!(estimate.eta(110, 100), Duration::ZERO);
    }
}
