//! Globally shared entities: the market and score boards.
//!
//! The client never speculates on these; they are refreshed from confirmed
//! evaluations of any participant's actions.

use std::collections::BTreeMap;

use super::{BlockIndex, ItemId, ListingId};
use crate::address::EntityAddress;

/// An item offered for sale on the market.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Listing {
    pub id: ListingId,
    pub seller_agent: EntityAddress,
    pub seller_avatar: EntityAddress,
    pub item_id: ItemId,
    pub count: u32,
    pub price: u64,
    pub registered_block: BlockIndex,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarketState {
    pub listings: BTreeMap<ListingId, Listing>,
}

impl MarketState {
    pub fn listings_of(&self, avatar: &EntityAddress) -> impl Iterator<Item = &Listing> {
        self.listings
            .values()
            .filter(move |listing| listing.seller_avatar == *avatar)
    }
}

/// Score board keyed by avatar address (stage ranking, arena bucket).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoardState {
    pub entries: BTreeMap<EntityAddress, u64>,
}

impl BoardState {
    pub fn score(&self, avatar: &EntityAddress) -> Option<u64> {
        self.entries.get(avatar).copied()
    }

    /// 1-based rank of `avatar`, highest score first; ties share a rank.
    pub fn rank(&self, avatar: &EntityAddress) -> Option<usize> {
        let score = self.score(avatar)?;
        Some(self.entries.values().filter(|other| **other > score).count() + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_counts_strictly_higher_scores() {
        let a = EntityAddress::shared("a");
        let b = EntityAddress::shared("b");
        let c = EntityAddress::shared("c");
        let board = BoardState {
            entries: [(a, 10), (b, 30), (c, 10)].into_iter().collect(),
        };

        assert_eq!(board.rank(&b), Some(1));
        assert_eq!(board.rank(&a), Some(2));
        assert_eq!(board.rank(&c), Some(2));
        assert_eq!(board.rank(&EntityAddress::shared("d")), None);
    }
}
