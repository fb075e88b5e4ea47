//! Action kind enumeration - the routing key for evaluations.

/// Discriminant of an [`ActionInput`](super::ActionInput).
///
/// Evaluation handlers are registered per kind; the string form is the
/// snake_case variant name.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ActionKind {
    // ========================================================================
    // Agent
    // ========================================================================
    /// Move currency to another agent.
    TransferAsset,

    // ========================================================================
    // Avatar - crafting
    // ========================================================================
    /// Combine materials into equipment in a crafting slot.
    CombineEquipment,

    /// Upgrade an equipment by consuming another.
    EnhanceEquipment,

    // ========================================================================
    // Avatar - rewards
    // ========================================================================
    /// Daily action point refill.
    ClaimReward,

    /// Mark mails as read and collect their attachments.
    RedeemMail,

    // ========================================================================
    // Shared entities
    // ========================================================================
    /// Offer items on the market.
    RegisterListing,

    /// Buy a market listing.
    BuyListing,

    /// Clear a stage; updates the ranking board.
    ClearStage,

    /// Enter a time-windowed arena bucket.
    JoinArena,
}

impl ActionKind {
    /// Whether evaluations of this kind touch globally shared entities.
    pub const fn touches_shared(self) -> bool {
        matches!(
            self,
            ActionKind::RegisterListing
                | ActionKind::BuyListing
                | ActionKind::ClearStage
                | ActionKind::JoinArena
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn kinds_roundtrip_through_strings() {
        for kind in ActionKind::iter() {
            assert_eq!(kind.to_string().parse::<ActionKind>().unwrap(), kind);
        }
        assert_eq!(ActionKind::ClaimReward.to_string(), "claim_reward");
    }
}
