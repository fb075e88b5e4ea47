//! Per-kind action parameters.

use super::ActionKind;
use crate::address::EntityAddress;
use crate::state::{Equipment, ItemId, Listing, MailId};

/// Move `amount` of currency from the signer to `recipient`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransferAssetAction {
    pub recipient: EntityAddress,
    pub amount: u64,
    pub memo: Option<String>,
}

/// Craft `result_item_id` from `materials` in crafting `slot`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CombineEquipmentAction {
    pub avatar: EntityAddress,
    pub slot: u8,
    pub recipe_id: u32,
    pub result_item_id: ItemId,
    pub materials: Vec<(ItemId, u32)>,
    pub cost: u64,
    /// Blocks the crafting takes once included.
    pub required_blocks: u64,
}

/// Raise `target` by one level, consuming `material`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnhanceEquipmentAction {
    pub avatar: EntityAddress,
    pub target: Equipment,
    pub material: Equipment,
    pub cost: u64,
}

/// Refill the avatar's action points.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClaimRewardAction {
    pub avatar: EntityAddress,
    pub action_point: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RedeemMailAction {
    pub avatar: EntityAddress,
    pub mail_ids: Vec<MailId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegisterListingAction {
    pub avatar: EntityAddress,
    pub item_id: ItemId,
    pub count: u32,
    pub price: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BuyListingAction {
    pub avatar: EntityAddress,
    pub listing: Listing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClearStageAction {
    pub avatar: EntityAddress,
    pub stage_id: u32,
    pub action_point_cost: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JoinArenaAction {
    pub avatar: EntityAddress,
    pub championship: u32,
    pub round: u32,
    pub fee: u64,
}

/// Kind-specific parameters of an action.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ActionInput {
    TransferAsset(TransferAssetAction),
    CombineEquipment(CombineEquipmentAction),
    EnhanceEquipment(EnhanceEquipmentAction),
    ClaimReward(ClaimRewardAction),
    RedeemMail(RedeemMailAction),
    RegisterListing(RegisterListingAction),
    BuyListing(BuyListingAction),
    ClearStage(ClearStageAction),
    JoinArena(JoinArenaAction),
}

impl ActionInput {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionInput::TransferAsset(_) => ActionKind::TransferAsset,
            ActionInput::CombineEquipment(_) => ActionKind::CombineEquipment,
            ActionInput::EnhanceEquipment(_) => ActionKind::EnhanceEquipment,
            ActionInput::ClaimReward(_) => ActionKind::ClaimReward,
            ActionInput::RedeemMail(_) => ActionKind::RedeemMail,
            ActionInput::RegisterListing(_) => ActionKind::RegisterListing,
            ActionInput::BuyListing(_) => ActionKind::BuyListing,
            ActionInput::ClearStage(_) => ActionKind::ClearStage,
            ActionInput::JoinArena(_) => ActionKind::JoinArena,
        }
    }

    pub fn avatar(&self) -> Option<EntityAddress> {
        match self {
            ActionInput::TransferAsset(_) => None,
            ActionInput::CombineEquipment(a) => Some(a.avatar),
            ActionInput::EnhanceEquipment(a) => Some(a.avatar),
            ActionInput::ClaimReward(a) => Some(a.avatar),
            ActionInput::RedeemMail(a) => Some(a.avatar),
            ActionInput::RegisterListing(a) => Some(a.avatar),
            ActionInput::BuyListing(a) => Some(a.avatar),
            ActionInput::ClearStage(a) => Some(a.avatar),
            ActionInput::JoinArena(a) => Some(a.avatar),
        }
    }
}

macro_rules! impl_from_action {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ActionInput {
                fn from(action: $ty) -> Self {
                    ActionInput::$variant(action)
                }
            }
        )*
    };
}

impl_from_action! {
    TransferAsset => TransferAssetAction,
    CombineEquipment => CombineEquipmentAction,
    EnhanceEquipment => EnhanceEquipmentAction,
    ClaimReward => ClaimRewardAction,
    RedeemMail => RedeemMailAction,
    RegisterListing => RegisterListingAction,
    BuyListing => BuyListingAction,
    ClearStage => ClearStageAction,
    JoinArena => JoinArenaAction,
}
