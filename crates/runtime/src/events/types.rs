//! UI-facing notifications.

use serde::{Deserialize, Serialize};

use client_blockchain_core::ActionException;
use game_core::{ActionId, ActionKind, BlockIndex, EntityAddress, Equipment, ListingId, MailId};

/// Topics for notification routing.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize, strum::EnumIter)]
pub enum Topic {
    /// Lifecycle of this session's own actions (confirmed, failed, rolled back).
    Action,
    /// Feature-level outcomes (items received, rankings, sales).
    Gameplay,
}

/// Notification published after a reconciliation or a fatal broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    // ========================================================================
    // Action lifecycle
    // ========================================================================
    ActionConfirmed {
        action_id: ActionId,
        kind: ActionKind,
        block_index: BlockIndex,
    },

    /// The ledger executed the action and rejected it.
    ActionFailed {
        action_id: ActionId,
        kind: ActionKind,
        exception: ActionException,
    },

    /// A confirmed evaluation was invalidated by a reorg.
    ActionRolledBack {
        action_id: ActionId,
        kind: ActionKind,
        block_index: BlockIndex,
    },

    /// A batch could not be broadcast; its actions will never reach the ledger.
    SubmissionRejected {
        signer: EntityAddress,
        action_ids: Vec<ActionId>,
        reason: String,
    },

    // ========================================================================
    // Gameplay
    // ========================================================================
    AssetReceived {
        sender: EntityAddress,
        recipient: EntityAddress,
        amount: u64,
        memo: Option<String>,
    },

    CombinationStarted {
        avatar: EntityAddress,
        slot: u8,
        unlock_block_index: BlockIndex,
        result: Option<Equipment>,
    },

    EnhancementCompleted {
        avatar: EntityAddress,
        equipment_id: u64,
        level: u8,
    },

    RewardClaimed {
        avatar: EntityAddress,
        action_point: u32,
        block_index: BlockIndex,
    },

    MailRedeemed {
        avatar: EntityAddress,
        mail_ids: Vec<MailId>,
    },

    /// A listing owned by an observed avatar was bought.
    ListingSold {
        seller_avatar: EntityAddress,
        buyer: EntityAddress,
        listing_id: ListingId,
        price: u64,
    },

    RankingUpdated {
        avatar: EntityAddress,
        score: u64,
        rank: Option<usize>,
    },

    ArenaJoined {
        avatar: EntityAddress,
        championship: u32,
        round: u32,
        score: Option<u64>,
    },
}

impl Notification {
    pub fn topic(&self) -> Topic {
        match self {
            Notification::ActionConfirmed { .. }
            | Notification::ActionFailed { .. }
            | Notification::ActionRolledBack { .. }
            | Notification::SubmissionRejected { .. } => Topic::Action,
            _ => Topic::Gameplay,
        }
    }
}
