//! In-memory ledger for tests and the demo client.
//!
//! [`MockLedger`] keeps a state map, a mempool and a block history. Blocks
//! are produced on demand with [`MockLedger::produce_block`], which executes
//! every pooled action, validates it against the stored state and broadcasts
//! one confirm [`EvaluationEvent`] per action. [`MockLedger::rollback_last_block`]
//! reverts the newest block and broadcasts rollback events in reverse order.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tracing::debug;

use game_core::{
    Action, ActionId, ActionInput, AgentState, AvatarState, BlockIndex, BoardState, EffectContext,
    EntityAddress, EntityState, Equipment, Listing, ListingId, MarketState, ModifierTarget,
    NonFungibleId, Speculation, StateModifier, UnlockEstimate, anticipate,
};

use crate::traits::{LedgerTransport, SignerError, TransactionSigner, TransportError};
use crate::types::{
    ActionEvaluation, ActionException, EvaluationEvent, Signature, SignedTransaction, Transaction,
    TxId,
};

const EVENT_CAPACITY: usize = 1024;
const ARENA_START_SCORE: u64 = 1_000;

/// Mock ledger node for testing without network.
#[derive(Clone)]
pub struct MockLedger {
    inner: Arc<Mutex<LedgerState>>,
    events: broadcast::Sender<EvaluationEvent>,
}

#[derive(Default)]
struct LedgerState {
    states: HashMap<EntityAddress, EntityState>,
    nonces: HashMap<EntityAddress, u64>,
    mempool: Vec<(TxId, SignedTransaction)>,
    submitted: Vec<SignedTransaction>,
    blocks: Vec<Vec<ActionEvaluation>>,
    tip: BlockIndex,
    injected: VecDeque<TransportError>,
    next_listing_id: ListingId,
    next_equipment_id: NonFungibleId,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::with_event_capacity(EVENT_CAPACITY)
    }

    /// Ledger whose evaluation stream buffers at most `capacity` events per
    /// subscriber; slower subscribers observe a lag.
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Mutex::new(LedgerState {
                next_listing_id: 1,
                next_equipment_id: 1_000_000,
                ..LedgerState::default()
            })),
            events,
        }
    }

    /// Seeds `state` at `address`.
    pub fn with_state(self, address: EntityAddress, state: impl Into<EntityState>) -> Self {
        self.set_state(address, state);
        self
    }

    pub fn set_state(&self, address: EntityAddress, state: impl Into<EntityState>) {
        self.lock().states.insert(address, state.into());
    }

    pub fn state(&self, address: &EntityAddress) -> Option<EntityState> {
        self.lock().states.get(address).cloned()
    }

    pub fn set_tip(&self, tip: BlockIndex) {
        self.lock().tip = tip;
    }

    pub fn current_tip(&self) -> BlockIndex {
        self.lock().tip
    }

    /// Makes the next `submit_transaction` call fail with `error`.
    ///
    /// Injected failures are consumed in FIFO order.
    pub fn inject_failure(&self, error: TransportError) {
        self.lock().injected.push_back(error);
    }

    /// Consumes a nonce for `signer` as if another device had submitted.
    pub fn bump_nonce(&self, signer: &EntityAddress) {
        *self.lock().nonces.entry(*signer).or_default() += 1;
    }

    /// Every transaction accepted so far, in submission order.
    pub fn submitted(&self) -> Vec<SignedTransaction> {
        self.lock().submitted.clone()
    }

    pub fn mempool_len(&self) -> usize {
        self.lock().mempool.len()
    }

    /// Drops every pooled transaction without executing it.
    pub fn drop_mempool(&self) -> Vec<SignedTransaction> {
        self.lock().mempool.drain(..).map(|(_, tx)| tx).collect()
    }

    /// Broadcasts an arbitrary event, e.g. another participant's evaluation.
    pub fn emit(&self, event: EvaluationEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Executes the mempool as a new block and broadcasts confirmations.
    pub fn produce_block(&self) -> Vec<ActionEvaluation> {
        let mut state = self.lock();
        state.tip += 1;
        let block_index = state.tip;

        let pooled: Vec<_> = state.mempool.drain(..).collect();
        let mut evaluations = Vec::new();
        for (tx_id, signed) in pooled {
            for action in signed.transaction.actions() {
                let ordinal = u32::try_from(evaluations.len()).unwrap_or(u32::MAX);
                evaluations.push(state.execute(action, block_index, ordinal, tx_id));
            }
        }

        debug!(
            block_index,
            actions = evaluations.len(),
            "mock ledger produced block"
        );
        state.blocks.push(evaluations.clone());
        drop(state);

        for evaluation in &evaluations {
            self.emit(EvaluationEvent::confirm(evaluation.clone()));
        }
        evaluations
    }

    /// Reverts the newest block and broadcasts rollbacks, newest action first.
    pub fn rollback_last_block(&self) -> Vec<ActionEvaluation> {
        let mut state = self.lock();
        let Some(block) = state.blocks.pop() else {
            return Vec::new();
        };

        for evaluation in block.iter().rev() {
            for address in evaluation.output_states.keys() {
                match evaluation.previous_states.get(address) {
                    Some(previous) => {
                        state.states.insert(*address, previous.clone());
                    }
                    None => {
                        state.states.remove(address);
                    }
                }
            }
        }
        state.tip = state.tip.saturating_sub(1);
        debug!(actions = block.len(), "mock ledger rolled back block");
        drop(state);

        let reverted: Vec<_> = block.into_iter().rev().collect();
        for evaluation in &reverted {
            self.emit(EvaluationEvent::rollback(evaluation.clone()));
        }
        reverted
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerState {
    fn execute(
        &mut self,
        action: &Action,
        block_index: BlockIndex,
        ordinal: u32,
        tx_id: TxId,
    ) -> ActionEvaluation {
        let mut evaluation = ActionEvaluation {
            action: action.clone(),
            block_index,
            ordinal,
            tx_id: Some(tx_id),
            output_states: BTreeMap::new(),
            previous_states: BTreeMap::new(),
            exception: None,
        };

        let effects = match self.effects(action, block_index) {
            Ok(effects) => effects,
            Err(exception) => {
                debug!(action = %action.id(), %exception, "mock ledger rejected action");
                evaluation.exception = Some(exception);
                return evaluation;
            }
        };

        for Speculation { address, modifier } in effects {
            let base = match evaluation.output_states.get(&address) {
                Some(current) => current.clone(),
                None => match self.states.get(&address) {
                    Some(stored) => {
                        evaluation.previous_states.insert(address, stored.clone());
                        stored.clone()
                    }
                    None => empty_state(modifier.target()),
                },
            };
            evaluation
                .output_states
                .insert(address, modifier.apply(&base));
        }

        for (address, output) in &evaluation.output_states {
            self.states.insert(*address, output.clone());
        }
        evaluation
    }

    /// Validates `action` and returns the authoritative modifiers it applies.
    fn effects(
        &mut self,
        action: &Action,
        block_index: BlockIndex,
    ) -> Result<Vec<Speculation>, ActionException> {
        let signer = action.signer();
        let gold = self
            .states
            .get(&signer)
            .and_then(EntityState::as_agent)
            .map(|agent| agent.gold)
            .unwrap_or(0);
        let avatar = match action.avatar() {
            Some(address) => Some(
                self.states
                    .get(&address)
                    .and_then(EntityState::as_avatar)
                    .cloned()
                    .ok_or_else(|| {
                        ActionException::new("AvatarNotFound", format!("no avatar at {address}"))
                    })?,
            ),
            None => None,
        };

        let cost = match action.input() {
            ActionInput::TransferAsset(a) => a.amount,
            ActionInput::CombineEquipment(a) => a.cost,
            ActionInput::EnhanceEquipment(a) => a.cost,
            ActionInput::BuyListing(a) => a.listing.price,
            ActionInput::JoinArena(a) => a.fee,
            _ => 0,
        };
        if gold < cost {
            return Err(ActionException::new(
                "InsufficientBalance",
                format!("balance {gold} is below required {cost}"),
            ));
        }

        let mut extra = Vec::new();
        match action.input() {
            ActionInput::TransferAsset(transfer) => {
                extra.push(Speculation::new(
                    transfer.recipient,
                    StateModifier::AdjustBalance {
                        amount: i64::try_from(transfer.amount).unwrap_or(i64::MAX),
                    },
                ));
            }
            ActionInput::CombineEquipment(combine) => {
                let avatar = avatar.as_ref().ok_or_else(missing_avatar)?;
                for (item_id, count) in &combine.materials {
                    if avatar.inventory.count(*item_id) < *count {
                        return Err(ActionException::new(
                            "NotEnoughMaterial",
                            format!("item {item_id} needs {count}"),
                        ));
                    }
                }
                if avatar
                    .combination_slots
                    .get(&combine.slot)
                    .is_some_and(|slot| slot.unlock_block_index > block_index)
                {
                    return Err(ActionException::new(
                        "SlotOccupied",
                        format!("slot {} is still crafting", combine.slot),
                    ));
                }
            }
            ActionInput::EnhanceEquipment(enhance) => {
                let avatar = avatar.as_ref().ok_or_else(missing_avatar)?;
                for item in [&enhance.target, &enhance.material] {
                    if !avatar.inventory.equipment.contains_key(&item.id) {
                        return Err(ActionException::new(
                            "ItemNotFound",
                            format!("equipment {} is not in the inventory", item.id),
                        ));
                    }
                }
            }
            ActionInput::RegisterListing(register) => {
                let avatar = avatar.as_ref().ok_or_else(missing_avatar)?;
                if avatar.inventory.count(register.item_id) < register.count {
                    return Err(ActionException::new(
                        "NotEnoughMaterial",
                        format!("item {} needs {}", register.item_id, register.count),
                    ));
                }
                let listing = Listing {
                    id: self.next_listing_id,
                    seller_agent: signer,
                    seller_avatar: register.avatar,
                    item_id: register.item_id,
                    count: register.count,
                    price: register.price,
                    registered_block: block_index,
                };
                self.next_listing_id += 1;
                extra.push(Speculation::new(
                    EntityAddress::market(),
                    StateModifier::AddListing { listing },
                ));
            }
            ActionInput::BuyListing(buy) => {
                let listing = self
                    .states
                    .get(&EntityAddress::market())
                    .and_then(EntityState::as_market)
                    .and_then(|market| market.listings.get(&buy.listing.id))
                    .cloned()
                    .ok_or_else(|| {
                        ActionException::new(
                            "ListingNotFound",
                            format!("listing {} is gone", buy.listing.id),
                        )
                    })?;
                extra.push(Speculation::new(
                    listing.seller_agent,
                    StateModifier::AdjustBalance {
                        amount: i64::try_from(listing.price).unwrap_or(i64::MAX),
                    },
                ));
                extra.push(Speculation::new(
                    EntityAddress::market(),
                    StateModifier::RemoveListing { listing },
                ));
            }
            ActionInput::ClearStage(stage) => {
                let avatar = avatar.as_ref().ok_or_else(missing_avatar)?;
                if avatar.action_point < stage.action_point_cost {
                    return Err(ActionException::new(
                        "NotEnoughActionPoint",
                        format!(
                            "{} action points, {} required",
                            avatar.action_point, stage.action_point_cost
                        ),
                    ));
                }
                let from = self.board_score(&EntityAddress::ranking(), &stage.avatar);
                let to = from.unwrap_or(0).max(u64::from(stage.stage_id));
                extra.push(Speculation::new(
                    EntityAddress::ranking(),
                    StateModifier::SetBoardEntry {
                        avatar: stage.avatar,
                        from,
                        to: Some(to),
                    },
                ));
            }
            ActionInput::JoinArena(arena) => {
                let board = EntityAddress::arena(arena.championship, arena.round);
                let from = self.board_score(&board, &arena.avatar);
                extra.push(Speculation::new(
                    board,
                    StateModifier::SetBoardEntry {
                        avatar: arena.avatar,
                        from,
                        to: Some(from.unwrap_or(ARENA_START_SCORE)),
                    },
                ));
            }
            ActionInput::ClaimReward(_) | ActionInput::RedeemMail(_) => {}
        }

        // Reuse the client-side effects with an exact, unbounded unlock estimate.
        let unlock = UnlockEstimate {
            safety_margin_blocks: 0,
            max_estimate_blocks: u64::MAX,
            ..UnlockEstimate::default()
        };
        let states = &self.states;
        let view = |address: &EntityAddress| states.get(address).cloned();
        let ctx = EffectContext {
            tip: block_index,
            unlock,
            view: &view,
        };
        let mut effects = anticipate(action, &ctx);

        if let ActionInput::CombineEquipment(combine) = action.input() {
            for effect in &mut effects {
                if let StateModifier::SetSlot { to: Some(slot), .. } = &mut effect.modifier {
                    slot.estimated = false;
                    slot.result = Some(Equipment {
                        id: self.next_equipment_id,
                        item_id: combine.result_item_id,
                        level: 0,
                    });
                    self.next_equipment_id += 1;
                }
            }
        }

        effects.extend(extra);
        Ok(effects)
    }

    fn board_score(&self, board: &EntityAddress, avatar: &EntityAddress) -> Option<u64> {
        self.states
            .get(board)
            .and_then(EntityState::as_board)
            .and_then(|board| board.score(avatar))
    }
}

fn missing_avatar() -> ActionException {
    ActionException::new("AvatarNotFound", "action has no avatar")
}

fn empty_state(target: ModifierTarget) -> EntityState {
    match target {
        ModifierTarget::Agent => AgentState::default().into(),
        ModifierTarget::Avatar => AvatarState::default().into(),
        ModifierTarget::Market => MarketState::default().into(),
        ModifierTarget::Board => BoardState::default().into(),
    }
}

#[async_trait]
impl LedgerTransport for MockLedger {
    async fn submit_transaction(&self, tx: SignedTransaction) -> Result<TxId, TransportError> {
        let mut state = self.lock();
        if let Some(error) = state.injected.pop_front() {
            return Err(error);
        }

        let signer = tx.transaction.signer();
        let expected = state.nonces.get(&signer).copied().unwrap_or(0);
        if tx.transaction.nonce() != expected {
            return Err(TransportError::NonceConflict {
                signer,
                submitted: tx.transaction.nonce(),
                expected,
            });
        }
        if tx.signature.0.is_empty() {
            return Err(TransportError::Rejected("missing signature".into()));
        }

        let tx_id = tx
            .transaction
            .id()
            .map_err(|e| TransportError::SerializationError(e.to_string()))?;
        state.nonces.insert(signer, expected + 1);
        state.submitted.push(tx.clone());
        state.mempool.push((tx_id, tx));
        Ok(tx_id)
    }

    async fn next_nonce(&self, signer: &EntityAddress) -> Result<u64, TransportError> {
        Ok(self.lock().nonces.get(signer).copied().unwrap_or(0))
    }

    async fn query_state(
        &self,
        address: &EntityAddress,
    ) -> Result<Option<EntityState>, TransportError> {
        Ok(self.state(address))
    }

    async fn tip(&self) -> Result<BlockIndex, TransportError> {
        Ok(self.current_tip())
    }

    fn subscribe_evaluations(&self) -> broadcast::Receiver<EvaluationEvent> {
        self.events.subscribe()
    }

    async fn evaluation_of(
        &self,
        action_id: ActionId,
    ) -> Result<Option<ActionEvaluation>, TransportError> {
        Ok(self
            .lock()
            .blocks
            .iter()
            .rev()
            .flatten()
            .find(|evaluation| evaluation.action_id() == action_id)
            .cloned())
    }
}

/// Deterministic signer keyed by the agent address.
#[derive(Clone, Debug)]
pub struct MockSigner {
    address: EntityAddress,
    secret: [u8; 32],
}

impl MockSigner {
    pub fn new(address: EntityAddress) -> Self {
        let secret = Sha256::digest(address.as_bytes()).into();
        Self { address, secret }
    }
}

impl TransactionSigner for MockSigner {
    fn address(&self) -> EntityAddress {
        self.address
    }

    fn sign(&self, transaction: &Transaction) -> Result<Signature, SignerError> {
        if transaction.signer() != self.address {
            return Err(SignerError::WrongSigner {
                signer: self.address,
                requested: transaction.signer(),
            });
        }
        let mut hasher = Sha256::new();
        hasher.update(self.secret);
        hasher.update(transaction.signing_payload()?);
        Ok(Signature(hasher.finalize().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EvaluationDirection, LedgerPosition};
    use game_core::{ClearStageAction, RegisterListingAction, TransferAssetAction};

    fn agent() -> EntityAddress {
        EntityAddress::shared("mock-agent")
    }

    async fn submit(ledger: &MockLedger, actions: Vec<Action>) -> Result<TxId, TransportError> {
        let nonce = ledger.next_nonce(&agent()).await?;
        let tx = Transaction::new(agent(), nonce, actions).unwrap();
        let signature = MockSigner::new(agent()).sign(&tx).unwrap();
        ledger
            .submit_transaction(SignedTransaction {
                transaction: tx,
                signature,
            })
            .await
    }

    #[tokio::test]
    async fn transfer_moves_gold_and_broadcasts_confirmation() {
        let friend = EntityAddress::shared("friend");
        let ledger = MockLedger::new().with_state(agent(), AgentState::with_gold(100));
        let mut events = ledger.subscribe_evaluations();

        submit(
            &ledger,
            vec![Action::new(
                agent(),
                TransferAssetAction {
                    recipient: friend,
                    amount: 40,
                    memo: None,
                },
            )],
        )
        .await
        .unwrap();
        let block = ledger.produce_block();

        assert_eq!(block.len(), 1);
        assert!(block[0].is_success());
        assert_eq!(
            ledger.state(&agent()),
            Some(AgentState::with_gold(60).into())
        );
        assert_eq!(
            ledger.state(&friend),
            Some(AgentState::with_gold(40).into())
        );
        assert!(block[0].previous(&friend).is_none());

        let event = events.recv().await.unwrap();
        assert_eq!(event.direction, EvaluationDirection::Confirm);
        assert_eq!(event.evaluation.action_id(), block[0].action_id());
    }

    fn pay(amount: u64) -> Action {
        Action::new(
            agent(),
            TransferAssetAction {
                recipient: EntityAddress::shared("friend"),
                amount,
                memo: None,
            },
        )
    }

    #[tokio::test]
    async fn ordinals_count_actions_across_transactions() {
        let ledger = MockLedger::new().with_state(agent(), AgentState::with_gold(100));
        submit(&ledger, vec![pay(1), pay(2)]).await.unwrap();
        submit(&ledger, vec![pay(3)]).await.unwrap();

        let block = ledger.produce_block();
        let positions: Vec<_> = block.iter().map(ActionEvaluation::position).collect();
        assert_eq!(
            positions,
            vec![
                LedgerPosition::new(1, 0),
                LedgerPosition::new(1, 1),
                LedgerPosition::new(1, 2),
            ]
        );
        assert!(positions[2] < LedgerPosition::end_of(1));
        assert!(LedgerPosition::end_of(1) < LedgerPosition::new(2, 0));
    }

    #[tokio::test]
    async fn evaluation_lookup_follows_block_history() {
        let ledger = MockLedger::new().with_state(agent(), AgentState::with_gold(100));
        let action = pay(10);
        submit(&ledger, vec![action.clone()]).await.unwrap();
        assert_eq!(ledger.evaluation_of(action.id()).await.unwrap(), None);

        let block = ledger.produce_block();
        assert_eq!(
            ledger.evaluation_of(action.id()).await.unwrap().as_ref(),
            block.first()
        );

        ledger.rollback_last_block();
        assert_eq!(ledger.evaluation_of(action.id()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn small_event_buffer_lags_slow_subscribers() {
        let ledger = MockLedger::with_event_capacity(1)
            .with_state(agent(), AgentState::with_gold(100));
        let mut events = ledger.subscribe_evaluations();
        submit(&ledger, vec![pay(1), pay(2)]).await.unwrap();
        ledger.produce_block();

        assert!(matches!(
            events.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
    }

    #[tokio::test]
    async fn insufficient_balance_yields_exception_without_writes() {
        let ledger = MockLedger::new().with_state(agent(), AgentState::with_gold(5));
        submit(
            &ledger,
            vec![Action::new(
                agent(),
                TransferAssetAction {
                    recipient: EntityAddress::shared("friend"),
                    amount: 40,
                    memo: None,
                },
            )],
        )
        .await
        .unwrap();

        let block = ledger.produce_block();
        let exception = block[0].exception.as_ref().unwrap();
        assert_eq!(exception.name, "InsufficientBalance");
        assert!(block[0].output_states.is_empty());
        assert_eq!(ledger.state(&agent()), Some(AgentState::with_gold(5).into()));
    }

    #[tokio::test]
    async fn stale_nonce_is_a_conflict() {
        let ledger = MockLedger::new();
        ledger.bump_nonce(&agent());

        let tx = Transaction::new(
            agent(),
            0,
            vec![Action::new(
                agent(),
                TransferAssetAction {
                    recipient: agent(),
                    amount: 0,
                    memo: None,
                },
            )],
        )
        .unwrap();
        let signature = MockSigner::new(agent()).sign(&tx).unwrap();
        let result = ledger
            .submit_transaction(SignedTransaction {
                transaction: tx,
                signature,
            })
            .await;

        assert!(matches!(
            result,
            Err(TransportError::NonceConflict { expected: 1, .. })
        ));
    }

    #[tokio::test]
    async fn rollback_restores_previous_states() {
        let avatar_address = EntityAddress::avatar(&agent(), 0);
        let mut avatar = AvatarState::new(agent(), "runner");
        avatar.action_point = 10;
        avatar.inventory.add_fungible(7, 3);
        let ledger = MockLedger::new()
            .with_state(agent(), AgentState::with_gold(0))
            .with_state(avatar_address, avatar.clone());
        let mut events = ledger.subscribe_evaluations();

        submit(
            &ledger,
            vec![
                Action::new(
                    agent(),
                    ClearStageAction {
                        avatar: avatar_address,
                        stage_id: 4,
                        action_point_cost: 5,
                    },
                ),
                Action::new(
                    agent(),
                    RegisterListingAction {
                        avatar: avatar_address,
                        item_id: 7,
                        count: 2,
                        price: 30,
                    },
                ),
            ],
        )
        .await
        .unwrap();
        let block = ledger.produce_block();
        assert!(block.iter().all(ActionEvaluation::is_success));
        assert!(ledger.state(&EntityAddress::market()).is_some());

        let reverted = ledger.rollback_last_block();
        assert_eq!(reverted.len(), 2);
        assert_eq!(reverted[0].action_id(), block[1].action_id());
        assert_eq!(ledger.state(&avatar_address), Some(avatar.into()));
        assert_eq!(ledger.state(&EntityAddress::market()), None);
        assert_eq!(ledger.state(&EntityAddress::ranking()), None);

        let directions: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|event| event.direction)
            .collect();
        assert_eq!(
            directions,
            vec![
                EvaluationDirection::Confirm,
                EvaluationDirection::Confirm,
                EvaluationDirection::Rollback,
                EvaluationDirection::Rollback,
            ]
        );
    }

    #[test]
    fn signer_refuses_foreign_transactions() {
        let other = EntityAddress::shared("other");
        let tx = Transaction::new(
            other,
            0,
            vec![Action::new(
                other,
                TransferAssetAction {
                    recipient: agent(),
                    amount: 1,
                    memo: None,
                },
            )],
        )
        .unwrap();
        assert!(matches!(
            MockSigner::new(agent()).sign(&tx),
            Err(SignerError::WrongSigner { .. })
        ));
    }
}
