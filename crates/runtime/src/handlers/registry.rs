//! Handler lookup by action kind.

use std::collections::HashMap;
use std::sync::Arc;

use game_core::ActionKind;

use super::{
    BuyListingHandler, ClaimRewardHandler, ClearStageHandler, CombineEquipmentHandler,
    EnhanceEquipmentHandler, JoinArenaHandler, ReconciliationHandler, RedeemMailHandler,
    RegisterListingHandler, TransferAssetHandler,
};

/// Registry mapping each [`ActionKind`] to its reconciliation handler.
///
/// Evaluations of a kind without a handler are ignored by the router.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ActionKind, Arc<dyn ReconciliationHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with a handler for every built-in kind.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let defaults: [Arc<dyn ReconciliationHandler>; 9] = [
            Arc::new(TransferAssetHandler),
            Arc::new(CombineEquipmentHandler),
            Arc::new(EnhanceEquipmentHandler),
            Arc::new(ClaimRewardHandler),
            Arc::new(RedeemMailHandler),
            Arc::new(RegisterListingHandler),
            Arc::new(BuyListingHandler),
            Arc::new(ClearStageHandler),
            Arc::new(JoinArenaHandler),
        ];
        for handler in defaults {
            registry.register(handler);
        }
        registry
    }

    /// Registers `handler` for its kind, returning the handler it replaced.
    pub fn register(
        &mut self,
        handler: Arc<dyn ReconciliationHandler>,
    ) -> Option<Arc<dyn ReconciliationHandler>> {
        self.handlers.insert(handler.kind(), handler)
    }

    pub fn remove(&mut self, kind: ActionKind) -> Option<Arc<dyn ReconciliationHandler>> {
        self.handlers.remove(&kind)
    }

    pub fn get(&self, kind: ActionKind) -> Option<&Arc<dyn ReconciliationHandler>> {
        self.handlers.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
