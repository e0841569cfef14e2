//! Object-change and market notification dispatcher (C9).
//!
//! Grounded in `messages.rs`'s `DepthSnapshot` / crossbeam-queue pattern:
//! the teacher's matching engine pushes depth snapshots onto a bounded
//! `ArrayQueue` with `let _ = queue.push(..)`, so a full queue drops the
//! oldest update rather than stalling the engine. This module applies the
//! same non-blocking-producer shape to object/market subscriptions:
//! `ChainController::apply_block` only *enqueues* a diff of what changed
//! (cheap, never blocks), and a separate `dispatch_pending` call — driven
//! by whatever owns the node's event loop, not by block application
//! itself — drains the queue and actually runs subscriber callbacks.

use crate::core_types::ObjectId;
use crate::db::undo::ObjectChange;
use crate::db::ObjectDatabase;
use crate::error::ChainResult;
use crate::tx::Operation;
use crossbeam_queue::ArrayQueue;
use rustc_hash::FxHashMap;
use serde_json::Value;

/// A subscribed `(base_asset, quote_asset)` pair, asset ids ordered so the
/// same market is always addressed by the same key regardless of which
/// side an order's `sell_price` quotes.
pub type MarketKey = (ObjectId, ObjectId);

pub fn market_key(a: ObjectId, b: ObjectId) -> MarketKey {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Per-object callback: receives the object's current JSON snapshot, or
/// `None` if it was removed.
pub type ObjectCallback = Box<dyn FnMut(Option<Value>) -> ChainResult<()> + Send>;

/// Per-market callback: receives the ordered operations from one applied
/// block that touched this market.
pub type MarketCallback = Box<dyn FnMut(&[Operation]) -> ChainResult<()> + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct ObjectSub {
    handle: SubscriptionHandle,
    callback: ObjectCallback,
}

struct MarketSub {
    handle: SubscriptionHandle,
    callback: MarketCallback,
}

/// One applied block's worth of notification inputs, queued up for later
/// dispatch.
struct PendingBlock {
    changes: Vec<ObjectChange>,
    market_ops: Vec<(MarketKey, Operation)>,
}

/// Registry of subscribers plus the queue of not-yet-dispatched blocks.
pub struct SubscriptionDispatcher {
    next_handle: u64,
    object_subs: FxHashMap<ObjectId, Vec<ObjectSub>>,
    market_subs: FxHashMap<MarketKey, Vec<MarketSub>>,
    pending: ArrayQueue<PendingBlock>,
}

impl SubscriptionDispatcher {
    /// `capacity` bounds how many applied blocks can sit unconsumed before
    /// `queue_block` starts dropping them — a slow or absent consumer must
    /// never be able to stall block application.
    pub fn new(capacity: usize) -> Self {
        Self {
            next_handle: 0,
            object_subs: FxHashMap::default(),
            market_subs: FxHashMap::default(),
            pending: ArrayQueue::new(capacity.max(1)),
        }
    }

    fn alloc_handle(&mut self) -> SubscriptionHandle {
        let h = SubscriptionHandle(self.next_handle);
        self.next_handle += 1;
        h
    }

    pub fn subscribe_object(&mut self, id: ObjectId, callback: ObjectCallback) -> SubscriptionHandle {
        let handle = self.alloc_handle();
        self.object_subs
            .entry(id)
            .or_default()
            .push(ObjectSub { handle, callback });
        handle
    }

    pub fn unsubscribe_object(&mut self, id: ObjectId, handle: SubscriptionHandle) {
        if let Some(subs) = self.object_subs.get_mut(&id) {
            subs.retain(|s| s.handle != handle);
        }
    }

    pub fn subscribe_market(&mut self, key: MarketKey, callback: MarketCallback) -> SubscriptionHandle {
        let handle = self.alloc_handle();
        self.market_subs
            .entry(key)
            .or_default()
            .push(MarketSub { handle, callback });
        handle
    }

    pub fn unsubscribe_market(&mut self, key: MarketKey, handle: SubscriptionHandle) {
        if let Some(subs) = self.market_subs.get_mut(&key) {
            subs.retain(|s| s.handle != handle);
        }
    }

    /// Non-blocking: called right after a block's undo session commits.
    /// Returns `false` if the queue was full and this block's diff was
    /// dropped — callers may log that, but must not retry synchronously.
    pub fn queue_block(&self, changes: Vec<ObjectChange>, ops: &[Operation]) -> bool {
        if self.object_subs.is_empty() && self.market_subs.is_empty() {
            return true;
        }
        let market_ops = ops
            .iter()
            .filter_map(|op| market_key_for_op(op).map(|k| (k, op.clone())))
            .collect();
        self.pending
            .push(PendingBlock { changes, market_ops })
            .is_ok()
    }

    /// Drain every queued block and invoke subscriber callbacks against the
    /// database's current state. Run this off the block-apply path (e.g.
    /// from the node's main loop between blocks) so a slow callback never
    /// delays consensus. Returns the number of blocks drained.
    pub fn dispatch_pending(&mut self, db: &ObjectDatabase) -> usize {
        let mut drained = 0;
        while let Some(block) = self.pending.pop() {
            drained += 1;
            self.dispatch_one(db, block);
        }
        drained
    }

    fn dispatch_one(&mut self, db: &ObjectDatabase, block: PendingBlock) {
        let mut dead_object: Vec<(ObjectId, SubscriptionHandle)> = Vec::new();
        for change in &block.changes {
            let id = change.id();
            let Some(subs) = self.object_subs.get_mut(&id) else {
                continue;
            };
            let value = match change {
                ObjectChange::Removed(_) => None,
                ObjectChange::Created(_) | ObjectChange::Modified(_) => db.object_snapshot(id),
            };
            for sub in subs.iter_mut() {
                if (sub.callback)(value.clone()).is_err() {
                    dead_object.push((id, sub.handle));
                }
            }
        }
        for (id, handle) in dead_object {
            self.unsubscribe_object(id, handle);
        }

        let mut by_market: FxHashMap<MarketKey, Vec<Operation>> = FxHashMap::default();
        for (key, op) in block.market_ops {
            by_market.entry(key).or_default().push(op);
        }
        let mut dead_market: Vec<(MarketKey, SubscriptionHandle)> = Vec::new();
        for (key, ops) in &by_market {
            let Some(subs) = self.market_subs.get_mut(key) else {
                continue;
            };
            for sub in subs.iter_mut() {
                if (sub.callback)(ops).is_err() {
                    dead_market.push((*key, sub.handle));
                }
            }
        }
        for (key, handle) in dead_market {
            self.unsubscribe_market(key, handle);
        }
    }
}

/// Which market, if any, an operation belongs to — only operations that
/// directly name a trading pair produce one.
fn market_key_for_op(op: &Operation) -> Option<MarketKey> {
    match op {
        Operation::LimitOrderCreate { sell_price, .. } => {
            Some(market_key(sell_price.base.asset_id, sell_price.quote.asset_id))
        }
        Operation::AssetGlobalSettle {
            asset_id,
            settle_price,
            ..
        } => Some(market_key(*asset_id, settle_price.quote.asset_id)),
        _ => None,
    }
}
