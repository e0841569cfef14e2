//! Object database (C1): typed per-`(space, type)` tables, each a
//! monotonic instance counter plus a primary map, with secondary indices
//! layered on top where a module needs one (e.g. "limit orders sorted by
//! price" for the market engine).
//!
//! Grounded in `original_source/libraries/db/object_database.cpp`'s
//! `index`/`primary_index` split: this module plays the role of that
//! database, while `db::undo` plays the role of its undo-state stack.
//! Every mutating method here records a pre-image with the active
//! `UndoStack` session before applying the change, which is what makes
//! `ChainController::pop_block` able to unwind a whole block.

pub mod objects;
pub mod undo;

use crate::core_types::{ObjectId, Space, TypeTag};
use crate::error::{ChainResult, StateError};
use rustc_hash::FxHashMap;
use std::any::Any;
use undo::{downcast_or_corrupt, UndoSink, UndoStack};

/// A single `(space, type)` table: a dense instance counter plus sparse
/// storage (objects can be removed, leaving holes).
struct Table<T> {
    next_instance: u64,
    rows: FxHashMap<ObjectId, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_instance: 0,
            rows: FxHashMap::default(),
        }
    }
}

/// Object store for a single object type `T`, addressed by `ObjectId`.
/// `T` must carry its own id as a field named by convention `id`; callers
/// pass it explicitly to `insert` to keep this module free of a trait per
/// entity type.
pub struct Index<T> {
    space: Space,
    type_tag: TypeTag,
    table: Table<T>,
}

impl<T: Clone + Send + Sync + 'static> Index<T> {
    fn new(space: Space, type_tag: TypeTag) -> Self {
        Self {
            space,
            type_tag,
            table: Table::default(),
        }
    }

    /// Reserve the next id in this table without inserting anything — used
    /// when an object's own fields need to reference its about-to-exist id
    /// (e.g. `AccountStatistics` pointing back at its `Account`).
    pub fn reserve_id(&mut self) -> ObjectId {
        let instance = self.table.next_instance;
        self.table.next_instance += 1;
        ObjectId::new(self.space, self.type_tag, instance)
    }

    pub fn insert(&mut self, id: ObjectId, value: T, undo: &mut UndoStack) -> ChainResult<()> {
        debug_assert_eq!(id.space, self.space);
        debug_assert_eq!(id.type_tag, self.type_tag);
        undo.on_create(id)?;
        self.table.rows.insert(id, value);
        Ok(())
    }

    pub fn get(&self, id: ObjectId) -> ChainResult<&T> {
        self.table.rows.get(&id).ok_or(StateError::NotFound(id).into())
    }

    pub fn try_get(&self, id: ObjectId) -> Option<&T> {
        self.table.rows.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &T)> {
        self.table.rows.iter()
    }

    /// Modify the object at `id` via `f`, recording the pre-image so the
    /// change can be undone.
    pub fn modify(
        &mut self,
        id: ObjectId,
        undo: &mut UndoStack,
        f: impl FnOnce(&mut T),
    ) -> ChainResult<()> {
        let old = self
            .table
            .rows
            .get(&id)
            .cloned()
            .ok_or(StateError::NotFound(id))?;
        undo.on_modify(id, &old)?;
        let row = self.table.rows.get_mut(&id).expect("checked above");
        f(row);
        Ok(())
    }

    pub fn remove(&mut self, id: ObjectId, undo: &mut UndoStack) -> ChainResult<T> {
        let old = self
            .table
            .rows
            .remove(&id)
            .ok_or(StateError::NotFound(id))?;
        undo.on_remove(id, &old)?;
        Ok(old)
    }

    /// Re-insert `value` at `id` with no new instance allocated — used only
    /// by `undo::UndoSink::restore_removed`.
    fn restore(&mut self, id: ObjectId, value: T) {
        self.table.rows.insert(id, value);
    }

    fn erase(&mut self, id: ObjectId) {
        self.table.rows.remove(&id);
    }
}

use objects::*;

/// All object tables in one place, implementing `UndoSink` so the undo
/// stack can reverse changes without knowing concrete types.
pub struct ObjectDatabase {
    pub accounts: Index<Account>,
    pub account_statistics: Index<AccountStatistics>,
    pub assets: Index<Asset>,
    pub asset_dynamic_data: Index<AssetDynamicData>,
    pub asset_bitasset_data: Index<AssetBitassetData>,
    pub limit_orders: Index<LimitOrder>,
    pub call_orders: Index<CallOrder>,
    pub force_settlements: Index<ForceSettlement>,
    pub balances: Index<Balance>,
    pub witnesses: Index<Witness>,
    pub delegates: Index<Delegate>,
    pub proposals: Index<Proposal>,
    pub operation_history: Index<OperationHistory>,
    pub global_properties: Index<GlobalProperties>,
    pub dynamic_global_properties: Index<DynamicGlobalProperties>,
    pub witness_schedule: Index<WitnessSchedule>,
}

impl Default for ObjectDatabase {
    fn default() -> Self {
        use crate::core_types::{impl_types, protocol_types};
        Self {
            accounts: Index::new(Space::Protocol, protocol_types::ACCOUNT),
            account_statistics: Index::new(Space::Implementation, impl_types::ACCOUNT_STATISTICS),
            assets: Index::new(Space::Protocol, protocol_types::ASSET),
            asset_dynamic_data: Index::new(Space::Implementation, impl_types::ASSET_DYNAMIC_DATA),
            asset_bitasset_data: Index::new(
                Space::Implementation,
                impl_types::ASSET_BITASSET_DATA,
            ),
            limit_orders: Index::new(Space::Protocol, protocol_types::LIMIT_ORDER),
            call_orders: Index::new(Space::Protocol, protocol_types::CALL_ORDER),
            force_settlements: Index::new(Space::Protocol, protocol_types::FORCE_SETTLEMENT),
            balances: Index::new(Space::Protocol, protocol_types::BALANCE),
            witnesses: Index::new(Space::Protocol, protocol_types::WITNESS),
            delegates: Index::new(Space::Protocol, protocol_types::DELEGATE),
            proposals: Index::new(Space::Protocol, protocol_types::PROPOSAL),
            operation_history: Index::new(Space::Protocol, protocol_types::OPERATION_HISTORY),
            global_properties: Index::new(Space::Implementation, impl_types::GLOBAL_PROPERTIES),
            dynamic_global_properties: Index::new(
                Space::Implementation,
                impl_types::DYNAMIC_GLOBAL_PROPERTIES,
            ),
            witness_schedule: Index::new(Space::Implementation, impl_types::WITNESS_SCHEDULE),
        }
    }
}

impl ObjectDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit orders selling `for_sale_asset`, sorted best (lowest sell
    /// price, i.e. cheapest quote per base) first. Rebuilt on demand
    /// rather than maintained incrementally — the teacher's `engine.rs`
    /// BTreeMap book does the same per-symbol rebuild-on-match pattern.
    pub fn limit_orders_for_asset(&self, for_sale_asset: ObjectId) -> Vec<&LimitOrder> {
        let mut orders: Vec<&LimitOrder> = self
            .limit_orders
            .iter()
            .map(|(_, o)| o)
            .filter(|o| o.sell_price.base.asset_id == for_sale_asset)
            .collect();
        orders.sort_by(|a, b| {
            if a.sell_price.less_than(&b.sell_price) {
                std::cmp::Ordering::Less
            } else if b.sell_price.less_than(&a.sell_price) {
                std::cmp::Ordering::Greater
            } else {
                a.id.cmp(&b.id)
            }
        });
        orders
    }

    /// Call orders on `debt_asset`, sorted worst-collateralized (lowest
    /// call price, i.e. closest to triggering a margin call) first.
    pub fn call_orders_for_asset(&self, debt_asset: ObjectId) -> Vec<&CallOrder> {
        let mut orders: Vec<&CallOrder> = self
            .call_orders
            .iter()
            .map(|(_, o)| o)
            .filter(|o| o.call_price.quote.asset_id == debt_asset)
            .collect();
        orders.sort_by(|a, b| {
            if a.call_price.less_than(&b.call_price) {
                std::cmp::Ordering::Less
            } else if b.call_price.less_than(&a.call_price) {
                std::cmp::Ordering::Greater
            } else {
                a.id.cmp(&b.id)
            }
        });
        orders
    }
}

impl UndoSink for ObjectDatabase {
    fn erase_created(&mut self, id: ObjectId) {
        use crate::core_types::{impl_types, protocol_types, Space};
        match (id.space, id.type_tag) {
            (Space::Protocol, protocol_types::ACCOUNT) => self.accounts.erase(id),
            (Space::Protocol, protocol_types::ASSET) => self.assets.erase(id),
            (Space::Protocol, protocol_types::LIMIT_ORDER) => self.limit_orders.erase(id),
            (Space::Protocol, protocol_types::CALL_ORDER) => self.call_orders.erase(id),
            (Space::Protocol, protocol_types::FORCE_SETTLEMENT) => {
                self.force_settlements.erase(id)
            }
            (Space::Protocol, protocol_types::BALANCE) => self.balances.erase(id),
            (Space::Protocol, protocol_types::WITNESS) => self.witnesses.erase(id),
            (Space::Protocol, protocol_types::DELEGATE) => self.delegates.erase(id),
            (Space::Protocol, protocol_types::PROPOSAL) => self.proposals.erase(id),
            (Space::Protocol, protocol_types::OPERATION_HISTORY) => {
                self.operation_history.erase(id)
            }
            (Space::Implementation, impl_types::ACCOUNT_STATISTICS) => {
                self.account_statistics.erase(id)
            }
            (Space::Implementation, impl_types::ASSET_DYNAMIC_DATA) => {
                self.asset_dynamic_data.erase(id)
            }
            (Space::Implementation, impl_types::ASSET_BITASSET_DATA) => {
                self.asset_bitasset_data.erase(id)
            }
            (Space::Implementation, impl_types::GLOBAL_PROPERTIES) => {
                self.global_properties.erase(id)
            }
            (Space::Implementation, impl_types::DYNAMIC_GLOBAL_PROPERTIES) => {
                self.dynamic_global_properties.erase(id)
            }
            (Space::Implementation, impl_types::WITNESS_SCHEDULE) => {
                self.witness_schedule.erase(id)
            }
            _ => {}
        }
    }

    fn restore_modified(&mut self, id: ObjectId, old: Box<dyn Any + Send + Sync>) {
        self.restore_into(id, old);
    }

    fn restore_removed(&mut self, id: ObjectId, old: Box<dyn Any + Send + Sync>) {
        self.restore_into(id, old);
    }
}

impl ObjectDatabase {
    fn restore_into(&mut self, id: ObjectId, old: Box<dyn Any + Send + Sync>) {
        use crate::core_types::{impl_types, protocol_types, Space};
        macro_rules! put {
            ($table:expr, $ty:ty) => {{
                if let Ok(v) = downcast_or_corrupt::<$ty>(old) {
                    $table.restore(id, v);
                }
                return;
            }};
        }
        match (id.space, id.type_tag) {
            (Space::Protocol, protocol_types::ACCOUNT) => put!(self.accounts, Account),
            (Space::Protocol, protocol_types::ASSET) => put!(self.assets, Asset),
            (Space::Protocol, protocol_types::LIMIT_ORDER) => put!(self.limit_orders, LimitOrder),
            (Space::Protocol, protocol_types::CALL_ORDER) => put!(self.call_orders, CallOrder),
            (Space::Protocol, protocol_types::FORCE_SETTLEMENT) => {
                put!(self.force_settlements, ForceSettlement)
            }
            (Space::Protocol, protocol_types::BALANCE) => put!(self.balances, Balance),
            (Space::Protocol, protocol_types::WITNESS) => put!(self.witnesses, Witness),
            (Space::Protocol, protocol_types::DELEGATE) => put!(self.delegates, Delegate),
            (Space::Protocol, protocol_types::PROPOSAL) => put!(self.proposals, Proposal),
            (Space::Protocol, protocol_types::OPERATION_HISTORY) => {
                put!(self.operation_history, OperationHistory)
            }
            (Space::Implementation, impl_types::ACCOUNT_STATISTICS) => {
                put!(self.account_statistics, AccountStatistics)
            }
            (Space::Implementation, impl_types::ASSET_DYNAMIC_DATA) => {
                put!(self.asset_dynamic_data, AssetDynamicData)
            }
            (Space::Implementation, impl_types::ASSET_BITASSET_DATA) => {
                put!(self.asset_bitasset_data, AssetBitassetData)
            }
            (Space::Implementation, impl_types::GLOBAL_PROPERTIES) => {
                put!(self.global_properties, GlobalProperties)
            }
            (Space::Implementation, impl_types::DYNAMIC_GLOBAL_PROPERTIES) => {
                put!(self.dynamic_global_properties, DynamicGlobalProperties)
            }
            (Space::Implementation, impl_types::WITNESS_SCHEDULE) => {
                put!(self.witness_schedule, WitnessSchedule)
            }
            _ => {}
        }
    }
}

impl ObjectDatabase {
    /// Serialize the current row at `id` to JSON, or `None` if it no longer
    /// exists — what the subscription dispatcher (C9) sends a per-object
    /// callback as the "new value" half of a diff.
    pub fn object_snapshot(&self, id: ObjectId) -> Option<serde_json::Value> {
        use crate::core_types::{impl_types, protocol_types, Space};
        macro_rules! snap {
            ($table:expr) => {
                return $table.try_get(id).and_then(|v| serde_json::to_value(v).ok())
            };
        }
        match (id.space, id.type_tag) {
            (Space::Protocol, protocol_types::ACCOUNT) => snap!(self.accounts),
            (Space::Protocol, protocol_types::ASSET) => snap!(self.assets),
            (Space::Protocol, protocol_types::LIMIT_ORDER) => snap!(self.limit_orders),
            (Space::Protocol, protocol_types::CALL_ORDER) => snap!(self.call_orders),
            (Space::Protocol, protocol_types::FORCE_SETTLEMENT) => snap!(self.force_settlements),
            (Space::Protocol, protocol_types::BALANCE) => snap!(self.balances),
            (Space::Protocol, protocol_types::WITNESS) => snap!(self.witnesses),
            (Space::Protocol, protocol_types::DELEGATE) => snap!(self.delegates),
            (Space::Protocol, protocol_types::PROPOSAL) => snap!(self.proposals),
            (Space::Protocol, protocol_types::OPERATION_HISTORY) => snap!(self.operation_history),
            (Space::Implementation, impl_types::ACCOUNT_STATISTICS) => {
                snap!(self.account_statistics)
            }
            (Space::Implementation, impl_types::ASSET_DYNAMIC_DATA) => {
                snap!(self.asset_dynamic_data)
            }
            (Space::Implementation, impl_types::ASSET_BITASSET_DATA) => {
                snap!(self.asset_bitasset_data)
            }
            (Space::Implementation, impl_types::GLOBAL_PROPERTIES) => snap!(self.global_properties),
            (Space::Implementation, impl_types::DYNAMIC_GLOBAL_PROPERTIES) => {
                snap!(self.dynamic_global_properties)
            }
            (Space::Implementation, impl_types::WITNESS_SCHEDULE) => snap!(self.witness_schedule),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{protocol_types, Amount, Space};

    #[test]
    fn insert_get_modify_remove_roundtrip() {
        let mut db = ObjectDatabase::new();
        let mut undo = UndoStack::new();
        undo.push_session();

        let id = db.balances.reserve_id();
        let owner = ObjectId::new(Space::Protocol, protocol_types::ACCOUNT, 0);
        let asset_id = ObjectId::new(Space::Protocol, protocol_types::ASSET, 0);
        db.balances
            .insert(
                id,
                Balance {
                    id,
                    owner,
                    asset_id,
                    amount: Amount(100),
                },
                &mut undo,
            )
            .unwrap();

        db.balances
            .modify(id, &mut undo, |b| b.amount = Amount(50))
            .unwrap();
        assert_eq!(db.balances.get(id).unwrap().amount, Amount(50));

        let removed = db.balances.remove(id, &mut undo).unwrap();
        assert_eq!(removed.amount, Amount(50));
        assert!(db.balances.try_get(id).is_none());
    }

    #[test]
    fn undo_restores_modified_object() {
        let mut db = ObjectDatabase::new();
        let mut undo = UndoStack::new();
        undo.push_session();

        let id = db.balances.reserve_id();
        let owner = ObjectId::new(Space::Protocol, protocol_types::ACCOUNT, 0);
        let asset_id = ObjectId::new(Space::Protocol, protocol_types::ASSET, 0);
        db.balances
            .insert(
                id,
                Balance {
                    id,
                    owner,
                    asset_id,
                    amount: Amount(100),
                },
                &mut undo,
            )
            .unwrap();
        undo.commit_session().unwrap();

        undo.push_session();
        db.balances
            .modify(id, &mut undo, |b| b.amount = Amount(1))
            .unwrap();
        undo.undo_session(&mut db).unwrap();

        assert_eq!(db.balances.get(id).unwrap().amount, Amount(100));
    }
}
