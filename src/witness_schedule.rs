//! Witness scheduler (C7): near/far token-queue schedulers seeded by the
//! chain's rolling entropy, and block-interval slot-time math.
//!
//! Grounded in `original_source/libraries/chain/db_witness_schedule.cpp`'s
//! near-scheduler token queue (`witness_schedule_object::scheduler`),
//! reimplemented here with `rand_chacha` in place of the original's
//! boost `minstd_rand0`-derived witness shuffle — the teacher's codebase
//! reaches for `rand_chacha::ChaCha20Rng` anywhere it needs a seedable,
//! reproducible PRNG, so this follows that choice rather than hand-rolling
//! one.

use crate::core_types::{ChainTime, ObjectId};
use crate::db::objects::{DynamicGlobalProperties, GlobalProperties, WitnessSchedule};
use crate::db::undo::UndoStack;
use crate::db::ObjectDatabase;
use crate::error::{ChainResult, ConsensusError};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// `floor(head_time / interval) * interval + n * interval`.
pub fn get_slot_time(dgp: &DynamicGlobalProperties, gp: &GlobalProperties, slot_num: u32) -> ChainTime {
    if slot_num == 0 {
        return dgp.time;
    }
    let interval = gp.block_interval;
    let aligned_head = (dgp.time / interval) * interval;
    aligned_head + slot_num * interval
}

/// Inverse of `get_slot_time`: returns 0 if `t` precedes the next slot.
pub fn get_slot_at_time(dgp: &DynamicGlobalProperties, gp: &GlobalProperties, t: ChainTime) -> u32 {
    let first_slot_time = get_slot_time(dgp, gp, 1);
    if t < first_slot_time {
        return 0;
    }
    (t - first_slot_time) / gp.block_interval + 1
}

/// `get_scheduled_witness(slot_num) -> (witness_id, is_near)`. `slot_num ==
/// 0` names no witness. Consults the near scheduler's token queue first,
/// falling back to a far scheduler derived from the same seed for slots
/// beyond the near horizon.
pub fn get_scheduled_witness(
    db: &ObjectDatabase,
    slot_num: u32,
) -> ChainResult<(ObjectId, bool)> {
    if slot_num == 0 {
        return Ok((default_witness_id(), false));
    }
    let ws = db.witness_schedule.get(default_schedule_id())?;
    let index = (slot_num - 1) as usize;
    if let Some(&witness) = ws.near_future_slots.get(index) {
        return Ok((witness, true));
    }
    far_schedule_witness(db, ws, index).map(|w| (w, false))
}

fn default_witness_id() -> ObjectId {
    use crate::core_types::{protocol_types, Space};
    ObjectId::new(Space::Protocol, protocol_types::WITNESS, 0)
}

fn default_schedule_id() -> ObjectId {
    use crate::core_types::{impl_types, Space};
    ObjectId::new(Space::Implementation, impl_types::WITNESS_SCHEDULE, 0)
}

/// Queried only for slots beyond the near horizon: slower, deterministic,
/// derived from the near scheduler's current seed plus a distinct IV so it
/// never collides with near-horizon draws (spec §4.7).
fn far_schedule_witness(
    db: &ObjectDatabase,
    ws: &WitnessSchedule,
    beyond_near_index: usize,
) -> ChainResult<ObjectId> {
    let gp = db
        .global_properties
        .iter()
        .next()
        .ok_or(ConsensusError::NoActiveWitnesses)?
        .1;
    if gp.active_witnesses.is_empty() {
        return Err(ConsensusError::NoActiveWitnesses.into());
    }
    let mut seed = ws.rng_seed;
    seed[0] ^= 0xFA; // far-scheduler IV, distinguishes it from the near seed
    let mut rng = ChaCha20Rng::from_seed(seed);
    // Burn draws up to the requested horizon; deterministic, not cached.
    let mut witness = gp.active_witnesses[0];
    for _ in 0..=beyond_near_index {
        let draw = rng.next_u64() as usize % gp.active_witnesses.len();
        witness = gp.active_witnesses[draw];
    }
    Ok(witness)
}

/// Advances the near scheduler by one produced slot: drains `schedule_slot`
/// tokens from the front of the queue, then refills up to
/// `|active_witnesses|` future slots via `produce_schedule`, rolling the
/// seed forward from `DynamicGlobalProperties.random` whenever a refill
/// completes a full pass over the active set (spec §4.7 step 5's
/// `emit_turn`).
pub fn advance_schedule(
    db: &mut ObjectDatabase,
    undo: &mut UndoStack,
    schedule_slot: u32,
) -> ChainResult<()> {
    if schedule_slot < 1 {
        return Err(ConsensusError::InvalidSlot.into());
    }
    let gp = db
        .global_properties
        .iter()
        .next()
        .ok_or(ConsensusError::NoActiveWitnesses)?
        .1
        .clone();
    if gp.active_witnesses.is_empty() {
        return Err(ConsensusError::NoActiveWitnesses.into());
    }
    let dgp = db
        .dynamic_global_properties
        .iter()
        .next()
        .ok_or(ConsensusError::NoActiveWitnesses)?
        .1
        .clone();

    let schedule_id = default_schedule_id();
    let min_token_count = (gp.active_witnesses.len() / 2).max(1);
    let active_count = gp.active_witnesses.len();

    db.witness_schedule.modify(schedule_id, undo, |ws| {
        ws.slots_since_genesis += schedule_slot as u64;
        let drain = (schedule_slot as usize).min(ws.near_future_slots.len());
        ws.near_future_slots.drain(0..drain);

        let mut rng = ChaCha20Rng::from_seed(ws.rng_seed);
        let mut refilled = false;
        while ws.near_future_slots.len() < active_count.max(min_token_count) {
            let draw = rng.next_u64() as usize % active_count;
            ws.near_future_slots.push(gp.active_witnesses[draw]);
            refilled = true;
        }
        if refilled {
            ws.rng_seed = roll_seed(ws.rng_seed, &dgp.random);
        }
    })?;

    Ok(())
}

/// Folds the chain's rolling entropy into the scheduler's PRNG seed.
fn roll_seed(seed: [u8; 32], random: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = seed[i] ^ random[i];
    }
    crate::crypto::sha256(&out)
}

/// Seeds a brand new schedule object at genesis from the chain id, before
/// any blocks (and therefore any rolled `random`) exist.
pub fn genesis_schedule(chain_id: &[u8; 32], active_witnesses: &[ObjectId]) -> WitnessSchedule {
    let mut rng = ChaCha20Rng::from_seed(*chain_id);
    let mut near_future_slots = Vec::with_capacity(active_witnesses.len());
    if !active_witnesses.is_empty() {
        for _ in 0..active_witnesses.len() {
            let draw = rng.next_u64() as usize % active_witnesses.len();
            near_future_slots.push(active_witnesses[draw]);
        }
    }
    WitnessSchedule {
        id: default_schedule_id(),
        current_shuffled_witnesses: active_witnesses.to_vec(),
        near_future_slots,
        slots_since_genesis: 0,
        rng_seed: *chain_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{protocol_types, Space};

    fn witness(n: u64) -> ObjectId {
        ObjectId::new(Space::Protocol, protocol_types::WITNESS, n)
    }

    #[test]
    fn slot_time_roundtrips_through_slot_at_time() {
        let dgp = DynamicGlobalProperties {
            id: ObjectId::new(Space::Implementation, crate::core_types::impl_types::DYNAMIC_GLOBAL_PROPERTIES, 0),
            head_block_number: 10,
            head_block_id: [0; 20],
            time: 1_000_000,
            current_witness: witness(0),
            next_maintenance_time: 2_000_000,
            random: [0; 32],
            recently_missed_count: 0,
        };
        let gp = GlobalProperties {
            id: ObjectId::new(Space::Implementation, crate::core_types::impl_types::GLOBAL_PROPERTIES, 0),
            active_witnesses: vec![witness(0), witness(1), witness(2)],
            active_delegates: vec![],
            maximum_transaction_size: 65536,
            block_interval: 3,
            maintenance_interval: 86_400,
            maintenance_skip_slots: 0,
        };
        let t = get_slot_time(&dgp, &gp, 5);
        assert_eq!(get_slot_at_time(&dgp, &gp, t), 5);
        assert_eq!(get_slot_at_time(&dgp, &gp, dgp.time), 0);
    }

    #[test]
    fn genesis_schedule_fills_near_queue_to_witness_count() {
        let witnesses = vec![witness(0), witness(1), witness(2)];
        let schedule = genesis_schedule(&[7u8; 32], &witnesses);
        assert_eq!(schedule.near_future_slots.len(), 3);
        for w in &schedule.near_future_slots {
            assert!(witnesses.contains(w));
        }
    }
}
