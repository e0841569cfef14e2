//! Block production always consults the slot scheduler for who is allowed
//! to sign the next block: a witness who produces out of turn is rejected,
//! the near scheduler advances (and refills) after every produced block,
//! and slots beyond the near horizon still resolve to some active witness
//! via the far scheduler.

mod common;

use common::Fixture;
use ledger_chain_core::core_types::ObjectId;
use ledger_chain_core::error::{ChainError, ConsensusError};
use ledger_chain_core::witness_schedule::{genesis_schedule, get_scheduled_witness};
use ledger_chain_core::SkipFlags;

#[test]
fn genesis_near_schedule_only_draws_from_the_active_witness_set() {
    let witnesses: Vec<ObjectId> = (0..4u64)
        .map(|i| {
            ObjectId::new(
                ledger_chain_core::core_types::Space::Protocol,
                ledger_chain_core::core_types::protocol_types::WITNESS,
                i,
            )
        })
        .collect();
    let schedule = genesis_schedule(&common::CHAIN_ID, &witnesses);
    assert_eq!(schedule.near_future_slots.len(), witnesses.len());
    for w in &schedule.near_future_slots {
        assert!(witnesses.contains(w));
    }
}

#[test]
fn a_witness_producing_out_of_turn_is_rejected() {
    let mut fx = Fixture::build(3, 3);

    let (scheduled, _) = get_scheduled_witness(&fx.chain.db, 1).expect("slot 1 must resolve");
    let impostor = fx
        .witnesses
        .iter()
        .copied()
        .find(|w| *w != scheduled)
        .expect("fixture has more than one witness");
    let impostor_key = fx.witness_key(impostor).clone();

    let result = fx
        .chain
        .produce_block(impostor, &impostor_key, [0u8; 20], [0u8; 20], SkipFlags::empty());

    match result.unwrap_err() {
        ChainError::Consensus(ConsensusError::WrongWitness { expected, got }) => {
            assert_eq!(expected, scheduled);
            assert_eq!(got, impostor);
        }
        other => panic!("expected WrongWitness, got {other:?}"),
    }

    // The rejected attempt must not have advanced the chain at all.
    assert_eq!(fx.head_block_number(), 0);
}

#[test]
fn producing_blocks_back_to_back_keeps_the_near_schedule_non_empty() {
    let mut fx = Fixture::build(4, 4);

    // Drive past one full pass over the active set so `advance_schedule`'s
    // drain-then-refill path runs more than once.
    for n in 1..=(fx.witnesses.len() as u32 * 2) {
        let block = fx.produce_block().unwrap_or_else(|e| panic!("block {n} should apply: {e:?}"));
        assert!(fx.witnesses.contains(&block.header.witness));
        assert_eq!(fx.head_block_number(), n);

        let ws = fx
            .chain
            .db
            .witness_schedule
            .iter()
            .next()
            .expect("schedule object always exists")
            .1;
        assert!(
            !ws.near_future_slots.is_empty(),
            "near scheduler must refill rather than run dry after block {n}"
        );
    }
}

#[test]
fn slots_beyond_the_near_horizon_still_resolve_to_an_active_witness() {
    let fx = Fixture::build(3, 3);

    let ws = fx
        .chain
        .db
        .witness_schedule
        .iter()
        .next()
        .expect("schedule object always exists")
        .1;
    let far_slot = ws.near_future_slots.len() as u32 + 5;

    let (witness, is_near) = get_scheduled_witness(&fx.chain.db, far_slot)
        .expect("far scheduler must resolve slots beyond the near horizon");
    assert!(!is_near);
    assert!(fx.witnesses.contains(&witness));
}

#[test]
fn slot_zero_names_no_witness_and_is_never_near() {
    let fx = Fixture::build(2, 2);
    let (_, is_near) = get_scheduled_witness(&fx.chain.db, 0).expect("slot 0 always resolves");
    assert!(!is_near);
}
