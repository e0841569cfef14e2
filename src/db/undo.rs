//! Undo session stack (C2).
//!
//! Grounded in `original_source/libraries/db/object_database.cpp`: every
//! mutation to the object database is first recorded here as an undo-state
//! delta, so a session can be rolled back (`undo`) or merged into its
//! parent (`commit`). Blocks push one session each; `pop_block` undoes the
//! most recent block wholesale (short-reorg support), and `pop_commit`
//! advances the durable boundary once a block is far enough behind the
//! head that it can never be reorged away.

use crate::core_types::ObjectId;
use crate::db::objects::*;
use crate::error::{ChainResult, UndoError};
use std::any::Any;

/// Type-erased pre-image of an object, stashed so `undo()` can restore it.
enum UndoOp {
    Created(ObjectId),
    Modified(ObjectId, Box<dyn Any + Send + Sync>),
    Removed(ObjectId, Box<dyn Any + Send + Sync>),
}

/// One undo session: the ordered list of operations needed to reverse
/// everything recorded since the session was opened.
#[derive(Default)]
pub struct UndoSession {
    ops: Vec<UndoOp>,
}

impl UndoSession {
    fn record_create(&mut self, id: ObjectId) {
        self.ops.push(UndoOp::Created(id));
    }

    fn record_modify<T: Clone + Send + Sync + 'static>(&mut self, id: ObjectId, old: T) {
        self.ops.push(UndoOp::Modified(id, Box::new(old)));
    }

    fn record_remove<T: Clone + Send + Sync + 'static>(&mut self, id: ObjectId, old: T) {
        self.ops.push(UndoOp::Removed(id, Box::new(old)));
    }
}

/// A single object-level change recorded by a session, stripped of its
/// pre-image — what the subscription dispatcher (C9) needs to know which
/// ids to notify about after a block commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectChange {
    Created(ObjectId),
    Modified(ObjectId),
    Removed(ObjectId),
}

impl ObjectChange {
    pub fn id(&self) -> ObjectId {
        match self {
            ObjectChange::Created(id) | ObjectChange::Modified(id) | ObjectChange::Removed(id) => {
                *id
            }
        }
    }
}

impl UndoSession {
    /// The ids touched by this session, in recorded order. Used to hand the
    /// subscription dispatcher a diff without exposing undo pre-images.
    pub fn changes(&self) -> Vec<ObjectChange> {
        self.ops
            .iter()
            .map(|op| match op {
                UndoOp::Created(id) => ObjectChange::Created(*id),
                UndoOp::Modified(id, _) => ObjectChange::Modified(*id),
                UndoOp::Removed(id, _) => ObjectChange::Removed(*id),
            })
            .collect()
    }
}

/// Callback surface the object database implements so the undo stack can
/// reverse operations without knowing concrete table types.
pub trait UndoSink {
    fn erase_created(&mut self, id: ObjectId);
    fn restore_modified(&mut self, id: ObjectId, old: Box<dyn Any + Send + Sync>);
    fn restore_removed(&mut self, id: ObjectId, old: Box<dyn Any + Send + Sync>);
}

/// Stack of open undo sessions. Every session still in `sessions` is
/// poppable; `pop_commit` is what permanently discards the ones outside
/// the retained window.
pub struct UndoStack {
    sessions: Vec<UndoSession>,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self {
            sessions: Vec::new(),
        }
    }
}

impl UndoStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.sessions.len()
    }

    /// Open a new session, e.g. at the start of block application or
    /// before evaluating a transaction within a block.
    pub fn push_session(&mut self) {
        self.sessions.push(UndoSession::default());
    }

    fn top_mut(&mut self) -> ChainResult<&mut UndoSession> {
        self.sessions.last_mut().ok_or(UndoError::EmptyStack.into())
    }

    pub fn on_create(&mut self, id: ObjectId) -> ChainResult<()> {
        self.top_mut()?.record_create(id);
        Ok(())
    }

    pub fn on_modify<T: Clone + Send + Sync + 'static>(
        &mut self,
        id: ObjectId,
        old: &T,
    ) -> ChainResult<()> {
        self.top_mut()?.record_modify(id, old.clone());
        Ok(())
    }

    pub fn on_remove<T: Clone + Send + Sync + 'static>(
        &mut self,
        id: ObjectId,
        old: &T,
    ) -> ChainResult<()> {
        self.top_mut()?.record_remove(id, old.clone());
        Ok(())
    }

    /// Merge the top session into the one beneath it (or discard it if it
    /// is the only one), keeping its ops reversible by the parent.
    pub fn commit_session(&mut self) -> ChainResult<()> {
        let top = self.sessions.pop().ok_or(UndoError::EmptyStack)?;
        if let Some(parent) = self.sessions.last_mut() {
            parent.ops.extend(top.ops);
        }
        Ok(())
    }

    /// Reverse the top session against `sink`, in reverse order, and drop it.
    pub fn undo_session(&mut self, sink: &mut dyn UndoSink) -> ChainResult<()> {
        let top = self.sessions.pop().ok_or(UndoError::EmptyStack)?;
        for op in top.ops.into_iter().rev() {
            match op {
                UndoOp::Created(id) => sink.erase_created(id),
                UndoOp::Modified(id, old) => sink.restore_modified(id, old),
                UndoOp::Removed(id, old) => sink.restore_removed(id, old),
            }
        }
        Ok(())
    }

    /// Undo the most recently applied block's session, for short-reorg
    /// switching. Fails if every retained session has already been
    /// permanently committed (spec: bounded undo window).
    pub fn pop_block(&mut self, sink: &mut dyn UndoSink) -> ChainResult<()> {
        if self.sessions.is_empty() {
            return Err(UndoError::BeyondWindow.into());
        }
        self.undo_session(sink)
    }

    /// Permanently discards every session older than the last `retain`,
    /// because those blocks have enough confirmations to be considered
    /// irreversible and no longer need to stay poppable.
    pub fn pop_commit(&mut self, retain: usize) {
        let drop_count = self.sessions.len().saturating_sub(retain);
        self.sessions.drain(0..drop_count);
    }

    /// Peek at the ids touched by the top session without consuming it —
    /// used right before `commit_session` to hand the subscription
    /// dispatcher a diff of what a block just changed.
    pub fn top_changes(&self) -> ChainResult<Vec<ObjectChange>> {
        self.sessions
            .last()
            .map(|s| s.changes())
            .ok_or(UndoError::EmptyStack.into())
    }
}

/// Convenience macro-free helper kept generic via trait objects would be
/// heavier than needed here; object tables downcast explicitly.
pub fn downcast_or_corrupt<T: 'static>(boxed: Box<dyn Any + Send + Sync>) -> ChainResult<T> {
    boxed
        .downcast::<T>()
        .map(|b| *b)
        .map_err(|_| crate::error::StateError::IndexCorrupt("undo pre-image type mismatch").into())
}

#[allow(dead_code)]
fn _type_check(_: &Account, _: &Balance, _: &LimitOrder) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{protocol_types, Space};

    struct FakeSink {
        erased: Vec<ObjectId>,
        restored: Vec<ObjectId>,
    }

    impl UndoSink for FakeSink {
        fn erase_created(&mut self, id: ObjectId) {
            self.erased.push(id);
        }
        fn restore_modified(&mut self, id: ObjectId, _old: Box<dyn Any + Send + Sync>) {
            self.restored.push(id);
        }
        fn restore_removed(&mut self, id: ObjectId, _old: Box<dyn Any + Send + Sync>) {
            self.restored.push(id);
        }
    }

    #[test]
    fn undo_reverses_in_lifo_order() {
        let mut stack = UndoStack::new();
        stack.push_session();
        let a = ObjectId::new(Space::Protocol, protocol_types::ACCOUNT, 1);
        let b = ObjectId::new(Space::Protocol, protocol_types::ACCOUNT, 2);
        stack.on_create(a).unwrap();
        stack.on_create(b).unwrap();

        let mut sink = FakeSink {
            erased: vec![],
            restored: vec![],
        };
        stack.undo_session(&mut sink).unwrap();
        assert_eq!(sink.erased, vec![b, a]);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn commit_merges_into_parent() {
        let mut stack = UndoStack::new();
        stack.push_session();
        let a = ObjectId::new(Space::Protocol, protocol_types::ACCOUNT, 1);
        stack.on_create(a).unwrap();

        stack.push_session();
        let b = ObjectId::new(Space::Protocol, protocol_types::ACCOUNT, 2);
        stack.on_create(b).unwrap();
        stack.commit_session().unwrap();

        assert_eq!(stack.depth(), 1);
        let mut sink = FakeSink {
            erased: vec![],
            restored: vec![],
        };
        stack.undo_session(&mut sink).unwrap();
        assert_eq!(sink.erased, vec![b, a]);
    }

    #[test]
    fn pop_block_refuses_past_durable_boundary() {
        let mut stack = UndoStack::new();
        stack.push_session();
        stack.commit_session().unwrap(); // merges into nothing; stack empty

        stack.push_session();
        stack.pop_commit(0); // mark this one durable immediately

        let mut sink = FakeSink {
            erased: vec![],
            restored: vec![],
        };
        assert!(stack.pop_block(&mut sink).is_err());
    }
}
