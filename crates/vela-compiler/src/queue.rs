//! The function compilation queue.
//!
//! Referencing a not-yet-compiled callable allocates its entry label and
//! enqueues it; the queue drains to empty before assembly finalisation.
//! A FIFO rather than an unordered work-set: two runs on the same input
//! must emit functions in the same order.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use vela_asm::{Assembly, LabelId};
use vela_parser::ast::NodeId;

#[derive(Debug, Default)]
pub struct FunctionQueue {
    pending: VecDeque<NodeId>,
    queued: FxHashSet<NodeId>,
    emitted: FxHashSet<NodeId>,
    labels: FxHashMap<NodeId, LabelId>,
}

impl FunctionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry label of a callable; the first request allocates the label
    /// and schedules the callable for emission.
    pub fn entry_label(&mut self, asm: &mut Assembly, callable: NodeId) -> LabelId {
        if let Some(&label) = self.labels.get(&callable) {
            return label;
        }
        let label = asm.new_label();
        self.labels.insert(callable, label);
        if !self.emitted.contains(&callable) {
            self.pending.push_back(callable);
            self.queued.insert(callable);
        }
        label
    }

    /// Next callable to emit, marking it emitted.
    pub fn pop(&mut self) -> Option<NodeId> {
        let next = self.pending.pop_front()?;
        self.queued.remove(&next);
        self.emitted.insert(next);
        Some(next)
    }

    pub fn is_drained(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn label_of(&self, callable: NodeId) -> Option<LabelId> {
        self.labels.get(&callable).copied()
    }

    pub fn emitted_count(&self) -> usize {
        self.emitted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut asm = Assembly::new();
        let mut queue = FunctionQueue::new();
        let a = NodeId(1);
        let b = NodeId(2);
        queue.entry_label(&mut asm, a);
        queue.entry_label(&mut asm, b);
        // re-referencing does not enqueue twice
        queue.entry_label(&mut asm, a);
        assert_eq!(queue.pop(), Some(a));
        assert_eq!(queue.pop(), Some(b));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_drained());
    }

    #[test]
    fn test_label_is_stable() {
        let mut asm = Assembly::new();
        let mut queue = FunctionQueue::new();
        let id = NodeId(7);
        let first = queue.entry_label(&mut asm, id);
        let second = queue.entry_label(&mut asm, id);
        assert_eq!(first, second);
    }

    #[test]
    fn test_emitted_not_requeued() {
        let mut asm = Assembly::new();
        let mut queue = FunctionQueue::new();
        let id = NodeId(3);
        queue.entry_label(&mut asm, id);
        assert_eq!(queue.pop(), Some(id));
        // a later reference to an emitted callable only reuses the label
        queue.entry_label(&mut asm, id);
        assert_eq!(queue.pop(), None);
    }
}
