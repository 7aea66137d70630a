//! Per-hook queues of pending state transitions.
//!
//! Each state hook owns one [`UpdateQueue`]. Dispatched updates are appended
//! to a circular list and folded onto the hook's base state during render.
//! Updates whose urgency is not covered by the current render are skipped
//! without breaking order: the first skipped update's predecessor becomes
//! the new base, so a later pass replays everything from there.

use crate::ring::{NodeId, Ring};
use crate::urgency::Urgency;
use std::cell::RefCell;

/// Stable id of an update inside its queue.
pub type UpdateId = NodeId;

/// One requested state transition.
pub struct Update<A> {
    pub urgency: Urgency,
    pub action: A,
}

/// Result of folding a queue onto a base state.
#[derive(Debug, Clone, PartialEq)]
pub struct Fold<S> {
    /// State including every update covered by the render.
    pub state: S,
    /// State to fold from next time.
    pub base_state: S,
    /// Last update already folded into `base_state`.
    pub base_update: Option<UpdateId>,
    /// Most urgent skipped update, if any were skipped.
    pub remaining: Option<Urgency>,
}

pub struct UpdateQueue<A> {
    updates: Ring<Update<A>>,
    render_phase: Vec<A>,
}

impl<A> UpdateQueue<A> {
    pub fn new() -> Self {
        Self {
            updates: Ring::new(),
            render_phase: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// The most recently appended update.
    pub fn last(&self) -> Option<UpdateId> {
        self.updates.tail()
    }

    /// Append an update at the logical end of the queue.
    pub fn enqueue(&mut self, urgency: Urgency, action: A) -> UpdateId {
        self.updates.push_back(Update { urgency, action })
    }

    /// Stash an update dispatched while the owning unit is rendering.
    ///
    /// Returns `true` if this is the first stashed update since the stash
    /// was last drained.
    pub fn stash_render_phase(&mut self, action: A) -> bool {
        self.render_phase.push(action);
        self.render_phase.len() == 1
    }

    pub fn has_render_phase_updates(&self) -> bool {
        !self.render_phase.is_empty()
    }

    /// Move stashed render-phase updates into the queue at `urgency`.
    ///
    /// Returns the tail before merging so the merge can be rolled back.
    pub fn merge_render_phase(&mut self, urgency: Urgency) -> Option<UpdateId> {
        let mark = self.last();
        for action in std::mem::take(&mut self.render_phase) {
            self.enqueue(urgency, action);
        }
        mark
    }

    pub fn discard_render_phase(&mut self) {
        self.render_phase.clear();
    }

    /// Remove every update appended after `mark`.
    pub fn rollback(&mut self, mark: Option<UpdateId>) {
        self.updates.truncate_after(mark);
    }

    /// Retire updates from the head through `base`, inclusive.
    ///
    /// Called once a render whose base reached `base` has committed; those
    /// updates are already part of the committed base state.
    pub fn retire_through(&mut self, base: UpdateId) -> usize {
        if !self.updates.contains(base) {
            return 0;
        }
        let mut retired = 0;
        while let Some((id, _)) = self.updates.pop_front() {
            retired += 1;
            if id == base {
                break;
            }
        }
        retired
    }

    /// Fold every update after `base_update` onto `base_state`.
    ///
    /// Returns `None` when there is nothing past the base to process.
    pub fn fold<S: Clone>(
        &self,
        base_state: &S,
        base_update: Option<UpdateId>,
        render: Urgency,
        reducer: impl Fn(&S, &A) -> S,
    ) -> Option<Fold<S>> {
        let mut pending = self.updates.iter_after(base_update).peekable();
        pending.peek()?;

        let mut state = base_state.clone();
        let mut skipped: Option<(Option<UpdateId>, S)> = None;
        let mut remaining = None;
        let mut previous = base_update;

        for (id, update) in pending {
            if render.covers(update.urgency) {
                state = reducer(&state, &update.action);
            } else {
                if skipped.is_none() {
                    skipped = Some((previous, state.clone()));
                }
                remaining = Some(Urgency::most_urgent(remaining, update.urgency));
            }
            previous = Some(id);
        }

        let (base_update, base_state) = match skipped {
            Some(anchor) => anchor,
            None => (previous, state.clone()),
        };
        Some(Fold {
            state,
            base_state,
            base_update,
            remaining,
        })
    }
}

impl<A> Default for UpdateQueue<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased view of a queue holding render-phase updates.
pub(crate) trait RenderPhaseQueue {
    fn merge_render_phase(&self, urgency: Urgency) -> Option<UpdateId>;
    fn rollback(&self, mark: Option<UpdateId>);
    fn discard_render_phase(&self);
}

impl<A: 'static> RenderPhaseQueue for RefCell<UpdateQueue<A>> {
    fn merge_render_phase(&self, urgency: Urgency) -> Option<UpdateId> {
        self.borrow_mut().merge_render_phase(urgency)
    }

    fn rollback(&self, mark: Option<UpdateId>) {
        self.borrow_mut().rollback(mark);
    }

    fn discard_render_phase(&self) {
        self.borrow_mut().discard_render_phase();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(state: &String, action: &&'static str) -> String {
        format!("{state}{action}")
    }

    const LOW: Urgency = Urgency::from_expiration(5000);
    const HIGH: Urgency = Urgency::from_expiration(300);

    #[test]
    fn empty_queue_has_nothing_to_fold() {
        let queue: UpdateQueue<&'static str> = UpdateQueue::new();
        assert!(queue.fold(&String::new(), None, LOW, push).is_none());
    }

    #[test]
    fn equal_urgency_folds_in_enqueue_order() {
        let mut queue = UpdateQueue::new();
        for action in ["a", "b", "c", "d"] {
            queue.enqueue(LOW, action);
        }
        let fold = queue
            .fold(&String::new(), None, LOW, push)
            .expect("updates pending");
        assert_eq!(fold.state, "abcd");
        assert_eq!(fold.base_state, "abcd");
        assert_eq!(fold.base_update, queue.last());
        assert_eq!(fold.remaining, None);
    }

    #[test]
    fn insufficient_urgency_is_skipped_and_anchored() {
        let mut queue = UpdateQueue::new();
        let first = queue.enqueue(HIGH, "a");
        queue.enqueue(LOW, "b");
        queue.enqueue(HIGH, "c");

        let fold = queue
            .fold(&String::new(), None, HIGH, push)
            .expect("updates pending");
        assert_eq!(fold.state, "ac");
        assert_eq!(fold.base_state, "a");
        assert_eq!(fold.base_update, Some(first));
        assert_eq!(fold.remaining, Some(LOW));

        let resumed = queue
            .fold(&fold.base_state, fold.base_update, LOW, push)
            .expect("skipped updates pending");
        assert_eq!(resumed.state, "abc");
        assert_eq!(resumed.remaining, None);
    }

    #[test]
    fn folding_twice_without_new_updates_is_idempotent() {
        let mut queue = UpdateQueue::new();
        queue.enqueue(LOW, "x");
        queue.enqueue(LOW, "y");
        let fold = queue
            .fold(&String::new(), None, LOW, push)
            .expect("updates pending");
        assert!(
            queue
                .fold(&fold.base_state, fold.base_update, LOW, push)
                .is_none()
        );
        assert_eq!(fold.base_state, "xy");
    }

    #[test]
    fn retire_through_drops_folded_prefix() {
        let mut queue = UpdateQueue::new();
        queue.enqueue(LOW, "a");
        let base = queue.enqueue(LOW, "b");
        queue.enqueue(LOW, "c");
        assert_eq!(queue.retire_through(base), 2);
        let fold = queue
            .fold(&"ab".to_string(), None, LOW, push)
            .expect("one update left");
        assert_eq!(fold.state, "abc");
    }

    #[test]
    fn merged_render_phase_updates_roll_back() {
        let mut queue = UpdateQueue::new();
        queue.enqueue(LOW, "a");
        assert!(queue.stash_render_phase("b"));
        assert!(!queue.stash_render_phase("c"));
        let mark = queue.merge_render_phase(LOW);
        assert_eq!(queue.len(), 3);
        assert!(!queue.has_render_phase_updates());
        queue.rollback(mark);
        assert_eq!(queue.len(), 1);
    }
}
