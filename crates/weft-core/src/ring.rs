//! Arena-backed circular singly linked list.
//!
//! Nodes live in a slot vector and link to each other by [`NodeId`]. The
//! list only stores its tail; the head is always `tail.next`. Freed slots
//! bump a generation counter so stale ids never alias a newer node.

/// Stable handle to a node in a [`Ring`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

struct Node<T> {
    value: T,
    next: NodeId,
}

struct Slot<T> {
    generation: u32,
    node: Option<Node<T>>,
}

pub struct Ring<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    tail: Option<NodeId>,
    len: usize,
}

impl<T> Ring<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn tail(&self) -> Option<NodeId> {
        self.tail
    }

    pub fn head(&self) -> Option<NodeId> {
        self.tail.and_then(|tail| self.next(tail))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.node(id).map(|node| &node.value)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.node_mut(id).map(|node| &mut node.value)
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).map(|node| node.next)
    }

    /// Append after the tail; the new node becomes the tail.
    pub fn push_back(&mut self, value: T) -> NodeId {
        let id = self.allocate();
        let next = match self.tail {
            None => id,
            Some(tail) => {
                let head = self.next(tail).unwrap_or(tail);
                if let Some(node) = self.node_mut(tail) {
                    node.next = id;
                }
                head
            }
        };
        self.slots[id.index as usize].node = Some(Node { value, next });
        self.tail = Some(id);
        self.len += 1;
        id
    }

    /// Remove and return the head.
    pub fn pop_front(&mut self) -> Option<(NodeId, T)> {
        let tail = self.tail?;
        let head = self.next(tail)?;
        if head == tail {
            self.tail = None;
        } else {
            let after = self.next(head)?;
            if let Some(node) = self.node_mut(tail) {
                node.next = after;
            }
        }
        self.release(head).map(|value| (head, value))
    }

    /// Drop every node after `mark`, making `mark` the tail again.
    ///
    /// `None` clears the list. A stale mark leaves the list untouched.
    pub fn truncate_after(&mut self, mark: Option<NodeId>) -> usize {
        let Some(tail) = self.tail else {
            return 0;
        };
        let Some(mark) = mark else {
            let mut removed = 0;
            while self.pop_front().is_some() {
                removed += 1;
            }
            return removed;
        };
        if mark == tail || !self.contains(mark) {
            return 0;
        }
        let head = self.next(tail).unwrap_or(tail);
        let mut removed = 0;
        let mut cursor = self.next(mark);
        while let Some(id) = cursor {
            cursor = if id == tail { None } else { self.next(id) };
            self.release(id);
            removed += 1;
        }
        if let Some(node) = self.node_mut(mark) {
            node.next = head;
        }
        self.tail = Some(mark);
        removed
    }

    /// Iterate from the head to the tail.
    pub fn iter(&self) -> RingIter<'_, T> {
        self.iter_after(None)
    }

    /// Iterate over the nodes that follow `anchor`, up to and including the
    /// tail. `None` starts at the head.
    pub fn iter_after(&self, anchor: Option<NodeId>) -> RingIter<'_, T> {
        let next = match (anchor, self.tail) {
            (_, None) => None,
            (Some(anchor), Some(tail)) if anchor == tail => None,
            (Some(anchor), Some(_)) => self.next(anchor),
            (None, Some(tail)) => self.next(tail),
        };
        RingIter {
            ring: self,
            next,
        }
    }

    fn node(&self, id: NodeId) -> Option<&Node<T>> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node<T>> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    fn allocate(&mut self) -> NodeId {
        if let Some(index) = self.free.pop() {
            let generation = self.slots[index as usize].generation;
            return NodeId { index, generation };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: None,
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    fn release(&mut self, id: NodeId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(node.value)
    }
}

impl<T> Default for Ring<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RingIter<'a, T> {
    ring: &'a Ring<T>,
    next: Option<NodeId>,
}

impl<'a, T> Iterator for RingIter<'a, T> {
    type Item = (NodeId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let node = self.ring.node(id)?;
        self.next = if Some(id) == self.ring.tail {
            None
        } else {
            Some(node.next)
        };
        Some((id, &node.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(ring: &Ring<i32>) -> Vec<i32> {
        ring.iter().map(|(_, v)| *v).collect()
    }

    #[test]
    fn single_node_links_to_itself() {
        let mut ring = Ring::new();
        let id = ring.push_back(1);
        assert_eq!(ring.head(), Some(id));
        assert_eq!(ring.tail(), Some(id));
        assert_eq!(ring.next(id), Some(id));
    }

    #[test]
    fn tail_links_back_to_head() {
        let mut ring = Ring::new();
        let first = ring.push_back(1);
        ring.push_back(2);
        let last = ring.push_back(3);
        assert_eq!(ring.next(last), Some(first));
        assert_eq!(values(&ring), vec![1, 2, 3]);
    }

    #[test]
    fn pop_front_keeps_circle_closed() {
        let mut ring = Ring::new();
        ring.push_back(1);
        let second = ring.push_back(2);
        let last = ring.push_back(3);
        assert_eq!(ring.pop_front().map(|(_, v)| v), Some(1));
        assert_eq!(ring.next(last), Some(second));
        assert_eq!(values(&ring), vec![2, 3]);
    }

    #[test]
    fn iter_after_skips_anchor_and_stops_at_tail() {
        let mut ring = Ring::new();
        let first = ring.push_back(1);
        ring.push_back(2);
        let last = ring.push_back(3);
        let after: Vec<_> = ring.iter_after(Some(first)).map(|(_, v)| *v).collect();
        assert_eq!(after, vec![2, 3]);
        assert_eq!(ring.iter_after(Some(last)).count(), 0);
    }

    #[test]
    fn truncate_after_restores_old_tail() {
        let mut ring = Ring::new();
        ring.push_back(1);
        let mark = ring.push_back(2);
        ring.push_back(3);
        ring.push_back(4);
        assert_eq!(ring.truncate_after(Some(mark)), 2);
        assert_eq!(values(&ring), vec![1, 2]);
        ring.push_back(5);
        assert_eq!(values(&ring), vec![1, 2, 5]);
    }

    #[test]
    fn stale_ids_do_not_alias_reused_slots() {
        let mut ring = Ring::new();
        let old = ring.push_back(1);
        ring.pop_front();
        let new = ring.push_back(2);
        assert!(!ring.contains(old));
        assert_eq!(ring.get(new), Some(&2));
    }
}
