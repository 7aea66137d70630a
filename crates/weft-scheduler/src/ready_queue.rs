//! Expiration-ordered circular doubly linked list of scheduled callbacks.
//!
//! Nodes live in an arena and link by slot index. The queue remembers only
//! its head; the tail is `head.previous`. Handles carry a generation so a
//! handle to a node that already ran or was canceled never matches a node
//! that later reuses the slot.

use crate::Millis;
use crate::priority::Priority;

/// Handle to a callback in the ready queue.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CallbackNode {
    index: u32,
    generation: u32,
}

/// Where a new node goes relative to nodes with the same expiration.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Placement {
    /// After existing nodes of equal expiration (FIFO).
    AfterEqual,
    /// Before existing nodes of equal expiration.
    BeforeEqual,
}

pub struct Entry<T> {
    pub priority: Priority,
    pub expiration: Millis,
    pub value: T,
}

struct Link<T> {
    entry: Entry<T>,
    next: u32,
    previous: u32,
}

struct Slot<T> {
    generation: u32,
    link: Option<Link<T>>,
}

pub struct ReadyQueue<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    head: Option<u32>,
    len: usize,
}

impl<T> ReadyQueue<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn contains(&self, node: CallbackNode) -> bool {
        self.link(node).is_some()
    }

    /// The next node to run.
    pub fn peek(&self) -> Option<(CallbackNode, &Entry<T>)> {
        let head = self.head?;
        let slot = &self.slots[head as usize];
        let link = slot.link.as_ref()?;
        Some((
            CallbackNode {
                index: head,
                generation: slot.generation,
            },
            &link.entry,
        ))
    }

    pub fn head_expiration(&self) -> Option<Millis> {
        self.peek().map(|(_, entry)| entry.expiration)
    }

    pub fn head_priority(&self) -> Option<Priority> {
        self.peek().map(|(_, entry)| entry.priority)
    }

    /// Insert in expiration order.
    ///
    /// Returns the new node and whether it became the head.
    pub fn insert(
        &mut self,
        priority: Priority,
        expiration: Millis,
        value: T,
        placement: Placement,
    ) -> (CallbackNode, bool) {
        let entry = Entry {
            priority,
            expiration,
            value,
        };
        let node = self.allocate();
        let index = node.index;

        let Some(head) = self.head else {
            self.slots[index as usize].link = Some(Link {
                entry,
                next: index,
                previous: index,
            });
            self.head = Some(index);
            self.len += 1;
            return (node, true);
        };

        let goes_before = |existing: Millis| match placement {
            Placement::AfterEqual => existing > expiration,
            Placement::BeforeEqual => existing >= expiration,
        };

        let mut next = None;
        let mut cursor = head;
        loop {
            let link = self.link_at(cursor);
            if goes_before(link.entry.expiration) {
                next = Some(cursor);
                break;
            }
            cursor = link.next;
            if cursor == head {
                break;
            }
        }

        // Nothing expires later: the new node becomes the tail, which in a
        // circular list is the slot just before the head.
        let next = next.unwrap_or(head);
        let became_head = next == head && goes_before(self.link_at(head).entry.expiration);
        let previous = self.link_at(next).previous;

        self.slots[index as usize].link = Some(Link {
            entry,
            next,
            previous,
        });
        self.link_at_mut(previous).next = index;
        self.link_at_mut(next).previous = index;
        if became_head {
            self.head = Some(index);
        }
        self.len += 1;
        (node, became_head)
    }

    /// Unlink `node` in O(1). Returns `None` if it already left the queue.
    pub fn remove(&mut self, node: CallbackNode) -> Option<Entry<T>> {
        let (next, previous) = {
            let link = self.link(node)?;
            (link.next, link.previous)
        };
        if next == node.index {
            self.head = None;
        } else {
            if self.head == Some(node.index) {
                self.head = Some(next);
            }
            self.link_at_mut(previous).next = next;
            self.link_at_mut(next).previous = previous;
        }
        self.release(node.index)
    }

    /// Remove and return the head.
    pub fn pop_head(&mut self) -> Option<(CallbackNode, Entry<T>)> {
        let (node, _) = self.peek()?;
        self.remove(node).map(|entry| (node, entry))
    }

    /// Expirations from head to tail.
    pub fn expirations(&self) -> Vec<Millis> {
        let mut out = Vec::with_capacity(self.len);
        let Some(head) = self.head else {
            return out;
        };
        let mut cursor = head;
        loop {
            let link = self.link_at(cursor);
            out.push(link.entry.expiration);
            cursor = link.next;
            if cursor == head {
                return out;
            }
        }
    }

    fn link(&self, node: CallbackNode) -> Option<&Link<T>> {
        let slot = self.slots.get(node.index as usize)?;
        if slot.generation != node.generation {
            return None;
        }
        slot.link.as_ref()
    }

    // Only called with indices reachable from `head`, which always hold a link.
    fn link_at(&self, index: u32) -> &Link<T> {
        match self.slots[index as usize].link.as_ref() {
            Some(link) => link,
            None => unreachable!("ready queue slot {index} is linked but empty"),
        }
    }

    fn link_at_mut(&mut self, index: u32) -> &mut Link<T> {
        match self.slots[index as usize].link.as_mut() {
            Some(link) => link,
            None => unreachable!("ready queue slot {index} is linked but empty"),
        }
    }

    fn allocate(&mut self) -> CallbackNode {
        if let Some(index) = self.free.pop() {
            let generation = self.slots[index as usize].generation;
            return CallbackNode { index, generation };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            link: None,
        });
        CallbackNode {
            index,
            generation: 0,
        }
    }

    fn release(&mut self, index: u32) -> Option<Entry<T>> {
        let slot = &mut self.slots[index as usize];
        let link = slot.link.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.len -= 1;
        Some(link.entry)
    }
}

impl<T> Default for ReadyQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
