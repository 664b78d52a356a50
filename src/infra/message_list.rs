//! In-memory ordered storage for pending messages.
//!
//! Messages live in an arena of nodes addressed by index and are linked in
//! ascending due-time order. Freed slots are kept on a free list and reused,
//! so a queue that churns through messages stops allocating once warm.

use crate::core::Message;

struct Node {
    message: Message,
    next: Option<usize>,
}

/// Singly linked list of messages sorted by due time, stored in an arena.
///
/// Every message in the list carries a due time. Ties keep insertion order:
/// a new message goes after the last message whose due time is `<=` its own.
#[derive(Default)]
pub struct MessageList {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    len: usize,
}

impl MessageList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty list with room for `capacity` messages.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Number of pending messages.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// `true` when no message is pending.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Due time of the first message.
    #[must_use]
    pub fn head_due(&self) -> Option<u64> {
        self.head.map(|idx| self.node(idx).message.due())
    }

    /// Link `message` in due-time order. Returns `true` if it became the new head.
    pub fn insert(&mut self, message: Message) -> bool {
        let when = message.due();
        match self.head {
            Some(head) if when >= self.node(head).message.due() => {
                let mut prev = head;
                while let Some(next) = self.node(prev).next {
                    if self.node(next).message.due() > when {
                        break;
                    }
                    prev = next;
                }
                let after = self.node(prev).next;
                let idx = self.alloc(message, after);
                self.node_mut(prev).next = Some(idx);
                false
            }
            _ => {
                let idx = self.alloc(message, self.head);
                self.head = Some(idx);
                true
            }
        }
    }

    /// Unlink and return the first message if it is due at `now`.
    pub fn pop_due(&mut self, now: u64) -> Option<Message> {
        let head = self.head?;
        if self.node(head).message.due() > now {
            return None;
        }
        let next = self.node(head).next;
        self.head = next;
        Some(self.release(head))
    }

    /// Remove every message matching `predicate` in a single pass.
    ///
    /// With `dry_run` nothing is removed and the scan stops at the first match.
    /// Returns whether any message matched.
    pub fn remove_where<F>(&mut self, mut predicate: F, dry_run: bool) -> bool
    where
        F: FnMut(&Message) -> bool,
    {
        let mut found = false;
        let mut prev: Option<usize> = None;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let next = self.node(idx).next;
            if predicate(&self.node(idx).message) {
                if dry_run {
                    return true;
                }
                found = true;
                match prev {
                    Some(p) => self.node_mut(p).next = next,
                    None => self.head = next,
                }
                drop(self.release(idx));
            } else {
                prev = Some(idx);
            }
            cursor = next;
        }
        found
    }

    /// Drop every pending message.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.len = 0;
    }

    /// Iterate pending messages in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &Message> + '_ {
        std::iter::successors(self.head, move |&idx| self.node(idx).next)
            .map(move |idx| &self.node(idx).message)
    }

    fn alloc(&mut self, message: Message, next: Option<usize>) -> usize {
        let node = Node { message, next };
        self.len += 1;
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(node);
            idx
        } else {
            self.slots.push(Some(node));
            self.slots.len() - 1
        }
    }

    fn release(&mut self, idx: usize) -> Message {
        let node = self.slots[idx].take().expect("linked slot is occupied");
        self.free.push(idx);
        self.len -= 1;
        node.message
    }

    fn node(&self, idx: usize) -> &Node {
        self.slots[idx].as_ref().expect("linked slot is occupied")
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node {
        self.slots[idx].as_mut().expect("linked slot is occupied")
    }
}
