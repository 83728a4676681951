//! Candidate set for progressive refinement.
//!
//! A doubly linked list of `(vector_id, distance)` entries stored in an arena.
//! Entries are addressed by [`EntryRef`] handles: an arena slot plus the
//! generation the slot had when the entry was created. Removing an entry
//! bumps its slot's generation, so handles to removed entries are detected
//! instead of aliasing whatever reuses the slot.
//!
//! Insertion at the head and removal are O(1). Sorted insertion walks the
//! list and is O(n).

use crate::error::{Result, StrataError};
use crate::VectorId;

/// Stable handle to an entry of a [`CandidateSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryRef {
    slot: u32,
    generation: u32,
}

/// A vector that is still a candidate, with its distance at the most
/// recently examined level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: VectorId,
    pub distance: f64,
}

#[derive(Debug, Clone)]
struct Node {
    candidate: Candidate,
    prev: Option<u32>,
    next: Option<u32>,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena-backed doubly linked list of candidates.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

fn check_distance(operation: &'static str, distance: f64) -> Result<()> {
    if distance.is_finite() && distance >= 0.0 {
        Ok(())
    } else {
        Err(StrataError::precondition(
            operation,
            format!("distance must be finite and non-negative, got {distance}"),
        ))
    }
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert at the head in O(1).
    pub fn insert_head(&mut self, id: VectorId, distance: f64) -> Result<EntryRef> {
        check_distance("insert_head", distance)?;
        let slot = self.alloc(Candidate { id, distance });
        self.link_before(slot, self.head);
        Ok(self.handle(slot))
    }

    /// Insert keeping ascending distance order. The new entry goes before the
    /// first entry whose distance is greater than or equal to its own.
    pub fn insert_sorted(&mut self, id: VectorId, distance: f64) -> Result<EntryRef> {
        check_distance("insert_sorted", distance)?;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let node = self.node(idx);
            if node.candidate.distance >= distance {
                break;
            }
            cursor = node.next;
        }
        let slot = self.alloc(Candidate { id, distance });
        self.link_before(slot, cursor);
        Ok(self.handle(slot))
    }

    /// Unlink an entry in O(1) and return it. Stale handles are rejected.
    pub fn remove(&mut self, entry: EntryRef) -> Result<Candidate> {
        let slot = self.resolve(entry).ok_or_else(|| {
            StrataError::precondition("remove", "entry was already removed")
        })?;
        let (prev, next) = {
            let node = self.node(slot);
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }

        let cell = &mut self.slots[slot as usize];
        cell.generation = cell.generation.wrapping_add(1);
        let node = cell.node.take();
        self.free.push(slot);
        self.len -= 1;
        node.map(|n| n.candidate)
            .ok_or_else(|| StrataError::precondition("remove", "entry was already removed"))
    }

    /// Drop every entry. All outstanding handles become stale.
    pub fn clear(&mut self) {
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let cell = &mut self.slots[idx as usize];
            cursor = cell.node.as_ref().and_then(|n| n.next);
            cell.node = None;
            cell.generation = cell.generation.wrapping_add(1);
            self.free.push(idx);
        }
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    pub fn first(&self) -> Option<EntryRef> {
        self.head.map(|s| self.handle(s))
    }

    pub fn last(&self) -> Option<EntryRef> {
        self.tail.map(|s| self.handle(s))
    }

    /// Entry after `entry`, or `None` at the tail or for a stale handle.
    pub fn next(&self, entry: EntryRef) -> Option<EntryRef> {
        let slot = self.resolve(entry)?;
        self.node(slot).next.map(|s| self.handle(s))
    }

    /// Entry before `entry`, or `None` at the head or for a stale handle.
    pub fn prev(&self, entry: EntryRef) -> Option<EntryRef> {
        let slot = self.resolve(entry)?;
        self.node(slot).prev.map(|s| self.handle(s))
    }

    pub fn get(&self, entry: EntryRef) -> Option<&Candidate> {
        self.resolve(entry).map(|s| &self.node(s).candidate)
    }

    /// Replace the distance of an entry without moving it.
    pub fn update_distance(&mut self, entry: EntryRef, distance: f64) -> Result<()> {
        check_distance("update_distance", distance)?;
        let slot = self.resolve(entry).ok_or_else(|| {
            StrataError::precondition("update_distance", "entry was already removed")
        })?;
        self.node_mut(slot).candidate.distance = distance;
        Ok(())
    }

    /// Head-insert every entry of `other`. The resulting membership does not
    /// depend on the order in which sets are merged.
    pub fn merge(&mut self, other: CandidateSet) -> Result<()> {
        for c in other.iter() {
            self.insert_head(c.id, c.distance)?;
        }
        Ok(())
    }

    /// Candidates from head to tail.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            set: self,
            cursor: self.head,
            remaining: self.len,
        }
    }

    /// Candidates from head to tail, copied out.
    pub fn to_vec(&self) -> Vec<Candidate> {
        self.iter().copied().collect()
    }

    pub fn ids(&self) -> Vec<VectorId> {
        self.iter().map(|c| c.id).collect()
    }

    fn alloc(&mut self, candidate: Candidate) -> u32 {
        let node = Node {
            candidate,
            prev: None,
            next: None,
        };
        self.len += 1;
        if let Some(slot) = self.free.pop() {
            self.slots[slot as usize].node = Some(node);
            slot
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            (self.slots.len() - 1) as u32
        }
    }

    /// Link `slot` in front of `before`; `None` appends at the tail.
    fn link_before(&mut self, slot: u32, before: Option<u32>) {
        let prev = match before {
            Some(b) => self.node(b).prev,
            None => self.tail,
        };
        {
            let node = self.node_mut(slot);
            node.prev = prev;
            node.next = before;
        }
        match prev {
            Some(p) => self.node_mut(p).next = Some(slot),
            None => self.head = Some(slot),
        }
        match before {
            Some(b) => self.node_mut(b).prev = Some(slot),
            None => self.tail = Some(slot),
        }
    }

    fn handle(&self, slot: u32) -> EntryRef {
        EntryRef {
            slot,
            generation: self.slots[slot as usize].generation,
        }
    }

    fn resolve(&self, entry: EntryRef) -> Option<u32> {
        let cell = self.slots.get(entry.slot as usize)?;
        (cell.generation == entry.generation && cell.node.is_some()).then_some(entry.slot)
    }

    // Callers only pass slots reached through the list links, which are
    // always occupied.
    fn node(&self, slot: u32) -> &Node {
        match &self.slots[slot as usize].node {
            Some(node) => node,
            None => unreachable!("linked slot {slot} is vacant"),
        }
    }

    fn node_mut(&mut self, slot: u32) -> &mut Node {
        match &mut self.slots[slot as usize].node {
            Some(node) => node,
            None => unreachable!("linked slot {slot} is vacant"),
        }
    }
}

/// Iterator over a [`CandidateSet`], head to tail.
pub struct Iter<'a> {
    set: &'a CandidateSet,
    cursor: Option<u32>,
    remaining: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Candidate;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let node = self.set.node(slot);
        self.cursor = node.next;
        self.remaining -= 1;
        Some(&node.candidate)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a CandidateSet {
    type Item = &'a Candidate;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distances(set: &CandidateSet) -> Vec<f64> {
        set.iter().map(|c| c.distance).collect()
    }

    #[test]
    fn head_insertion_prepends() {
        let mut set = CandidateSet::new();
        set.insert_head(1, 0.5).unwrap();
        set.insert_head(2, 0.1).unwrap();
        set.insert_head(3, 0.9).unwrap();
        assert_eq!(set.ids(), vec![3, 2, 1]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn sorted_insertion_places_ties_first() {
        let mut set = CandidateSet::new();
        set.insert_sorted(1, 2.0).unwrap();
        set.insert_sorted(2, 1.0).unwrap();
        set.insert_sorted(3, 3.0).unwrap();
        set.insert_sorted(4, 2.0).unwrap();
        assert_eq!(distances(&set), vec![1.0, 2.0, 2.0, 3.0]);
        // Equal distance goes before the existing entry.
        assert_eq!(set.ids(), vec![2, 4, 1, 3]);
    }

    #[test]
    fn remove_keeps_links_valid() {
        let mut set = CandidateSet::new();
        let a = set.insert_sorted(1, 1.0).unwrap();
        let b = set.insert_sorted(2, 2.0).unwrap();
        let c = set.insert_sorted(3, 3.0).unwrap();

        assert_eq!(set.remove(b).unwrap().id, 2);
        assert_eq!(set.next(a), Some(c));
        assert_eq!(set.prev(c), Some(a));

        set.remove(a).unwrap();
        assert_eq!(set.first(), Some(c));
        set.remove(c).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.first(), None);
        assert_eq!(set.last(), None);
    }

    #[test]
    fn stale_handles_are_rejected() {
        let mut set = CandidateSet::new();
        let a = set.insert_head(1, 1.0).unwrap();
        set.remove(a).unwrap();
        // Slot is reused by the next insertion.
        let b = set.insert_head(2, 2.0).unwrap();
        assert_ne!(a, b);
        assert!(matches!(
            set.remove(a),
            Err(StrataError::PreconditionViolation { .. })
        ));
        assert!(set.get(a).is_none());
        assert!(set.update_distance(a, 0.0).is_err());
        assert_eq!(set.get(b).unwrap().id, 2);
    }

    #[test]
    fn removal_during_traversal() {
        let mut set = CandidateSet::new();
        for id in 1..=6 {
            set.insert_head(id, id as f64).unwrap();
        }
        let mut cursor = set.first();
        while let Some(entry) = cursor {
            cursor = set.next(entry);
            if set.get(entry).unwrap().id % 2 == 0 {
                set.remove(entry).unwrap();
            }
        }
        assert_eq!(set.ids(), vec![5, 3, 1]);

        // Backward traversal after removals.
        let mut back = Vec::new();
        let mut cursor = set.last();
        while let Some(entry) = cursor {
            back.push(set.get(entry).unwrap().id);
            cursor = set.prev(entry);
        }
        assert_eq!(back, vec![1, 3, 5]);
    }

    #[test]
    fn update_distance_in_place() {
        let mut set = CandidateSet::new();
        let a = set.insert_head(7, 4.0).unwrap();
        set.update_distance(a, 0.25).unwrap();
        assert_eq!(set.get(a).unwrap().distance, 0.25);
    }

    #[test]
    fn invalid_distances_are_rejected() {
        let mut set = CandidateSet::new();
        assert!(set.insert_head(1, -0.1).is_err());
        assert!(set.insert_sorted(1, f64::NAN).is_err());
        assert!(set.insert_sorted(1, f64::INFINITY).is_err());
        assert!(set.is_empty());
    }

    #[test]
    fn clear_invalidates_handles() {
        let mut set = CandidateSet::new();
        let a = set.insert_head(1, 1.0).unwrap();
        set.insert_head(2, 1.0).unwrap();
        set.clear();
        assert!(set.is_empty());
        assert!(set.get(a).is_none());
        set.insert_sorted(3, 0.0).unwrap();
        assert_eq!(set.ids(), vec![3]);
    }

    #[test]
    fn merge_is_order_independent() {
        let mut a = CandidateSet::new();
        a.insert_head(1, 1.0).unwrap();
        let mut b = CandidateSet::new();
        b.insert_head(2, 2.0).unwrap();
        b.insert_head(3, 3.0).unwrap();

        let mut ab = a.clone();
        ab.merge(b.clone()).unwrap();
        let mut ba = b;
        ba.merge(a).unwrap();

        let mut x = ab.ids();
        let mut y = ba.ids();
        x.sort_unstable();
        y.sort_unstable();
        assert_eq!(x, y);
        assert_eq!(x, vec![1, 2, 3]);
    }
}
