//! Index sets of terms awaiting repair.
//!
//! The scheduler keeps two of these (`down` and `up`). Every operation the
//! repair loop needs is O(1): insert, remove, membership, and picking the
//! k-th element for a uniformly random k.

use crate::types::TermId;

const NO_POS: u32 = u32::MAX;

/// A set of term ids with O(1) insert/remove/contains and uniform random
/// pick via [`elem_at`][RepairSet::elem_at].
///
/// Implemented as a swap-on-remove dense array plus an id-to-position
/// table; term ids are dense, so the position table is a plain vector.
#[derive(Debug, Clone, Default)]
pub struct RepairSet {
    dense: Vec<TermId>,
    pos: Vec<u32>,
}

impl RepairSet {
    pub fn new() -> Self {
        RepairSet::default()
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    pub fn contains(&self, id: TermId) -> bool {
        self.pos.get(id.index()).is_some_and(|&p| p != NO_POS)
    }

    /// Inserts `id`; inserting a member again is a no-op.
    pub fn insert(&mut self, id: TermId) {
        if self.contains(id) {
            return;
        }
        if id.index() >= self.pos.len() {
            self.pos.resize(id.index() + 1, NO_POS);
        }
        self.pos[id.index()] = self.dense.len() as u32;
        self.dense.push(id);
    }

    /// Removes `id`; removing a non-member is a no-op.
    pub fn remove(&mut self, id: TermId) {
        if !self.contains(id) {
            return;
        }
        let p = self.pos[id.index()] as usize;
        let last = *self.dense.last().unwrap();
        self.dense.swap_remove(p);
        if last != id {
            self.pos[last.index()] = p as u32;
        }
        self.pos[id.index()] = NO_POS;
    }

    /// The k-th member in current iteration order.
    ///
    /// With a uniformly random `k` in `[0, len)` every member has equal
    /// selection probability.
    pub fn elem_at(&self, k: usize) -> TermId {
        self.dense[k]
    }

    /// Removes every member.
    pub fn reset(&mut self) {
        for &id in &self.dense {
            self.pos[id.index()] = NO_POS;
        }
        self.dense.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = TermId> + '_ {
        self.dense.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(i: u32) -> TermId {
        TermId::new(i)
    }

    #[test]
    fn test_insert_contains() {
        let mut set = RepairSet::new();
        assert!(set.is_empty());
        set.insert(id(3));
        set.insert(id(7));
        set.insert(id(3)); // idempotent
        assert_eq!(set.len(), 2);
        assert!(set.contains(id(3)));
        assert!(set.contains(id(7)));
        assert!(!set.contains(id(5)));
    }

    #[test]
    fn test_remove_swaps() {
        let mut set = RepairSet::new();
        for i in 0..5 {
            set.insert(id(i));
        }
        set.remove(id(2));
        assert_eq!(set.len(), 4);
        assert!(!set.contains(id(2)));
        // Remaining members are all reachable through elem_at.
        let mut seen: Vec<u32> = (0..set.len()).map(|k| set.elem_at(k).raw()).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 3, 4]);

        set.remove(id(2)); // non-member, no-op
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_remove_last() {
        let mut set = RepairSet::new();
        set.insert(id(1));
        set.insert(id(9));
        set.remove(id(9));
        assert_eq!(set.len(), 1);
        assert_eq!(set.elem_at(0), id(1));
    }

    #[test]
    fn test_reset() {
        let mut set = RepairSet::new();
        for i in 0..10 {
            set.insert(id(i));
        }
        set.reset();
        assert!(set.is_empty());
        for i in 0..10 {
            assert!(!set.contains(id(i)));
        }
        // Reusable after reset.
        set.insert(id(4));
        assert_eq!(set.len(), 1);
        assert!(set.contains(id(4)));
    }

    #[test]
    fn test_elem_at_covers_members() {
        let mut set = RepairSet::new();
        let members = [0u32, 13, 7, 64, 2];
        for &i in &members {
            set.insert(id(i));
        }
        let mut picked: Vec<u32> = (0..set.len()).map(|k| set.elem_at(k).raw()).collect();
        picked.sort_unstable();
        let mut expected = members.to_vec();
        expected.sort_unstable();
        assert_eq!(picked, expected);
    }

    #[test]
    fn test_churn() {
        let mut set = RepairSet::new();
        for i in 0..100 {
            set.insert(id(i));
        }
        for i in (0..100).step_by(2) {
            set.remove(id(i));
        }
        assert_eq!(set.len(), 50);
        for i in 0..100 {
            assert_eq!(set.contains(id(i)), i % 2 == 1);
        }
        for i in (0..100).step_by(2) {
            set.insert(id(i));
        }
        assert_eq!(set.len(), 100);
    }
}
