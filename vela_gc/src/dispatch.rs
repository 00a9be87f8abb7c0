//! Virtual-method dispatch cache.
//!
//! Dispatch resolves a (concrete class, declared class, method) triple to
//! the method actually executed. The interpreter consults the cache before
//! walking the class hierarchy and records the result afterwards, so each
//! triple pays for resolution once.
//!
//! The triple is folded into a single integer key with the Szudzik pairing
//! function, which is collision-free for the id ranges the loader produces.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Pair two ids into one key without collisions.
#[inline]
fn szudzik(a: u64, b: u64) -> u64 {
    if a >= b {
        a.wrapping_mul(a).wrapping_add(a).wrapping_add(b)
    } else {
        b.wrapping_mul(b).wrapping_add(a)
    }
}

#[inline]
fn triple_key(concrete_cls: usize, virtual_cls_id: usize, virtual_mthd_id: usize) -> u64 {
    szudzik(
        szudzik(concrete_cls as u64, virtual_cls_id as u64),
        virtual_mthd_id as u64,
    )
}

/// Resolved (class id, method id) pair.
pub type ResolvedMethod = (usize, usize);

/// The dispatch cache: read-mostly map from folded triple to resolution.
#[derive(Debug, Default)]
pub struct VirtualMethodTable {
    entries: RwLock<FxHashMap<u64, ResolvedMethod>>,
}

impl VirtualMethodTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached resolution.
    pub fn get(
        &self,
        concrete_cls: usize,
        virtual_cls_id: usize,
        virtual_mthd_id: usize,
    ) -> Option<ResolvedMethod> {
        self.entries
            .read()
            .get(&triple_key(concrete_cls, virtual_cls_id, virtual_mthd_id))
            .copied()
    }

    /// Record a resolution; later inserts for the same triple win.
    pub fn insert(
        &self,
        concrete_cls: usize,
        virtual_cls_id: usize,
        virtual_mthd_id: usize,
        resolved: ResolvedMethod,
    ) {
        self.entries
            .write()
            .insert(triple_key(concrete_cls, virtual_cls_id, virtual_mthd_id), resolved);
    }

    /// Number of cached triples.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let table = VirtualMethodTable::new();
        table.insert(3, 1, 4, (3, 9));

        assert_eq!(table.get(3, 1, 4), Some((3, 9)));
        assert_eq!(table.get(3, 1, 5), None);
        assert_eq!(table.get(4, 1, 4), None);
    }

    #[test]
    fn test_distinct_triples_distinct_keys() {
        // Permutations of the same ids must not collide.
        let triples = [(1, 2, 3), (3, 2, 1), (2, 1, 3), (1, 3, 2), (2, 3, 1), (3, 1, 2)];
        let keys: Vec<u64> = triples
            .iter()
            .map(|&(a, b, c)| triple_key(a, b, c))
            .collect();
        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_later_insert_wins() {
        let table = VirtualMethodTable::new();
        table.insert(7, 2, 0, (7, 1));
        table.insert(7, 2, 0, (8, 2));
        assert_eq!(table.get(7, 2, 0), Some((8, 2)));
    }
}
