//! A key/value map with nested checkpoints.
//!
//! Every mutation is tagged with the checkpoint level it was made at. Rolling
//! back pops the newest level; entries made at a level that is no longer on
//! the stack become dead and are skipped by readers and dropped by the next
//! mutating access to the same key. Lookups take `&self` and never compact,
//! so a key that is only read after a rollback keeps its dead entries until
//! it is written again or the map is cleared.

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Entry<V> {
    level: u32,
    value: Option<V>,
}

/// Ordered map whose mutations can be undone level by level.
///
/// `checkpoint` and `rollback` are O(1). Reads and writes are proportional to
/// the number of live entries for the key, which is bounded by the
/// checkpoint depth.
#[derive(Debug, Clone)]
pub struct TransactionalMap<K, V> {
    entries: BTreeMap<K, Vec<Entry<V>>>,
    /// Active levels, oldest first. Level values increase strictly, so a
    /// rolled-back level number is never reused.
    levels: Vec<u32>,
    next_level: u32,
}

impl<K: Ord + Clone, V: Clone> Default for TransactionalMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone, V: Clone> TransactionalMap<K, V> {
    /// Creates an empty map at the base level.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            levels: vec![0],
            next_level: 1,
        }
    }

    fn current_level(&self) -> u32 {
        self.levels[self.levels.len() - 1]
    }

    fn is_live(levels: &[u32], level: u32) -> bool {
        levels.binary_search(&level).is_ok()
    }

    /// Latest live value in `chain`.
    fn live_value<'a>(levels: &[u32], chain: &'a [Entry<V>]) -> Option<&'a V> {
        chain
            .iter()
            .rev()
            .find(|e| Self::is_live(levels, e.level))
            .and_then(|e| e.value.as_ref())
    }

    /// Drops dead entries for `key`, removing the key if nothing is left.
    fn compact(&mut self, key: &K) {
        let levels = &self.levels;
        let emptied = match self.entries.get_mut(key) {
            Some(chain) => {
                chain.retain(|e| Self::is_live(levels, e.level));
                chain.is_empty()
            }
            None => false,
        };
        if emptied {
            self.entries.remove(key);
        }
    }

    /// Number of checkpoints above the base level.
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Pushes a new mutation level.
    pub fn checkpoint(&mut self) {
        self.levels.push(self.next_level);
        self.next_level += 1;
    }

    /// Discards every mutation made since the last checkpoint.
    ///
    /// # Panics
    ///
    /// Panics when there is no checkpoint to roll back to.
    pub fn rollback(&mut self) {
        assert!(self.depth() > 0, "rollback below the base level");
        self.levels.pop();
    }

    /// Returns the live value for `key`. Dead entries are skipped, not
    /// dropped.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries
            .get(key)
            .and_then(|chain| Self::live_value(&self.levels, chain))
    }

    /// Returns `true` if `key` has a live value.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Sets `key` to `value` at the current level and returns the previous
    /// live value.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        self.compact(&key);
        let level = self.current_level();
        let chain = self.entries.entry(key).or_default();
        let previous = chain.last().and_then(|e| e.value.clone());
        match chain.last_mut() {
            Some(top) if top.level == level => top.value = Some(value),
            _ => chain.push(Entry {
                level,
                value: Some(value),
            }),
        }
        previous
    }

    /// Removes `key` at the current level. Returns `true` if a live value was
    /// removed.
    pub fn remove(&mut self, key: &K) -> bool {
        self.compact(key);
        let level = self.current_level();
        let Some(chain) = self.entries.get_mut(key) else {
            return false;
        };
        let had_value = chain.last().is_some_and(|e| e.value.is_some());
        if !had_value {
            return false;
        }
        if chain.last().is_some_and(|e| e.level == level) {
            chain.pop();
        }
        match chain.last().map(|e| e.value.is_some()) {
            None => {
                self.entries.remove(key);
            }
            Some(true) => chain.push(Entry { level, value: None }),
            Some(false) => {}
        }
        true
    }

    /// Iterates over live entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries
            .iter()
            .filter_map(|(k, chain)| Self::live_value(&self.levels, chain).map(|v| (k, v)))
    }

    /// Iterates over live keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns `true` if no key has a live value.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Removes everything, checkpoints included.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.levels.truncate(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn snapshot(map: &TransactionalMap<u32, i64>) -> Vec<(u32, i64)> {
        map.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn put_get_remove() {
        let mut m = TransactionalMap::new();
        assert_eq!(m.put(1, "a"), None);
        assert_eq!(m.put(1, "b"), Some("a"));
        assert_eq!(m.get(&1), Some(&"b"));
        assert!(m.remove(&1));
        assert!(!m.remove(&1));
        assert_eq!(m.get(&1), None);
        assert!(m.is_empty());
    }

    #[test]
    fn rollback_restores_overwrites_and_removals() {
        let mut m = TransactionalMap::new();
        m.put("x", 1);
        m.put("y", 2);
        m.checkpoint();
        m.put("x", 10);
        m.remove(&"y");
        m.put("z", 3);
        assert_eq!(m.len(), 2);
        m.rollback();
        assert_eq!(m.get(&"x"), Some(&1));
        assert_eq!(m.get(&"y"), Some(&2));
        assert_eq!(m.get(&"z"), None);
        assert_eq!(m.depth(), 0);
    }

    #[test]
    fn nested_levels_unwind_one_at_a_time() {
        let mut m = TransactionalMap::new();
        m.put(0, 0);
        for level in 1..=5 {
            m.checkpoint();
            m.put(0, level);
        }
        for level in (0..5).rev() {
            m.rollback();
            assert_eq!(m.get(&0), Some(&level));
        }
    }

    #[test]
    fn dead_entries_do_not_resurface() {
        let mut m = TransactionalMap::new();
        m.checkpoint();
        m.put(7, 1);
        m.rollback();
        m.checkpoint();
        assert_eq!(m.get(&7), None);
        m.put(7, 2);
        m.rollback();
        assert!(!m.contains_key(&7));
    }

    #[test]
    fn reads_skip_dead_entries_and_writes_drop_them() {
        let mut m = TransactionalMap::new();
        m.checkpoint();
        m.put(3, 1);
        m.checkpoint();
        m.put(3, 2);
        m.rollback();
        m.rollback();
        assert_eq!(m.get(&3), None);
        assert_eq!(m.entries[&3].len(), 2);

        m.put(3, 9);
        assert_eq!(m.entries[&3].len(), 1);
        assert!(m.remove(&3));
        assert!(!m.entries.contains_key(&3));
    }

    #[test]
    fn remove_then_put_in_same_level() {
        let mut m = TransactionalMap::new();
        m.put(1, 1);
        m.checkpoint();
        assert!(m.remove(&1));
        m.put(1, 5);
        assert_eq!(m.get(&1), Some(&5));
        m.rollback();
        assert_eq!(m.get(&1), Some(&1));
    }

    #[test]
    #[should_panic(expected = "rollback below the base level")]
    fn rollback_at_base_panics() {
        let mut m: TransactionalMap<u8, u8> = TransactionalMap::new();
        m.rollback();
    }

    #[test]
    fn random_mutations_roll_back_to_identity() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut m: TransactionalMap<u32, i64> = TransactionalMap::new();
        for k in 0..16 {
            m.put(k, i64::from(k));
        }
        let mut saved = Vec::new();
        for _ in 0..200 {
            match rng.gen_range(0..10) {
                0..=1 => {
                    saved.push(snapshot(&m));
                    m.checkpoint();
                }
                2 if !saved.is_empty() => {
                    m.rollback();
                    assert_eq!(snapshot(&m), saved.pop().unwrap());
                }
                3..=4 => {
                    m.remove(&rng.gen_range(0..24));
                }
                _ => {
                    m.put(rng.gen_range(0..24), rng.gen_range(-100..100));
                }
            }
        }
        while let Some(expected) = saved.pop() {
            m.rollback();
            assert_eq!(snapshot(&m), expected);
        }
        assert_eq!(m.depth(), 0);
    }
}
