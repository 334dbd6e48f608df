//! Small sorted association list for Jacobian rows.

use crate::topology::connected_nodes::GlobalNodeId;

/// Sparse row keyed by global node id. Keys are kept sorted; the support is
/// fixed when the row is built and [`SparseRow::add`] only touches known keys.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SparseRow {
    entries: Vec<(GlobalNodeId, f64)>,
}

impl SparseRow {
    /// Zero row over `keys` (duplicates are collapsed).
    pub fn with_support(keys: impl IntoIterator<Item = GlobalNodeId>) -> Self {
        let mut keys: Vec<_> = keys.into_iter().collect();
        keys.sort_unstable();
        keys.dedup();
        Self {
            entries: keys.into_iter().map(|k| (k, 0.0)).collect(),
        }
    }

    #[inline]
    fn position(&self, key: GlobalNodeId) -> Option<usize> {
        self.entries.binary_search_by_key(&key, |&(k, _)| k).ok()
    }

    /// `row[key] += value`. Returns `false` if `key` is outside the support.
    #[inline]
    pub fn add(&mut self, key: GlobalNodeId, value: f64) -> bool {
        match self.position(key) {
            Some(p) => {
                self.entries[p].1 += value;
                true
            }
            None => false,
        }
    }

    /// Entry for `key`; keys outside the support read as zero.
    pub fn get(&self, key: GlobalNodeId) -> f64 {
        self.position(key).map_or(0.0, |p| self.entries[p].1)
    }

    pub fn contains(&self, key: GlobalNodeId) -> bool {
        self.position(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Scale every entry.
    pub fn scale(&mut self, factor: f64) {
        for (_, v) in &mut self.entries {
            *v *= factor;
        }
    }

    /// `(key, value)` in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (GlobalNodeId, f64)> + '_ {
        self.entries.iter().copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = GlobalNodeId> + '_ {
        self.entries.iter().map(|&(k, _)| k)
    }
}
