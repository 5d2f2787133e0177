//! Sparse numeric vectors keyed by small integer ids.
//!
//! - [`SparseVector`]: sorted `(id, value)` pairs, used for per-edge feature
//!   vectors in the id-indexed proof graph.
//! - [`DenseVector`]: a growable `Vec<f64>` addressed directly by id, used by
//!   the id-indexed provers for their mass vectors.
//! - [`SparseRow`]: one node's adjacency (children + their feature vectors).

use serde::{Deserialize, Serialize};

/// Sparse float vector with ids kept sorted and unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    ids: Vec<usize>,
    values: Vec<f64>,
}

impl SparseVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from unordered pairs; duplicate ids are summed.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (usize, f64)>) -> Self {
        let mut pairs: Vec<(usize, f64)> = pairs.into_iter().collect();
        pairs.sort_by_key(|(id, _)| *id);
        let mut out = Self::new();
        for (id, value) in pairs {
            match out.ids.last() {
                Some(&last) if last == id => {
                    if let Some(v) = out.values.last_mut() {
                        *v += value;
                    }
                }
                _ => {
                    out.ids.push(id);
                    out.values.push(value);
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Value at `id`, or 0.0 when absent.
    pub fn get(&self, id: usize) -> f64 {
        match self.ids.binary_search(&id) {
            Ok(i) => self.values[i],
            Err(_) => 0.0,
        }
    }

    /// Add `value` at `id`, inserting the id if needed.
    pub fn add(&mut self, id: usize, value: f64) {
        match self.ids.binary_search(&id) {
            Ok(i) => self.values[i] += value,
            Err(i) => {
                self.ids.insert(i, id);
                self.values.insert(i, value);
            }
        }
    }

    /// Iterate `(id, value)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.ids.iter().copied().zip(self.values.iter().copied())
    }

    /// Dot product against a parameter lookup.
    pub fn dot_with(&self, mut param: impl FnMut(usize) -> f64) -> f64 {
        self.iter().map(|(id, value)| value * param(id)).sum()
    }

    /// Dot product against a dense parameter array; ids past its end read `default`.
    pub fn dot(&self, params: &[f64], default: f64) -> f64 {
        self.dot_with(|id| params.get(id).copied().unwrap_or(default))
    }
}

/// Dense-by-index vector that grows on write and reads 0.0 past its end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DenseVector {
    values: Vec<f64>,
}

impl DenseVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_len(len: usize) -> Self {
        Self {
            values: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, id: usize) -> f64 {
        self.values.get(id).copied().unwrap_or(0.0)
    }

    fn grow(&mut self, id: usize) {
        if id >= self.values.len() {
            self.values.resize(id + 1, 0.0);
        }
    }

    pub fn set(&mut self, id: usize, value: f64) {
        self.grow(id);
        self.values[id] = value;
    }

    pub fn add(&mut self, id: usize, value: f64) {
        self.grow(id);
        self.values[id] += value;
    }

    /// Sum of all entries.
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Nonzero `(id, value)` pairs in id order.
    pub fn nonzero(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.values
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, v)| *v != 0.0)
    }

    /// Move entries to new ids; entries mapped to `None` are dropped.
    pub fn remap(&self, mapping: &[Option<usize>]) -> DenseVector {
        let mut out = DenseVector::new();
        for (old, value) in self.nonzero() {
            if let Some(Some(new)) = mapping.get(old) {
                out.add(*new, value);
            }
        }
        out
    }
}

/// Adjacency of one node: children and the feature vector on each edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseRow {
    pub children: Vec<usize>,
    pub features: Vec<SparseVector>,
}

impl SparseRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, child: usize, features: SparseVector) {
        self.children.push(child);
        self.features.push(features);
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Iterate `(child, features)` edges.
    pub fn edges(&self) -> impl Iterator<Item = (usize, &SparseVector)> + '_ {
        self.children.iter().copied().zip(self.features.iter())
    }

    /// Position of the edge to `child`, if any.
    pub fn position(&self, child: usize) -> Option<usize> {
        self.children.iter().position(|&c| c == child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_pairs_sorts_and_merges() {
        let v = SparseVector::from_pairs([(3, 1.0), (1, 2.0), (3, 0.5)]);
        assert_eq!(v.len(), 2);
        assert_eq!(v.iter().collect::<Vec<_>>(), vec![(1, 2.0), (3, 1.5)]);
    }

    #[test]
    fn add_keeps_order() {
        let mut v = SparseVector::new();
        v.add(5, 1.0);
        v.add(2, 1.0);
        v.add(5, 1.0);
        assert_eq!(v.iter().collect::<Vec<_>>(), vec![(2, 1.0), (5, 2.0)]);
        assert_eq!(v.get(5), 2.0);
        assert_eq!(v.get(4), 0.0);
    }

    #[test]
    fn dot_uses_default_past_end() {
        let v = SparseVector::from_pairs([(0, 2.0), (7, 1.0)]);
        assert_eq!(v.dot(&[0.5], 3.0), 2.0 * 0.5 + 3.0);
    }

    #[test]
    fn dense_vector_grows_and_remaps() {
        let mut d = DenseVector::new();
        d.add(3, 0.25);
        d.add(1, 0.5);
        assert_eq!(d.len(), 4);
        assert_eq!(d.get(10), 0.0);
        assert_eq!(d.total(), 0.75);

        let remapped = d.remap(&[None, Some(0), None, None]);
        assert_eq!(remapped.nonzero().collect::<Vec<_>>(), vec![(0, 0.5)]);
    }

    #[test]
    fn sparse_row_edges() {
        let mut row = SparseRow::new();
        row.push(4, SparseVector::from_pairs([(0, 1.0)]));
        row.push(2, SparseVector::new());
        assert_eq!(row.len(), 2);
        assert_eq!(row.position(2), Some(1));
        assert_eq!(row.position(9), None);
        assert_eq!(row.edges().map(|(c, _)| c).collect::<Vec<_>>(), vec![4, 2]);
    }
}
