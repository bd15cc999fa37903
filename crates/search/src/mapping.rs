use std::collections::HashMap;

/// Many-valued chunk id → parent id table.
///
/// A chunk may belong to several parents; repeated `(chunk, parent)` pairs are
/// stored once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentMapping {
    parents: HashMap<i64, Vec<i64>>,
}

impl ParentMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (i64, i64)>,
    {
        pairs.into_iter().collect()
    }

    pub fn insert(&mut self, chunk_id: i64, parent_id: i64) {
        let parents = self.parents.entry(chunk_id).or_default();
        if !parents.contains(&parent_id) {
            parents.push(parent_id);
        }
    }

    /// Parent ids of `chunk_id`; empty for unknown chunks.
    pub fn parents(&self, chunk_id: i64) -> &[i64] {
        self.parents.get(&chunk_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct chunk ids.
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

impl FromIterator<(i64, i64)> for ParentMapping {
    fn from_iter<T: IntoIterator<Item = (i64, i64)>>(iter: T) -> Self {
        let mut mapping = Self::new();
        for (chunk_id, parent_id) in iter {
            mapping.insert(chunk_id, parent_id);
        }
        mapping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_can_have_several_parents() {
        let mapping = ParentMapping::from_pairs([(10, 100), (10, 101), (11, 100)]);
        assert_eq!(mapping.parents(10), &[100, 101]);
        assert_eq!(mapping.parents(11), &[100]);
        assert_eq!(mapping.len(), 2);
    }

    #[test]
    fn repeated_pairs_are_kept_once() {
        let mapping = ParentMapping::from_pairs([(10, 100), (10, 100)]);
        assert_eq!(mapping.parents(10), &[100]);
    }

    #[test]
    fn unknown_chunk_has_no_parents() {
        let mapping = ParentMapping::new();
        assert!(mapping.parents(42).is_empty());
        assert!(mapping.is_empty());
    }
}
