use crate::error::{Result, StoreError};
use crate::types::MetricType;
use std::collections::HashSet;

/// Exhaustive vector index used by the in-memory store.
pub struct FlatIndex {
    dimension: usize,
    ids: HashSet<i64>,
    rows: Vec<(i64, Vec<f32>)>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: HashSet::new(),
            rows: Vec::new(),
        }
    }

    pub fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(StoreError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    /// Add vector to index
    pub fn add(&mut self, id: i64, vector: &[f32]) -> Result<()> {
        self.check_dimension(vector)?;
        self.ids.insert(id);
        self.rows.push((id, vector.to_vec()));
        Ok(())
    }

    /// Search for k nearest neighbors.
    /// Returns (id, score) best first; ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize, metric: MetricType) -> Result<Vec<(i64, f32)>> {
        self.check_dimension(query)?;

        let mut scores: Vec<(i64, f32)> = self
            .rows
            .iter()
            .map(|(id, vector)| (*id, score(metric, query, vector)))
            .collect();

        match metric {
            MetricType::L2 => {
                scores.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            }
            MetricType::Ip | MetricType::Cosine => {
                scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            }
        }

        scores.truncate(k);
        Ok(scores)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

fn score(metric: MetricType, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        MetricType::Cosine => cosine_similarity(a, b),
        MetricType::Ip => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        MetricType::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
