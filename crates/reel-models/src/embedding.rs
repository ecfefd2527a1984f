//! Face embedding vectors and similarity math.
//!
//! Embeddings are opaque fixed-length vectors produced by a detection
//! backend. The pipeline only ever compares them by cosine similarity and
//! averages them per track, so both operations live here.

use serde::{Deserialize, Serialize};

/// A face embedding vector from a detection backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Create an embedding from raw components.
    pub fn new(components: Vec<f32>) -> Self {
        Self(components)
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the vector has no components.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// L2 norm of the vector.
    pub fn norm(&self) -> f64 {
        self.0.iter().map(|c| (*c as f64) * (*c as f64)).sum::<f64>().sqrt()
    }

    /// Cosine similarity with another embedding, in [-1, 1].
    ///
    /// Mismatched dimensions or zero vectors yield 0.0 rather than NaN so a
    /// degenerate backend output can never poison downstream comparisons.
    pub fn cosine_similarity(&self, other: &Embedding) -> f64 {
        if self.0.len() != other.0.len() || self.0.is_empty() {
            return 0.0;
        }

        let dot: f64 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (*a as f64) * (*b as f64))
            .sum();

        let norms = self.norm() * other.norm();
        if norms > 0.0 {
            dot / norms
        } else {
            0.0
        }
    }

    /// Cosine distance, in [0, 2].
    pub fn cosine_distance(&self, other: &Embedding) -> f64 {
        1.0 - self.cosine_similarity(other)
    }
}

/// Running mean over a stream of embeddings.
///
/// Tracks accumulate one embedding per face detection; the mean is the
/// track's representative vector handed to the clusterer.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingAccumulator {
    sum: Vec<f64>,
    count: usize,
}

impl EmbeddingAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one embedding to the running mean.
    ///
    /// The first embedding fixes the dimensionality; later embeddings with a
    /// different length are ignored.
    pub fn push(&mut self, embedding: &Embedding) {
        if self.sum.is_empty() {
            self.sum = embedding.0.iter().map(|c| *c as f64).collect();
            self.count = 1;
            return;
        }
        if self.sum.len() != embedding.0.len() {
            return;
        }
        for (acc, c) in self.sum.iter_mut().zip(embedding.0.iter()) {
            *acc += *c as f64;
        }
        self.count += 1;
    }

    /// Number of embeddings accumulated.
    pub fn count(&self) -> usize {
        self.count
    }

    /// The mean embedding, or `None` if nothing was accumulated.
    pub fn mean(&self) -> Option<Embedding> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(Embedding(self.sum.iter().map(|s| (s / n) as f32).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding::new(vec![1.0, 2.0, 3.0]);
        assert!((a.cosine_similarity(&a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!(a.cosine_similarity(&b).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_mismatched_dims() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert_eq!(a.cosine_similarity(&b), 0.0);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 1.0]);
        assert_eq!(a.cosine_similarity(&b), 0.0);
    }

    #[test]
    fn test_accumulator_mean() {
        let mut acc = EmbeddingAccumulator::new();
        acc.push(&Embedding::new(vec![1.0, 0.0]));
        acc.push(&Embedding::new(vec![0.0, 1.0]));

        let mean = acc.mean().unwrap();
        assert_eq!(mean.0, vec![0.5, 0.5]);
        assert_eq!(acc.count(), 2);
    }

    #[test]
    fn test_accumulator_ignores_mismatched_dims() {
        let mut acc = EmbeddingAccumulator::new();
        acc.push(&Embedding::new(vec![1.0, 1.0]));
        acc.push(&Embedding::new(vec![1.0]));
        assert_eq!(acc.count(), 1);
    }

    #[test]
    fn test_accumulator_empty() {
        assert!(EmbeddingAccumulator::new().mean().is_none());
    }
}
