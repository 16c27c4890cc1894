//! O(1) discrete sampling with Vose's alias method.
//!
//! An [`AliasTable`] turns an arbitrary weight vector into two length-`K`
//! tables (`prob` and `alias`) from which a sample is drawn with exactly two
//! uniform variates, independent of `K`. The random-walk engine builds one
//! table per node and one per directed edge.

use rand::Rng;

/// Precomputed alias tables for a discrete distribution.
#[derive(Debug, Clone)]
pub struct AliasTable {
    prob: Vec<f64>,
    alias: Vec<u32>,
}

impl AliasTable {
    /// Builds the alias tables for the given weights.
    ///
    /// Weights need not be normalized; they are scaled to sum to one first.
    /// The weight vector must be non-empty with a positive sum.
    pub fn new(weights: &[f64]) -> Self {
        let k = weights.len();
        debug_assert!(k > 0, "alias table needs at least one outcome");
        let total: f64 = weights.iter().sum();
        debug_assert!(total > 0.0, "alias table needs a positive weight sum");

        let mut prob = vec![0.0; k];
        let mut alias = vec![0u32; k];
        let mut smaller: Vec<usize> = Vec::new();
        let mut larger: Vec<usize> = Vec::new();

        for (i, &w) in weights.iter().enumerate() {
            prob[i] = k as f64 * (w / total);
            if prob[i] < 1.0 {
                smaller.push(i);
            } else {
                larger.push(i);
            }
        }

        while let (Some(small), Some(large)) = (smaller.pop(), larger.pop()) {
            alias[small] = large as u32;
            prob[large] = prob[large] + prob[small] - 1.0;
            if prob[large] < 1.0 {
                smaller.push(large);
            } else {
                larger.push(large);
            }
        }

        Self { prob, alias }
    }

    /// Number of outcomes.
    pub fn len(&self) -> usize {
        self.prob.len()
    }

    /// Returns whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.prob.is_empty()
    }

    /// Draws an outcome index using two uniform variates in `[0, 1)`.
    pub fn draw(&self, rng: &mut impl Rng) -> usize {
        let k = self.prob.len();
        let cell = ((rng.gen::<f64>() * k as f64) as usize).min(k - 1);
        if rng.gen::<f64>() < self.prob[cell] {
            cell
        } else {
            self.alias[cell] as usize
        }
    }
}
