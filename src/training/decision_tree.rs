//! CART regression tree

use super::models::{check_fit_input, Regressor};
use crate::error::{HarvestError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Decision tree node. Children are indices into the tree's node list, which
/// keeps deep trees flat when serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf {
        value: f64,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: usize,
        right: usize,
        n_samples: usize,
    },
}

/// Best split found for one feature
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

/// Regression tree using the squared-error criterion.
///
/// The order in which features are scanned at each node is a permutation
/// drawn from `random_state`; among equally good splits the first feature in
/// that order wins, so a fixed seed gives a fixed tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    /// Nodes in construction order; the root is first
    nodes: Vec<TreeNode>,
    /// Maximum depth (`None` grows until leaves are pure)
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Seed for the per-node feature order
    pub random_state: Option<u64>,
    n_features: usize,
}

impl Default for DecisionTreeRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTreeRegressor {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            random_state: None,
            n_features: 0,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.min_samples_split < 2 {
            return Err(HarvestError::InvalidParameter {
                name: "min_samples_split".to_string(),
                value: self.min_samples_split.to_string(),
                reason: "must be at least 2".to_string(),
            });
        }
        if self.min_samples_leaf < 1 {
            return Err(HarvestError::InvalidParameter {
                name: "min_samples_leaf".to_string(),
                value: self.min_samples_leaf.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Fit the tree to training data
    pub(crate) fn fit_tree(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.validate()?;

        let n_features = x.ncols();
        self.n_features = n_features;

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));
        let indices: Vec<usize> = (0..x.nrows()).collect();
        let mut nodes = Vec::new();
        self.build_tree(x, y, indices, 0, &mut rng, &mut nodes);
        self.nodes = nodes;
        Ok(())
    }

    /// Grow the subtree for `indices` and return the index of its root node
    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: Vec<usize>,
        depth: usize,
        rng: &mut ChaCha8Rng,
        nodes: &mut Vec<TreeNode>,
    ) -> usize {
        let n_samples = indices.len();
        let node_idx = nodes.len();
        let mean = indices.iter().map(|&i| y[i]).sum::<f64>() / n_samples as f64;

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || Self::is_pure(y, &indices);

        if should_stop {
            nodes.push(TreeNode::Leaf {
                value: mean,
                n_samples,
            });
            return node_idx;
        }

        let mut feature_order: Vec<usize> = (0..x.ncols()).collect();
        feature_order.shuffle(rng);

        let Some(best) = self.find_best_split(x, y, &indices, mean, &feature_order) else {
            nodes.push(TreeNode::Leaf {
                value: mean,
                n_samples,
            });
            return node_idx;
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| x[[i, best.feature_idx]] <= best.threshold);

        // Reserve the slot, children are appended after it
        nodes.push(TreeNode::Leaf {
            value: mean,
            n_samples,
        });
        let left = self.build_tree(x, y, left_indices, depth + 1, rng, nodes);
        let right = self.build_tree(x, y, right_indices, depth + 1, rng, nodes);

        nodes[node_idx] = TreeNode::Split {
            feature_idx: best.feature_idx,
            threshold: best.threshold,
            left,
            right,
            n_samples,
        };
        node_idx
    }

    /// Scan the candidate features in parallel; each sorts the node once and
    /// sweeps prefix sums, so a node costs `O(n log n)` per feature.
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        mean: f64,
        feature_order: &[usize],
    ) -> Option<SplitCandidate> {
        let per_feature: Vec<Option<SplitCandidate>> = feature_order
            .par_iter()
            .map(|&feature_idx| self.best_split_for_feature(x, y, indices, mean, feature_idx))
            .collect();

        // Strictly greater keeps the earliest feature in scan order on ties
        per_feature.into_iter().flatten().fold(None, |best, cand| match best {
            Some(b) if cand.gain <= b.gain => Some(b),
            _ => Some(cand),
        })
    }

    fn best_split_for_feature(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        mean: f64,
        feature_idx: usize,
    ) -> Option<SplitCandidate> {
        let mut pairs: Vec<(f64, f64)> = indices
            .iter()
            .map(|&i| (x[[i, feature_idx]], y[i] - mean))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = pairs.len();
        // Centered targets: total sum is ~0, so gain = L²/nl + R²/nr
        let total: f64 = pairs.iter().map(|p| p.1).sum();

        let mut left_sum = 0.0f64;
        let mut best: Option<SplitCandidate> = None;

        for i in 0..n - 1 {
            left_sum += pairs[i].1;
            if pairs[i].0 == pairs[i + 1].0 {
                continue;
            }
            let n_left = i + 1;
            let n_right = n - n_left;
            if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                continue;
            }

            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64
                - total * total / n as f64;

            if gain > best.map_or(0.0, |b| b.gain) {
                let mut threshold = (pairs[i].0 + pairs[i + 1].0) / 2.0;
                // Midpoint can round up to the right value for adjacent floats
                if threshold >= pairs[i + 1].0 {
                    threshold = pairs[i].0;
                }
                best = Some(SplitCandidate {
                    feature_idx,
                    threshold,
                    gain,
                });
            }
        }

        best
    }

    fn is_pure(y: &Array1<f64>, indices: &[usize]) -> bool {
        let first = y[indices[0]];
        indices.iter().all(|&i| y[i] == first)
    }

    fn predict_row(&self, sample: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if sample[*feature_idx] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Make predictions
    pub(crate) fn predict_tree(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.nodes.is_empty() {
            return Err(HarvestError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(HarvestError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        Ok(x.rows().into_iter().map(|row| self.predict_row(row)).collect())
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 1usize)];
        while let Some((idx, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let TreeNode::Split { left, right, .. } = &self.nodes[idx] {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        max_depth
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }
}

impl Regressor for DecisionTreeRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fit_tree(x, y)?;
        debug!(depth = self.get_depth(), leaves = self.get_n_leaves(), "Grew regression tree");
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.predict_tree(x)
    }
}
