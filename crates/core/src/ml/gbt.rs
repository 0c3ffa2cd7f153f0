//! Gradient-boosted regression trees with squared-error loss.
//!
//! Each round fits a depth-limited CART tree to the current residuals and
//! adds it to the ensemble scaled by the learning rate. Split search is
//! exhaustive over midpoints between distinct feature values, and ties are
//! resolved by feature index then threshold, so fitting is deterministic.

use serde::{Deserialize, Serialize};

use super::features::FeatureVector;

pub type Row = [f64; FeatureVector::DIM];

/// Minimum variance reduction for a split to be kept.
const MIN_GAIN: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self { n_estimators: 100, learning_rate: 0.1, max_depth: 4, min_samples_leaf: 1 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf { value: f64 },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn fit(rows: &[Row], targets: &[f64], max_depth: usize, min_samples_leaf: usize) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        let indices: Vec<usize> = (0..rows.len()).collect();
        tree.grow(rows, targets, indices, 0, max_depth, min_samples_leaf.max(1));
        tree
    }

    pub fn predict(&self, row: &Row) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split { feature, threshold, left, right } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Checks the layout `grow` produces: a root exists, and every split
    /// names a real feature and points strictly forward to existing nodes.
    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { value } if !value.is_finite() => {
                    return Err(format!("leaf {index} has a non-finite value"));
                }
                Node::Leaf { .. } => {}
                Node::Split { feature, threshold, left, right } => {
                    if *feature >= FeatureVector::DIM {
                        return Err(format!("split {index} uses unknown feature {feature}"));
                    }
                    if threshold.is_nan() {
                        return Err(format!("split {index} has a NaN threshold"));
                    }
                    for child in [*left, *right] {
                        if child <= index || child >= self.nodes.len() {
                            return Err(format!("split {index} points to invalid node {child}"));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|node| matches!(node, Node::Leaf { .. })).count()
    }

    fn grow(
        &mut self,
        rows: &[Row],
        targets: &[f64],
        indices: Vec<usize>,
        depth: usize,
        max_depth: usize,
        min_samples_leaf: usize,
    ) -> usize {
        let slot = self.nodes.len();
        let mean = if indices.is_empty() {
            0.0
        } else {
            indices.iter().map(|&i| targets[i]).sum::<f64>() / indices.len() as f64
        };
        self.nodes.push(Node::Leaf { value: mean });

        if depth >= max_depth || indices.len() < 2 * min_samples_leaf {
            return slot;
        }
        let Some((feature, threshold)) = best_split(rows, targets, &indices, min_samples_leaf)
        else {
            return slot;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            indices.into_iter().partition(|&i| rows[i][feature] <= threshold);
        let left = self.grow(rows, targets, left_rows, depth + 1, max_depth, min_samples_leaf);
        let right = self.grow(rows, targets, right_rows, depth + 1, max_depth, min_samples_leaf);
        self.nodes[slot] = Node::Split { feature, threshold, left, right };
        slot
    }
}

fn best_split(
    rows: &[Row],
    targets: &[f64],
    indices: &[usize],
    min_samples_leaf: usize,
) -> Option<(usize, f64)> {
    let count = indices.len() as f64;
    let total: f64 = indices.iter().map(|&i| targets[i]).sum();
    let parent_score = total * total / count;

    let mut best: Option<(usize, f64, f64)> = None;
    for feature in 0..FeatureVector::DIM {
        let mut sorted = indices.to_vec();
        sorted.sort_by(|&a, &b| rows[a][feature].total_cmp(&rows[b][feature]));

        let mut left_sum = 0.0;
        for position in 0..sorted.len() - 1 {
            left_sum += targets[sorted[position]];
            let left_count = position + 1;
            let right_count = sorted.len() - left_count;
            if left_count < min_samples_leaf || right_count < min_samples_leaf {
                continue;
            }

            let here = rows[sorted[position]][feature];
            let next = rows[sorted[position + 1]][feature];
            if here == next {
                continue;
            }

            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / left_count as f64
                + right_sum * right_sum / right_count as f64
                - parent_score;
            if gain > MIN_GAIN && best.map_or(true, |(_, _, best_gain)| gain > best_gain) {
                best = Some((feature, here + (next - here) / 2.0, gain));
            }
        }
    }

    best.map(|(feature, threshold, _)| (feature, threshold))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    base_score: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedRegressor {
    /// `rows` and `targets` must be non-empty and of equal length.
    pub fn fit(rows: &[Row], targets: &[f64], params: &BoostingParams) -> Self {
        let base_score = targets.iter().sum::<f64>() / targets.len().max(1) as f64;
        let mut predictions = vec![base_score; targets.len()];
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            let residuals: Vec<f64> =
                targets.iter().zip(&predictions).map(|(target, pred)| target - pred).collect();
            if residuals.iter().all(|residual| residual.abs() < 1e-9) {
                break;
            }

            let tree =
                RegressionTree::fit(rows, &residuals, params.max_depth, params.min_samples_leaf);
            for (prediction, row) in predictions.iter_mut().zip(rows) {
                *prediction += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Self { base_score, learning_rate: params.learning_rate, trees }
    }

    pub fn predict(&self, row: &Row) -> f64 {
        self.base_score
            + self.learning_rate * self.trees.iter().map(|tree| tree.predict(row)).sum::<f64>()
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.base_score.is_finite() || !self.learning_rate.is_finite() {
            return Err("base score and learning rate must be finite".to_string());
        }
        for (position, tree) in self.trees.iter().enumerate() {
            tree.validate().map_err(|reason| format!("tree {position}: {reason}"))?;
        }
        Ok(())
    }
}
