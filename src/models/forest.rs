//! Random-forest classifier over the standardized feature matrix.
//!
//! Trees are grown greedily on gini impurity with bootstrap row sampling and
//! per-node feature subsampling. All randomness flows through PCG streams
//! derived from the configured seed, so a fit is reproducible bit-for-bit
//! given the same inputs. Probability output is the two-class row
//! `[p(legit), p(fraud)]` with element 1 always the fraud class.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};

/// Hyperparameters for a single forest fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: u32,
    /// Minimum samples a leaf may hold.
    pub min_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_leaf: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        prob: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A single fitted CART-style tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Node,
}

impl DecisionTree {
    /// A depth-zero tree that predicts a fixed fraud probability.
    pub fn leaf(prob: f64) -> Self {
        Self {
            root: Node::Leaf { prob },
        }
    }

    fn grow(x: &[Vec<f64>], y: &[u8], indices: &[usize], params: &ForestParams, rng: &mut Pcg64Mcg) -> Self {
        let n_features = x.first().map_or(0, Vec::len);
        Self {
            root: grow_node(x, y, indices, n_features, 0, params, rng),
        }
    }

    /// Fraud probability for one row.
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { prob } => return *prob,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] < *threshold { left } else { right };
                }
            }
        }
    }
}

fn fraud_fraction(y: &[u8], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    let pos: u64 = indices.iter().map(|&i| u64::from(y[i])).sum();
    pos as f64 / indices.len() as f64
}

fn gini(p: f64) -> f64 {
    2.0 * p * (1.0 - p)
}

fn grow_node(
    x: &[Vec<f64>],
    y: &[u8],
    indices: &[usize],
    n_features: usize,
    depth: u32,
    params: &ForestParams,
    rng: &mut Pcg64Mcg,
) -> Node {
    let prob = fraud_fraction(y, indices);
    if depth >= params.max_depth
        || indices.len() < 2 * params.min_leaf
        || prob == 0.0
        || prob == 1.0
        || n_features == 0
    {
        return Node::Leaf { prob };
    }

    let parent_impurity = gini(prob);
    let mut best: Option<(usize, f64, f64)> = None; // (feature, threshold, impurity)

    for &feature in &feature_subset(n_features, rng) {
        let mut values: Vec<(f64, u8)> = indices.iter().map(|&i| (x[i][feature], y[i])).collect();
        values.sort_by(|a, b| a.0.partial_cmp(&b.0).expect("non-finite feature value"));

        let total = values.len();
        let total_pos: u64 = values.iter().map(|&(_, label)| u64::from(label)).sum();

        let mut left_n = 0u64;
        let mut left_pos = 0u64;
        for w in 0..total - 1 {
            left_n += 1;
            left_pos += u64::from(values[w].1);

            // only split between distinct values
            if values[w].0 == values[w + 1].0 {
                continue;
            }
            let right_n = total as u64 - left_n;
            if (left_n as usize) < params.min_leaf || (right_n as usize) < params.min_leaf {
                continue;
            }

            let p_left = left_pos as f64 / left_n as f64;
            let p_right = (total_pos - left_pos) as f64 / right_n as f64;
            let weighted = (left_n as f64 * gini(p_left) + right_n as f64 * gini(p_right))
                / total as f64;

            if best.as_ref().map_or(weighted < parent_impurity - 1e-12, |b| weighted < b.2) {
                let threshold = (values[w].0 + values[w + 1].0) / 2.0;
                best = Some((feature, threshold, weighted));
            }
        }
    }

    let Some((feature, threshold, _)) = best else {
        return Node::Leaf { prob };
    };

    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
        indices.iter().partition(|&&i| x[i][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow_node(x, y, &left_idx, n_features, depth + 1, params, rng)),
        right: Box::new(grow_node(x, y, &right_idx, n_features, depth + 1, params, rng)),
    }
}

/// Random sqrt-sized feature subset for one node, in draw order.
fn feature_subset(n_features: usize, rng: &mut Pcg64Mcg) -> Vec<usize> {
    let k = ((n_features as f64).sqrt().ceil() as usize).clamp(1, n_features);
    let mut pool: Vec<usize> = (0..n_features).collect();
    for i in 0..k {
        let j = rng.gen_range(i..pool.len());
        pool.swap(i, j);
    }
    pool.truncate(k);
    pool
}

/// Ensemble-member classifier: bagged gini trees with a frozen seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    params: ForestParams,
}

impl RandomForest {
    /// Fit a forest on a feature matrix and binary labels.
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: ForestParams) -> Self {
        let n = x.len();
        let mut trees = Vec::with_capacity(params.n_trees);
        for t in 0..params.n_trees {
            let mut rng = tree_rng(params.seed, t as u64);
            let indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            trees.push(DecisionTree::grow(x, y, &indices, &params, &mut rng));
        }
        Self { trees, params }
    }

    /// A degenerate forest that always outputs `prob` for the fraud class.
    pub fn constant(prob: f64) -> Self {
        Self {
            trees: vec![DecisionTree::leaf(prob)],
            params: ForestParams {
                n_trees: 1,
                ..ForestParams::default()
            },
        }
    }

    /// Two-class probability row `[p(legit), p(fraud)]` for one input row.
    pub fn predict_proba_one(&self, row: &[f64]) -> [f64; 2] {
        let p = self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64;
        [1.0 - p, p]
    }

    /// Two-class probability rows for a matrix.
    pub fn predict_proba(&self, x: &[Vec<f64>]) -> Vec<[f64; 2]> {
        x.iter().map(|row| self.predict_proba_one(row)).collect()
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

/// Per-tree RNG stream derived from the master seed; adding trees never
/// perturbs earlier trees' streams.
fn tree_rng(seed: u64, tree_index: u64) -> Pcg64Mcg {
    let derived = seed ^ tree_index.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    Pcg64Mcg::seed_from_u64(derived)
}
