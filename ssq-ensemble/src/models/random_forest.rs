use rand::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use ssq_db::models::{Algorithm, Draw, Pool, Prediction};

use super::{finalize, to_metadata, Predictor};
use crate::config::ForestConfig;
use crate::error::EngineError;
use crate::features::{self, rank_top, FEATURE_NAMES};

pub struct RandomForestPredictor {
    config: ForestConfig,
}

#[derive(Debug, Serialize)]
struct ForestMetadata {
    n_trees: usize,
    max_depth: usize,
    red_training_rows: usize,
    blue_training_rows: usize,
    red_probabilities: Vec<f64>,
    blue_probabilities: Vec<f64>,
}

/// Probabilités de sortie par numéro pour le prochain tirage et nombre de
/// lignes d'entraînement.
struct PoolForecast {
    probabilities: Vec<f64>,
    training_rows: usize,
}

impl RandomForestPredictor {
    pub fn new(config: ForestConfig) -> Self {
        Self { config }
    }

    fn forecast(&self, draws: &[Draw], pool: Pool) -> PoolForecast {
        // Cibles : les `window` tirages les plus récents qui ont un historique
        let targets = self.config.window.min(draws.len().saturating_sub(1));

        let mut all_features = Vec::new();
        let mut all_labels = Vec::new();
        for t in 0..targets {
            for row in features::extract_features_for_target(draws, pool, t) {
                all_features.push(row.features);
                all_labels.push(row.label);
            }
        }

        let next_rows = features::features_for_next(draws, pool);
        if all_features.is_empty() {
            let uniform = pool.pick_count() as f64 / pool.size() as f64;
            return PoolForecast {
                probabilities: vec![uniform; next_rows.len()],
                training_rows: 0,
            };
        }

        let features_per_split = (FEATURE_NAMES.len() as f64).sqrt().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut forest = Vec::with_capacity(self.config.n_trees);

        for _ in 0..self.config.n_trees {
            // Échantillonnage bootstrap
            let n_samples = all_features.len();
            let indices: Vec<usize> = (0..n_samples).map(|_| rng.random_range(0..n_samples)).collect();

            let boot_features: Vec<&Vec<f64>> = indices.iter().map(|&i| &all_features[i]).collect();
            let boot_labels: Vec<f64> = indices.iter().map(|&i| all_labels[i]).collect();

            forest.push(build_tree(&boot_features, &boot_labels, self.config.max_depth, features_per_split, &mut rng));
        }

        let n_trees = forest.len().max(1) as f64;
        let probabilities = next_rows
            .iter()
            .map(|row| forest.iter().map(|tree| predict_tree(tree, &row.features)).sum::<f64>() / n_trees)
            .collect();

        PoolForecast {
            probabilities,
            training_rows: all_labels.len(),
        }
    }
}

impl Predictor for RandomForestPredictor {
    fn algorithm(&self) -> Algorithm {
        Algorithm::RandomForest
    }

    fn min_draws(&self) -> usize {
        self.config.min_draws
    }

    fn predict(&self, draws: &[Draw]) -> Result<Prediction, EngineError> {
        self.check_window(draws)?;

        let red = self.forecast(draws, Pool::Red);
        let blue = self.forecast(draws, Pool::Blue);

        let reds = rank_top(&red.probabilities, Pool::Red.pick_count());
        let blue_pick = rank_top(&blue.probabilities, 1)[0];

        let selected: f64 = reds.iter().map(|&r| red.probabilities[(r - 1) as usize]).sum::<f64>()
            + blue.probabilities[(blue_pick - 1) as usize];
        let confidence = selected / (reds.len() + 1) as f64 * 100.0;

        let meta = ForestMetadata {
            n_trees: self.config.n_trees,
            max_depth: self.config.max_depth,
            red_training_rows: red.training_rows,
            blue_training_rows: blue.training_rows,
            red_probabilities: red.probabilities,
            blue_probabilities: blue.probabilities,
        };

        finalize(
            self.algorithm(),
            &reds,
            blue_pick,
            confidence,
            self.config.max_confidence,
            draws.len(),
            to_metadata(self.algorithm(), &meta)?,
        )
    }
}

#[derive(Debug)]
enum TreeNode {
    Leaf { value: f64 },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

fn mean(labels: &[f64]) -> f64 {
    labels.iter().sum::<f64>() / labels.len().max(1) as f64
}

fn build_tree(
    features: &[&Vec<f64>],
    labels: &[f64],
    max_depth: usize,
    features_per_split: usize,
    rng: &mut StdRng,
) -> TreeNode {
    if max_depth == 0 || labels.len() < 4 {
        return TreeNode::Leaf { value: mean(labels) };
    }

    // Nœud pur
    let first = labels[0];
    if labels.iter().all(|&l| (l - first).abs() < 1e-10) {
        return TreeNode::Leaf { value: first };
    }

    let n_features = features[0].len();
    let mut feature_indices: Vec<usize> = (0..n_features).collect();
    feature_indices.shuffle(rng);
    feature_indices.truncate(features_per_split);

    let mut best: Option<(usize, f64, f64)> = None;

    for &feat_idx in &feature_indices {
        let mut values: Vec<f64> = features.iter().map(|f| f[feat_idx]).collect();
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup();

        if values.len() < 2 {
            continue;
        }

        // Seuils échantillonnés entre valeurs consécutives
        let step = (values.len() / 10).max(1);
        for i in (0..values.len() - 1).step_by(step) {
            let threshold = (values[i] + values[i + 1]) / 2.0;
            let gini = split_gini(features, labels, feat_idx, threshold);
            if best.map_or(true, |(_, _, g)| gini < g) {
                best = Some((feat_idx, threshold, gini));
            }
        }
    }

    let Some((best_feature, best_threshold, best_gini)) = best else {
        return TreeNode::Leaf { value: mean(labels) };
    };
    if best_gini >= gini_impurity(labels) {
        return TreeNode::Leaf { value: mean(labels) };
    }

    let mut left_features = Vec::new();
    let mut left_labels = Vec::new();
    let mut right_features = Vec::new();
    let mut right_labels = Vec::new();

    for (feat, &label) in features.iter().zip(labels) {
        if feat[best_feature] <= best_threshold {
            left_features.push(*feat);
            left_labels.push(label);
        } else {
            right_features.push(*feat);
            right_labels.push(label);
        }
    }

    if left_features.is_empty() || right_features.is_empty() {
        return TreeNode::Leaf { value: mean(labels) };
    }

    TreeNode::Split {
        feature_idx: best_feature,
        threshold: best_threshold,
        left: Box::new(build_tree(&left_features, &left_labels, max_depth - 1, features_per_split, rng)),
        right: Box::new(build_tree(&right_features, &right_labels, max_depth - 1, features_per_split, rng)),
    }
}

fn gini_impurity(labels: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let p = mean(labels);
    2.0 * p * (1.0 - p)
}

fn split_gini(features: &[&Vec<f64>], labels: &[f64], feature_idx: usize, threshold: f64) -> f64 {
    let (mut n_left, mut sum_left, mut sum_right) = (0usize, 0.0, 0.0);
    for (feat, &label) in features.iter().zip(labels) {
        if feat[feature_idx] <= threshold {
            n_left += 1;
            sum_left += label;
        } else {
            sum_right += label;
        }
    }

    let n = labels.len();
    let n_right = n - n_left;
    if n_left == 0 || n_right == 0 {
        return f64::MAX;
    }

    let gini = |sum: f64, count: usize| {
        let p = sum / count as f64;
        2.0 * p * (1.0 - p)
    };
    (n_left as f64 / n as f64) * gini(sum_left, n_left) + (n_right as f64 / n as f64) * gini(sum_right, n_right)
}

fn predict_tree(node: &TreeNode, features: &[f64]) -> f64 {
    match node {
        TreeNode::Leaf { value } => *value,
        TreeNode::Split { feature_idx, threshold, left, right } => {
            if features[*feature_idx] <= *threshold {
                predict_tree(left, features)
            } else {
                predict_tree(right, features)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{make_random_draws, make_test_draws};

    fn small() -> RandomForestPredictor {
        RandomForestPredictor::new(ForestConfig {
            n_trees: 10,
            max_depth: 3,
            window: 30,
            ..ForestConfig::default()
        })
    }

    #[test]
    fn test_valid_candidate() {
        let p = small().predict(&make_random_draws(60, 13)).unwrap();
        assert!(p.is_valid());
        assert!(p.confidence <= 72.0);
        assert_eq!(p.metadata["n_trees"], 10);
        assert_eq!(p.metadata["red_training_rows"], 30 * 33);
        assert_eq!(p.metadata["blue_training_rows"], 30 * 16);
    }

    #[test]
    fn test_probabilities_in_unit_interval() {
        let forecast = small().forecast(&make_random_draws(40, 2), Pool::Red);
        assert_eq!(forecast.probabilities.len(), 33);
        assert!(forecast.probabilities.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_deterministic() {
        let draws = make_random_draws(50, 8);
        let a = small().predict(&draws).unwrap();
        let b = small().predict(&draws).unwrap();
        assert_eq!(a.reds, b.reds);
        assert_eq!(a.blue, b.blue);
        assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn test_insufficient_data() {
        let err = small().predict(&make_test_draws(14)).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { required: 15, actual: 14, .. }));
    }

    #[test]
    fn test_split_gini_perfect_split() {
        let rows = [vec![0.0], vec![0.0], vec![1.0], vec![1.0]];
        let refs: Vec<&Vec<f64>> = rows.iter().collect();
        let labels = [0.0, 0.0, 1.0, 1.0];
        assert_eq!(split_gini(&refs, &labels, 0, 0.5), 0.0);
        assert!((gini_impurity(&labels) - 0.5).abs() < 1e-12);
    }
}
