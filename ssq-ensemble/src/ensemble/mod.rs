use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::RngExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use ssq_db::models::{Algorithm, Draw, Pool, Prediction, BLUE_MAX};

use crate::config::{EngineConfig, EnsembleConfig, ScoreWeights};
use crate::error::EngineError;
use crate::evaluation::AlgorithmStats;
use crate::features::{
    current_gap, ewma_scores, frequencies, gap_statistics, normalize_min_max, rank_top,
};
use crate::models::{all_predictors, finalize, random_reds, Predictor};

/// Combine les prédicteurs membres en une recommandation unique.
pub struct EnsembleCombiner {
    predictors: Vec<Arc<dyn Predictor>>,
    weights: BTreeMap<Algorithm, f64>,
    config: EnsembleConfig,
    predictor_timeout: Duration,
    fallback_confidence: f64,
}

/// Candidat d'un sous-prédicteur tel qu'exposé dans les métadonnées.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubPrediction {
    pub algorithm: Algorithm,
    pub reds: [u8; 6],
    pub blue: u8,
    pub confidence: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exclusion {
    pub algorithm: Algorithm,
    pub reason: String,
}

/// Décomposition du score composite d'un numéro.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub number: u8,
    pub frequency: f64,
    pub momentum: f64,
    pub gap: f64,
    pub votes: f64,
    pub total: f64,
}

#[derive(Debug, Serialize)]
struct EnsembleMetadata {
    fallback: bool,
    sub_predictions: Vec<SubPrediction>,
    excluded: Vec<Exclusion>,
    effective_weights: BTreeMap<Algorithm, f64>,
    score_weights: ScoreWeights,
    red_scores: Vec<ScoreBreakdown>,
    blue_scores: Vec<ScoreBreakdown>,
    margin: f64,
    agreement: f64,
}

#[derive(Debug, Serialize)]
struct FallbackMetadata {
    fallback: bool,
    reason: &'static str,
    excluded: Vec<Exclusion>,
}

/// Résultat de la jointure des sous-prédicteurs.
struct Joined {
    successes: Vec<Prediction>,
    excluded: Vec<Exclusion>,
}

impl EnsembleCombiner {
    pub fn new(predictors: Vec<Arc<dyn Predictor>>, config: &EngineConfig) -> Self {
        Self {
            predictors,
            weights: config.ensemble.weights.clone(),
            config: config.ensemble.clone(),
            predictor_timeout: Duration::from_millis(config.predictor_timeout_ms),
            fallback_confidence: config.fallback_confidence,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(all_predictors(config), config)
    }

    pub fn with_weights(mut self, weights: BTreeMap<Algorithm, f64>) -> Self {
        self.weights = weights;
        self
    }

    pub fn weights(&self) -> &BTreeMap<Algorithm, f64> {
        &self.weights
    }

    pub fn predict(&self, draws: &[Draw]) -> Result<Prediction, EngineError> {
        let start = Instant::now();
        let joined = self.run_members(Arc::from(draws));
        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = joined.successes.len(),
            excluded = joined.excluded.len(),
            "sous-prédicteurs terminés"
        );

        if joined.successes.is_empty() {
            warn!(excluded = joined.excluded.len(), "aucun sous-prédicteur disponible, candidat aléatoire");
            return self.fallback(draws.len(), "aucun sous-prédicteur n'a abouti", joined.excluded);
        }
        self.combine(draws, joined)
    }

    /// Lance chaque membre dans une tâche rayon et attend tous les résultats
    /// jusqu'à l'échéance. Les échecs deviennent des exclusions.
    fn run_members(&self, window: Arc<[Draw]>) -> Joined {
        let (tx, rx) = mpsc::channel();
        for (idx, predictor) in self.predictors.iter().enumerate() {
            let tx = tx.clone();
            let predictor = Arc::clone(predictor);
            let window = Arc::clone(&window);
            rayon::spawn(move || {
                let algorithm = predictor.algorithm();
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| predictor.predict(&window)))
                    .unwrap_or_else(|_| {
                        Err(EngineError::PredictorFailure {
                            algorithm,
                            reason: "panique pendant la prédiction".to_string(),
                        })
                    });
                // le récepteur a pu abandonner après l'échéance
                let _ = tx.send((idx, outcome));
            });
        }
        drop(tx);

        let deadline = Instant::now() + self.predictor_timeout;
        let mut outcomes: Vec<Option<Result<Prediction, EngineError>>> = vec![None; self.predictors.len()];
        let mut received = 0;
        while received < self.predictors.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((idx, outcome)) => {
                    outcomes[idx] = Some(outcome);
                    received += 1;
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let mut joined = Joined { successes: Vec::new(), excluded: Vec::new() };
        for (predictor, outcome) in self.predictors.iter().zip(outcomes) {
            let algorithm = predictor.algorithm();
            match outcome {
                Some(Ok(prediction)) => joined.successes.push(prediction),
                Some(Err(e)) => {
                    warn!(%algorithm, error = %e, "sous-prédicteur exclu");
                    joined.excluded.push(Exclusion { algorithm, reason: e.to_string() });
                }
                None => {
                    warn!(%algorithm, timeout_ms = self.predictor_timeout.as_millis() as u64, "sous-prédicteur hors délai");
                    joined.excluded.push(Exclusion {
                        algorithm,
                        reason: format!("délai dépassé ({} ms)", self.predictor_timeout.as_millis()),
                    });
                }
            }
        }
        joined
    }

    fn combine(&self, draws: &[Draw], joined: Joined) -> Result<Prediction, EngineError> {
        let succeeded: Vec<Algorithm> = joined.successes.iter().map(|p| p.algorithm).collect();
        let effective = effective_weights(&self.weights, &succeeded);
        let weight_of = |a: Algorithm| effective.get(&a).copied().unwrap_or(0.0);

        let sw = self.config.score_weights;
        let red_scores = composite_scores(draws, Pool::Red, &joined.successes, &weight_of, sw, self.config.ewma_alpha);
        let blue_scores = composite_scores(draws, Pool::Blue, &joined.successes, &weight_of, sw, self.config.ewma_alpha);

        let red_totals: Vec<f64> = red_scores.iter().map(|s| s.total).collect();
        let blue_totals: Vec<f64> = blue_scores.iter().map(|s| s.total).collect();
        let reds = rank_top(&red_totals, Pool::Red.pick_count());
        let blue = rank_top(&blue_totals, 1)[0];

        let margin = score_margin(&red_totals);
        let agreement = joined
            .successes
            .iter()
            .map(|p| p.reds.iter().filter(|r| reds.contains(r)).count() as f64 / reds.len() as f64)
            .sum::<f64>()
            / joined.successes.len() as f64;
        let data_factor = (draws.len() as f64 / 400.0).min(1.0);
        let confidence = (45.0 + 15.0 * (10.0 * margin).min(1.0) + 20.0 * agreement + 8.0 * data_factor)
            .clamp(self.config.min_confidence, self.config.max_confidence);

        info!(
            reds = ?reds,
            blue,
            confidence,
            members = succeeded.len(),
            excluded = joined.excluded.len(),
            "prédiction ensembliste"
        );

        let meta = EnsembleMetadata {
            fallback: false,
            sub_predictions: joined
                .successes
                .iter()
                .map(|p| SubPrediction {
                    algorithm: p.algorithm,
                    reds: p.reds,
                    blue: p.blue,
                    confidence: p.confidence,
                    weight: weight_of(p.algorithm),
                })
                .collect(),
            excluded: joined.excluded,
            effective_weights: effective,
            score_weights: sw,
            red_scores,
            blue_scores,
            margin,
            agreement,
        };

        finalize(
            Algorithm::Ensemble,
            &reds,
            blue,
            confidence,
            self.config.max_confidence,
            draws.len(),
            metadata_value(&meta)?,
        )
    }

    /// Candidat uniformément aléatoire, confiance fixée et signalé comme repli.
    pub fn fallback(
        &self,
        dataset_size: usize,
        reason: &'static str,
        excluded: Vec<Exclusion>,
    ) -> Result<Prediction, EngineError> {
        let mut rng = rand::rng();
        let reds = random_reds(&mut rng);
        let blue = rng.random_range(1..=BLUE_MAX);
        let meta = FallbackMetadata {
            fallback: true,
            reason,
            excluded,
        };
        finalize(
            Algorithm::Ensemble,
            &reds,
            blue,
            self.fallback_confidence,
            self.config.max_confidence,
            dataset_size,
            metadata_value(&meta)?,
        )
    }
}

fn metadata_value<T: Serialize>(meta: &T) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(meta).map_err(|e| EngineError::PredictorFailure {
        algorithm: Algorithm::Ensemble,
        reason: format!("sérialisation des métadonnées : {e}"),
    })
}

/// Poids configurés restreints aux prédicteurs ayant abouti, renormalisés à 1.
/// Poids uniformes si leur somme est nulle.
pub fn effective_weights(base: &BTreeMap<Algorithm, f64>, succeeded: &[Algorithm]) -> BTreeMap<Algorithm, f64> {
    let mut out: BTreeMap<Algorithm, f64> = succeeded
        .iter()
        .map(|&a| (a, base.get(&a).copied().unwrap_or(0.0).max(0.0)))
        .collect();
    let total: f64 = out.values().sum();
    if total > 0.0 {
        out.values_mut().for_each(|w| *w /= total);
    } else if !out.is_empty() {
        let uniform = 1.0 / out.len() as f64;
        out.values_mut().for_each(|w| *w = uniform);
    }
    out
}

/// Poids ajustés par la performance : w · (1 + moyenne des rouges trouvées), renormalisés.
pub fn adjust_weights(base: &BTreeMap<Algorithm, f64>, stats: &[AlgorithmStats]) -> BTreeMap<Algorithm, f64> {
    let mut out: BTreeMap<Algorithm, f64> = base
        .iter()
        .map(|(&a, &w)| {
            let boost = stats
                .iter()
                .find(|s| s.algorithm == a && s.evaluated > 0)
                .map_or(1.0, |s| 1.0 + s.avg_red_hits);
            (a, w * boost)
        })
        .collect();
    let total: f64 = out.values().sum();
    if total > 0.0 {
        out.values_mut().for_each(|w| *w /= total);
    }
    out
}

fn composite_scores(
    draws: &[Draw],
    pool: Pool,
    successes: &[Prediction],
    weight_of: &impl Fn(Algorithm) -> f64,
    sw: ScoreWeights,
    alpha: f64,
) -> Vec<ScoreBreakdown> {
    let counts: Vec<f64> = frequencies(draws, pool).iter().map(|&c| c as f64).collect();
    let frequency = normalize_min_max(&counts);
    let momentum = normalize_min_max(&ewma_scores(draws, pool, alpha));
    let overdue: Vec<f64> = (1..=pool.size() as u8)
        .map(|n| {
            let gap = current_gap(n, draws, pool) as f64;
            let (mean_gap, _) = gap_statistics(n, draws, pool);
            (gap + 1.0) / mean_gap
        })
        .collect();
    let gap = normalize_min_max(&overdue);

    (0..pool.size())
        .map(|i| {
            let number = (i + 1) as u8;
            let votes: f64 = successes
                .iter()
                .filter(|p| match pool {
                    Pool::Red => p.reds.contains(&number),
                    Pool::Blue => p.blue == number,
                })
                .map(|p| weight_of(p.algorithm))
                .sum();
            let total = sw.frequency * frequency[i] + sw.momentum * momentum[i] + sw.gap * gap[i] + sw.votes * votes;
            ScoreBreakdown {
                number,
                frequency: frequency[i],
                momentum: momentum[i],
                gap: gap[i],
                votes,
                total,
            }
        })
        .collect()
}

/// (s6 − s7) / s1 sur les scores triés par ordre décroissant.
fn score_margin(totals: &[f64]) -> f64 {
    let mut sorted = totals.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    match (sorted.first(), sorted.get(5), sorted.get(6)) {
        (Some(&s1), Some(&s6), Some(&s7)) if s1 > 0.0 => ((s6 - s7) / s1).max(0.0),
        _ => 0.0,
    }
}
