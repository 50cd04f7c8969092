pub mod frequency;
pub mod random_forest;
pub mod sequence;
pub mod trend;

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngExt, SeedableRng};
use serde::Serialize;
use ssq_db::models::{Algorithm, Draw, Prediction, RED_COUNT, RED_MAX};

use crate::config::EngineConfig;
use crate::error::EngineError;

/// Contrat commun des prédicteurs. draws[0] = tirage le plus récent ; la
/// fenêtre entière est utilisée, jamais tronquée ni complétée.
pub trait Predictor: Send + Sync {
    fn algorithm(&self) -> Algorithm;
    fn min_draws(&self) -> usize;
    fn predict(&self, draws: &[Draw]) -> Result<Prediction, EngineError>;

    fn check_window(&self, draws: &[Draw]) -> Result<(), EngineError> {
        if draws.len() < self.min_draws() {
            return Err(EngineError::InsufficientData {
                algorithm: self.algorithm(),
                required: self.min_draws(),
                actual: draws.len(),
            });
        }
        Ok(())
    }
}

/// Trie les rouges, borne la confiance dans [0, max_confidence] et vérifie
/// les invariants du candidat.
pub fn finalize(
    algorithm: Algorithm,
    reds: &[u8],
    blue: u8,
    confidence: f64,
    max_confidence: f64,
    dataset_size: usize,
    metadata: serde_json::Value,
) -> Result<Prediction, EngineError> {
    let picked: [u8; RED_COUNT] = reds.try_into().map_err(|_| EngineError::PredictorFailure {
        algorithm,
        reason: format!("{} rouges sélectionnées au lieu de {RED_COUNT}", reds.len()),
    })?;
    let mut sorted = picked;
    sorted.sort_unstable();

    let confidence = if confidence.is_finite() {
        confidence.clamp(0.0, max_confidence.min(100.0))
    } else {
        0.0
    };

    let prediction = Prediction {
        reds: sorted,
        blue,
        confidence,
        algorithm,
        dataset_size,
        generated_at: Utc::now(),
        metadata,
    };
    if !prediction.is_valid() {
        return Err(EngineError::PredictorFailure {
            algorithm,
            reason: format!("candidat invalide : {:?} + {}", prediction.reds, prediction.blue),
        });
    }
    Ok(prediction)
}

pub(crate) fn to_metadata<T: Serialize>(algorithm: Algorithm, meta: &T) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(meta).map_err(|e| EngineError::PredictorFailure {
        algorithm,
        reason: format!("sérialisation des métadonnées : {e}"),
    })
}

pub fn predictor_for(algorithm: Algorithm, config: &EngineConfig) -> Option<Arc<dyn Predictor>> {
    match algorithm {
        Algorithm::Frequency => Some(Arc::new(frequency::FrequencyPredictor::new(config.frequency.clone()))),
        Algorithm::Trend => Some(Arc::new(trend::TrendPredictor::new(config.trend.clone()))),
        Algorithm::RandomForest => Some(Arc::new(random_forest::RandomForestPredictor::new(config.forest.clone()))),
        Algorithm::Lstm => Some(Arc::new(sequence::SequencePredictor::new(config.sequence.clone()))),
        Algorithm::Ensemble => None,
    }
}

/// Prédicteurs membres de l'ensemble, dans l'ordre de la configuration.
pub fn all_predictors(config: &EngineConfig) -> Vec<Arc<dyn Predictor>> {
    config
        .ensemble
        .members
        .iter()
        .filter_map(|&a| predictor_for(a, config))
        .collect()
}

/// Jeu de test cyclique : le tirage i porte les rouges (i%5)*6+1 ..= (i%5)*6+6
/// et la bleue i%16+1. Le tirage 0 est le plus récent.
pub fn make_test_draws(n: usize) -> Vec<Draw> {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default();
    (0..n)
        .map(|i| {
            let base = (i % 5) as u8;
            let mut reds = [0u8; RED_COUNT];
            for (k, r) in reds.iter_mut().enumerate() {
                *r = base * 6 + k as u8 + 1;
            }
            Draw {
                period: format!("{}", 2020000 + n - i),
                date: start + Duration::days(((n - i) * 2) as i64),
                reds,
                blue: (i % 16) as u8 + 1,
                source: "test".to_string(),
            }
        })
        .collect()
}

/// 6 rouges distinctes tirées uniformément, triées.
pub fn random_reds(rng: &mut impl Rng) -> [u8; RED_COUNT] {
    let mut numbers: Vec<u8> = (1..=RED_MAX).collect();
    numbers.shuffle(rng);
    let mut reds = [0u8; RED_COUNT];
    reds.copy_from_slice(&numbers[..RED_COUNT]);
    reds.sort_unstable();
    reds
}

/// Tirages pseudo-aléatoires reproductibles.
pub fn make_random_draws(n: usize, seed: u64) -> Vec<Draw> {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default();
    (0..n)
        .map(|i| {
            let reds = random_reds(&mut rng);
            Draw {
                period: format!("{}", 2020000 + n - i),
                date: start + Duration::days(((n - i) * 2) as i64),
                reds,
                blue: rng.random_range(1..=16u8),
                source: "test".to_string(),
            }
        })
        .collect()
}
