use serde::Serialize;
use ssq_db::models::{Algorithm, Draw, Pool, Prediction};
use ssq_esn::training::{predict_next, train};

use super::{finalize, to_metadata, Predictor};
use crate::config::SequenceConfig;
use crate::error::EngineError;
use crate::features::rank_top;

/// Modèle séquentiel : réseau à réservoir (ESN) entraîné sur la fenêtre à chaque appel.
pub struct SequencePredictor {
    config: SequenceConfig,
}

#[derive(Debug, Serialize)]
struct SequenceMetadata {
    model: &'static str,
    reservoir_size: usize,
    washout: usize,
    training_pairs: usize,
    red_probabilities: Vec<f64>,
    blue_probabilities: Vec<f64>,
    peak_red_probability: f64,
    selected_red_mass: f64,
}

impl SequencePredictor {
    pub fn new(config: SequenceConfig) -> Self {
        Self { config }
    }
}

impl Predictor for SequencePredictor {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Lstm
    }

    fn min_draws(&self) -> usize {
        self.config.min_draws
    }

    fn predict(&self, draws: &[Draw]) -> Result<Prediction, EngineError> {
        self.check_window(draws)?;

        let failure = |e: anyhow::Error| EngineError::PredictorFailure {
            algorithm: Algorithm::Lstm,
            reason: format!("{e:#}"),
        };
        let mut esn = train(draws, &self.config.esn).map_err(failure)?;
        let (red_probs, blue_probs) = predict_next(&mut esn, draws).map_err(failure)?;

        let reds = rank_top(&red_probs, Pool::Red.pick_count());
        let blue = rank_top(&blue_probs, 1)[0];

        let mass: f64 = reds.iter().map(|&r| red_probs[(r - 1) as usize]).sum();
        // confiance = masse des 6 rouges retenues, pas le pic
        let confidence = mass * 100.0;

        let meta = SequenceMetadata {
            model: "echo_state_network",
            reservoir_size: self.config.esn.reservoir_size,
            washout: self.config.esn.washout,
            training_pairs: esn.training_pairs,
            peak_red_probability: reds
                .iter()
                .map(|&r| red_probs[(r - 1) as usize])
                .fold(0.0, f64::max),
            selected_red_mass: mass,
            red_probabilities: red_probs,
            blue_probabilities: blue_probs,
        };

        finalize(
            self.algorithm(),
            &reds,
            blue,
            confidence,
            self.config.max_confidence,
            draws.len(),
            to_metadata(self.algorithm(), &meta)?,
        )
    }
}
