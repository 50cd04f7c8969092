use serde::Serialize;
use ssq_db::models::{Algorithm, Draw, Pool, Prediction};

use super::{finalize, to_metadata, Predictor};
use crate::config::FrequencyConfig;
use crate::error::EngineError;
use crate::features::{classify_hot_cold, frequencies, rank_top, HotCold};

pub struct FrequencyPredictor {
    config: FrequencyConfig,
}

#[derive(Debug, Serialize)]
struct FrequencyMetadata {
    red_counts: Vec<u32>,
    blue_counts: Vec<u32>,
    red_hot_cold: HotCold,
    blue_hot_cold: HotCold,
    top_red_frequency: u32,
    top_blue_frequency: u32,
    concentration: f64,
}

impl FrequencyPredictor {
    pub fn new(config: FrequencyConfig) -> Self {
        Self { config }
    }
}

/// Part (en %) des occurrences captée par les numéros retenus.
fn concentration(red_counts: &[u32], reds: &[u8], blue_counts: &[u32], blue: u8) -> f64 {
    let total: u32 = red_counts.iter().sum::<u32>() + blue_counts.iter().sum::<u32>();
    if total == 0 {
        return 0.0;
    }
    let selected: u32 = reds.iter().map(|&r| red_counts[(r - 1) as usize]).sum::<u32>()
        + blue_counts[(blue - 1) as usize];
    selected as f64 / total as f64 * 100.0
}

impl Predictor for FrequencyPredictor {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Frequency
    }

    fn min_draws(&self) -> usize {
        self.config.min_draws
    }

    fn predict(&self, draws: &[Draw]) -> Result<Prediction, EngineError> {
        self.check_window(draws)?;

        let red_counts = frequencies(draws, Pool::Red);
        let blue_counts = frequencies(draws, Pool::Blue);
        let red_scores: Vec<f64> = red_counts.iter().map(|&c| c as f64).collect();
        let blue_scores: Vec<f64> = blue_counts.iter().map(|&c| c as f64).collect();

        let reds = rank_top(&red_scores, Pool::Red.pick_count());
        let blue = rank_top(&blue_scores, 1)[0];

        let concentration = concentration(&red_counts, &reds, &blue_counts, blue);
        let confidence = 50.0 + 0.25 * concentration;

        let meta = FrequencyMetadata {
            top_red_frequency: red_counts[(reds[0] - 1) as usize],
            top_blue_frequency: blue_counts[(blue - 1) as usize],
            red_hot_cold: classify_hot_cold(&red_counts, self.config.hot_percentile, self.config.cold_percentile),
            blue_hot_cold: classify_hot_cold(&blue_counts, self.config.hot_percentile, self.config.cold_percentile),
            red_counts,
            blue_counts,
            concentration,
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
