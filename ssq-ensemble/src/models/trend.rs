use serde::Serialize;
use ssq_db::models::{Algorithm, Draw, Pool, Prediction};

use super::{finalize, to_metadata, Predictor};
use crate::config::TrendConfig;
use crate::error::EngineError;
use crate::features::{current_gap, gap_statistics, moving_average, rank_top, slope};

const SLOPE_WEIGHT: f64 = 0.6;
const OVERDUE_WEIGHT: f64 = 0.4;

pub struct TrendPredictor {
    config: TrendConfig,
}

/// Paramètres de tendance propres à chaque pool.
struct PoolTrend {
    ma_window_cap: usize,
    slope_points: usize,
    min_occurrences: usize,
}

impl PoolTrend {
    fn for_pool(pool: Pool) -> Self {
        match pool {
            Pool::Red => PoolTrend { ma_window_cap: 10, slope_points: 5, min_occurrences: 3 },
            Pool::Blue => PoolTrend { ma_window_cap: 8, slope_points: 3, min_occurrences: 2 },
        }
    }
}

#[derive(Debug, Serialize)]
struct TrendMetadata {
    method: &'static str,
    avg_trend_strength: f64,
    red_scores: Vec<f64>,
    blue_scores: Vec<f64>,
    data_points: usize,
}

impl TrendPredictor {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }
}

/// Pente récente de la moyenne mobile de la série d'apparitions (chronologique).
fn number_slope(number: u8, chrono: &[&Draw], pool: Pool, params: &PoolTrend) -> f64 {
    let series: Vec<f64> = chrono
        .iter()
        .map(|d| if pool.numbers_from(d).contains(&number) { 1.0 } else { 0.0 })
        .collect();
    let occurrences = series.iter().filter(|&&v| v > 0.0).count();
    if occurrences < params.min_occurrences {
        return 0.0;
    }
    let window = params.ma_window_cap.min(series.len() / 3);
    let averaged = moving_average(&series, window);
    let tail = averaged.len().saturating_sub(params.slope_points);
    slope(&averaged[tail..])
}

/// Scores de tendance par numéro : pente normalisée + signal de retard.
/// Retourne aussi les pentes brutes.
fn trend_scores(draws: &[Draw], pool: Pool) -> (Vec<f64>, Vec<f64>) {
    let params = PoolTrend::for_pool(pool);
    let chrono: Vec<&Draw> = draws.iter().rev().collect();

    let slopes: Vec<f64> = (1..=pool.size() as u8)
        .map(|n| number_slope(n, &chrono, pool, &params))
        .collect();
    let max_abs = slopes.iter().map(|s| s.abs()).fold(0.0, f64::max);

    let scores = (1..=pool.size() as u8)
        .zip(&slopes)
        .map(|(n, &s)| {
            let gap = current_gap(n, draws, pool) as f64;
            let (mean_gap, _) = gap_statistics(n, draws, pool);
            let overdue = ((gap + 1.0) / mean_gap - 1.0).clamp(0.0, 1.0);
            let trend = if max_abs > 0.0 { s / max_abs } else { 0.0 };
            SLOPE_WEIGHT * trend + OVERDUE_WEIGHT * overdue
        })
        .collect();
    (scores, slopes)
}

impl Predictor for TrendPredictor {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Trend
    }

    fn min_draws(&self) -> usize {
        self.config.min_draws
    }

    fn predict(&self, draws: &[Draw]) -> Result<Prediction, EngineError> {
        self.check_window(draws)?;

        let (red_scores, red_slopes) = trend_scores(draws, Pool::Red);
        let (blue_scores, _) = trend_scores(draws, Pool::Blue);

        let reds = rank_top(&red_scores, Pool::Red.pick_count());
        let blue = rank_top(&blue_scores, 1)[0];

        let mean_top = reds.iter().map(|&r| red_scores[(r - 1) as usize]).sum::<f64>() / reds.len() as f64;
        let confidence = 50.0 + 20.0 * mean_top;

        let meta = TrendMetadata {
            method: "moving_average_gap",
            avg_trend_strength: red_slopes.iter().map(|s| s.abs()).sum::<f64>() / red_slopes.len() as f64,
            red_scores,
            blue_scores,
            data_points: draws.len(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{make_random_draws, make_test_draws};

    fn predictor() -> TrendPredictor {
        TrendPredictor::new(TrendConfig::default())
    }

    #[test]
    fn test_valid_candidate() {
        let p = predictor().predict(&make_random_draws(120, 9)).unwrap();
        assert!(p.is_valid());
        assert!(p.confidence <= 70.0);
        assert_eq!(p.metadata["method"], "moving_average_gap");
        assert_eq!(p.metadata["data_points"], 120);
        assert_eq!(p.metadata["red_scores"].as_array().unwrap().len(), 33);
    }

    #[test]
    fn test_rising_number_favoured() {
        // la rouge 33 n'apparaît que sur les 8 derniers tirages
        let mut draws = make_random_draws(60, 21);
        for d in draws.iter_mut() {
            if let Some(pos) = d.reds.iter().position(|&r| r == 33) {
                d.reds[pos] = if d.reds.contains(&32) { 31 } else { 32 };
                if d.reds.iter().filter(|&&r| r == d.reds[pos]).count() > 1 {
                    d.reds[pos] = (1..=30).find(|n| !d.reds.contains(n)).unwrap();
                }
                d.reds.sort_unstable();
            }
        }
        for d in draws.iter_mut().take(8) {
            if !d.reds.contains(&33) {
                d.reds[0] = 33;
                d.reds.sort_unstable();
            }
        }
        assert!(draws.iter().all(|d| ssq_db::models::validate_draw(&d.reds, d.blue).is_ok()));
        let (scores, slopes) = trend_scores(&draws, Pool::Red);
        assert!(slopes[32] > 0.0);
        assert!((slopes[32] - slopes.iter().cloned().fold(f64::MIN, f64::max)).abs() < 1e-12);
        assert!(scores[32] >= 0.6 - 1e-9);
    }

    #[test]
    fn test_rare_numbers_have_flat_slope() {
        let draws = make_test_draws(40);
        let (_, slopes) = trend_scores(&draws, Pool::Red);
        // 31..33 ne sortent jamais
        assert_eq!(slopes[30], 0.0);
        assert_eq!(slopes[32], 0.0);
    }

    #[test]
    fn test_deterministic() {
        let draws = make_random_draws(80, 4);
        let a = predictor().predict(&draws).unwrap();
        let b = predictor().predict(&draws).unwrap();
        assert_eq!((a.reds, a.blue, a.confidence), (b.reds, b.blue, b.confidence));
    }

    #[test]
    fn test_insufficient_data() {
        let err = predictor().predict(&make_test_draws(29)).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { required: 30, actual: 29, .. }));
    }
}
