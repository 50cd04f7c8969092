pub mod compute;

use serde::Serialize;
use ssq_db::models::{Draw, Pool};

pub use compute::{extract_features_for_target, features_for_next};

pub const FEATURE_NAMES: &[&str] = &[
    "lag_1", "lag_2", "lag_3",
    "freq_5", "freq_10", "freq_20",
    "gap", "gap_norm", "std_gap",
    "trend",
    "position",
    "number_norm",
];

#[derive(Debug, Clone)]
pub struct FeatureRow {
    pub number: u8,
    pub features: Vec<f64>,
    pub label: f64,
}

/// Classement chaud / froid / neutre par percentiles des effectifs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HotCold {
    pub hot: Vec<u8>,
    pub cold: Vec<u8>,
    pub neutral: Vec<u8>,
}

/// Effectifs par numéro (index = numéro - 1).
pub fn frequencies(draws: &[Draw], pool: Pool) -> Vec<u32> {
    let mut counts = vec![0u32; pool.size()];
    for draw in draws {
        for &n in pool.numbers_from(draw) {
            counts[(n - 1) as usize] += 1;
        }
    }
    counts
}

/// Percentile avec interpolation linéaire entre rangs.
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

pub fn classify_hot_cold(counts: &[u32], hot_pct: f64, cold_pct: f64) -> HotCold {
    let values: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
    let hot_cut = percentile(&values, hot_pct);
    let cold_cut = percentile(&values, cold_pct);

    let mut out = HotCold::default();
    for (i, &v) in values.iter().enumerate() {
        let number = (i + 1) as u8;
        if v >= hot_cut {
            out.hot.push(number);
        } else if v <= cold_cut {
            out.cold.push(number);
        } else {
            out.neutral.push(number);
        }
    }
    out
}

/// Moyenne mobile arrière ; les premiers points moyennent le préfixe disponible.
pub fn moving_average(series: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 || series.len() < window {
        return series.to_vec();
    }
    let mut out = Vec::with_capacity(series.len());
    let mut sum = 0.0;
    for i in 0..series.len() {
        sum += series[i];
        if i >= window {
            sum -= series[i - window];
        }
        out.push(sum / (i + 1).min(window) as f64);
    }
    out
}

/// Pente des moindres carrés de `values` contre 0..n.
pub fn slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let nf = n as f64;
    let mean_x = (nf - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / nf;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    if den > 0.0 { num / den } else { 0.0 }
}

/// Nombre de tirages depuis la dernière sortie (longueur de la fenêtre si jamais sorti).
pub fn current_gap(number: u8, draws: &[Draw], pool: Pool) -> usize {
    draws
        .iter()
        .position(|d| pool.numbers_from(d).contains(&number))
        .unwrap_or(draws.len())
}

/// Moyenne et écart-type des intervalles de réapparition.
pub fn gap_statistics(number: u8, draws: &[Draw], pool: Pool) -> (f64, f64) {
    let mut gaps = Vec::new();
    let mut last_seen: Option<usize> = None;

    for (i, draw) in draws.iter().enumerate() {
        if pool.numbers_from(draw).contains(&number) {
            if let Some(prev) = last_seen {
                gaps.push((i - prev) as f64);
            }
            last_seen = Some(i);
        }
    }

    if gaps.is_empty() {
        return (pool.size() as f64 / pool.pick_count() as f64, 0.0);
    }

    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    let variance = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64;
    (mean, variance.sqrt())
}

/// Effectifs pondérés par la récence : poids alpha^t, t = 0 pour le plus récent.
pub fn ewma_scores(draws: &[Draw], pool: Pool, alpha: f64) -> Vec<f64> {
    let mut scores = vec![0.0f64; pool.size()];
    let mut weight = 1.0;
    for draw in draws {
        for &n in pool.numbers_from(draw) {
            scores[(n - 1) as usize] += weight;
        }
        weight *= alpha;
    }
    scores
}

/// Ramène à [0,1] ; un vecteur plat donne 1/n partout.
pub fn normalize_min_max(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range < 1e-12 {
        return vec![1.0 / values.len() as f64; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}

/// Les `k` numéros (1-based) de plus haut score, égalités départagées par numéro croissant.
pub fn rank_top(scores: &[f64], k: usize) -> Vec<u8> {
    let mut idx: Vec<usize> = (0..scores.len()).collect();
    idx.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    idx.into_iter().take(k).map(|i| (i + 1) as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::make_test_draws;

    #[test]
    fn test_frequencies_totals() {
        let draws = make_test_draws(20);
        let red = frequencies(&draws, Pool::Red);
        let blue = frequencies(&draws, Pool::Blue);
        assert_eq!(red.len(), 33);
        assert_eq!(red.iter().sum::<u32>(), 120);
        assert_eq!(blue.iter().sum::<u32>(), 20);
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((percentile(&values, 50.0) - 3.0).abs() < 1e-12);
        assert!((percentile(&values, 70.0) - 3.8).abs() < 1e-12);
        assert!((percentile(&values, 0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_hot_cold_partition() {
        let counts: Vec<u32> = (0..10).collect();
        let hc = classify_hot_cold(&counts, 70.0, 30.0);
        assert_eq!(hc.hot.len() + hc.cold.len() + hc.neutral.len(), 10);
        assert!(hc.hot.contains(&10));
        assert!(hc.cold.contains(&1));
    }

    #[test]
    fn test_moving_average() {
        let ma = moving_average(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(ma, vec![1.0, 1.5, 2.5, 3.5]);
        assert_eq!(moving_average(&[1.0, 2.0], 5), vec![1.0, 2.0]);
    }

    #[test]
    fn test_slope() {
        assert!((slope(&[1.0, 3.0, 5.0, 7.0]) - 2.0).abs() < 1e-12);
        assert!(slope(&[4.0, 4.0, 4.0]).abs() < 1e-12);
        assert_eq!(slope(&[1.0]), 0.0);
    }

    #[test]
    fn test_gap_never_seen_and_defaults() {
        let draws = make_test_draws(10);
        // 33 n'apparaît jamais dans le jeu de test
        assert_eq!(current_gap(33, &draws, Pool::Red), 10);
        let (mean, std) = gap_statistics(33, &draws, Pool::Red);
        assert!((mean - 5.5).abs() < 1e-12);
        assert_eq!(std, 0.0);
    }

    #[test]
    fn test_gap_statistics_regular() {
        // rouge 1 sort tous les 5 tirages
        let draws = make_test_draws(20);
        assert_eq!(current_gap(1, &draws, Pool::Red), 0);
        let (mean, std) = gap_statistics(1, &draws, Pool::Red);
        assert!((mean - 5.0).abs() < 1e-12);
        assert!(std.abs() < 1e-12);
    }

    #[test]
    fn test_ewma_recency() {
        let draws = make_test_draws(5);
        let scores = ewma_scores(&draws, Pool::Red, 0.5);
        // rouge 1 au tirage 0 uniquement, rouge 7 au tirage 1 uniquement
        assert!((scores[0] - 1.0).abs() < 1e-12);
        assert!((scores[6] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_min_max() {
        assert_eq!(normalize_min_max(&[2.0, 4.0, 6.0]), vec![0.0, 0.5, 1.0]);
        assert_eq!(normalize_min_max(&[3.0; 4]), vec![0.25; 4]);
        assert!(normalize_min_max(&[]).is_empty());
    }

    #[test]
    fn test_rank_top_ties_ascending() {
        let scores = [0.5, 0.9, 0.5, 0.9, 0.1];
        assert_eq!(rank_top(&scores, 3), vec![2, 4, 1]);
    }
}
