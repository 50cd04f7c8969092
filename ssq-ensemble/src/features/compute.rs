use ssq_db::models::{Draw, Pool};

use super::{current_gap, gap_statistics, FeatureRow};

/// Features de chaque numéro pour le tirage `target_idx`, calculées sur
/// l'historique strictement plus ancien (draws[0] = le plus récent).
/// Le label vaut 1.0 si le numéro figure dans le tirage cible.
pub fn extract_features_for_target(draws: &[Draw], pool: Pool, target_idx: usize) -> Vec<FeatureRow> {
    let Some(target) = draws.get(target_idx) else {
        return Vec::new();
    };
    let target_numbers = pool.numbers_from(target);
    let history = &draws[target_idx + 1..];
    let position = history.len() as f64 / draws.len() as f64;

    (1..=pool.size() as u8)
        .map(|number| FeatureRow {
            number,
            features: compute_features_for_number(number, history, pool, position),
            label: if target_numbers.contains(&number) { 1.0 } else { 0.0 },
        })
        .collect()
}

/// Features du prochain tirage (inconnu) : toute la fenêtre sert d'historique.
pub fn features_for_next(draws: &[Draw], pool: Pool) -> Vec<FeatureRow> {
    (1..=pool.size() as u8)
        .map(|number| FeatureRow {
            number,
            features: compute_features_for_number(number, draws, pool, 1.0),
            label: 0.0,
        })
        .collect()
}

fn compute_features_for_number(number: u8, history: &[Draw], pool: Pool, position: f64) -> Vec<f64> {
    let lag = |k: usize| -> f64 {
        match history.get(k) {
            Some(d) if pool.numbers_from(d).contains(&number) => 1.0,
            _ => 0.0,
        }
    };

    let freq_5 = frequency_in_window(number, history, pool, 5);
    let freq_10 = frequency_in_window(number, history, pool, 10);
    let freq_20 = frequency_in_window(number, history, pool, 20);

    let gap = current_gap(number, history, pool) as f64;
    let (mean_gap, std_gap) = gap_statistics(number, history, pool);
    let gap_norm = if mean_gap > 0.0 { gap / mean_gap } else { 1.0 };

    // momentum court terme vs long terme
    let trend = freq_5 - freq_20;

    let number_norm = number as f64 / pool.size() as f64;

    vec![
        lag(0),      // 0
        lag(1),      // 1
        lag(2),      // 2
        freq_5,      // 3
        freq_10,     // 4
        freq_20,     // 5
        gap,         // 6
        gap_norm,    // 7
        std_gap,     // 8
        trend,       // 9
        position,    // 10
        number_norm, // 11
    ]
}

fn frequency_in_window(number: u8, history: &[Draw], pool: Pool, window: usize) -> f64 {
    let w = window.min(history.len());
    if w == 0 {
        return 0.0;
    }
    let count = history[..w]
        .iter()
        .filter(|d| pool.numbers_from(d).contains(&number))
        .count();
    count as f64 / w as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_NAMES;
    use crate::models::make_test_draws;

    #[test]
    fn test_feature_count() {
        let draws = make_test_draws(30);
        let rows = extract_features_for_target(&draws, Pool::Red, 0);
        assert_eq!(rows.len(), 33);
        assert_eq!(rows[0].features.len(), FEATURE_NAMES.len());
    }

    #[test]
    fn test_feature_labels_sum() {
        let draws = make_test_draws(30);
        let red: f64 = extract_features_for_target(&draws, Pool::Red, 3).iter().map(|r| r.label).sum();
        let blue: f64 = extract_features_for_target(&draws, Pool::Blue, 3).iter().map(|r| r.label).sum();
        assert_eq!(red, 6.0);
        assert_eq!(blue, 1.0);
    }

    #[test]
    fn test_target_history_excludes_target() {
        let draws = make_test_draws(30);
        // tirage 0 = rouges 1..6 ; l'historique commence au tirage 1 (7..12)
        let rows = extract_features_for_target(&draws, Pool::Red, 0);
        assert_eq!(rows[0].features[0], 0.0);
        assert_eq!(rows[6].features[0], 1.0);
        assert_eq!(rows[0].label, 1.0);
    }

    #[test]
    fn test_features_for_next_uses_latest_draw() {
        let draws = make_test_draws(30);
        let rows = features_for_next(&draws, Pool::Red);
        // la rouge 1 est sortie au dernier tirage : lag_1 = 1, gap = 0
        assert_eq!(rows[0].features[0], 1.0);
        assert_eq!(rows[0].features[6], 0.0);
        assert_eq!(rows[0].features[10], 1.0);
        assert!(rows.iter().all(|r| r.label == 0.0));
    }

    #[test]
    fn test_features_no_nan() {
        let draws = make_test_draws(30);
        for idx in [0, 5, 29] {
            for row in extract_features_for_target(&draws, Pool::Red, idx) {
                assert!(row.features.iter().all(|f| f.is_finite()), "non-finite for {}", row.number);
            }
        }
        assert!(extract_features_for_target(&draws, Pool::Red, 30).is_empty());
    }
}
