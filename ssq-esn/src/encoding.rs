use ndarray::Array1;
use ssq_db::models::{Draw, Pool};

use crate::config::Encoding;

/// Encode a draw as an input vector.
/// - OneHot: 49-dim, indices (red-1) and 33+(blue-1) set to 1.0
/// - Normalized: 7-dim, [r1/33, ..., r6/33, b/16] (reds sorted ascending)
pub fn encode_draw(draw: &Draw, encoding: Encoding) -> Array1<f64> {
    let red_size = Pool::Red.size();
    match encoding {
        Encoding::OneHot => {
            let mut v = Array1::zeros(encoding.input_dim());
            for &r in &draw.reds {
                v[(r - 1) as usize] = 1.0;
            }
            v[red_size + (draw.blue - 1) as usize] = 1.0;
            v
        }
        Encoding::Normalized => {
            let mut reds = draw.reds;
            reds.sort_unstable();
            let mut v = Array1::zeros(encoding.input_dim());
            for (i, &r) in reds.iter().enumerate() {
                v[i] = r as f64 / red_size as f64;
            }
            v[reds.len()] = draw.blue as f64 / Pool::Blue.size() as f64;
            v
        }
    }
}

/// Multi-hot target vector of a draw for one pool (33 or 16 dims).
pub fn encode_target_onehot(draw: &Draw, pool: Pool) -> Array1<f64> {
    let mut v = Array1::zeros(pool.size());
    for &n in pool.numbers_from(draw) {
        v[(n - 1) as usize] = 1.0;
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn test_draw() -> Draw {
        Draw {
            period: "2024001".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            reds: [3, 15, 27, 30, 31, 33],
            blue: 9,
            source: String::new(),
        }
    }

    #[test]
    fn test_onehot_sum_and_indices() {
        let v = encode_draw(&test_draw(), Encoding::OneHot);
        assert_eq!(v.len(), 49);
        assert!((v.sum() - 7.0).abs() < 1e-10);
        assert_eq!(v[2], 1.0);
        assert_eq!(v[32], 1.0);
        // bleue 9 -> 33 + 8
        assert_eq!(v[41], 1.0);
        assert_eq!(v[0], 0.0);
    }

    #[test]
    fn test_normalized_values() {
        let v = encode_draw(&test_draw(), Encoding::Normalized);
        assert_eq!(v.len(), 7);
        assert!((v[0] - 3.0 / 33.0).abs() < 1e-10);
        assert!((v[5] - 1.0).abs() < 1e-10);
        assert!((v[6] - 9.0 / 16.0).abs() < 1e-10);
        for i in 0..5 {
            assert!(v[i] <= v[i + 1], "reds not sorted at {i}");
        }
    }

    #[test]
    fn test_target_pools() {
        let draw = test_draw();
        let red = encode_target_onehot(&draw, Pool::Red);
        assert_eq!(red.len(), 33);
        assert!((red.sum() - 6.0).abs() < 1e-10);
        let blue = encode_target_onehot(&draw, Pool::Blue);
        assert_eq!(blue.len(), 16);
        assert_eq!(blue[8], 1.0);
        assert!((blue.sum() - 1.0).abs() < 1e-10);
    }
}
