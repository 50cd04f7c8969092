use anyhow::{bail, Result};
use ndarray::{s, Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use ssq_db::models::{Draw, Pool};

use crate::config::EsnConfig;
use crate::encoding::{encode_draw, encode_target_onehot};
use crate::linalg::ridge_regression;
use crate::reservoir::Reservoir;

pub struct TrainedEsn {
    pub config: EsnConfig,
    pub reservoir: Reservoir,
    pub w_out_red: Array2<f64>,
    pub w_out_blue: Array2<f64>,
    pub training_pairs: usize,
}

/// Softmax with numerical stability (subtract max).
pub fn softmax(logits: &Array1<f64>) -> Vec<f64> {
    let mut out = vec![0.0; logits.len()];
    softmax_into(logits, &mut out);
    out
}

/// Softmax in-place into a pre-allocated buffer.
pub fn softmax_into(logits: &Array1<f64>, out: &mut [f64]) {
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for (o, &x) in out.iter_mut().zip(logits.iter()) {
        *o = (x - max).exp();
        sum += *o;
    }
    if sum < 1e-30 || !sum.is_finite() {
        let uniform = 1.0 / out.len() as f64;
        out.iter_mut().for_each(|o| *o = uniform);
        return;
    }
    for o in out.iter_mut() {
        *o /= sum;
    }
}

fn extended_state(state: &Array1<f64>, input: &Array1<f64>) -> Array1<f64> {
    let rs = state.len();
    let mut extended = Array1::zeros(rs + input.len());
    extended.slice_mut(s![..rs]).assign(state);
    extended.slice_mut(s![rs..]).assign(input);
    extended
}

/// Fit both readouts on the whole window.
/// Draws are newest-first; input t is paired with draw t+1 in chronological order.
pub fn train(draws: &[Draw], config: &EsnConfig) -> Result<TrainedEsn> {
    let chrono: Vec<&Draw> = draws.iter().rev().collect();
    let n = chrono.len();

    if n < config.washout + 2 {
        bail!(
            "ESN: {} tirages insuffisants (washout {} + 2 requis)",
            n,
            config.washout
        );
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let input_dim = config.encoding.input_dim();
    let rs = config.reservoir_size;

    let inputs: Vec<Array1<f64>> = chrono.iter().map(|d| encode_draw(d, config.encoding)).collect();

    let mut reservoir = Reservoir::from_config(config, &mut rng)?;
    let states = reservoir.run_sequence(&inputs[..n - 1], &mut rng)?;

    let t_train = n - 1 - config.washout;
    let mut h_mat = Array2::zeros((rs + input_dim, t_train));
    let mut y_red = Array2::zeros((Pool::Red.size(), t_train));
    let mut y_blue = Array2::zeros((Pool::Blue.size(), t_train));

    for (col, t) in (config.washout..n - 1).enumerate() {
        h_mat.slice_mut(s![..rs, col]).assign(&states[t]);
        h_mat.slice_mut(s![rs.., col]).assign(&inputs[t]);
        y_red.column_mut(col).assign(&encode_target_onehot(chrono[t + 1], Pool::Red));
        y_blue.column_mut(col).assign(&encode_target_onehot(chrono[t + 1], Pool::Blue));
    }

    let w_out_red = ridge_regression(&h_mat, &y_red, config.ridge_lambda)?;
    let w_out_blue = ridge_regression(&h_mat, &y_blue, config.ridge_lambda)?;

    Ok(TrainedEsn {
        config: config.clone(),
        reservoir,
        w_out_red,
        w_out_blue,
        training_pairs: t_train,
    })
}

/// Replay the window from a zero state and read out the next-draw distributions.
/// Returns (red_probs[33], blue_probs[16]).
pub fn predict_next(esn: &mut TrainedEsn, draws: &[Draw]) -> Result<(Vec<f64>, Vec<f64>)> {
    let mut rng = StdRng::seed_from_u64(esn.config.seed);

    esn.reservoir.reset_state();
    let inputs: Vec<Array1<f64>> = draws
        .iter()
        .rev()
        .map(|d| encode_draw(d, esn.config.encoding))
        .collect();
    let states = esn.reservoir.run_sequence(&inputs, &mut rng)?;

    match (states.last(), inputs.last()) {
        (Some(state), Some(input)) => {
            let extended = extended_state(state, input);
            Ok((
                softmax(&esn.w_out_red.dot(&extended)),
                softmax(&esn.w_out_blue.dot(&extended)),
            ))
        }
        _ => Ok((
            vec![1.0 / Pool::Red.size() as f64; Pool::Red.size()],
            vec![1.0 / Pool::Blue.size() as f64; Pool::Blue.size()],
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_test_draws(n: usize) -> Vec<Draw> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        (0..n)
            .map(|i| {
                let base = (i % 5) as u8;
                let mut reds = [0u8; 6];
                for (k, r) in reds.iter_mut().enumerate() {
                    *r = base * 6 + k as u8 + 1;
                }
                Draw {
                    period: format!("{}", 2020000 + n - i),
                    date: start + chrono::Duration::days(((n - i) * 2) as i64),
                    reds,
                    blue: (i % 16) as u8 + 1,
                    source: String::new(),
                }
            })
            .collect()
    }

    fn small_config() -> EsnConfig {
        EsnConfig {
            reservoir_size: 20,
            sparsity: 0.8,
            washout: 5,
            ..EsnConfig::default()
        }
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&Array1::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0]));
        let sum: f64 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-10, "softmax sum={sum}");
        assert!(probs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_softmax_overflow_stability() {
        let probs = softmax(&Array1::from_vec(vec![1000.0, 1001.0, 1002.0]));
        let sum: f64 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-10, "overflow sum={sum}");
        assert!(probs.iter().all(|&p| p.is_finite() && p >= 0.0));
    }

    #[test]
    fn test_train_shapes() {
        let draws = make_test_draws(60);
        let esn = train(&draws, &small_config()).unwrap();
        assert_eq!(esn.w_out_red.shape(), &[33, 20 + 49]);
        assert_eq!(esn.w_out_blue.shape(), &[16, 20 + 49]);
        assert_eq!(esn.training_pairs, 60 - 1 - 5);
    }

    #[test]
    fn test_train_rejects_short_window() {
        let draws = make_test_draws(6);
        assert!(train(&draws, &small_config()).is_err());
    }

    #[test]
    fn test_predict_next_distributions() {
        let draws = make_test_draws(80);
        let mut esn = train(&draws, &small_config()).unwrap();
        let (red, blue) = predict_next(&mut esn, &draws).unwrap();
        assert_eq!(red.len(), 33);
        assert_eq!(blue.len(), 16);
        assert!((red.iter().sum::<f64>() - 1.0).abs() < 1e-6);
        assert!((blue.iter().sum::<f64>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_predict_next_deterministic() {
        let draws = make_test_draws(80);
        let mut a = train(&draws, &small_config()).unwrap();
        let mut b = train(&draws, &small_config()).unwrap();
        assert_eq!(
            predict_next(&mut a, &draws).unwrap(),
            predict_next(&mut b, &draws).unwrap()
        );
    }
}
