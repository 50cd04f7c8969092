use anyhow::Result;
use ndarray::linalg::general_mat_vec_mul;
use ndarray::{Array1, Array2};
use rand::distr::Uniform;
use rand::{Rng, RngExt};
use sprs::{CsMat, TriMat};

use crate::config::EsnConfig;

pub struct Reservoir {
    pub w_in: Array2<f64>,
    pub w_res: CsMat<f64>,
    pub state: Array1<f64>,
    buf: Array1<f64>,
    pub leaking_rate: f64,
    pub noise_amplitude: f64,
}

impl Reservoir {
    /// Build input and recurrent weights from the config. The recurrent matrix
    /// is rescaled to `spectral_radius` then stored as CSR.
    pub fn from_config(config: &EsnConfig, rng: &mut impl Rng) -> Result<Self> {
        let n = config.reservoir_size;
        let input_dim = config.encoding.input_dim();

        let dist_in = Uniform::new(-config.input_scaling, config.input_scaling)?;
        let w_in = Array2::from_shape_fn((n, input_dim), |_| rng.sample(dist_in));

        let dist_res = Uniform::new(-1.0, 1.0)?;
        let mut dense = Array2::from_shape_fn((n, n), |_| {
            if rng.random::<f64>() < config.sparsity {
                0.0
            } else {
                rng.sample(dist_res)
            }
        });

        let rho = power_iteration(&dense, rng);
        if rho > 1e-10 {
            dense.mapv_inplace(|x| x * config.spectral_radius / rho);
        }

        let mut tri = TriMat::new((n, n));
        for ((i, j), &v) in dense.indexed_iter() {
            if v != 0.0 {
                tri.add_triplet(i, j, v);
            }
        }

        Ok(Reservoir {
            w_in,
            w_res: tri.to_csr(),
            state: Array1::zeros(n),
            buf: Array1::zeros(n),
            leaking_rate: config.leaking_rate,
            noise_amplitude: config.noise_amplitude,
        })
    }

    pub fn size(&self) -> usize {
        self.state.len()
    }

    /// h(t) = (1-a)·h(t-1) + a·tanh(W_in·x + W_res·h(t-1)) + noise
    pub fn step(&mut self, input: &Array1<f64>, rng: &mut impl Rng) -> Result<()> {
        general_mat_vec_mul(1.0, &self.w_in, input, 0.0, &mut self.buf);

        for (row, row_vec) in self.w_res.outer_iterator().enumerate() {
            for (col, &val) in row_vec.iter() {
                self.buf[row] += val * self.state[col];
            }
        }

        let a = self.leaking_rate;
        self.state.zip_mut_with(&self.buf, |h, &pre| {
            *h = *h * (1.0 - a) + pre.tanh() * a;
        });

        if self.noise_amplitude > 0.0 {
            let noise = Uniform::new(-self.noise_amplitude, self.noise_amplitude)?;
            for v in self.state.iter_mut() {
                *v += rng.sample(noise);
            }
        }
        Ok(())
    }

    /// Drive the reservoir over `inputs`, returning every visited state.
    pub fn run_sequence(&mut self, inputs: &[Array1<f64>], rng: &mut impl Rng) -> Result<Vec<Array1<f64>>> {
        let mut states = Vec::with_capacity(inputs.len());
        for x in inputs {
            self.step(x, rng)?;
            states.push(self.state.clone());
        }
        Ok(states)
    }

    pub fn reset_state(&mut self) {
        self.state.fill(0.0);
    }
}

/// Spectral radius estimate by power iteration.
pub fn power_iteration(w: &Array2<f64>, rng: &mut impl Rng) -> f64 {
    let n = w.nrows();
    if n == 0 {
        return 0.0;
    }

    let Ok(dist) = Uniform::new(-1.0, 1.0) else {
        return 0.0;
    };
    let mut v: Array1<f64> = Array1::from_shape_fn(n, |_| rng.sample(dist));
    let norm = v.dot(&v).sqrt();
    if norm < 1e-15 {
        return 0.0;
    }
    v /= norm;

    let mut lambda = 0.0;
    for _ in 0..200 {
        let w_v = w.dot(&v);
        let next = w_v.dot(&w_v).sqrt();
        if next < 1e-15 {
            return 0.0;
        }
        v = &w_v / next;
        if (next - lambda).abs() < 1e-10 {
            return next;
        }
        lambda = next;
    }
    lambda
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_config(leaking_rate: f64) -> EsnConfig {
        EsnConfig {
            reservoir_size: 40,
            leaking_rate,
            sparsity: 0.8,
            noise_amplitude: 0.0,
            ..EsnConfig::default()
        }
    }

    fn dense(sparse: &CsMat<f64>) -> Array2<f64> {
        let (rows, cols) = sparse.shape();
        let mut out = Array2::zeros((rows, cols));
        for (row, row_vec) in sparse.outer_iterator().enumerate() {
            for (col, &val) in row_vec.iter() {
                out[[row, col]] = val;
            }
        }
        out
    }

    #[test]
    fn test_matrix_shapes() {
        let mut rng = StdRng::seed_from_u64(42);
        let r = Reservoir::from_config(&small_config(0.3), &mut rng).unwrap();
        assert_eq!(r.w_in.shape(), &[40, 49]);
        assert_eq!(r.w_res.shape(), (40, 40));
        assert_eq!(r.size(), 40);
    }

    #[test]
    fn test_spectral_radius_close_to_target() {
        let mut rng = StdRng::seed_from_u64(42);
        let config = small_config(0.3);
        let r = Reservoir::from_config(&config, &mut rng).unwrap();
        let rho = power_iteration(&dense(&r.w_res), &mut rng);
        assert!(
            (rho - config.spectral_radius).abs() / config.spectral_radius < 0.05,
            "rho={rho}"
        );
    }

    #[test]
    fn test_deterministic_seed() {
        let config = small_config(0.3);
        let r1 = Reservoir::from_config(&config, &mut StdRng::seed_from_u64(7)).unwrap();
        let r2 = Reservoir::from_config(&config, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(r1.w_in, r2.w_in);
        assert_eq!(dense(&r1.w_res), dense(&r2.w_res));
    }

    #[test]
    fn test_leaking_rate_zero_keeps_state() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut r = Reservoir::from_config(&small_config(0.0), &mut rng).unwrap();
        r.step(&Array1::ones(49), &mut rng).unwrap();
        assert!(r.state.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_full_update_from_zero_state() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut r = Reservoir::from_config(&small_config(1.0), &mut rng).unwrap();
        let input = Array1::ones(49);
        r.step(&input, &mut rng).unwrap();
        let expected = r.w_in.dot(&input).mapv(f64::tanh);
        for i in 0..r.size() {
            assert!((r.state[i] - expected[i]).abs() < 1e-10);
        }
    }

    #[test]
    fn test_run_sequence_and_reset() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut r = Reservoir::from_config(&small_config(0.3), &mut rng).unwrap();
        let inputs: Vec<Array1<f64>> = (0..5).map(|_| Array1::ones(49)).collect();
        let states = r.run_sequence(&inputs, &mut rng).unwrap();
        assert_eq!(states.len(), 5);
        assert!(r.state.iter().any(|v| v.abs() > 1e-10));
        r.reset_state();
        assert!(r.state.iter().all(|v| v.abs() < 1e-15));
    }

    #[test]
    fn test_power_iteration_scaled_identity() {
        let mut rng = StdRng::seed_from_u64(42);
        let rho = power_iteration(&(Array2::eye(5) * 3.0), &mut rng);
        assert!((rho - 3.0).abs() < 0.01, "rho={rho}");
    }
}
