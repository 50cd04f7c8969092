use anyhow::{anyhow, Result};
use faer::prelude::Solve;
use faer::{Mat, Side};
use ndarray::Array2;

/// Solve A·X = B for a symmetric positive-definite A (Cholesky via faer).
fn solve_spd(a: &Array2<f64>, b: &Array2<f64>) -> Result<Array2<f64>> {
    let a_mat = Mat::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]]);
    let b_mat = Mat::from_fn(b.nrows(), b.ncols(), |i, j| b[[i, j]]);
    let llt = a_mat
        .llt(Side::Lower)
        .map_err(|_| anyhow!("Cholesky: matrix not positive-definite"))?;
    let x = llt.solve(&b_mat);
    Ok(Array2::from_shape_fn((x.nrows(), x.ncols()), |(i, j)| x[(i, j)]))
}

fn add_ridge(mut gram: Array2<f64>, lambda: f64) -> Array2<f64> {
    for i in 0..gram.nrows() {
        gram[[i, i]] += lambda;
    }
    gram
}

/// Ridge readout: W_out = Y·Hᵀ·(H·Hᵀ + λI)⁻¹
///
/// - `h`: [state_dim, T], one state per column
/// - `y`: [output_dim, T]
/// - returns W_out: [output_dim, state_dim]
///
/// With fewer samples than state dimensions the T×T dual system is solved
/// instead (push-through identity).
pub fn ridge_regression(h: &Array2<f64>, y: &Array2<f64>, lambda: f64) -> Result<Array2<f64>> {
    let (d, t) = h.dim();

    if t < d {
        // (HᵀH + λI) Z = Yᵀ, W_out = (H Z)ᵀ
        let g = add_ridge(h.t().dot(h), lambda);
        let z = solve_spd(&g, &y.t().to_owned())?;
        Ok(h.dot(&z).t().to_owned())
    } else {
        // (HHᵀ + λI) W_outᵀ = H Yᵀ
        let a = add_ridge(h.dot(&h.t()), lambda);
        let w_out_t = solve_spd(&a, &h.dot(&y.t()))?;
        Ok(w_out_t.t().to_owned())
    }
}
