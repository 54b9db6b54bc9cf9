//! Gaussian emission distributions for HMM states

use crate::error::{HmmError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::Rng;
use std::f64::consts::PI;

/// Smallest weight mass accepted by re-estimation before a state is
/// considered degenerate.
const WEIGHT_EPS: f64 = 1e-12;

/// Covariance parameterization of an emission distribution.
#[derive(Debug, Clone)]
pub enum Covariance {
    /// Per-dimension variances (off-diagonal terms fixed at zero)
    Diagonal(Array1<f64>),
    /// Full symmetric positive-definite covariance matrix
    Full(Array2<f64>),
}

/// Which covariance parameterization re-estimation should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CovarianceKind {
    Diagonal,
    Full,
}

/// Gaussian emission distribution for one hidden state.
///
/// Density evaluation happens in log space: the diagonal variant sums
/// per-dimension log terms, the full variant goes through a cached Cholesky
/// factor. Neither path forms a raw determinant or inverse.
#[derive(Debug, Clone)]
pub struct GaussianEmission {
    mean: Array1<f64>,
    covariance: Covariance,
    /// Cached log|Sigma|
    log_det: f64,
    /// Cached 1/sigma_d^2 (diagonal variant)
    inv_var: Option<Array1<f64>>,
    /// Cached lower Cholesky factor (full variant)
    chol: Option<Array2<f64>>,
}

impl GaussianEmission {
    /// Create a diagonal-covariance emission.
    ///
    /// # Errors
    ///
    /// Returns an error if dimensions disagree or any variance is not a
    /// positive finite number.
    pub fn diagonal(mean: Array1<f64>, variances: Array1<f64>) -> Result<Self> {
        if mean.len() != variances.len() {
            return Err(HmmError::DimensionMismatch {
                expected: mean.len(),
                actual: variances.len(),
            });
        }
        if mean.is_empty() {
            return Err(HmmError::InvalidInput("emission dimension must be > 0".into()));
        }
        if !mean.iter().all(|m| m.is_finite()) {
            return Err(HmmError::InvalidInput("emission mean contains non-finite values".into()));
        }
        if !variances.iter().all(|v| v.is_finite() && *v > 0.0) {
            return Err(HmmError::InvalidInput(
                "emission variances must be positive and finite".into(),
            ));
        }

        let log_det = variances.iter().map(|v| v.ln()).sum();
        let inv_var = variances.mapv(|v| 1.0 / v);

        Ok(Self {
            mean,
            covariance: Covariance::Diagonal(variances),
            log_det,
            inv_var: Some(inv_var),
            chol: None,
        })
    }

    /// Create a full-covariance emission.
    ///
    /// # Errors
    ///
    /// Returns an error if dimensions disagree or the matrix admits no
    /// Cholesky factorization (not positive definite).
    pub fn full(mean: Array1<f64>, covariance: Array2<f64>) -> Result<Self> {
        let d = mean.len();
        if covariance.nrows() != d || covariance.ncols() != d {
            return Err(HmmError::DimensionMismatch {
                expected: d,
                actual: covariance.nrows().max(covariance.ncols()),
            });
        }
        if d == 0 {
            return Err(HmmError::InvalidInput("emission dimension must be > 0".into()));
        }
        if !mean.iter().all(|m| m.is_finite()) || !covariance.iter().all(|c| c.is_finite()) {
            return Err(HmmError::InvalidInput(
                "emission parameters contain non-finite values".into(),
            ));
        }

        let chol = cholesky(&covariance).ok_or_else(|| {
            HmmError::InvalidInput("covariance matrix is not positive definite".into())
        })?;
        let log_det = 2.0 * (0..d).map(|i| chol[[i, i]].ln()).sum::<f64>();

        Ok(Self {
            mean,
            covariance: Covariance::Full(covariance),
            log_det,
            inv_var: None,
            chol: Some(chol),
        })
    }

    /// Diagonal emission with unit variances (useful for initialization).
    pub fn with_unit_variances(mean: Array1<f64>) -> Result<Self> {
        let d = mean.len();
        Self::diagonal(mean, Array1::from_elem(d, 1.0))
    }

    /// Dimension of the distribution.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Mean vector.
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Covariance parameters.
    pub fn covariance(&self) -> &Covariance {
        &self.covariance
    }

    /// Covariance parameterization in use.
    pub fn kind(&self) -> CovarianceKind {
        match self.covariance {
            Covariance::Diagonal(_) => CovarianceKind::Diagonal,
            Covariance::Full(_) => CovarianceKind::Full,
        }
    }

    /// Log probability density at a point.
    ///
    /// The caller guarantees the observation dimension; decoding and training
    /// entry points validate it once per sequence.
    pub fn log_density(&self, x: ArrayView1<f64>) -> f64 {
        debug_assert_eq!(x.len(), self.dim());
        let d = self.dim() as f64;
        let ln_2pi = (2.0 * PI).ln();

        match &self.covariance {
            Covariance::Diagonal(_) => {
                let inv_var = self.inv_var.as_ref().expect("diagonal cache");
                let mut quad = 0.0;
                for i in 0..self.dim() {
                    let diff = x[i] - self.mean[i];
                    quad += diff * diff * inv_var[i];
                }
                -0.5 * (d * ln_2pi + self.log_det + quad)
            }
            Covariance::Full(_) => {
                let chol = self.chol.as_ref().expect("cholesky cache");
                let diff = &x - &self.mean;
                let y = forward_substitute(chol, &diff);
                let quad = y.dot(&y);
                -0.5 * (d * ln_2pi + self.log_det + quad)
            }
        }
    }

    /// Re-estimate emission parameters from weighted observations.
    ///
    /// Computes the weighted mean and (co)variance, then applies
    /// `variance_floor` elementwise to the variances / covariance diagonal.
    /// The `state` index is carried only for error reporting.
    ///
    /// # Errors
    ///
    /// Returns [`HmmError::DegenerateState`] when the total weight mass is
    /// numerically zero, or when a full covariance estimate collapses to a
    /// non-positive-definite matrix. The caller decides the
    /// reinitialization policy.
    pub fn reestimate(
        state: usize,
        kind: CovarianceKind,
        observations: ArrayView2<f64>,
        weights: ArrayView1<f64>,
        variance_floor: f64,
    ) -> Result<Self> {
        let n = observations.nrows();
        let d = observations.ncols();
        if weights.len() != n {
            return Err(HmmError::InvalidInput(format!(
                "weight count {} != observation count {}",
                weights.len(),
                n
            )));
        }

        let weight_sum: f64 = weights.sum();
        if !(weight_sum > WEIGHT_EPS) {
            return Err(HmmError::DegenerateState { state });
        }

        // Weighted mean
        let mut mean = Array1::<f64>::zeros(d);
        for i in 0..n {
            let w = weights[i];
            for j in 0..d {
                mean[j] += w * observations[[i, j]];
            }
        }
        mean /= weight_sum;

        match kind {
            CovarianceKind::Diagonal => {
                let mut var = Array1::<f64>::zeros(d);
                for i in 0..n {
                    let w = weights[i];
                    for j in 0..d {
                        let diff = observations[[i, j]] - mean[j];
                        var[j] += w * diff * diff;
                    }
                }
                var /= weight_sum;
                var.mapv_inplace(|v| v.max(variance_floor));
                Self::diagonal(mean, var)
            }
            CovarianceKind::Full => {
                let mut cov = Array2::<f64>::zeros((d, d));
                for i in 0..n {
                    let w = weights[i];
                    let diff = &observations.row(i) - &mean;
                    for j in 0..d {
                        for k in 0..d {
                            cov[[j, k]] += w * diff[j] * diff[k];
                        }
                    }
                }
                cov /= weight_sum;
                for j in 0..d {
                    cov[[j, j]] = cov[[j, j]].max(variance_floor);
                }
                Self::full(mean, cov).map_err(|_| HmmError::DegenerateState { state })
            }
        }
    }

    /// Draw one observation from the distribution.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Array1<f64> {
        let d = self.dim();

        // Standard normal draws via Box-Muller
        let mut z = Array1::<f64>::zeros(d);
        for i in 0..d {
            let u1: f64 = 1.0 - rng.gen::<f64>();
            let u2: f64 = rng.gen();
            z[i] = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
        }

        match &self.covariance {
            Covariance::Diagonal(var) => {
                let mut x = self.mean.clone();
                for i in 0..d {
                    x[i] += var[i].sqrt() * z[i];
                }
                x
            }
            Covariance::Full(_) => {
                let chol = self.chol.as_ref().expect("cholesky cache");
                let mut x = self.mean.clone();
                for i in 0..d {
                    for k in 0..=i {
                        x[i] += chol[[i, k]] * z[k];
                    }
                }
                x
            }
        }
    }
}

/// Lower-triangular Cholesky factorization; `None` if the matrix is not
/// positive definite.
fn cholesky(m: &Array2<f64>) -> Option<Array2<f64>> {
    let n = m.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = m[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[[i, j]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }

    Some(l)
}

/// Solve L y = b for lower-triangular L.
fn forward_substitute(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = b.len();
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * y[k];
        }
        y[i] = sum / l[[i, i]];
    }
    y
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, array};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn diagonal_log_density_matches_closed_form() {
        let g = GaussianEmission::diagonal(array![1.0, -2.0], array![4.0, 0.25]).unwrap();
        let x = array![2.0, -1.0];

        // Sum of two independent 1-D normal log densities
        let ln_2pi = (2.0 * PI).ln();
        let expected = -0.5 * (ln_2pi + 4.0_f64.ln() + 1.0 / 4.0)
            + -0.5 * (ln_2pi + 0.25_f64.ln() + 1.0 / 0.25);
        assert!((g.log_density(x.view()) - expected).abs() < 1e-12);
    }

    #[test]
    fn full_identity_matches_diagonal() {
        let mean = array![0.5, -0.5, 1.0];
        let diag = GaussianEmission::diagonal(mean.clone(), Array1::from_elem(3, 1.0)).unwrap();
        let full = GaussianEmission::full(mean, Array2::eye(3)).unwrap();

        let x = array![0.0, 0.3, 0.9];
        assert!((diag.log_density(x.view()) - full.log_density(x.view())).abs() < 1e-12);
    }

    #[test]
    fn full_correlated_density() {
        // 2-D with correlation 0.5: Sigma = [[1, 0.5], [0.5, 1]]
        let g = GaussianEmission::full(array![0.0, 0.0], arr2(&[[1.0, 0.5], [0.5, 1.0]])).unwrap();

        // At the mean: -0.5 * (2 ln 2pi + ln det), det = 0.75
        let expected = -0.5 * (2.0 * (2.0 * PI).ln() + 0.75_f64.ln());
        let at_mean = g.log_density(array![0.0, 0.0].view());
        assert!((at_mean - expected).abs() < 1e-12);

        // Density decreases away from the mean
        assert!(at_mean > g.log_density(array![1.0, -1.0].view()));
    }

    #[test]
    fn non_positive_definite_rejected() {
        let res = GaussianEmission::full(array![0.0, 0.0], arr2(&[[1.0, 2.0], [2.0, 1.0]]));
        assert!(res.is_err());

        let res = GaussianEmission::diagonal(array![0.0], array![0.0]);
        assert!(res.is_err());
    }

    #[test]
    fn reestimate_weighted_mean_and_variance() {
        let obs = arr2(&[[0.0], [2.0], [4.0]]);
        let weights = array![1.0, 1.0, 2.0];
        let g = GaussianEmission::reestimate(
            0,
            CovarianceKind::Diagonal,
            obs.view(),
            weights.view(),
            1e-6,
        )
        .unwrap();

        // mean = (0 + 2 + 8) / 4 = 2.5
        assert!((g.mean()[0] - 2.5).abs() < 1e-12);
        // var = (6.25 + 0.25 + 2 * 2.25) / 4 = 2.75
        match g.covariance() {
            Covariance::Diagonal(v) => assert!((v[0] - 2.75).abs() < 1e-12),
            _ => panic!("expected diagonal"),
        }
    }

    #[test]
    fn reestimate_zero_weights_is_degenerate() {
        let obs = arr2(&[[0.0], [1.0]]);
        let weights = array![0.0, 0.0];
        let res = GaussianEmission::reestimate(
            3,
            CovarianceKind::Diagonal,
            obs.view(),
            weights.view(),
            1e-6,
        );
        assert!(matches!(res, Err(HmmError::DegenerateState { state: 3 })));
    }

    #[test]
    fn constant_observations_hit_variance_floor() {
        let obs = arr2(&[[1.5, -0.5]; 10]);
        let weights = Array1::from_elem(10, 1.0);
        let floor = 1e-4;
        let g = GaussianEmission::reestimate(
            0,
            CovarianceKind::Diagonal,
            obs.view(),
            weights.view(),
            floor,
        )
        .unwrap();

        match g.covariance() {
            Covariance::Diagonal(v) => {
                for &var in v.iter() {
                    assert!(var >= floor);
                    assert!(var > 0.0);
                }
            }
            _ => panic!("expected diagonal"),
        }
    }

    #[test]
    fn sample_centers_on_mean() {
        let g = GaussianEmission::diagonal(array![3.0, -3.0], array![1.0, 1.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(11);

        let mut sum = Array1::<f64>::zeros(2);
        let n = 2000;
        for _ in 0..n {
            sum += &g.sample(&mut rng);
        }
        sum /= n as f64;

        assert!((sum[0] - 3.0).abs() < 0.2);
        assert!((sum[1] + 3.0).abs() < 0.2);
    }

    #[test]
    fn cholesky_reconstructs() {
        let m = arr2(&[[4.0, 2.0, 0.6], [2.0, 5.0, 1.0], [0.6, 1.0, 3.0]]);
        let l = cholesky(&m).unwrap();

        for i in 0..3 {
            for j in 0..3 {
                let mut v = 0.0;
                for k in 0..3 {
                    v += l[[i, k]] * l[[j, k]];
                }
                assert!((v - m[[i, j]]).abs() < 1e-10);
            }
        }
    }
}
