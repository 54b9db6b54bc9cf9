//! Baum-Welch (EM) parameter estimation

use super::algorithms::forward_backward;
use super::gaussian::{CovarianceKind, GaussianEmission};
use super::hmm::{pool_observations, HmmParams};
use crate::data::Sequence;
use crate::error::{HmmError, Result};
use ndarray::{s, Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Log-likelihood regressions larger than this stop training with a warning;
/// smaller ones are floating-point rounding and count as converged.
const LL_REGRESSION_TOL: f64 = 1e-6;

/// Training configuration.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Iteration cap; reaching it is reported, not an error
    pub max_iterations: usize,
    /// Stop once the total log-likelihood delta falls below this
    pub tolerance: f64,
    /// Elementwise lower bound on emission variances after re-estimation
    pub variance_floor: f64,
    /// Covariance parameterization re-estimated for every state
    pub covariance: CovarianceKind,
    /// Seed for degenerate-state reinitialization draws; `None` uses entropy
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-4,
            variance_floor: 1e-6,
            covariance: CovarianceKind::Diagonal,
            seed: None,
        }
    }
}

/// How a training run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainStatus {
    /// Log-likelihood delta fell below the tolerance
    Converged {
        /// EM iterations completed before the stop
        iterations: usize,
    },
    /// Iteration cap reached; the final estimate is still usable
    MaxIterationsReached,
}

/// Outcome report of one training run.
#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub status: TrainStatus,
    /// Total log-likelihood of the corpus under the returned parameters
    pub log_likelihood: f64,
    /// Total log-likelihood after each E-step
    pub history: Vec<f64>,
    /// States reinitialized after losing all responsibility
    pub degenerate_resets: usize,
}

/// Baum-Welch trainer over a corpus of independent sequences.
///
/// Each call to [`fit`](Self::fit) runs one complete training pass from the
/// given initial parameters and returns a fresh immutable parameter set; the
/// trainer itself holds only configuration.
#[derive(Debug, Clone)]
pub struct BaumWelchTrainer {
    config: TrainConfig,
}

impl BaumWelchTrainer {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Fit HMM parameters to the corpus.
    ///
    /// Per-sequence forward-backward statistics are pooled in input order,
    /// so a fixed seed makes runs reproducible. A state that receives no
    /// responsibility is reinitialized from a random training observation
    /// and training continues.
    ///
    /// # Errors
    ///
    /// Fails on an empty corpus, mismatched feature dimensions, or a
    /// sequence whose likelihood underflows to log(0) (restart with
    /// different initialization).
    pub fn fit(&self, init: HmmParams, sequences: &[Sequence]) -> Result<(HmmParams, TrainSummary)> {
        if self.config.max_iterations == 0 {
            return Err(HmmError::InvalidInput("max_iterations must be > 0".into()));
        }
        let pooled = pool_observations(sequences)?;
        if pooled.ncols() != init.n_features() {
            return Err(HmmError::DimensionMismatch {
                expected: init.n_features(),
                actual: pooled.ncols(),
            });
        }

        let k = init.n_states();
        let t_total = pooled.nrows();
        let n_seqs = sequences.len();
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        tracing::info!(
            "training {}-state HMM on {} sequences ({} observations, {} features)",
            k,
            n_seqs,
            t_total,
            init.n_features()
        );

        let mut params = init;
        let mut history: Vec<f64> = Vec::new();
        let mut prev_ll = f64::NEG_INFINITY;
        let mut status = TrainStatus::MaxIterationsReached;
        let mut degenerate_resets = 0usize;

        for iter in 0..self.config.max_iterations {
            // E-step: pool statistics over sequences in input order
            let mut total_ll = 0.0;
            let mut initial_acc = Array1::<f64>::zeros(k);
            let mut xi_acc = Array2::<f64>::zeros((k, k));
            let mut pooled_gamma = Array2::<f64>::zeros((t_total, k));

            let mut offset = 0;
            for seq in sequences {
                let fb = forward_backward(&params, seq.observations())?;
                total_ll += fb.log_likelihood;
                initial_acc += &fb.gamma.row(0);
                xi_acc += &fb.xi_sum;
                let t = seq.len();
                pooled_gamma
                    .slice_mut(s![offset..offset + t, ..])
                    .assign(&fb.gamma);
                offset += t;
            }

            history.push(total_ll);
            let delta = total_ll - prev_ll;
            if iter > 0 {
                if delta < -LL_REGRESSION_TOL {
                    tracing::warn!(
                        "log-likelihood regressed by {:.3e} at iteration {}; stopping",
                        -delta,
                        iter
                    );
                    status = TrainStatus::Converged { iterations: iter };
                    break;
                }
                if delta.abs() < self.config.tolerance {
                    tracing::info!("converged after {} iterations", iter);
                    status = TrainStatus::Converged { iterations: iter };
                    break;
                }
            }
            prev_ll = total_ll;

            if (iter + 1) % 10 == 0 {
                tracing::debug!("iteration {}: log-likelihood = {:.4}", iter + 1, total_ll);
            }

            // M-step
            let initial = &initial_acc / n_seqs as f64;

            let mut transition = Array2::<f64>::zeros((k, k));
            for i in 0..k {
                let row_sum: f64 = xi_acc.row(i).sum();
                if row_sum > 0.0 {
                    for j in 0..k {
                        transition[[i, j]] = xi_acc[[i, j]] / row_sum;
                    }
                } else {
                    // No observed mass leaving this state; keep it uniform
                    for j in 0..k {
                        transition[[i, j]] = 1.0 / k as f64;
                    }
                }
            }

            let mut emissions = Vec::with_capacity(k);
            for j in 0..k {
                let reestimated = GaussianEmission::reestimate(
                    j,
                    self.config.covariance,
                    pooled.view(),
                    pooled_gamma.column(j),
                    self.config.variance_floor,
                );
                match reestimated {
                    Ok(e) => emissions.push(e),
                    Err(HmmError::DegenerateState { state }) => {
                        tracing::warn!(
                            "state {} received no responsibility; reinitializing from a random observation",
                            state
                        );
                        degenerate_resets += 1;
                        let idx = rng.gen_range(0..t_total);
                        let mean = pooled.row(idx).to_owned();
                        let variances =
                            Array1::from_elem(pooled.ncols(), 1.0_f64.max(self.config.variance_floor));
                        emissions.push(GaussianEmission::diagonal(mean, variances)?);
                    }
                    Err(e) => return Err(e),
                }
            }

            params = HmmParams::new(initial, transition, emissions)?;
        }

        let log_likelihood = *history.last().expect("at least one iteration ran");
        Ok((
            params,
            TrainSummary {
                status,
                log_likelihood,
                history,
                degenerate_resets,
            },
        ))
    }
}
