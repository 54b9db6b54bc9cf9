//! HMM inference algorithms: forward-backward and Viterbi
//!
//! Both run entirely in log space, so long sequences cannot underflow the
//! recursions themselves; a sequence whose total likelihood still underflows
//! to log(0) is reported as [`HmmError::Underflow`].

use super::hmm::HmmParams;
use super::logspace::log_sum_exp_slice;
use crate::data::Sequence;
use crate::error::{HmmError, Result};
use ndarray::{Array2, ArrayView2};

/// Result of one forward-backward pass over a single sequence.
#[derive(Debug, Clone)]
pub struct ForwardBackward {
    /// Log forward probabilities (T x K)
    pub log_alpha: Array2<f64>,
    /// Log backward probabilities (T x K)
    pub log_beta: Array2<f64>,
    /// State occupation posteriors gamma (T x K, rows sum to 1)
    pub gamma: Array2<f64>,
    /// Transition posteriors xi summed over time (K x K)
    pub xi_sum: Array2<f64>,
    /// log P(sequence | params)
    pub log_likelihood: f64,
}

/// Most probable state path for one sequence.
#[derive(Debug, Clone)]
pub struct DecodedPath {
    /// State index per time step
    pub states: Vec<usize>,
    /// Log probability of the whole path
    pub log_prob: f64,
}

fn validate(params: &HmmParams, observations: ArrayView2<f64>) -> Result<()> {
    if observations.nrows() == 0 {
        return Err(HmmError::InvalidInput("observation sequence is empty".into()));
    }
    if observations.ncols() != params.n_features() {
        return Err(HmmError::DimensionMismatch {
            expected: params.n_features(),
            actual: observations.ncols(),
        });
    }
    if !observations.iter().all(|v| v.is_finite()) {
        return Err(HmmError::InvalidInput(
            "observation sequence contains non-finite values".into(),
        ));
    }
    Ok(())
}

/// Emission log densities for every (time, state) pair.
fn emission_log_probs(params: &HmmParams, observations: ArrayView2<f64>) -> Array2<f64> {
    let t_len = observations.nrows();
    let k = params.n_states();
    let mut log_b = Array2::zeros((t_len, k));
    for t in 0..t_len {
        let obs = observations.row(t);
        for j in 0..k {
            log_b[[t, j]] = params.emission(j).log_density(obs);
        }
    }
    log_b
}

/// Forward recursion; returns `(log_alpha, log_likelihood)`.
fn forward(params: &HmmParams, log_b: &Array2<f64>) -> (Array2<f64>, f64) {
    let t_len = log_b.nrows();
    let k = params.n_states();
    let log_pi = params.initial().mapv(f64::ln);
    let log_a = params.transition().mapv(f64::ln);

    let mut log_alpha = Array2::from_elem((t_len, k), f64::NEG_INFINITY);
    for j in 0..k {
        log_alpha[[0, j]] = log_pi[j] + log_b[[0, j]];
    }

    let mut terms = vec![f64::NEG_INFINITY; k];
    for t in 1..t_len {
        for j in 0..k {
            for (i, term) in terms.iter_mut().enumerate() {
                *term = log_alpha[[t - 1, i]] + log_a[[i, j]];
            }
            log_alpha[[t, j]] = log_sum_exp_slice(&terms) + log_b[[t, j]];
        }
    }

    let last: Vec<f64> = log_alpha.row(t_len - 1).to_vec();
    let log_likelihood = log_sum_exp_slice(&last);
    (log_alpha, log_likelihood)
}

/// Log-likelihood of a sequence under the given parameters (forward pass
/// only).
pub fn log_likelihood(params: &HmmParams, observations: ArrayView2<f64>) -> Result<f64> {
    validate(params, observations)?;
    let log_b = emission_log_probs(params, observations);
    let (_, ll) = forward(params, &log_b);
    if ll == f64::NEG_INFINITY {
        return Err(HmmError::Underflow);
    }
    Ok(ll)
}

/// Full forward-backward pass: log alpha/beta, gamma posteriors, pooled xi
/// transition posteriors, and the sequence log-likelihood.
///
/// A length-1 sequence is valid; its `xi_sum` is all zeros.
///
/// # Errors
///
/// Returns [`HmmError::Underflow`] if the sequence likelihood underflows to
/// log(0), [`HmmError::DimensionMismatch`] on a feature-dimension mismatch,
/// and an invalid-input error for empty or non-finite sequences.
pub fn forward_backward(params: &HmmParams, observations: ArrayView2<f64>) -> Result<ForwardBackward> {
    validate(params, observations)?;

    let t_len = observations.nrows();
    let k = params.n_states();
    let log_b = emission_log_probs(params, observations);
    let log_a = params.transition().mapv(f64::ln);

    let (log_alpha, ll) = forward(params, &log_b);
    if ll == f64::NEG_INFINITY {
        return Err(HmmError::Underflow);
    }

    // Backward recursion, seeded at log(1)
    let mut log_beta = Array2::from_elem((t_len, k), 0.0);
    let mut terms = vec![f64::NEG_INFINITY; k];
    for t in (0..t_len - 1).rev() {
        for i in 0..k {
            for (j, term) in terms.iter_mut().enumerate() {
                *term = log_a[[i, j]] + log_b[[t + 1, j]] + log_beta[[t + 1, j]];
            }
            log_beta[[t, i]] = log_sum_exp_slice(&terms);
        }
    }

    // Gamma: softmax over states of log_alpha + log_beta
    let mut gamma = Array2::zeros((t_len, k));
    for t in 0..t_len {
        for (j, term) in terms.iter_mut().enumerate() {
            *term = log_alpha[[t, j]] + log_beta[[t, j]];
        }
        let norm = log_sum_exp_slice(&terms);
        for j in 0..k {
            gamma[[t, j]] = (terms[j] - norm).exp();
        }
    }

    // Xi, normalized per step and pooled over time
    let mut xi_sum = Array2::zeros((k, k));
    let mut step = vec![f64::NEG_INFINITY; k * k];
    for t in 0..t_len.saturating_sub(1) {
        for i in 0..k {
            for j in 0..k {
                step[i * k + j] =
                    log_alpha[[t, i]] + log_a[[i, j]] + log_b[[t + 1, j]] + log_beta[[t + 1, j]];
            }
        }
        let norm = log_sum_exp_slice(&step);
        if norm == f64::NEG_INFINITY {
            continue;
        }
        for i in 0..k {
            for j in 0..k {
                xi_sum[[i, j]] += (step[i * k + j] - norm).exp();
            }
        }
    }

    Ok(ForwardBackward {
        log_alpha,
        log_beta,
        gamma,
        xi_sum,
        log_likelihood: ll,
    })
}

/// Viterbi decoding: the single most probable state path.
///
/// Ties in the per-step argmax and the final-state argmax resolve to the
/// lowest state index, so decoding is deterministic.
///
/// # Errors
///
/// Returns [`HmmError::Underflow`] if no path has positive probability, plus
/// the same input errors as [`forward_backward`].
pub fn viterbi(params: &HmmParams, observations: ArrayView2<f64>) -> Result<DecodedPath> {
    validate(params, observations)?;

    let t_len = observations.nrows();
    let k = params.n_states();
    let log_b = emission_log_probs(params, observations);
    let log_pi = params.initial().mapv(f64::ln);
    let log_a = params.transition().mapv(f64::ln);

    let mut delta = Array2::from_elem((t_len, k), f64::NEG_INFINITY);
    let mut psi = Array2::<usize>::zeros((t_len, k));

    for j in 0..k {
        delta[[0, j]] = log_pi[j] + log_b[[0, j]];
    }

    for t in 1..t_len {
        for j in 0..k {
            let mut best_val = f64::NEG_INFINITY;
            let mut best_state = 0;
            for i in 0..k {
                let val = delta[[t - 1, i]] + log_a[[i, j]];
                if val > best_val {
                    best_val = val;
                    best_state = i;
                }
            }
            delta[[t, j]] = best_val + log_b[[t, j]];
            psi[[t, j]] = best_state;
        }
    }

    let mut best_final = 0;
    let mut best_score = f64::NEG_INFINITY;
    for j in 0..k {
        if delta[[t_len - 1, j]] > best_score {
            best_score = delta[[t_len - 1, j]];
            best_final = j;
        }
    }
    if best_score == f64::NEG_INFINITY {
        return Err(HmmError::Underflow);
    }

    let mut states = vec![0usize; t_len];
    states[t_len - 1] = best_final;
    for t in (0..t_len - 1).rev() {
        states[t] = psi[[t + 1, states[t + 1]]];
    }

    Ok(DecodedPath {
        states,
        log_prob: best_score,
    })
}

/// Decode several sequences independently with one parameter set.
pub fn viterbi_batch(params: &HmmParams, sequences: &[Sequence]) -> Result<Vec<DecodedPath>> {
    sequences
        .iter()
        .map(|seq| viterbi(params, seq.observations()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::gaussian::GaussianEmission;
    use ndarray::{arr2, array, Array2};

    fn two_state_params() -> HmmParams {
        HmmParams::new(
            array![0.6, 0.4],
            arr2(&[[0.7, 0.3], [0.4, 0.6]]),
            vec![
                GaussianEmission::with_unit_variances(array![0.0]).unwrap(),
                GaussianEmission::with_unit_variances(array![3.0]).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn viterbi_separates_well_spaced_clusters() {
        let params = two_state_params();
        let obs = arr2(&[[0.1], [0.2], [2.8], [3.1]]);

        let path = viterbi(&params, obs.view()).unwrap();
        assert_eq!(path.states.len(), 4);
        assert_eq!(path.states[0], 0);
        assert_eq!(path.states[3], 1);
        assert!(path.log_prob.is_finite());
    }

    #[test]
    fn gamma_rows_sum_to_one() {
        let params = two_state_params();
        let obs = arr2(&[[0.1], [0.2], [2.8], [3.1]]);

        let fb = forward_backward(&params, obs.view()).unwrap();
        assert_eq!(fb.gamma.nrows(), 4);
        for t in 0..4 {
            let sum: f64 = fb.gamma.row(t).sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
        assert!(fb.log_likelihood.is_finite());
    }

    #[test]
    fn xi_steps_sum_to_one() {
        let params = two_state_params();
        let obs = arr2(&[[0.1], [1.5], [2.8], [3.1], [0.4]]);

        let fb = forward_backward(&params, obs.view()).unwrap();
        // Each of the T-1 steps contributes a normalized distribution
        let total: f64 = fb.xi_sum.iter().sum();
        assert!((total - 4.0).abs() < 1e-9);
    }

    #[test]
    fn forward_and_backward_likelihoods_agree() {
        let params = two_state_params();
        let obs = arr2(&[[0.1], [0.9], [2.5], [3.3], [-0.7], [1.2]]);

        let fb = forward_backward(&params, obs.view()).unwrap();

        // Backward-only likelihood: LSE_s(log pi_s + log b_s(x_0) + beta_0(s))
        let mut terms = vec![f64::NEG_INFINITY; 2];
        for s in 0..2 {
            terms[s] = params.initial()[s].ln()
                + params.emission(s).log_density(obs.row(0))
                + fb.log_beta[[0, s]];
        }
        let ll_backward = log_sum_exp_slice(&terms);

        assert!((fb.log_likelihood - ll_backward).abs() < 1e-6);
    }

    #[test]
    fn single_observation_sequence_is_valid() {
        let params = two_state_params();
        let obs = arr2(&[[0.5]]);

        let fb = forward_backward(&params, obs.view()).unwrap();
        assert_eq!(fb.gamma.nrows(), 1);
        assert!((fb.gamma.row(0).sum() - 1.0).abs() < 1e-9);
        // No transitions contribute
        assert_eq!(fb.xi_sum.iter().filter(|&&x| x != 0.0).count(), 0);

        let path = viterbi(&params, obs.view()).unwrap();
        assert_eq!(path.states.len(), 1);
    }

    #[test]
    fn viterbi_length_one_matches_brute_force() {
        // K = 4 states at staggered means
        let means = [-2.0, 0.0, 1.5, 4.0];
        let emissions: Vec<_> = means
            .iter()
            .map(|&m| GaussianEmission::with_unit_variances(array![m]).unwrap())
            .collect();
        let initial = array![0.1, 0.2, 0.3, 0.4];
        let transition = Array2::from_elem((4, 4), 0.25);
        let params = HmmParams::new(initial.clone(), transition, emissions).unwrap();

        for &x in &[-3.0, -0.4, 0.7, 2.0, 5.0] {
            let obs = arr2(&[[x]]);
            let path = viterbi(&params, obs.view()).unwrap();

            // Brute force: argmax_s log pi_s + log b_s(x)
            let mut best = 0;
            let mut best_score = f64::NEG_INFINITY;
            for s in 0..4 {
                let score = initial[s].ln() + params.emission(s).log_density(obs.row(0));
                if score > best_score {
                    best_score = score;
                    best = s;
                }
            }
            assert_eq!(path.states, vec![best]);
            assert!((path.log_prob - best_score).abs() < 1e-12);
        }
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let params = two_state_params();
        let obs = arr2(&[[0.1, 0.2]]);
        assert!(matches!(
            forward_backward(&params, obs.view()),
            Err(HmmError::DimensionMismatch { expected: 1, actual: 2 })
        ));
        assert!(matches!(
            viterbi(&params, obs.view()),
            Err(HmmError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn empty_sequence_is_rejected() {
        let params = two_state_params();
        let obs = Array2::<f64>::zeros((0, 1));
        assert!(forward_backward(&params, obs.view()).is_err());
        assert!(viterbi(&params, obs.view()).is_err());
    }

    #[test]
    fn underflow_is_reported_not_masked() {
        // A near-zero variance makes an observation far from the mean
        // underflow the density to exactly log(0).
        let params = HmmParams::new(
            array![1.0],
            arr2(&[[1.0]]),
            vec![GaussianEmission::diagonal(array![0.0], array![1e-300]).unwrap()],
        )
        .unwrap();
        let obs = arr2(&[[1e5]]);

        assert!(matches!(
            forward_backward(&params, obs.view()),
            Err(HmmError::Underflow)
        ));
        assert!(matches!(viterbi(&params, obs.view()), Err(HmmError::Underflow)));
        assert!(matches!(
            log_likelihood(&params, obs.view()),
            Err(HmmError::Underflow)
        ));
    }

    #[test]
    fn batch_decoding_matches_individual_decoding() {
        let params = two_state_params();
        let a = Sequence::from_rows(&[vec![0.1], vec![0.3], vec![2.9]]).unwrap();
        let b = Sequence::from_rows(&[vec![3.2], vec![2.7]]).unwrap();

        let batch = viterbi_batch(&params, &[a.clone(), b.clone()]).unwrap();
        let solo_a = viterbi(&params, a.observations()).unwrap();
        let solo_b = viterbi(&params, b.observations()).unwrap();

        assert_eq!(batch[0].states, solo_a.states);
        assert_eq!(batch[1].states, solo_b.states);
        assert_eq!(batch[0].log_prob, solo_a.log_prob);
        assert_eq!(batch[1].log_prob, solo_b.log_prob);
    }
}
