//! HMM parameter set: initial distribution, transitions, emissions

use super::gaussian::GaussianEmission;
use crate::data::Sequence;
use crate::error::{HmmError, Result};
use ndarray::{concatenate, Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Tolerance for probability-vector sum checks.
const PROB_TOL: f64 = 1e-9;

/// Complete parameter set of a Gaussian HMM.
///
/// The state count and feature dimension are fixed at construction; every
/// constructor validates the probability invariants (rows of the transition
/// matrix and the initial distribution sum to one, all entries finite and
/// non-negative). Training produces a fresh value rather than mutating a
/// fitted one.
#[derive(Debug, Clone)]
pub struct HmmParams {
    n_states: usize,
    n_features: usize,
    initial: Array1<f64>,
    transition: Array2<f64>,
    emissions: Vec<GaussianEmission>,
}

impl HmmParams {
    /// Build a parameter set after validating all invariants.
    ///
    /// # Errors
    ///
    /// Returns an error if dimensions disagree, any probability is negative
    /// or non-finite, or a distribution does not sum to 1 within 1e-9.
    pub fn new(
        initial: Array1<f64>,
        transition: Array2<f64>,
        emissions: Vec<GaussianEmission>,
    ) -> Result<Self> {
        let n_states = initial.len();
        if n_states == 0 {
            return Err(HmmError::InvalidInput("n_states must be > 0".into()));
        }
        if transition.nrows() != n_states || transition.ncols() != n_states {
            return Err(HmmError::InvalidInput(format!(
                "transition matrix is {}x{}, expected {}x{}",
                transition.nrows(),
                transition.ncols(),
                n_states,
                n_states
            )));
        }
        if emissions.len() != n_states {
            return Err(HmmError::InvalidInput(format!(
                "emission count {} != n_states {}",
                emissions.len(),
                n_states
            )));
        }
        let n_features = emissions[0].dim();
        for e in &emissions {
            if e.dim() != n_features {
                return Err(HmmError::DimensionMismatch {
                    expected: n_features,
                    actual: e.dim(),
                });
            }
        }

        if !initial.iter().all(|p| p.is_finite() && *p >= 0.0) {
            return Err(HmmError::InvalidInput(
                "initial probabilities must be finite and non-negative".into(),
            ));
        }
        let initial_sum: f64 = initial.sum();
        if (initial_sum - 1.0).abs() > PROB_TOL {
            return Err(HmmError::InvalidInput(format!(
                "initial probabilities sum to {initial_sum}, expected 1"
            )));
        }
        for (i, row) in transition.rows().into_iter().enumerate() {
            if !row.iter().all(|p| p.is_finite() && *p >= 0.0) {
                return Err(HmmError::InvalidInput(format!(
                    "transition row {i} contains negative or non-finite entries"
                )));
            }
            let row_sum: f64 = row.sum();
            if (row_sum - 1.0).abs() > PROB_TOL {
                return Err(HmmError::InvalidInput(format!(
                    "transition row {i} sums to {row_sum}, expected 1"
                )));
            }
        }

        Ok(Self {
            n_states,
            n_features,
            initial,
            transition,
            emissions,
        })
    }

    /// Random initialization with diagonal-dominant transitions and unit
    /// emission variances, seeded for reproducibility.
    pub fn random(n_states: usize, n_features: usize, seed: u64) -> Result<Self> {
        if n_states == 0 || n_features == 0 {
            return Err(HmmError::InvalidInput(
                "n_states and n_features must be > 0".into(),
            ));
        }
        let mut rng = StdRng::seed_from_u64(seed);

        let initial = random_initial(&mut rng, n_states);
        let transition = random_transition(&mut rng, n_states);

        // Spread means across feature space
        let mut emissions = Vec::with_capacity(n_states);
        for i in 0..n_states {
            let mut mean = Array1::zeros(n_features);
            for j in 0..n_features {
                mean[j] = (i as f64 - n_states as f64 / 2.0) * 0.5 + rng.gen::<f64>() * 0.2;
            }
            emissions.push(GaussianEmission::with_unit_variances(mean)?);
        }

        Self::new(initial, transition, emissions)
    }

    /// K-means seeding: emission means are cluster centers of the pooled
    /// training observations, variances start at one, transitions are
    /// diagonal-dominant.
    ///
    /// # Errors
    ///
    /// Returns an error if the corpus holds fewer observations than states
    /// or the sequences disagree on feature dimension.
    pub fn kmeans_seeded(n_states: usize, sequences: &[Sequence], seed: u64) -> Result<Self> {
        if n_states == 0 {
            return Err(HmmError::InvalidInput("n_states must be > 0".into()));
        }
        let observations = pool_observations(sequences)?;
        let n = observations.nrows();
        let d = observations.ncols();
        if n < n_states {
            return Err(HmmError::InvalidInput(format!(
                "need at least {n_states} observations to seed {n_states} states, got {n}"
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);

        // Distinct random observations as initial centers
        let centers_idx = rand::seq::index::sample(&mut rng, n, n_states);
        let mut centers: Vec<Array1<f64>> = centers_idx
            .iter()
            .map(|idx| observations.row(idx).to_owned())
            .collect();

        // A few Lloyd iterations are enough for a seed
        let mut assignments = vec![0usize; n];
        for _ in 0..10 {
            for i in 0..n {
                let mut best_dist = f64::MAX;
                for (j, center) in centers.iter().enumerate() {
                    let dist: f64 = observations
                        .row(i)
                        .iter()
                        .zip(center.iter())
                        .map(|(a, b)| (a - b).powi(2))
                        .sum();
                    if dist < best_dist {
                        best_dist = dist;
                        assignments[i] = j;
                    }
                }
            }

            for j in 0..n_states {
                let mut new_center = Array1::zeros(d);
                let mut count = 0usize;
                for i in 0..n {
                    if assignments[i] == j {
                        new_center += &observations.row(i);
                        count += 1;
                    }
                }
                if count > 0 {
                    new_center /= count as f64;
                    centers[j] = new_center;
                }
            }
        }

        let initial = random_initial(&mut rng, n_states);
        let transition = random_transition(&mut rng, n_states);
        let emissions = centers
            .into_iter()
            .map(GaussianEmission::with_unit_variances)
            .collect::<Result<Vec<_>>>()?;

        Self::new(initial, transition, emissions)
    }

    /// Number of hidden states.
    pub fn n_states(&self) -> usize {
        self.n_states
    }

    /// Feature dimension.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Initial state distribution.
    pub fn initial(&self) -> &Array1<f64> {
        &self.initial
    }

    /// State transition matrix.
    pub fn transition(&self) -> &Array2<f64> {
        &self.transition
    }

    /// Per-state emission distributions.
    pub fn emissions(&self) -> &[GaussianEmission] {
        &self.emissions
    }

    /// Emission distribution of one state.
    pub fn emission(&self, state: usize) -> &GaussianEmission {
        &self.emissions[state]
    }

    /// Sample a state path and observation sequence of the given length.
    pub fn sample<R: Rng>(&self, length: usize, rng: &mut R) -> (Vec<usize>, Array2<f64>) {
        let mut states = Vec::with_capacity(length);
        let mut observations = Array2::zeros((length, self.n_features));
        if length == 0 {
            return (states, observations);
        }

        let mut current = sample_discrete(self.initial.view(), rng);
        states.push(current);
        observations
            .row_mut(0)
            .assign(&self.emissions[current].sample(rng));

        for t in 1..length {
            current = sample_discrete(self.transition.row(current), rng);
            states.push(current);
            observations
                .row_mut(t)
                .assign(&self.emissions[current].sample(rng));
        }

        (states, observations)
    }
}

/// Pool the observations of all sequences into one matrix, validating that
/// every sequence agrees on the feature dimension.
pub(crate) fn pool_observations(sequences: &[Sequence]) -> Result<Array2<f64>> {
    if sequences.is_empty() {
        return Err(HmmError::InvalidInput("no training sequences given".into()));
    }
    let d = sequences[0].dim();
    for seq in sequences {
        if seq.dim() != d {
            return Err(HmmError::DimensionMismatch {
                expected: d,
                actual: seq.dim(),
            });
        }
        if seq.is_empty() {
            return Err(HmmError::InvalidInput("empty sequence in corpus".into()));
        }
    }
    let views: Vec<_> = sequences.iter().map(|s| s.observations()).collect();
    concatenate(Axis(0), &views)
        .map_err(|e| HmmError::InvalidInput(format!("could not pool sequences: {e}")))
}

fn random_initial<R: Rng>(rng: &mut R, n_states: usize) -> Array1<f64> {
    let mut initial = Array1::zeros(n_states);
    for i in 0..n_states {
        initial[i] = rng.gen::<f64>() + 0.1;
    }
    let sum = initial.sum();
    initial /= sum;
    initial
}

fn random_transition<R: Rng>(rng: &mut R, n_states: usize) -> Array2<f64> {
    let mut transition = Array2::zeros((n_states, n_states));
    for i in 0..n_states {
        for j in 0..n_states {
            if i == j {
                transition[[i, j]] = 0.8 + rng.gen::<f64>() * 0.15;
            } else {
                transition[[i, j]] = rng.gen::<f64>() * 0.1;
            }
        }
        let row_sum: f64 = transition.row(i).sum();
        for j in 0..n_states {
            transition[[i, j]] /= row_sum;
        }
    }
    transition
}

/// Sample an index from a discrete distribution.
fn sample_discrete<R: Rng>(probs: ndarray::ArrayView1<f64>, rng: &mut R) -> usize {
    let u: f64 = rng.gen();
    let mut cumsum = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cumsum += p;
        if u < cumsum {
            return i;
        }
    }
    probs.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, array};

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
    fn construction_validates_row_sums() {
        assert!(HmmParams::new(
            array![0.3, 0.3],
            arr2(&[[0.5, 0.5], [0.5, 0.5]]),
            vec![
                GaussianEmission::with_unit_variances(array![0.0]).unwrap(),
                GaussianEmission::with_unit_variances(array![1.0]).unwrap(),
            ],
        )
        .is_err());

        assert!(HmmParams::new(
            array![0.5, 0.5],
            arr2(&[[0.9, 0.2], [0.5, 0.5]]),
            vec![
                GaussianEmission::with_unit_variances(array![0.0]).unwrap(),
                GaussianEmission::with_unit_variances(array![1.0]).unwrap(),
            ],
        )
        .is_err());
    }

    #[test]
    fn construction_rejects_mixed_dimensions() {
        let res = HmmParams::new(
            array![0.5, 0.5],
            arr2(&[[0.5, 0.5], [0.5, 0.5]]),
            vec![
                GaussianEmission::with_unit_variances(array![0.0, 0.0]).unwrap(),
                GaussianEmission::with_unit_variances(array![1.0]).unwrap(),
            ],
        );
        assert!(matches!(res, Err(HmmError::DimensionMismatch { .. })));
    }

    #[test]
    fn random_params_satisfy_invariants() {
        let params = HmmParams::random(3, 5, 42).unwrap();
        assert_eq!(params.n_states(), 3);
        assert_eq!(params.n_features(), 5);

        let sum: f64 = params.initial().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        for i in 0..3 {
            let row_sum: f64 = params.transition().row(i).sum();
            assert!((row_sum - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn random_is_reproducible() {
        let a = HmmParams::random(3, 2, 7).unwrap();
        let b = HmmParams::random(3, 2, 7).unwrap();
        assert_eq!(a.initial(), b.initial());
        assert_eq!(a.transition(), b.transition());
    }

    #[test]
    fn kmeans_centers_land_on_clusters() {
        // Two tight clusters around 0 and 10
        let mut rows = Vec::new();
        for i in 0..20 {
            rows.push(vec![0.0 + i as f64 * 0.001]);
            rows.push(vec![10.0 + i as f64 * 0.001]);
        }
        let seq = Sequence::from_rows(&rows).unwrap();
        let params = HmmParams::kmeans_seeded(2, &[seq], 1).unwrap();

        let mut means: Vec<f64> = params.emissions().iter().map(|e| e.mean()[0]).collect();
        means.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((means[0] - 0.0).abs() < 0.5);
        assert!((means[1] - 10.0).abs() < 0.5);
    }

    #[test]
    fn sample_respects_length_and_states() {
        let params = two_state_params();
        let mut rng = StdRng::seed_from_u64(5);
        let (states, obs) = params.sample(50, &mut rng);

        assert_eq!(states.len(), 50);
        assert_eq!(obs.nrows(), 50);
        assert_eq!(obs.ncols(), 1);
        assert!(states.iter().all(|&s| s < 2));
    }
}
