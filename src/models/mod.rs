//! Gaussian HMM core
//!
//! Provides the parameter set, Gaussian emissions, log-space
//! forward-backward and Viterbi algorithms, and the Baum-Welch trainer.

mod algorithms;
mod gaussian;
mod hmm;
mod logspace;
mod trainer;

pub use algorithms::{
    forward_backward, log_likelihood, viterbi, viterbi_batch, DecodedPath, ForwardBackward,
};
pub use gaussian::{Covariance, CovarianceKind, GaussianEmission};
pub use hmm::HmmParams;
pub use logspace::{log_sum_exp, log_sum_exp_slice};
pub use trainer::{BaumWelchTrainer, TrainConfig, TrainStatus, TrainSummary};
