//! Activity labeling and evaluation
//!
//! Maps decoded hidden states to activity labels via a majority-vote
//! assignment learned at training time.

mod classifier;
mod metrics;

pub use classifier::{ActivityClassifier, Prediction, StateLabelMap};
pub use metrics::{evaluate, EvalReport};
