//! Gaussian hidden Markov models for activity sequence modeling.
//!
//! Trains multivariate Gaussian HMMs with the Baum-Welch (EM) algorithm,
//! decodes state paths with Viterbi, and classifies recordings into
//! activity labels through a majority-vote state-to-label assignment.
//! Feature extraction and scaling are the caller's responsibility: the
//! model layers consume pre-extracted, fixed-dimension feature sequences.
//!
//! # Quick start
//!
//! ```no_run
//! use activity_hmm::data::read_sequences_csv;
//! use activity_hmm::labeling::ActivityClassifier;
//! use activity_hmm::models::{HmmParams, TrainConfig};
//!
//! # fn main() -> activity_hmm::Result<()> {
//! let sequences = read_sequences_csv("features.csv")?;
//! let init = HmmParams::kmeans_seeded(5, &sequences, 42)?;
//! let (classifier, summary) =
//!     ActivityClassifier::train(init, &sequences, TrainConfig::default())?;
//! println!("log-likelihood: {:.2}", summary.log_likelihood);
//!
//! for prediction in classifier.predict_batch(&sequences)? {
//!     println!("{}", prediction.label);
//! }
//! # Ok(())
//! # }
//! ```

pub mod data;
pub mod error;
pub mod labeling;
pub mod models;
pub mod persist;

pub use data::Sequence;
pub use error::{HmmError, Result};
pub use labeling::{ActivityClassifier, StateLabelMap};
pub use models::{BaumWelchTrainer, DecodedPath, HmmParams, TrainConfig, TrainSummary};
pub use persist::{load_classifier, save_classifier, ModelArtifact, FORMAT_VERSION};
