//! Versioned model persistence
//!
//! A fitted model serializes to a self-describing JSON artifact holding the
//! full parameter set, the state-to-label map, and the feature
//! dimensionality, tagged with a format version. Loading checks the tag
//! before touching the payload and re-validates every invariant through the
//! normal constructors, so a corrupt or foreign file cannot become a model
//! silently.

use crate::error::{HmmError, Result};
use crate::labeling::{ActivityClassifier, StateLabelMap};
use crate::models::{Covariance, GaussianEmission, HmmParams};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Current artifact schema version.
pub const FORMAT_VERSION: u32 = 1;

/// Serialized covariance parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum CovarianceRecord {
    Diagonal(Vec<f64>),
    Full(Vec<Vec<f64>>),
}

/// Serialized emission parameters for one state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmissionRecord {
    pub mean: Vec<f64>,
    pub covariance: CovarianceRecord,
}

/// On-disk form of a fitted classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub n_states: usize,
    pub n_features: usize,
    pub initial: Vec<f64>,
    /// Transition matrix, one row per state
    pub transition: Vec<Vec<f64>>,
    pub emissions: Vec<EmissionRecord>,
    /// Label vocabulary in training enumeration order
    pub labels: Vec<String>,
    /// Per-state index into `labels`
    pub state_labels: Vec<usize>,
}

impl ModelArtifact {
    /// Capture a fitted classifier.
    pub fn from_classifier(classifier: &ActivityClassifier) -> Self {
        let params = classifier.params();
        let emissions = params
            .emissions()
            .iter()
            .map(|e| EmissionRecord {
                mean: e.mean().to_vec(),
                covariance: match e.covariance() {
                    Covariance::Diagonal(v) => CovarianceRecord::Diagonal(v.to_vec()),
                    Covariance::Full(m) => CovarianceRecord::Full(
                        m.rows().into_iter().map(|r| r.to_vec()).collect(),
                    ),
                },
            })
            .collect();

        Self {
            format_version: FORMAT_VERSION,
            n_states: params.n_states(),
            n_features: params.n_features(),
            initial: params.initial().to_vec(),
            transition: params
                .transition()
                .rows()
                .into_iter()
                .map(|r| r.to_vec())
                .collect(),
            emissions,
            labels: classifier.label_map().labels().to_vec(),
            state_labels: classifier.label_map().state_to_label().to_vec(),
        }
    }

    /// Rebuild the classifier, re-validating every invariant.
    ///
    /// # Errors
    ///
    /// Fails if any count, dimension, or probability constraint no longer
    /// holds (a tampered or truncated artifact).
    pub fn into_classifier(self) -> Result<ActivityClassifier> {
        if self.transition.len() != self.n_states {
            return Err(HmmError::InvalidInput(format!(
                "artifact declares {} states but has {} transition rows",
                self.n_states,
                self.transition.len()
            )));
        }

        let k = self.n_states;
        let mut flat = Vec::with_capacity(k * k);
        for row in &self.transition {
            if row.len() != k {
                return Err(HmmError::InvalidInput(
                    "transition matrix rows have inconsistent lengths".into(),
                ));
            }
            flat.extend_from_slice(row);
        }
        let transition = Array2::from_shape_vec((k, k), flat)
            .map_err(|e| HmmError::InvalidInput(format!("bad transition shape: {e}")))?;

        let emissions = self
            .emissions
            .into_iter()
            .map(|record| {
                let mean = Array1::from_vec(record.mean);
                match record.covariance {
                    CovarianceRecord::Diagonal(v) => {
                        GaussianEmission::diagonal(mean, Array1::from_vec(v))
                    }
                    CovarianceRecord::Full(rows) => {
                        let d = mean.len();
                        let mut flat = Vec::with_capacity(d * d);
                        for row in &rows {
                            if row.len() != d {
                                return Err(HmmError::InvalidInput(
                                    "covariance matrix rows have inconsistent lengths".into(),
                                ));
                            }
                            flat.extend_from_slice(row);
                        }
                        let cov = Array2::from_shape_vec((d, d), flat).map_err(|e| {
                            HmmError::InvalidInput(format!("bad covariance shape: {e}"))
                        })?;
                        GaussianEmission::full(mean, cov)
                    }
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let params = HmmParams::new(Array1::from_vec(self.initial), transition, emissions)?;
        if params.n_features() != self.n_features {
            return Err(HmmError::DimensionMismatch {
                expected: self.n_features,
                actual: params.n_features(),
            });
        }

        let label_map = StateLabelMap::from_parts(self.labels, self.state_labels)?;
        ActivityClassifier::new(params, label_map)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse JSON, checking the format version before decoding the payload.
    ///
    /// # Errors
    ///
    /// Returns [`HmmError::IncompatibleVersion`] when the tag disagrees with
    /// [`FORMAT_VERSION`], and an invalid-input error when the tag is
    /// missing entirely.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let found = value
            .get("format_version")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| {
                HmmError::InvalidInput("artifact has no format_version tag".into())
            })?;
        if found != u64::from(FORMAT_VERSION) {
            return Err(HmmError::IncompatibleVersion {
                found: found as u32,
                expected: FORMAT_VERSION,
            });
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Write the artifact to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Read an artifact from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Persist a fitted classifier to a file.
pub fn save_classifier<P: AsRef<Path>>(path: P, classifier: &ActivityClassifier) -> Result<()> {
    ModelArtifact::from_classifier(classifier).save(path)
}

/// Load a fitted classifier from a file.
pub fn load_classifier<P: AsRef<Path>>(path: P) -> Result<ActivityClassifier> {
    ModelArtifact::load(path)?.into_classifier()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, array};

    fn classifier() -> ActivityClassifier {
        let params = HmmParams::new(
            array![0.25, 0.75],
            arr2(&[[0.6, 0.4], [0.2, 0.8]]),
            vec![
                GaussianEmission::diagonal(array![0.1, -0.2], array![1.0, 2.0]).unwrap(),
                GaussianEmission::full(
                    array![3.0, 4.0],
                    arr2(&[[1.0, 0.3], [0.3, 2.0]]),
                )
                .unwrap(),
            ],
        )
        .unwrap();
        let map = StateLabelMap::from_parts(
            vec!["still".into(), "running".into()],
            vec![0, 1],
        )
        .unwrap();
        ActivityClassifier::new(params, map).unwrap()
    }

    #[test]
    fn round_trip_preserves_parameters() {
        let original = classifier();
        let json = ModelArtifact::from_classifier(&original).to_json().unwrap();
        let restored = ModelArtifact::from_json(&json)
            .unwrap()
            .into_classifier()
            .unwrap();

        assert_eq!(restored.params().initial(), original.params().initial());
        assert_eq!(restored.params().transition(), original.params().transition());
        for s in 0..2 {
            assert_eq!(
                restored.params().emission(s).mean(),
                original.params().emission(s).mean()
            );
        }
        match (
            restored.params().emission(1).covariance(),
            original.params().emission(1).covariance(),
        ) {
            (Covariance::Full(a), Covariance::Full(b)) => assert_eq!(a, b),
            _ => panic!("expected full covariance on state 1"),
        }
        assert_eq!(
            restored.label_map().labels(),
            original.label_map().labels()
        );
        assert_eq!(
            restored.label_map().state_to_label(),
            original.label_map().state_to_label()
        );
    }

    #[test]
    fn round_trip_through_file() {
        let original = classifier();
        let path = std::env::temp_dir().join("activity_hmm_model_roundtrip.json");

        save_classifier(&path, &original).unwrap();
        let restored = load_classifier(&path).unwrap();

        assert_eq!(restored.params().initial(), original.params().initial());
        assert_eq!(restored.params().n_features(), 2);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut artifact = ModelArtifact::from_classifier(&classifier());
        artifact.format_version = 99;
        let json = serde_json::to_string(&artifact).unwrap();

        assert!(matches!(
            ModelArtifact::from_json(&json),
            Err(HmmError::IncompatibleVersion { found: 99, expected: FORMAT_VERSION })
        ));
    }

    #[test]
    fn missing_version_tag_is_rejected() {
        assert!(ModelArtifact::from_json("{\"n_states\": 2}").is_err());
    }

    #[test]
    fn tampered_probabilities_fail_validation() {
        let mut artifact = ModelArtifact::from_classifier(&classifier());
        artifact.initial = vec![0.9, 0.9];
        assert!(artifact.into_classifier().is_err());

        let mut artifact = ModelArtifact::from_classifier(&classifier());
        artifact.transition[0] = vec![0.5, 0.1];
        assert!(artifact.into_classifier().is_err());

        let mut artifact = ModelArtifact::from_classifier(&classifier());
        artifact.state_labels = vec![0, 7];
        assert!(artifact.into_classifier().is_err());
    }
}
