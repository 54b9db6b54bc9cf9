//! Activity classification on top of a fitted parameter set

use crate::data::Sequence;
use crate::error::{HmmError, Result};
use crate::models::{
    forward_backward, viterbi, BaumWelchTrainer, DecodedPath, HmmParams, TrainConfig, TrainSummary,
};

/// Fixed assignment from hidden states to activity labels.
///
/// Learned once at training time: each state takes the majority ground-truth
/// label among the training frames assigned to it by posterior (gamma)
/// argmax. Labels are enumerated in order of first appearance in the
/// training corpus, and majority ties resolve to the lowest label index, so
/// the assignment is deterministic.
#[derive(Debug, Clone)]
pub struct StateLabelMap {
    labels: Vec<String>,
    state_to_label: Vec<usize>,
}

impl StateLabelMap {
    /// Learn the state-to-label assignment from labeled training sequences.
    ///
    /// # Errors
    ///
    /// Fails if any sequence is missing a ground-truth label, or on any
    /// decoding error from the underlying forward-backward pass.
    pub fn fit(params: &HmmParams, sequences: &[Sequence]) -> Result<Self> {
        if sequences.is_empty() {
            return Err(HmmError::InvalidInput("no training sequences given".into()));
        }

        let mut labels: Vec<String> = Vec::new();
        let mut label_indices = Vec::with_capacity(sequences.len());
        for seq in sequences {
            let label = seq.label().ok_or_else(|| {
                HmmError::InvalidInput(format!(
                    "sequence {} has no ground-truth label",
                    seq.id().unwrap_or("<unnamed>")
                ))
            })?;
            let idx = match labels.iter().position(|l| l == label) {
                Some(idx) => idx,
                None => {
                    labels.push(label.to_string());
                    labels.len() - 1
                }
            };
            label_indices.push(idx);
        }

        let k = params.n_states();
        let mut counts = vec![vec![0usize; labels.len()]; k];
        for (seq, &label_idx) in sequences.iter().zip(&label_indices) {
            let fb = forward_backward(params, seq.observations())?;
            for t in 0..seq.len() {
                let row = fb.gamma.row(t);
                let mut best_state = 0;
                let mut best_prob = f64::NEG_INFINITY;
                for (s, &p) in row.iter().enumerate() {
                    if p > best_prob {
                        best_prob = p;
                        best_state = s;
                    }
                }
                counts[best_state][label_idx] += 1;
            }
        }

        // Majority vote per state; `>` keeps the lowest label index on ties,
        // and a state that attracted no frames falls back to label 0.
        let state_to_label = counts
            .iter()
            .map(|per_label| {
                let mut best = 0;
                let mut best_count = per_label[0];
                for (idx, &count) in per_label.iter().enumerate().skip(1) {
                    if count > best_count {
                        best_count = count;
                        best = idx;
                    }
                }
                best
            })
            .collect();

        Ok(Self {
            labels,
            state_to_label,
        })
    }

    /// Rebuild a map from persisted parts.
    pub fn from_parts(labels: Vec<String>, state_to_label: Vec<usize>) -> Result<Self> {
        if labels.is_empty() {
            return Err(HmmError::InvalidInput("label list is empty".into()));
        }
        if let Some(&bad) = state_to_label.iter().find(|&&idx| idx >= labels.len()) {
            return Err(HmmError::InvalidInput(format!(
                "state label index {bad} out of range for {} labels",
                labels.len()
            )));
        }
        Ok(Self {
            labels,
            state_to_label,
        })
    }

    /// Known activity labels, in training enumeration order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Per-state label indices.
    pub fn state_to_label(&self) -> &[usize] {
        &self.state_to_label
    }

    /// Number of hidden states covered by the map.
    pub fn n_states(&self) -> usize {
        self.state_to_label.len()
    }

    /// Label assigned to a hidden state.
    pub fn label_of(&self, state: usize) -> &str {
        &self.labels[self.state_to_label[state]]
    }
}

/// One classified sequence.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Activity label of the sequence's dominant state
    pub label: String,
    /// Decoded state path backing the label
    pub path: DecodedPath,
}

/// Sequence classifier: a fitted parameter set plus its state-label map.
#[derive(Debug, Clone)]
pub struct ActivityClassifier {
    params: HmmParams,
    label_map: StateLabelMap,
}

impl ActivityClassifier {
    /// Combine a fitted parameter set with a label map.
    pub fn new(params: HmmParams, label_map: StateLabelMap) -> Result<Self> {
        if label_map.n_states() != params.n_states() {
            return Err(HmmError::InvalidInput(format!(
                "label map covers {} states, model has {}",
                label_map.n_states(),
                params.n_states()
            )));
        }
        Ok(Self { params, label_map })
    }

    /// Train parameters and learn the label map in one pass.
    pub fn train(
        init: HmmParams,
        sequences: &[Sequence],
        config: TrainConfig,
    ) -> Result<(Self, TrainSummary)> {
        let trainer = BaumWelchTrainer::new(config);
        let (params, summary) = trainer.fit(init, sequences)?;
        let label_map = StateLabelMap::fit(&params, sequences)?;
        Ok((Self { params, label_map }, summary))
    }

    /// Fitted parameter set.
    pub fn params(&self) -> &HmmParams {
        &self.params
    }

    /// State-to-label assignment.
    pub fn label_map(&self) -> &StateLabelMap {
        &self.label_map
    }

    /// Decode one sequence and map its dominant state to a label.
    pub fn predict(&self, sequence: &Sequence) -> Result<Prediction> {
        let path = viterbi(&self.params, sequence.observations())?;

        // Majority state over the decoded path; lowest index wins ties
        let mut counts = vec![0usize; self.params.n_states()];
        for &s in &path.states {
            counts[s] += 1;
        }
        let mut dominant = 0;
        let mut best = counts[0];
        for (s, &c) in counts.iter().enumerate().skip(1) {
            if c > best {
                best = c;
                dominant = s;
            }
        }

        Ok(Prediction {
            label: self.label_map.label_of(dominant).to_string(),
            path,
        })
    }

    /// Classify several sequences independently.
    pub fn predict_batch(&self, sequences: &[Sequence]) -> Result<Vec<Prediction>> {
        sequences.iter().map(|seq| self.predict(seq)).collect()
    }

    /// Per-frame labels for one sequence.
    pub fn frame_labels(&self, sequence: &Sequence) -> Result<Vec<&str>> {
        let path = viterbi(&self.params, sequence.observations())?;
        Ok(path
            .states
            .iter()
            .map(|&s| self.label_map.label_of(s))
            .collect())
    }
}
