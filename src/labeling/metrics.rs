//! Evaluation counts for labeled corpora

use super::classifier::ActivityClassifier;
use crate::data::Sequence;
use crate::error::{HmmError, Result};
use std::fmt;

/// Accuracy and confusion counts from one evaluation pass.
#[derive(Debug, Clone)]
pub struct EvalReport {
    /// Label vocabulary: the classifier's labels plus any evaluation-only
    /// ground-truth labels appended at the end
    pub labels: Vec<String>,
    pub n_sequences: usize,
    pub sequence_correct: usize,
    pub n_frames: usize,
    pub frame_correct: usize,
    /// confusion[true_label][predicted_label], counted per sequence
    pub confusion: Vec<Vec<usize>>,
}

impl EvalReport {
    pub fn sequence_accuracy(&self) -> f64 {
        if self.n_sequences == 0 {
            return 0.0;
        }
        self.sequence_correct as f64 / self.n_sequences as f64
    }

    pub fn frame_accuracy(&self) -> f64 {
        if self.n_frames == 0 {
            return 0.0;
        }
        self.frame_correct as f64 / self.n_frames as f64
    }
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "sequences: {}/{} correct ({:.1}%)",
            self.sequence_correct,
            self.n_sequences,
            self.sequence_accuracy() * 100.0
        )?;
        writeln!(
            f,
            "frames:    {}/{} correct ({:.1}%)",
            self.frame_correct,
            self.n_frames,
            self.frame_accuracy() * 100.0
        )?;
        writeln!(f, "confusion (rows = truth, cols = predicted):")?;
        let width = self
            .labels
            .iter()
            .map(|l| l.len())
            .max()
            .unwrap_or(0)
            .max(5);
        write!(f, "{:width$} ", "")?;
        for label in &self.labels {
            write!(f, "{label:>width$} ")?;
        }
        writeln!(f)?;
        for (i, row) in self.confusion.iter().enumerate() {
            write!(f, "{:width$} ", self.labels[i])?;
            for count in row {
                write!(f, "{count:>width$} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Classify every sequence and tally accuracy against ground-truth labels.
///
/// Frame counts compare each frame's mapped label against the sequence's
/// ground-truth label (recordings are labeled as a whole).
pub fn evaluate(classifier: &ActivityClassifier, sequences: &[Sequence]) -> Result<EvalReport> {
    let mut labels: Vec<String> = classifier.label_map().labels().to_vec();
    let mut confusion = vec![vec![0usize; labels.len()]; labels.len()];

    let mut n_sequences = 0;
    let mut sequence_correct = 0;
    let mut n_frames = 0;
    let mut frame_correct = 0;

    for seq in sequences {
        let truth = seq.label().ok_or_else(|| {
            HmmError::InvalidInput(format!(
                "sequence {} has no ground-truth label",
                seq.id().unwrap_or("<unnamed>")
            ))
        })?;

        let truth_idx = match labels.iter().position(|l| l == truth) {
            Some(idx) => idx,
            None => {
                labels.push(truth.to_string());
                for row in &mut confusion {
                    row.push(0);
                }
                confusion.push(vec![0; labels.len()]);
                labels.len() - 1
            }
        };

        let pred = classifier.predict(seq)?;
        let pred_idx = labels
            .iter()
            .position(|l| l == &pred.label)
            .expect("predicted label comes from the classifier vocabulary");

        n_sequences += 1;
        if pred.label == truth {
            sequence_correct += 1;
        }
        confusion[truth_idx][pred_idx] += 1;

        for &state in &pred.path.states {
            n_frames += 1;
            if classifier.label_map().label_of(state) == truth {
                frame_correct += 1;
            }
        }
    }

    Ok(EvalReport {
        labels,
        n_sequences,
        sequence_correct,
        n_frames,
        frame_correct,
        confusion,
    })
}
