//! CSV ingestion of pre-extracted feature sequences
//!
//! The expected layout is one feature window per row:
//! `sequence_id,activity,f0,...,f{D-1}`. Windowing, merging, and scaling
//! happen upstream; this module only groups rows into [`Sequence`]s.

use crate::data::Sequence;
use crate::error::{HmmError, Result};
use std::path::Path;

/// Read a feature CSV and group its rows into sequences by `sequence_id`,
/// preserving first-appearance order. An empty `activity` field leaves the
/// sequence unlabeled.
///
/// # Errors
///
/// Fails on malformed CSV, non-numeric feature fields, fewer than three
/// columns, or an id whose rows disagree on the activity label.
pub fn read_sequences_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Sequence>> {
    let mut reader = csv::Reader::from_path(path)?;

    let headers = reader.headers()?.clone();
    if headers.len() < 3 {
        return Err(HmmError::InvalidInput(format!(
            "expected columns sequence_id,activity,f0,..., got {} columns",
            headers.len()
        )));
    }
    let dim = headers.len() - 2;

    // (id, label, rows) per recording, in first-appearance order
    let mut groups: Vec<(String, Option<String>, Vec<Vec<f64>>)> = Vec::new();

    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let id = record[0].to_string();
        let activity = record[1].trim();
        let label = if activity.is_empty() {
            None
        } else {
            Some(activity.to_string())
        };

        let mut features = Vec::with_capacity(dim);
        for field in record.iter().skip(2) {
            let value: f64 = field.trim().parse().map_err(|_| {
                HmmError::InvalidInput(format!(
                    "row {}: feature value {field:?} is not a number",
                    line + 2
                ))
            })?;
            features.push(value);
        }

        match groups.iter_mut().find(|(gid, _, _)| *gid == id) {
            Some((_, glabel, rows)) => {
                if *glabel != label {
                    return Err(HmmError::InvalidInput(format!(
                        "sequence {id} carries conflicting activity labels"
                    )));
                }
                rows.push(features);
            }
            None => groups.push((id, label, vec![features])),
        }
    }

    if groups.is_empty() {
        return Err(HmmError::InvalidInput("CSV contains no data rows".into()));
    }

    groups
        .into_iter()
        .map(|(id, label, rows)| {
            let mut seq = Sequence::from_rows(&rows)?.with_id(id);
            if let Some(label) = label {
                seq = seq.with_label(label);
            }
            Ok(seq)
        })
        .collect()
}

/// Write per-sequence predictions as `sequence_id,predicted_activity` rows.
pub fn write_predictions_csv<P: AsRef<Path>>(path: P, rows: &[(String, String)]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["sequence_id", "predicted_activity"])?;
    for (id, label) in rows {
        writer.write_record([id.as_str(), label.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}
