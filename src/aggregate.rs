//! Observing record aggregation.
//!
//! Hex selection leaves `<trigger_id>-ra-dec-id-prob-mjd-slot-dist.txt` in
//! `maps/`: one whitespace-separated row per selected hex, `#` for comments.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::model::{ObservationRow, SlotResults, Summary};

const COLUMNS: usize = 7;

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("failed to read observing record {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("{path}:{line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// Where the engine writes the observing record.
pub fn observing_record_path(maps_dir: &Path, trigger_id: &str) -> PathBuf {
    maps_dir.join(format!("{trigger_id}-ra-dec-id-prob-mjd-slot-dist.txt"))
}

/// Summarize what the run selected.
///
/// With no observable slots, or no record on disk, the summary is zero;
/// neither is an error.
pub fn aggregate(
    trigger_id: &str,
    maps_dir: &Path,
    slots: &SlotResults,
) -> Result<Summary, AggregateError> {
    if slots.n_slots <= 0 {
        info!("{trigger_id}: nothing observable tonight");
        return Ok(Summary::zero(slots));
    }

    let path = observing_record_path(maps_dir, trigger_id);
    if !path.is_file() {
        warn!("no observing record at {}", path.display());
        return Ok(Summary::zero(slots));
    }

    let rows = read_observing_record(&path)?;
    let integrated_probability: f64 = rows.iter().map(|r| r.probability).sum();

    if let Some(total) = slots.sum_ligo_prob {
        debug!("map probability {total:.3}, observed probability {integrated_probability:.3}");
    }

    Ok(Summary {
        integrated_probability,
        n_hexes: rows.len(),
        best_slot: slots.best_slot,
        n_slots: slots.n_slots,
        first_slot: slots.first_slot,
    })
}

/// Read every row of an observing record.
pub fn read_observing_record(path: &Path) -> Result<Vec<ObservationRow>, AggregateError> {
    let contents = fs::read_to_string(path).map_err(|source| AggregateError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut rows = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = parse_row(line).map_err(|reason| AggregateError::Malformed {
            path: path.to_path_buf(),
            line: index + 1,
            reason,
        })?;
        rows.push(row);
    }
    Ok(rows)
}

fn parse_row(line: &str) -> Result<ObservationRow, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != COLUMNS {
        return Err(format!("expected {COLUMNS} columns, found {}", fields.len()));
    }

    let number = |i: usize, name: &str| {
        fields[i]
            .parse::<f64>()
            .map_err(|e| format!("{name} '{}': {e}", fields[i]))
    };

    let slot = number(5, "slot")?;
    if slot.fract().abs() > f64::EPSILON {
        return Err(format!("slot '{}' is not a whole number", fields[5]));
    }

    Ok(ObservationRow {
        ra: number(0, "ra")?,
        dec: number(1, "dec")?,
        id: fields[2].to_string(),
        probability: number(3, "probability")?,
        mjd: number(4, "mjd")?,
        slot: slot as i64,
        distance: number(6, "distance")?,
    })
}
