//! Observing record rows and the summary computed from them.

use serde::{Deserialize, Serialize};

/// One selected hex, as written by the hex-selection engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    pub ra: f64,
    pub dec: f64,
    pub id: String,
    pub probability: f64,
    pub mjd: f64,
    pub slot: i64,
    pub distance: f64,
}

/// Slot bookkeeping reported by the engine after hex selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotResults {
    pub best_slot: i64,
    pub n_slots: i64,
    pub first_slot: i64,

    /// Total map probability, when the engine reports it.
    #[serde(default)]
    pub sum_ligo_prob: Option<f64>,
}

/// What a run observed, summarized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub integrated_probability: f64,
    pub n_hexes: usize,
    pub best_slot: i64,
    pub n_slots: i64,
    pub first_slot: i64,
}

impl Summary {
    /// Nothing observable: zero probability, zero hexes.
    pub fn zero(slots: &SlotResults) -> Self {
        Self {
            integrated_probability: 0.0,
            n_hexes: 0,
            best_slot: slots.best_slot,
            n_slots: slots.n_slots,
            first_slot: slots.first_slot,
        }
    }
}
