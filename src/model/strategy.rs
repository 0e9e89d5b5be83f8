//! Strategy plan: the resolved exposure and tiling parameters for one run.

use serde::{Deserialize, Serialize};

use super::Regime;

/// Everything the engine needs to know about how to observe.
///
/// Derived from configuration on every run, never persisted as primary state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPlan {
    /// The branch this plan was drawn from.
    pub regime: Regime,

    pub camera: String,

    /// Exposure time per filter, in seconds.
    pub exposure_length: Vec<f64>,
    pub filter_list: Vec<String>,
    pub tiling_list: Vec<u32>,
    pub max_hexes_per_slot: u32,
    pub max_hexes_to_do: u32,
    pub time_budget_hours: f64,
    pub proposal_id: String,
    pub kasen_fraction: f64,
}
