//! Strategy selection: turn a regime and configuration into an observing plan.
//!
//! Each regime reads its own suffixed keys (`_Rem` for has-remnant, `_BH` for
//! no-remnant). Nothing is shared between branches and nothing defaults: a
//! missing branch key aborts the run before any stage executes.

use crate::{
    config::Config,
    model::{InvalidClassification, Regime, StrategyPlan},
};

/// Hours of telescope time available to a single trigger.
///
/// Fixed for both regimes. A per-regime budget derived from event rates and
/// weather losses would replace this constant.
pub const TIME_BUDGET_HOURS: f64 = 20.0;

/// Distance handed to the planner when no estimate is wired in, in Mpc.
pub const DEFAULT_DISTANCE_MPC: f64 = 1.0;

/// Errors that abort planning before any stage runs.
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error(transparent)]
    InvalidClassification(#[from] InvalidClassification),

    #[error("missing required config key `{0}`")]
    MissingKey(&'static str),
}

/// Parse a classification (`hasrem`, `norem`, `true`, `false`) into a regime.
pub fn classify(classification: &str) -> Result<Regime, StrategyError> {
    Ok(classification.parse()?)
}

/// Select the plan for a regime from its configuration branch.
pub fn select(regime: Regime, config: &Config) -> Result<StrategyPlan, StrategyError> {
    let branch = match regime {
        Regime::HasRemnant => Branch {
            exposure_length: required(&config.exposure_length_rem, "exposure_length_Rem")?,
            filter_list: required(&config.exposure_filter_rem, "exposure_filter_Rem")?,
            max_hexes_per_slot: *required(&config.max_hexes_per_slot_rem, "maxHexesPerSlot_Rem")?,
            tiling_list: required(&config.exposure_tiling_rem, "exposure_tiling_Rem")?,
            proposal_id: required(&config.propid_rem, "propid_Rem")?,
        },
        Regime::NoRemnant => Branch {
            exposure_length: required(&config.exposure_length_bh, "exposure_length_BH")?,
            filter_list: required(&config.exposure_filter_bh, "exposure_filter_BH")?,
            max_hexes_per_slot: *required(&config.max_hexes_per_slot_bh, "maxHexesPerSlot_BH")?,
            tiling_list: required(&config.exposure_tiling_bh, "exposure_tiling_BH")?,
            proposal_id: required(&config.propid_bh, "propid_BH")?,
        },
    };

    Ok(StrategyPlan {
        regime,
        camera: config.camera.clone(),
        exposure_length: branch.exposure_length.clone(),
        filter_list: branch.filter_list.clone(),
        tiling_list: branch.tiling_list.clone(),
        max_hexes_per_slot: branch.max_hexes_per_slot,
        max_hexes_to_do: config.max_number_of_hexes_to_do,
        time_budget_hours: TIME_BUDGET_HOURS,
        proposal_id: branch.proposal_id.clone(),
        kasen_fraction: config.kasen_fraction,
    })
}

/// Borrowed view of one regime's keys.
struct Branch<'a> {
    exposure_length: &'a Vec<f64>,
    filter_list: &'a Vec<String>,
    max_hexes_per_slot: u32,
    tiling_list: &'a Vec<u32>,
    proposal_id: &'a String,
}

fn required<'a, T>(value: &'a Option<T>, key: &'static str) -> Result<&'a T, StrategyError> {
    value.as_ref().ok_or(StrategyError::MissingKey(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config;

    #[test]
    fn has_remnant_draws_from_rem_keys() {
        let plan = select(Regime::HasRemnant, &config::sample()).unwrap();

        assert_eq!(plan.regime, Regime::HasRemnant);
        assert_eq!(plan.exposure_length, vec![60.0, 90.0]);
        assert_eq!(plan.filter_list, vec!["i", "z"]);
        assert_eq!(plan.max_hexes_per_slot, 6);
        assert_eq!(plan.tiling_list, vec![0, 1]);
        assert_eq!(plan.proposal_id, "2019B-0372");
    }

    #[test]
    fn no_remnant_draws_from_bh_keys() {
        let plan = select(Regime::NoRemnant, &config::sample()).unwrap();

        assert_eq!(plan.regime, Regime::NoRemnant);
        assert_eq!(plan.exposure_length, vec![90.0]);
        assert_eq!(plan.filter_list, vec!["r"]);
        assert_eq!(plan.max_hexes_per_slot, 18);
        assert_eq!(plan.tiling_list, vec![10]);
        assert_eq!(plan.proposal_id, "2019B-0371");
    }

    #[test]
    fn budget_is_fixed_across_branches() {
        let config = config::sample();
        let rem = select(Regime::HasRemnant, &config).unwrap();
        let bh = select(Regime::NoRemnant, &config).unwrap();

        assert!((rem.time_budget_hours - TIME_BUDGET_HOURS).abs() < f64::EPSILON);
        assert!((bh.time_budget_hours - TIME_BUDGET_HOURS).abs() < f64::EPSILON);
        assert_eq!(rem.max_hexes_to_do, 1000);
    }

    #[test]
    fn branch_does_not_fall_back_to_other_branch() {
        let mut config = config::sample();
        config.propid_bh = None;

        let err = select(Regime::NoRemnant, &config).unwrap_err();
        assert!(matches!(err, StrategyError::MissingKey("propid_BH")));

        // The other branch is unaffected.
        assert!(select(Regime::HasRemnant, &config).is_ok());
    }

    #[test]
    fn classify_rejects_anything_else() {
        assert_eq!(classify("norem").unwrap(), Regime::NoRemnant);
        assert_eq!(classify("hasrem").unwrap(), Regime::HasRemnant);

        let err = classify("bns").unwrap_err();
        assert!(matches!(err, StrategyError::InvalidClassification(_)));
    }
}
