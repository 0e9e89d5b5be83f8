//! Output formatting for CLI display.

use crate::{
    model::{ParamRecord, Stage, StrategyPlan, Summary},
    time,
};

/// Stages that ran, in order.
pub(super) fn format_stages(stages: &[Stage]) -> String {
    if stages.is_empty() {
        return "none".to_string();
    }
    stages
        .iter()
        .map(|s| s.name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// One line describing what hex selection picked.
pub(super) fn format_summary(summary: Option<&Summary>) -> String {
    match summary {
        None => "hexes not selected this run".to_string(),
        Some(s) if s.n_slots <= 0 => "nothing observable".to_string(),
        Some(s) => format!(
            "{} hex(es), probability {:.4}, best slot {} of {} (first {})",
            s.n_hexes, s.integrated_probability, s.best_slot, s.n_slots, s.first_slot
        ),
    }
}

/// Short human-readable description of a stored record.
pub(super) fn format_record(record: &ParamRecord, has_prior: bool) -> String {
    let origin = if has_prior { "stored" } else { "no prior record" };
    let mjd = match record.mjd.known().copied() {
        Some(mjd) => match time::mjd_to_timestamp(mjd) {
            Some(ts) => format!("MJD {mjd:.5} ({ts:.0})"),
            None => format!("MJD {mjd:.5}"),
        },
        None => "MJD unknown".to_string(),
    };
    let astro = format!("{}/9 astro fields", record.astro.known_fields());
    let planning = match &record.planning {
        Some(p) => format!("{} hex(es) planned ({})", p.n_hexes, p.regime),
        None => "not planned".to_string(),
    };
    format!("{} [{origin}]  {mjd}  {astro}  {planning}", record.trigger_id)
}

/// The plan a run used.
pub(super) fn format_plan(plan: &StrategyPlan) -> String {
    format!(
        "{} {} filters [{}] exposures {:?} s, {} h",
        plan.regime,
        plan.proposal_id,
        plan.filter_list.join(", "),
        plan.exposure_length,
        plan.time_budget_hours
    )
}
