//! Event parameter store: the durable per-trigger record.
//!
//! One JSON document per trigger, `<trigger_id>_params.json`, rewritten in full
//! after every completed run. Loading never fails: a missing, unreadable or
//! foreign file yields a record where every astrophysical field is unknown.

use std::{fs, io, path::Path};

use tracing::{debug, warn};

use crate::model::{Measured, ParamRecord, Planning, StrategyPlan, Summary, TriggerEvent};

/// Errors that can occur while writing the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, StoreError>;

/// A record as loaded at the start of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedParams {
    pub record: ParamRecord,

    /// Whether a prior record for this trigger was found.
    pub has_prior: bool,
}

/// What the current run computed, ready to be folded into the record.
#[derive(Debug, Clone, Copy)]
pub struct Computed<'a> {
    pub trigger: &'a TriggerEvent,
    pub plan: &'a StrategyPlan,
    pub recycler_mjd: f64,
    pub code_distance: f64,

    /// `None` when hex selection did not run.
    pub summary: Option<Summary>,
}

/// Load the record for `trigger_id`, or the unknown record if there is none.
pub fn load(path: &Path, trigger_id: &str) -> LoadedParams {
    let sentinel = || LoadedParams {
        record: ParamRecord::unknown(trigger_id),
        has_prior: false,
    };

    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("no parameter file at {}", path.display());
            return sentinel();
        }
        Err(e) => {
            warn!("could not read parameter file {}: {e}", path.display());
            return sentinel();
        }
    };

    let mut record: ParamRecord = match serde_json::from_str(&json) {
        Ok(record) => record,
        Err(e) => {
            warn!("ignoring unreadable parameter file {}: {e}", path.display());
            return sentinel();
        }
    };

    if record.trigger_id.is_empty() {
        record.trigger_id = trigger_id.to_string();
    } else if record.trigger_id != trigger_id {
        warn!(
            "parameter file {} belongs to {}, not {trigger_id}",
            path.display(),
            record.trigger_id
        );
        return sentinel();
    }

    LoadedParams {
        record,
        has_prior: true,
    }
}

/// Replace the record on disk.
///
/// The record is written to a sibling temporary file and renamed over the
/// old one, so readers see either the previous or the new record.
///
/// Writers are not serialized. At most one run per trigger may be in flight;
/// the `.processing` marker left next to the skymap is how other consumers
/// learn that a run holds it.
pub fn write(path: &Path, record: &ParamRecord) -> Result<()> {
    let mut json = serde_json::to_string_pretty(record)?;
    json.push('\n');

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Fold a run's results into the prior record.
///
/// Astrophysical fields are carried through untouched. Planning fields are
/// replaced when the run selected hexes and kept otherwise.
pub fn merge(prior: &ParamRecord, computed: &Computed<'_>) -> ParamRecord {
    let Computed {
        trigger,
        plan,
        recycler_mjd,
        code_distance,
        summary,
    } = *computed;

    let planning = summary.map_or_else(
        || prior.planning.clone(),
        |summary| {
            Some(Planning {
                regime: plan.regime,
                best_slot: summary.best_slot,
                n_slots: summary.n_slots,
                first_slot: summary.first_slot,
                integrated_probability: summary.integrated_probability,
                ligo_probability: 0.0,
                n_hexes: summary.n_hexes,
                exposure_times: plan.exposure_length.clone(),
                exposure_filter: plan.filter_list.clone(),
                exposure_tiling: plan.tiling_list.clone(),
                proposal_id: plan.proposal_id.clone(),
                hours: plan.time_budget_hours,
                code_distance,
            })
        },
    );

    ParamRecord {
        trigger_id: prior.trigger_id.clone(),
        mjd: Measured::Known(trigger.mjd),
        recycler_mjd: Measured::Known(recycler_mjd),
        skymap: Some(trigger.skymap.clone()),
        astro: prior.astro.clone(),
        planning,
        extra: prior.extra.clone(),
    }
}

/// Fold a record dropped by upstream tools into the workspace record.
///
/// Upstream owns the astrophysical values, so every value it knows wins.
/// Planning stays with the workspace record. Upstream keys we do not model
/// are added when the workspace record lacks them.
pub fn absorb_upstream(loaded: &mut LoadedParams, upstream: &LoadedParams) {
    if !upstream.has_prior {
        return;
    }
    loaded.record.astro.absorb(&upstream.record.astro);
    for (key, value) in &upstream.record.extra {
        loaded
            .record
            .extra
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    loaded.has_prior = true;
}
