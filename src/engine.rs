//! The map and hex engine: the numerical side of the pipeline.
//!
//! The recycler never renders maps or picks hexes itself. It hands the engine
//! a request describing the trigger, the plan and where to write, and reads
//! back slot bookkeeping after hex selection.

use std::{
    fs, io,
    path::{Path, PathBuf},
    process::Command,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::Config,
    model::{Regime, SlotResults, SlotWindow, Stage, StrategyPlan, TriggerEvent},
    workspace::Workspace,
};

/// Errors reported by an engine call.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to run {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("{program} {stage} failed ({status}): {stderr}")]
    Failed {
        program: String,
        stage: Stage,
        status: String,
        stderr: String,
    },

    #[error("unreadable slot results: {0}")]
    Results(#[from] serde_json::Error),

    #[error("I/O error")]
    Io(#[from] io::Error),
}

/// The trigger as the engine sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDescriptor {
    pub trigger_id: String,
    pub skymap: PathBuf,
    pub regime: Regime,
    pub resolution: u32,
    pub days_since_burst: f64,
}

/// Where and how the engine should work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineControl {
    pub resolution: u32,
    pub output_dir: PathBuf,
    pub maps_dir: PathBuf,
    pub debug: bool,
    pub all_sky: bool,
    pub skip_all: bool,
    pub one_ring: bool,
    pub strategy: bool,
    pub gif_resolution: f64,
}

/// Everything one engine call needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineRequest {
    pub trigger: TriggerDescriptor,
    pub strategy: StrategyPlan,
    pub control: EngineControl,
}

impl EngineRequest {
    pub fn new(
        trigger: &TriggerEvent,
        workspace: &Workspace,
        plan: &StrategyPlan,
        config: &Config,
    ) -> Self {
        Self {
            trigger: TriggerDescriptor {
                trigger_id: trigger.trigger_id.clone(),
                skymap: workspace.skymap_copy.clone(),
                regime: trigger.regime,
                resolution: config.resolution,
                days_since_burst: config.days_since_burst.unwrap_or(0.0),
            },
            strategy: plan.clone(),
            control: EngineControl {
                resolution: config.resolution,
                output_dir: workspace.root.clone(),
                maps_dir: workspace.maps_dir.clone(),
                debug: config.debug,
                all_sky: config.all_sky,
                skip_all: config.skip_all,
                one_ring: config.one_ring,
                strategy: config.strategy,
                gif_resolution: config.gif_resolution,
            },
        }
    }
}

/// The external map and hex engine.
pub trait MapEngine {
    /// Render per-slot map layers into the maps directory.
    fn make_maps(&mut self, request: &EngineRequest) -> Result<(), EngineError>;

    /// Select hexes, write the observing record, and report slot bookkeeping.
    fn make_hexes(
        &mut self,
        request: &EngineRequest,
        window: SlotWindow,
    ) -> Result<SlotResults, EngineError>;

    /// Write per-slot JSON descriptors into the maps directory.
    fn make_jsons(&mut self, request: &EngineRequest) -> Result<(), EngineError>;

    /// Render per-slot plots and animations into the maps directory.
    fn make_gifs(&mut self, request: &EngineRequest) -> Result<(), EngineError>;
}

/// An engine run as an external program.
///
/// Invoked as `<program> <stage> <request.json> [<start_slot> <slot_count>]`.
/// Hex selection prints its [`SlotResults`] as JSON on stdout.
pub struct CommandEngine {
    program: String,
    request_path: PathBuf,
}

impl CommandEngine {
    /// `request_path` is where the request is written before each call.
    pub fn new(program: impl Into<String>, request_path: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            request_path: request_path.into(),
        }
    }

    fn call(
        &self,
        stage: Stage,
        request: &EngineRequest,
        extra: &[String],
    ) -> Result<String, EngineError> {
        write_request(&self.request_path, request)?;

        let mut args = vec![stage.name().to_string(), self.request_path.display().to_string()];
        args.extend_from_slice(extra);
        debug!("running {} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| EngineError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(EngineError::Failed {
                program: self.program.clone(),
                stage,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl MapEngine for CommandEngine {
    fn make_maps(&mut self, request: &EngineRequest) -> Result<(), EngineError> {
        self.call(Stage::Maps, request, &[]).map(drop)
    }

    fn make_hexes(
        &mut self,
        request: &EngineRequest,
        window: SlotWindow,
    ) -> Result<SlotResults, EngineError> {
        let (start, count) = window.as_sentinel();
        let stdout = self.call(
            Stage::Hexes,
            request,
            &[start.to_string(), count.to_string()],
        )?;
        Ok(serde_json::from_str(stdout.trim())?)
    }

    fn make_jsons(&mut self, request: &EngineRequest) -> Result<(), EngineError> {
        self.call(Stage::Jsons, request, &[]).map(drop)
    }

    fn make_gifs(&mut self, request: &EngineRequest) -> Result<(), EngineError> {
        self.call(Stage::Gifs, request, &[]).map(drop)
    }
}

fn write_request(path: &Path, request: &EngineRequest) -> Result<(), EngineError> {
    let json = serde_json::to_string_pretty(request)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::{config, strategy};

    fn sample_request(dir: &Path) -> EngineRequest {
        let trigger = TriggerEvent {
            trigger_id: "GW190814".into(),
            trigger_dir: "GW190814".into(),
            mjd: 58_709.88,
            skymap: dir.join("GW190814.fits"),
            regime: Regime::NoRemnant,
        };
        let workspace = Workspace::resolve(&trigger, &dir.join("master"), &dir.join("web"));
        let config = config::sample();
        let plan = strategy::select(trigger.regime, &config).unwrap();
        EngineRequest::new(&trigger, &workspace, &plan, &config)
    }

    #[test]
    fn request_points_engine_at_workspace() {
        let dir = TempDir::new().unwrap();
        let request = sample_request(dir.path());

        assert_eq!(
            request.control.maps_dir,
            dir.path().join("master/GW190814/norem/maps")
        );
        assert_eq!(
            request.trigger.skymap,
            dir.path().join("master/GW190814/norem/GW190814.fits")
        );
        assert!((request.trigger.days_since_burst - 0.0).abs() < f64::EPSILON);
        assert_eq!(request.strategy.proposal_id, "2019B-0371");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let dir = TempDir::new().unwrap();
        let request = sample_request(dir.path());
        let mut engine = CommandEngine::new(
            "recycler-engine-that-does-not-exist",
            dir.path().join("request.json"),
        );

        let err = engine.make_maps(&request).unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
        assert!(dir.path().join("request.json").exists());
    }

    #[test]
    fn slot_results_parse_without_ligo_sum() {
        let results: SlotResults =
            serde_json::from_str(r#"{"best_slot": 4, "n_slots": 9, "first_slot": 2}"#).unwrap();
        assert_eq!(results.best_slot, 4);
        assert_eq!(results.sum_ligo_prob, None);
    }
}
