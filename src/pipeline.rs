//! Pipeline driver: runs the enabled stages in fixed order.
//!
//! `maps → hexes → jsons → gifs`. Each stage is gated by its control flag.
//! The first stage that fails stops the run; its error is classified into a
//! single [`RunFailure`] carrying the stage, cause, and the location and
//! backtrace of the point where the error was raised.
//! Copying and archiving artifacts are publication steps: they are logged
//! when they fail and never stop the run.

use std::{
    backtrace::Backtrace,
    error::Error as StdError,
    fs, io,
    panic::Location,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    engine::{EngineError, EngineRequest, MapEngine},
    model::{ControlFlags, SlotResults, Stage},
    publish::{ArtifactPublisher, FRAME_DELAY, PublishError},
    workspace::Workspace,
};

/// What went wrong inside a stage.
#[derive(Debug, thiserror::Error)]
enum Fault {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("I/O error")]
    Io(#[from] io::Error),
}

/// A stage error and the place it was raised.
///
/// Converting into this with `?` records the location of the `?` and a
/// backtrace from there.
#[derive(Debug)]
struct StageError {
    fault: Fault,
    location: &'static Location<'static>,
    trace: Backtrace,
}

impl StageError {
    #[track_caller]
    fn raise(fault: Fault) -> Self {
        Self {
            fault,
            location: Location::caller(),
            trace: Backtrace::force_capture(),
        }
    }
}

impl From<EngineError> for StageError {
    #[track_caller]
    fn from(e: EngineError) -> Self {
        Self::raise(e.into())
    }
}

impl From<PublishError> for StageError {
    #[track_caller]
    fn from(e: PublishError) -> Self {
        Self::raise(e.into())
    }
}

impl From<io::Error> for StageError {
    #[track_caller]
    fn from(e: io::Error) -> Self {
        Self::raise(e.into())
    }
}

/// A run that stopped at a stage.
#[derive(Debug, thiserror::Error)]
#[error("run {run_id} failed in {stage} at {location}: {cause}")]
pub struct RunFailure {
    pub run_id: Uuid,
    pub stage: Stage,
    pub cause: String,
    pub location: String,
    pub trace: String,
}

impl RunFailure {
    /// Classify an error raised by the caller itself.
    #[track_caller]
    pub fn capture(run_id: Uuid, stage: Stage, error: &dyn StdError) -> Self {
        Self {
            run_id,
            stage,
            cause: error_chain(error),
            location: Location::caller().to_string(),
            trace: Backtrace::force_capture().to_string(),
        }
    }

    fn from_stage(run_id: Uuid, stage: Stage, error: &StageError) -> Self {
        Self {
            run_id,
            stage,
            cause: error_chain(&error.fault),
            location: error.location.to_string(),
            trace: error.trace.to_string(),
        }
    }
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_id: Uuid,

    /// Stages that ran, in order.
    pub stages_run: Vec<Stage>,

    /// Slot bookkeeping, when hexes ran.
    pub slots: Option<SlotResults>,

    /// The JSON archive, when one was written.
    pub archive: Option<PathBuf>,

    /// The observing-plot animation, when one was composed.
    pub animation: Option<PathBuf>,
}

/// Drives one run against an engine and a publisher.
pub struct Driver<'a> {
    engine: &'a mut dyn MapEngine,
    publisher: &'a mut dyn ArtifactPublisher,
    skip_plots: bool,
}

impl<'a> Driver<'a> {
    pub fn new(
        engine: &'a mut dyn MapEngine,
        publisher: &'a mut dyn ArtifactPublisher,
        skip_plots: bool,
    ) -> Self {
        Self {
            engine,
            publisher,
            skip_plots,
        }
    }

    /// Run every enabled stage in order, stopping at the first failure.
    pub fn run(
        &mut self,
        run_id: Uuid,
        workspace: &Workspace,
        request: &EngineRequest,
        flags: &ControlFlags,
    ) -> Result<RunOutcome, RunFailure> {
        let mut outcome = RunOutcome {
            run_id,
            stages_run: Vec::new(),
            slots: None,
            archive: None,
            animation: None,
        };

        for stage in Stage::PIPELINE {
            if !flags.enabled(stage) {
                debug!(%run_id, %stage, "stage disabled");
                continue;
            }
            info!(%run_id, %stage, "stage starting");

            if let Err(e) = self.run_stage(stage, workspace, request, flags, &mut outcome) {
                let failure = RunFailure::from_stage(run_id, stage, &e);
                warn!(
                    %run_id,
                    %stage,
                    location = %failure.location,
                    "stage failed: {}",
                    failure.cause
                );
                return Err(failure);
            }
            outcome.stages_run.push(stage);
        }

        Ok(outcome)
    }

    fn run_stage(
        &mut self,
        stage: Stage,
        workspace: &Workspace,
        request: &EngineRequest,
        flags: &ControlFlags,
        outcome: &mut RunOutcome,
    ) -> Result<(), StageError> {
        match stage {
            Stage::Maps => self.engine.make_maps(request)?,
            Stage::Hexes => outcome.slots = Some(self.engine.make_hexes(request, flags.window)?),
            Stage::Jsons => outcome.archive = self.make_jsons(workspace, request)?,
            Stage::Gifs => outcome.animation = self.make_gifs(workspace, request)?,
            Stage::Aggregate => {}
        }
        Ok(())
    }

    /// Package the per-slot JSON descriptors and ship the archive.
    fn make_jsons(
        &mut self,
        workspace: &Workspace,
        request: &EngineRequest,
    ) -> Result<Option<PathBuf>, StageError> {
        self.engine.make_jsons(request)?;

        let maps = &workspace.maps_dir;
        purge_tmp(maps)?;

        let archive = workspace.json_archive();
        if archive.exists() {
            fs::remove_file(&archive)?;
        }

        let descriptors = json_descriptors(maps)?;
        if descriptors.is_empty() {
            info!("no JSON descriptors in {}, nothing to archive", maps.display());
            return Ok(None);
        }

        if let Err(e) = self.publisher.archive(&descriptors, &archive) {
            warn!("could not archive JSON descriptors: {e}");
            return Ok(None);
        }

        if let Some(name) = archive.file_name() {
            let dest = workspace.publication.root.join(name);
            if let Err(e) = self.publisher.copy(&archive, &dest) {
                warn!("could not publish {}: {e}", archive.display());
            }
        }
        Ok(Some(archive))
    }

    /// Render plots and compose the observing-plot animation.
    fn make_gifs(
        &mut self,
        workspace: &Workspace,
        request: &EngineRequest,
    ) -> Result<Option<PathBuf>, StageError> {
        self.engine.make_gifs(request)?;

        if self.skip_plots {
            debug!("observing plots skipped");
            return Ok(None);
        }

        let frames = observing_plot_frames(&workspace.maps_dir, &workspace.trigger_id)?;
        if frames.is_empty() {
            info!("no observing-plot frames to animate");
            return Ok(None);
        }

        let animation = workspace
            .maps_dir
            .join(format!("{}-observingPlot.gif", workspace.trigger_id));
        self.publisher
            .compose_animation(&frames, &animation, FRAME_DELAY)?;
        Ok(Some(animation))
    }
}

/// Observing-plot frames `<trigger_id>-observingPlot-<n>.png`, in frame order.
///
/// Ordering is numeric, so frame 10 follows frame 9. Gaps are fine.
pub fn observing_plot_frames(maps_dir: &Path, trigger_id: &str) -> io::Result<Vec<PathBuf>> {
    let prefix = format!("{trigger_id}-observingPlot-");
    let mut frames: Vec<(u32, PathBuf)> = Vec::new();

    for entry in fs::read_dir(maps_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let number = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".png"))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(number) = number {
            frames.push((number, path));
        }
    }

    frames.sort_by_key(|(number, _)| *number);
    Ok(frames.into_iter().map(|(_, path)| path).collect())
}

/// Remove leftover `-tmp` files from an interrupted engine run.
fn purge_tmp(maps_dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(maps_dir)? {
        let path = entry?.path();
        let is_tmp = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.contains("-tmp"));
        if is_tmp && path.is_file() {
            debug!("removing stale {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Every `.json` file in the maps directory, sorted by name.
fn json_descriptors(maps_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(maps_dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// `outer: inner: innermost` for an error and its sources.
fn error_chain(error: &dyn StdError) -> String {
    let mut chain = error.to_string();
    let mut source = error.source();
    while let Some(e) = source {
        // Messages that already end with their source are not repeated.
        let text = e.to_string();
        if !chain.ends_with(&text) {
            chain.push_str(": ");
            chain.push_str(&text);
        }
        source = e.source();
    }
    chain
}


#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::{
        config,
        model::{Regime, SlotWindow, TriggerEvent},
        publish::testing::{Call, RecordingPublisher},
        strategy,
    };

    use super::testing::FakeEngine;

    fn all_stages() -> ControlFlags {
        ControlFlags {
            make_maps: true,
            make_hexes: true,
            make_jsons: true,
            make_gifs: true,
            window: SlotWindow::WholeNight,
        }
    }

    fn setup(dir: &Path) -> (Workspace, EngineRequest) {
        let skymap = dir.join("GW190814.fits");
        fs::write(&skymap, b"map").unwrap();
        let trigger = TriggerEvent {
            trigger_id: "GW190814".into(),
            trigger_dir: "GW190814".into(),
            mjd: 58_709.88,
            skymap,
            regime: Regime::NoRemnant,
        };
        let ws = Workspace::prepare(&trigger, &dir.join("master"), &dir.join("web")).unwrap();
        let config = config::sample();
        let plan = strategy::select(trigger.regime, &config).unwrap();
        let request = EngineRequest::new(&trigger, &ws, &plan, &config);
        (ws, request)
    }

    #[test]
    fn runs_enabled_stages_in_order() {
        let dir = TempDir::new().unwrap();
        let (ws, request) = setup(dir.path());
        let mut engine = FakeEngine::default();
        let mut publisher = RecordingPublisher::default();

        let outcome = Driver::new(&mut engine, &mut publisher, false)
            .run(Uuid::nil(), &ws, &request, &all_stages())
            .unwrap();

        assert_eq!(engine.calls, Stage::PIPELINE.to_vec());
        assert_eq!(outcome.stages_run, Stage::PIPELINE.to_vec());
        assert_eq!(outcome.slots.unwrap().best_slot, 2);
        assert_eq!(outcome.archive, Some(ws.json_archive()));
        assert!(outcome.animation.is_some());
    }

    #[test]
    fn disabled_jsons_produce_no_archive() {
        let dir = TempDir::new().unwrap();
        let (ws, request) = setup(dir.path());
        let mut engine = FakeEngine::default();
        let mut publisher = RecordingPublisher::default();
        let flags = ControlFlags {
            make_jsons: false,
            ..all_stages()
        };

        let outcome = Driver::new(&mut engine, &mut publisher, false)
            .run(Uuid::nil(), &ws, &request, &flags)
            .unwrap();

        assert_eq!(engine.calls, vec![Stage::Maps, Stage::Hexes, Stage::Gifs]);
        assert_eq!(outcome.archive, None);
        assert!(publisher.archives().is_empty());
        assert!(!ws.json_archive().exists());
        assert!(
            !ws.publication
                .root
                .join("GW190814_GW190814_JSON.zip")
                .exists()
        );
    }

    #[test]
    fn jsons_purge_tmp_and_ship_archive() {
        let dir = TempDir::new().unwrap();
        let (ws, request) = setup(dir.path());
        let mut engine = FakeEngine::default();
        let mut publisher = RecordingPublisher::default();
        let flags = ControlFlags {
            make_jsons: true,
            ..ControlFlags::default()
        };

        Driver::new(&mut engine, &mut publisher, false)
            .run(Uuid::nil(), &ws, &request, &flags)
            .unwrap();

        assert!(!ws.maps_dir.join("GW190814-3-tmp.json").exists());
        let archives = publisher.archives();
        assert_eq!(archives.len(), 1);
        let Call::Archive { files, dest } = archives[0] else {
            unreachable!()
        };
        assert_eq!(
            files,
            &vec![
                ws.maps_dir.join("GW190814-1-0.json"),
                ws.maps_dir.join("GW190814-2-0.json"),
            ]
        );
        assert_eq!(dest, &ws.json_archive());
        assert!(ws.json_archive().is_file());
        assert!(
            ws.publication
                .root
                .join("GW190814_GW190814_JSON.zip")
                .is_file()
        );
    }

    #[test]
    fn failure_stops_remaining_stages() {
        let dir = TempDir::new().unwrap();
        let (ws, request) = setup(dir.path());
        let mut engine = FakeEngine {
            fail_at: Some(Stage::Hexes),
            ..FakeEngine::default()
        };
        let mut publisher = RecordingPublisher::default();
        let run_id = Uuid::new_v4();

        let failure = Driver::new(&mut engine, &mut publisher, false)
            .run(run_id, &ws, &request, &all_stages())
            .unwrap_err();

        assert_eq!(engine.calls, vec![Stage::Maps, Stage::Hexes]);
        assert_eq!(failure.stage, Stage::Hexes);
        assert_eq!(failure.run_id, run_id);
        assert!(failure.cause.contains("healpix resolution mismatch"));
        assert!(failure.location.contains("pipeline.rs"));
        assert!(!failure.trace.is_empty());
        assert!(publisher.calls.is_empty());
    }

    #[test]
    fn frames_are_ordered_numerically_with_gaps() {
        let dir = TempDir::new().unwrap();
        for n in [10, 2, 1, 7] {
            fs::write(dir.path().join(format!("S1-observingPlot-{n}.png")), b"png").unwrap();
        }
        fs::write(dir.path().join("S1-observingPlot.gif"), b"gif").unwrap();
        fs::write(dir.path().join("S1-observingPlot-x.png"), b"png").unwrap();

        let frames = observing_plot_frames(dir.path(), "S1").unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            [
                "S1-observingPlot-1.png",
                "S1-observingPlot-2.png",
                "S1-observingPlot-7.png",
                "S1-observingPlot-10.png",
            ]
        );
    }

    #[test]
    fn gifs_compose_frames_in_numeric_order() {
        let dir = TempDir::new().unwrap();
        let (ws, request) = setup(dir.path());
        let mut engine = FakeEngine::default();
        let mut publisher = RecordingPublisher::default();
        let flags = ControlFlags {
            make_gifs: true,
            ..ControlFlags::default()
        };

        let outcome = Driver::new(&mut engine, &mut publisher, false)
            .run(Uuid::nil(), &ws, &request, &flags)
            .unwrap();

        let animation = ws.maps_dir.join("GW190814-observingPlot.gif");
        assert_eq!(outcome.animation, Some(animation.clone()));
        assert_eq!(
            publisher.calls,
            vec![Call::Animate {
                frames: [1, 2, 10]
                    .iter()
                    .map(|n| ws.maps_dir.join(format!("GW190814-observingPlot-{n}.png")))
                    .collect(),
                dest: animation,
            }]
        );
    }

    #[test]
    fn skip_plots_leaves_frames_alone() {
        let dir = TempDir::new().unwrap();
        let (ws, request) = setup(dir.path());
        let mut engine = FakeEngine::default();
        let mut publisher = RecordingPublisher::default();
        let flags = ControlFlags {
            make_gifs: true,
            ..ControlFlags::default()
        };

        let outcome = Driver::new(&mut engine, &mut publisher, true)
            .run(Uuid::nil(), &ws, &request, &flags)
            .unwrap();

        assert_eq!(outcome.animation, None);
        assert!(publisher.calls.is_empty());
    }

    #[test]
    fn error_chain_includes_sources_once() {
        let outer = Fault::Engine(EngineError::Io(io::Error::other("disk full")));
        assert_eq!(error_chain(&outer), "I/O error: disk full");

        let spawn = EngineError::Spawn {
            program: "recycler-engine".into(),
            source: io::Error::other("not found"),
        };
        assert_eq!(error_chain(&spawn), "failed to run recycler-engine: not found");
    }

    #[test]
    fn failure_location_points_at_the_failing_stage() {
        let dir = TempDir::new().unwrap();
        let (ws, request) = setup(dir.path());
        let mut failures = Vec::new();
        for stage in [Stage::Maps, Stage::Hexes] {
            let mut engine = FakeEngine {
                fail_at: Some(stage),
                ..FakeEngine::default()
            };
            let mut publisher = RecordingPublisher::default();
            let failure = Driver::new(&mut engine, &mut publisher, false)
                .run(Uuid::nil(), &ws, &request, &all_stages())
                .unwrap_err();
            failures.push(failure);
        }

        assert!(failures[0].location.contains("pipeline.rs"));
        assert_ne!(failures[0].location, failures[1].location);
        assert!(failures.iter().all(|f| !f.trace.is_empty()));
    }
}
