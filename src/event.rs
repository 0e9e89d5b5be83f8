//! One trigger's lifecycle: prepare, plan, run, aggregate, record, publish.
//!
//! [`Event::open`] builds the workspace and loads whatever the store already
//! knows about the trigger. [`Event::process`] does the rest. Configuration
//! problems stop the run before any stage executes; a stage failure is
//! reported to the audience and leaves the store as it was; publication
//! problems are logged and never undo the recorded planning state.

use std::path::Path;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    aggregate,
    config::{Config, ConfigError},
    engine::{EngineRequest, MapEngine},
    model::{ParamRecord, SlotWindow, Stage, StrategyPlan, Summary, TriggerEvent},
    notify::{self, Notice, Notifier},
    pipeline::{Driver, RunFailure, RunOutcome},
    publish::{self, ArtifactPublisher, PageGenerator, PublishReport, TriggerList},
    store::{self, Computed, LoadedParams, StoreError},
    strategy::{self, DEFAULT_DISTANCE_MPC, StrategyError},
    time,
    workspace::{Workspace, WorkspaceError},
};

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Run(#[from] Box<RunFailure>),

    #[error("failed to write parameter record: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = core::result::Result<T, ProcessError>;

/// How a run was requested.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    /// Official runs notify the official audience.
    pub official: bool,
    pub window: SlotWindow,

    /// The public trigger list to add the event to, if any.
    pub index: Option<TriggerList>,
}

/// The external collaborators a run talks to.
pub struct Collaborators<'a> {
    pub engine: &'a mut dyn MapEngine,
    pub publisher: &'a mut dyn ArtifactPublisher,
    pub notifier: &'a mut dyn Notifier,
    pub pages: Option<&'a mut dyn PageGenerator>,
}

/// What a completed run left behind.
#[derive(Debug)]
pub struct Processed {
    pub outcome: RunOutcome,
    pub plan: StrategyPlan,
    pub summary: Option<Summary>,
    pub record: ParamRecord,
    pub report: PublishReport,
}

/// A trigger with its workspace ready.
#[derive(Debug)]
pub struct Event {
    pub run_id: Uuid,
    pub trigger: TriggerEvent,
    pub workspace: Workspace,
    pub params: LoadedParams,
    config: Config,
}

impl Event {
    /// Prepare the workspace and load the prior record.
    pub fn open(
        trigger: TriggerEvent,
        master_dir: &Path,
        web_root: &Path,
        config: Config,
    ) -> Result<Self> {
        let run_id = Uuid::new_v4();
        let workspace = Workspace::prepare(&trigger, master_dir, web_root)?;
        workspace.archive_strategy(&config);

        let mut params = store::load(&workspace.param_file, &trigger.trigger_id);
        let upstream = store::load(&workspace.master_param_file(), &trigger.trigger_id);
        store::absorb_upstream(&mut params, &upstream);
        info!(
            %run_id,
            trigger_id = %trigger.trigger_id,
            regime = %trigger.regime,
            has_prior = params.has_prior,
            "event opened"
        );

        Ok(Self {
            run_id,
            trigger,
            workspace,
            params,
            config,
        })
    }

    /// Run the pipeline and record, publish and announce the results.
    pub fn process(
        &mut self,
        options: ProcessOptions,
        collaborators: Collaborators<'_>,
    ) -> Result<Processed> {
        let Collaborators {
            engine,
            publisher,
            notifier,
            pages,
        } = collaborators;

        let recycler_mjd = time::recycler_mjd(self.config.forced_recycler_mjd()?);
        let plan = strategy::select(self.trigger.regime, &self.config)?;
        debug!(?plan, "strategy selected");

        let flags = self.config.control_flags(options.window);
        let request = EngineRequest::new(&self.trigger, &self.workspace, &plan, &self.config);

        let outcome = Driver::new(&mut *engine, &mut *publisher, self.config.skip_plots).run(
            self.run_id,
            &self.workspace,
            &request,
            &flags,
        );
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(failure) => return Err(self.fail(failure, options, notifier)),
        };

        let aggregated = outcome.slots.as_ref().map(|slots| {
            aggregate::aggregate(&self.trigger.trigger_id, &self.workspace.maps_dir, slots)
        });
        let summary = match aggregated {
            Some(Ok(summary)) => Some(summary),
            Some(Err(e)) => {
                let failure = RunFailure::capture(self.run_id, Stage::Aggregate, &e);
                return Err(self.fail(failure, options, notifier));
            }
            None => None,
        };
        if let Some(summary) = &summary {
            info!(
                run_id = %self.run_id,
                integrated_probability = summary.integrated_probability,
                n_hexes = summary.n_hexes,
                best_slot = summary.best_slot,
                "observing record aggregated"
            );
        }

        let record = store::merge(
            &self.params.record,
            &Computed {
                trigger: &self.trigger,
                plan: &plan,
                recycler_mjd,
                code_distance: DEFAULT_DISTANCE_MPC,
                summary,
            },
        );
        store::write(&self.workspace.param_file, &record)?;
        self.params = LoadedParams {
            record: record.clone(),
            has_prior: true,
        };

        let best_slot = record
            .planning
            .as_ref()
            .filter(|p| p.n_slots > 0)
            .map(|p| p.best_slot);
        let report = publish::publish(&self.workspace, best_slot, publisher);

        if let (Some(list), Some(pages)) = (options.index, pages) {
            self.update_site(list, pages, publisher);
        }

        let recipients = self.config.recipients(options.official);
        if recipients.is_empty() {
            debug!("no recipients for the completion notice");
        } else {
            let notice = Notice::completed(
                &self.workspace,
                self.config.site_url.as_deref(),
                self.run_id,
            );
            notify::notify(notifier, &notice, recipients);
        }

        info!(run_id = %self.run_id, stages = ?outcome.stages_run, "run complete");
        Ok(Processed {
            outcome,
            plan,
            summary,
            record,
            report,
        })
    }

    /// Add the trigger to its index and refresh its page. Failures are logged.
    fn update_site(
        &self,
        list: TriggerList,
        pages: &mut dyn PageGenerator,
        publisher: &mut dyn ArtifactPublisher,
    ) {
        let ws = &self.workspace;
        let web_root = &ws.publication.web_root;
        if let Err(e) = publish::update_index(web_root, list, &ws.trigger_id, &ws.root, pages) {
            warn!("could not update the {} trigger index: {e}", list.name());
        }
        if let Err(e) = publish::update_webpage(ws, list, pages, publisher) {
            warn!("could not update the trigger page: {e}");
        }
    }

    /// Report a stopped run to the audience.
    fn fail(
        &self,
        failure: RunFailure,
        options: ProcessOptions,
        notifier: &mut dyn Notifier,
    ) -> ProcessError {
        error!(
            run_id = %failure.run_id,
            stage = %failure.stage,
            location = %failure.location,
            "processing failed: {}",
            failure.cause
        );
        let recipients = self.config.recipients(options.official);
        if !recipients.is_empty() {
            let notice = Notice::processing_error(&self.workspace, &failure);
            notify::notify(notifier, &notice, recipients);
        }
        ProcessError::Run(Box::new(failure))
    }
}
