//! CLI interface for the recycler.
//!
//! Each subcommand is non-interactive: arguments in, a short report out.
//!
//! - `recycler process <skymap> ...` runs one trigger's full lifecycle.
//! - `recycler params <file>` shows what the parameter store holds.
//! - `recycler index <trigger_id> <work_area>` lists a trigger on the site.

mod format;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{
    config::Config,
    engine::CommandEngine,
    event::{Collaborators, Event, ProcessOptions},
    model::SlotWindow,
    notify::CommandNotifier,
    publish::{self, CommandPageGenerator, PageGenerator, ShellPublisher, TriggerList},
    store, strategy, workspace,
};

use format::{format_plan, format_record, format_stages, format_summary};

/// Delivers notices when `notify_command` is not configured.
const DEFAULT_NOTIFY_COMMAND: &str = "mail";

/// Recycler: plan follow-up observations for gravitational-wave triggers.
#[derive(Debug, Parser)]
#[command(name = "recycler", after_long_help = WORKFLOW_HELP)]
pub struct Cli {
    /// Config file. Overrides `RECYCLER_CONFIG` and the default locations.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

const WORKFLOW_HELP: &str = r#"Workflow: a new skymap arrives
  1. recycler process /data/S190814bv/GW190814.fits \
       --trigger-id S190814bv --mjd 58709.88 \
       --master-dir /data/triggers --regime norem --index real --official
  2. recycler params /data/triggers/GW190814/norem/S190814bv_params.json

Rerun hex selection over slots 3..5 only:
  recycler process GW190814.fits --trigger-id S190814bv --mjd 58709.88 \
    --master-dir /data/triggers --regime norem --start-slot 3 --slot-count 3"#;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process one skymap: plan, run the enabled stages, record, publish.
    Process(ProcessArgs),

    /// Show a parameter record, or the unknown record if there is none.
    ///
    /// Prints the record as JSON on stdout and a one-line summary on stderr.
    Params {
        /// Parameter file (`<trigger_id>_params.json`).
        path: PathBuf,

        /// Trigger the record should belong to. Defaults to the one in the file name.
        #[arg(long)]
        trigger_id: Option<String>,
    },

    /// Add a trigger to a public trigger list and regenerate its index page.
    Index {
        trigger_id: String,

        /// Workspace listed next to the trigger.
        work_area: PathBuf,

        #[arg(long, value_enum)]
        kind: ListArg,

        /// Web root. Overrides `WEB` and the `web_root` key.
        #[arg(long)]
        web_root: Option<PathBuf>,
    },
}

impl Command {
    /// Whether the command reads `recycler.toml`.
    pub fn needs_config(&self) -> bool {
        !matches!(self, Self::Params { .. })
    }
}

#[derive(Debug, Args)]
pub struct ProcessArgs {
    /// Sky-localization map.
    skymap: PathBuf,

    #[arg(long)]
    trigger_id: String,

    /// Event time as a Modified Julian Date.
    #[arg(long)]
    mjd: f64,

    /// Directory holding every trigger's workspace.
    #[arg(long)]
    master_dir: PathBuf,

    /// `hasrem` or `norem` (`true` and `false` are accepted).
    #[arg(long)]
    regime: String,

    /// Notify the official audience instead of the test list.
    #[arg(long)]
    official: bool,

    /// Public trigger list to add the event to.
    #[arg(long, value_enum)]
    index: Option<ListArg>,

    /// First slot for hex selection; negative selects the whole night.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    start_slot: i64,

    /// Number of slots; negative selects the whole night.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    slot_count: i64,

    /// Web root. Overrides `WEB` and the `web_root` key.
    #[arg(long)]
    web_root: Option<PathBuf>,
}

/// CLI-facing trigger list, mapped to the domain `TriggerList`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ListArg {
    /// Real alerts.
    Real,
    /// Simulations and tests.
    Sim,
}

impl ListArg {
    fn to_domain(self) -> TriggerList {
        match self {
            Self::Real => TriggerList::Real,
            Self::Sim => TriggerList::Sim,
        }
    }
}

/// Run the CLI, returning an error message on failure.
pub fn run(cli: Cli, config: Option<Config>) -> Result<(), String> {
    match cli.command {
        Command::Process(args) => cmd_process(require_config(config)?, args),
        Command::Params { path, trigger_id } => cmd_params(&path, trigger_id.as_deref()),
        Command::Index {
            trigger_id,
            work_area,
            kind,
            web_root,
        } => cmd_index(
            &require_config(config)?,
            &trigger_id,
            &work_area,
            kind,
            web_root,
        ),
    }
}

fn require_config(config: Option<Config>) -> Result<Config, String> {
    config.ok_or_else(|| "this command requires a config file".to_string())
}

fn cmd_process(config: Config, args: ProcessArgs) -> Result<(), String> {
    let regime = strategy::classify(&args.regime).map_err(|e| e.to_string())?;
    let web_root = config
        .resolve_web_root(args.web_root.as_deref())
        .map_err(|e| e.to_string())?;
    let engine_program = config
        .engine_command
        .clone()
        .ok_or("config is missing `engine_command`")?;
    let notify_program = config
        .notify_command
        .clone()
        .unwrap_or_else(|| DEFAULT_NOTIFY_COMMAND.to_string());
    let index = args.index.map(ListArg::to_domain);
    let mut pages = match (&config.page_command, index) {
        (Some(program), _) => Some(CommandPageGenerator::new(program.clone())),
        (None, Some(_)) => return Err("--index requires `page_command` in the config".to_string()),
        (None, None) => None,
    };

    let trigger = workspace::trigger_for_skymap(&args.skymap, &args.trigger_id, args.mjd, regime)
        .map_err(|e| e.to_string())?;
    let mut event = Event::open(trigger, &args.master_dir, &web_root, config)
        .map_err(|e| format!("failed to open event: {e}"))?;

    let mut engine = CommandEngine::new(engine_program, event.workspace.engine_request());
    let mut publisher = ShellPublisher;
    let mut notifier = CommandNotifier::new(notify_program);

    let options = ProcessOptions {
        official: args.official,
        window: SlotWindow::from_sentinel(args.start_slot, args.slot_count),
        index,
    };
    let processed = event
        .process(
            options,
            Collaborators {
                engine: &mut engine,
                publisher: &mut publisher,
                notifier: &mut notifier,
                pages: pages.as_mut().map(|p| p as &mut dyn PageGenerator),
            },
        )
        .map_err(|e| format!("processing {} failed: {e}", event.trigger.trigger_id))?;

    eprintln!(
        "Run {} for {} ({})",
        event.run_id, event.trigger.trigger_id, event.trigger.regime
    );
    eprintln!("Plan: {}", format_plan(&processed.plan));
    eprintln!("Stages: {}", format_stages(&processed.outcome.stages_run));
    eprintln!("Hexes: {}", format_summary(processed.summary.as_ref()));
    eprintln!(
        "Published {} file(s), {} failed",
        processed.report.published.len(),
        processed.report.failed.len()
    );
    eprintln!(
        "Record: {}",
        format_record(&processed.record, event.params.has_prior)
    );
    println!("{}", event.workspace.param_file.display());
    Ok(())
}

fn cmd_params(path: &Path, trigger_id: Option<&str>) -> Result<(), String> {
    let trigger_id = match trigger_id {
        Some(id) => id,
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix("_params.json"))
            .ok_or("cannot tell the trigger from the file name; pass --trigger-id")?,
    };
    let loaded = store::load(path, trigger_id);
    let json = serde_json::to_string_pretty(&loaded.record)
        .map_err(|e| format!("failed to serialize record: {e}"))?;

    println!("{json}");
    eprintln!("{}", format_record(&loaded.record, loaded.has_prior));
    Ok(())
}

fn cmd_index(
    config: &Config,
    trigger_id: &str,
    work_area: &Path,
    kind: ListArg,
    web_root: Option<PathBuf>,
) -> Result<(), String> {
    let web_root = config
        .resolve_web_root(web_root.as_deref())
        .map_err(|e| e.to_string())?;
    let program = config
        .page_command
        .clone()
        .ok_or("config is missing `page_command`")?;
    let list = kind.to_domain();
    let appended = publish::update_index(
        &web_root,
        list,
        trigger_id,
        work_area,
        &mut CommandPageGenerator::new(program),
    )
    .map_err(|e| format!("failed to update {} index: {e}", list.name()))?;

    if appended {
        eprintln!("Added {trigger_id} to {}", list.file_name());
    } else {
        eprintln!("{trigger_id} already listed in {}", list.file_name());
    }
    Ok(())
}
