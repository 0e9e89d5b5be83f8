//! Site maintenance: trigger indices and generated pages.
//!
//! Index files are flat text at the web root, one `<trigger_id> <work_area>`
//! line per trigger, appended once per trigger and never rewritten.

use std::{
    fs, io,
    path::{Path, PathBuf},
    process::Command,
};

// Trait must be in scope for `.write_all()` on `File`.
use io::Write;

use tracing::{info, warn};

use crate::workspace::Workspace;

use super::{ArtifactPublisher, PublishError};

/// Which public trigger list an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerList {
    Real,
    Sim,
}

impl TriggerList {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Real => "real-trigger_list.txt",
            Self::Sim => "test-trigger_list.txt",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::Sim => "sim",
        }
    }
}

/// Inputs for rendering one trigger's page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerPage {
    pub master_dir: PathBuf,
    pub out_html: PathBuf,
    pub trigger_id: String,
    pub param_file: PathBuf,
    pub trigger_dir: String,
    pub list: TriggerList,
}

/// The external page generator.
pub trait PageGenerator {
    fn make_index_page(&mut self, web_root: &Path, list: TriggerList) -> Result<(), PublishError>;

    fn make_trigger_page(&mut self, page: &TriggerPage) -> Result<(), PublishError>;
}

/// Page generator run as an external program.
///
/// Invoked as `<program> index <web_root> <real|sim>` or
/// `<program> trigger <out_html> <trigger_id> <param_file> <trigger_dir> <real|sim>`.
pub struct CommandPageGenerator {
    program: String,
}

impl CommandPageGenerator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[String]) -> Result<(), PublishError> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| PublishError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(PublishError::Failed {
                program: self.program.clone(),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

impl PageGenerator for CommandPageGenerator {
    fn make_index_page(&mut self, web_root: &Path, list: TriggerList) -> Result<(), PublishError> {
        self.run(&[
            "index".to_string(),
            web_root.display().to_string(),
            list.name().to_string(),
        ])
    }

    fn make_trigger_page(&mut self, page: &TriggerPage) -> Result<(), PublishError> {
        self.run(&[
            "trigger".to_string(),
            page.out_html.display().to_string(),
            page.trigger_id.clone(),
            page.param_file.display().to_string(),
            page.trigger_dir.clone(),
            page.list.name().to_string(),
        ])
    }
}

/// Add a trigger to its index and regenerate the index page.
///
/// Returns whether a new line was appended; a trigger already listed is left as is.
pub fn update_index(
    web_root: &Path,
    list: TriggerList,
    trigger_id: &str,
    work_area: &Path,
    pages: &mut dyn PageGenerator,
) -> Result<bool, PublishError> {
    let path = web_root.join(list.file_name());
    let appended = append_once(&path, trigger_id, work_area).map_err(|source| PublishError::Io {
        path: path.clone(),
        source,
    })?;
    if appended {
        info!("added {trigger_id} to {}", path.display());
    }
    pages.make_index_page(web_root, list)?;
    Ok(appended)
}

/// Render the trigger page and copy it, with the run log, to the site.
///
/// The page generator is required; the copies are best-effort.
pub fn update_webpage(
    workspace: &Workspace,
    list: TriggerList,
    pages: &mut dyn PageGenerator,
    publisher: &mut dyn ArtifactPublisher,
) -> Result<(), PublishError> {
    let page = TriggerPage {
        master_dir: workspace.master_dir.clone(),
        out_html: workspace.trigger_page(),
        trigger_id: workspace.trigger_id.clone(),
        param_file: workspace.param_file.clone(),
        trigger_dir: workspace.trigger_dir.clone(),
        list,
    };
    pages.make_trigger_page(&page)?;

    let mut copies = Vec::new();
    if let Some(name) = page.out_html.file_name() {
        copies.push((page.out_html.clone(), workspace.publication.web_root.join(name)));
    }
    let log_name = format!("{}_recycler.log", workspace.trigger_dir);
    let log = workspace
        .master_dir
        .join(&workspace.trigger_dir)
        .join(&log_name);
    if log.is_file() {
        copies.push((log, workspace.publication.root.join(log_name)));
    }

    for (from, to) in copies {
        if let Err(e) = publisher.copy(&from, &to) {
            warn!("could not copy {} to the site: {e}", from.display());
        }
    }
    Ok(())
}

/// Append `<trigger_id> <work_area>` unless the trigger is already listed.
fn append_once(path: &Path, trigger_id: &str, work_area: &Path) -> io::Result<bool> {
    let existing = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };
    let listed = existing
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|id| id == trigger_id);
    if listed {
        return Ok(false);
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let line = format!("{trigger_id} {}\n", work_area.display());
    file.write_all(line.as_bytes())?;
    Ok(true)
}
