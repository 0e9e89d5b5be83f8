//! Per-trigger workspace on disk.
//!
//! Each skymap processed for a trigger gets its own regime directory:
//!
//! ```text
//! <master_dir>/<trigger_dir>/<hasrem|norem>/
//!   <skymap>                   # copy of the input map
//!   <trigger_id>_params.json   # parameter record
//!   strategy.toml              # configuration snapshot
//!   maps/                      # engine outputs
//!
//! <web_root>/Triggers/<trigger_id>/<hasrem|norem>/
//!   images/
//! ```
//!
//! Every path is a pure function of the inputs. Preparing the same workspace
//! twice resolves to the same paths and leaves existing files alone.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    model::{Regime, TriggerEvent},
};

/// Errors that prevent a workspace from being used.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("cannot derive a trigger directory from skymap path {0}")]
    InvalidSkymap(PathBuf),

    #[error("failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

pub type Result<T> = core::result::Result<T, WorkspaceError>;

/// The public mirror of a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub web_root: PathBuf,

    /// `Triggers/<trigger_id>/<regime>`; JSON archives land here.
    pub root: PathBuf,

    /// Published images and animations.
    pub images_dir: PathBuf,
}

/// Resolved paths for one trigger run.
///
/// Built once by [`Workspace::prepare`] and passed by reference to every stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub trigger_id: String,
    pub trigger_dir: String,
    pub master_dir: PathBuf,

    /// `<master_dir>/<trigger_dir>/<regime>`.
    pub root: PathBuf,
    pub maps_dir: PathBuf,
    pub skymap_copy: PathBuf,
    pub param_file: PathBuf,
    pub strategy_snapshot: PathBuf,
    pub publication: Publication,
}

impl Workspace {
    /// Resolve every path for a trigger without touching the filesystem.
    pub fn resolve(trigger: &TriggerEvent, master_dir: &Path, web_root: &Path) -> Self {
        let regime = trigger.regime.dir_name();
        let root = master_dir.join(&trigger.trigger_dir).join(regime);
        let skymap_name = trigger
            .skymap
            .file_name()
            .map_or_else(|| trigger.trigger_dir.clone().into(), ToOwned::to_owned);
        let publication_root = web_root
            .join("Triggers")
            .join(&trigger.trigger_id)
            .join(regime);

        Self {
            trigger_id: trigger.trigger_id.clone(),
            trigger_dir: trigger.trigger_dir.clone(),
            master_dir: master_dir.to_path_buf(),
            maps_dir: root.join("maps"),
            skymap_copy: root.join(skymap_name),
            param_file: root.join(param_file_name(&trigger.trigger_id)),
            strategy_snapshot: root.join("strategy.toml"),
            root,
            publication: Publication {
                web_root: web_root.to_path_buf(),
                images_dir: publication_root.join("images"),
                root: publication_root,
            },
        }
    }

    /// Create the workspace and its publication mirror.
    ///
    /// Directory creation failures are fatal. A missing prior parameter file
    /// is expected on a first run and only logged.
    ///
    /// The `.processing` marker is advisory. Callers must not start a second
    /// run for a trigger while one is in flight; nothing here locks.
    pub fn prepare(trigger: &TriggerEvent, master_dir: &Path, web_root: &Path) -> Result<Self> {
        let workspace = Self::resolve(trigger, master_dir, web_root);

        mark_processing(&trigger.skymap);

        create_dir(&workspace.root)?;
        create_dir(&workspace.maps_dir)?;
        create_dir(&workspace.publication.root)?;
        create_dir(&workspace.publication.images_dir)?;

        workspace.copy_skymap(&trigger.skymap)?;
        workspace.copy_prior_params();

        info!(
            trigger_id = %workspace.trigger_id,
            root = %workspace.root.display(),
            "workspace ready"
        );
        Ok(workspace)
    }

    /// Archive the configuration this run used. Failure is logged, not fatal.
    pub fn archive_strategy(&self, config: &Config) {
        let snapshot = match config.snapshot() {
            Ok(s) => s,
            Err(e) => {
                warn!("could not serialize strategy snapshot: {e}");
                return;
            }
        };
        match fs::write(&self.strategy_snapshot, snapshot) {
            Ok(()) => debug!("archived strategy to {}", self.strategy_snapshot.display()),
            Err(e) => warn!(
                "could not write strategy snapshot {}: {e}",
                self.strategy_snapshot.display()
            ),
        }
    }

    /// The shared parameter file other tools drop next to the trigger directories.
    pub fn master_param_file(&self) -> PathBuf {
        self.master_dir.join(param_file_name(&self.trigger_id))
    }

    /// Where the engine request is written before each engine call.
    pub fn engine_request(&self) -> PathBuf {
        self.root.join("engine_request.json")
    }

    /// `<trigger_id>_<trigger_dir>_JSON.zip` inside `maps/`.
    pub fn json_archive(&self) -> PathBuf {
        self.maps_dir.join(format!(
            "{}_{}_JSON.zip",
            self.trigger_id, self.trigger_dir
        ))
    }

    /// `<trigger_id>_<trigger_dir>_trigger.html` in the master directory.
    pub fn trigger_page(&self) -> PathBuf {
        self.master_dir.join(format!(
            "{}_{}_trigger.html",
            self.trigger_id, self.trigger_dir
        ))
    }

    /// Copy the input map in, skipping the copy when an identical one is present.
    fn copy_skymap(&self, skymap: &Path) -> Result<()> {
        if self.skymap_copy.as_path() == skymap {
            return Ok(());
        }
        if self.skymap_copy.is_file()
            && let (Ok(have), Ok(want)) = (file_digest(&self.skymap_copy), file_digest(skymap))
            && have == want
        {
            debug!("skymap already in workspace ({have})");
            return Ok(());
        }
        fs::copy(skymap, &self.skymap_copy).map_err(|source| WorkspaceError::Copy {
            from: skymap.to_path_buf(),
            to: self.skymap_copy.clone(),
            source,
        })?;
        Ok(())
    }

    /// Seed the workspace record from the shared parameter file.
    ///
    /// An existing workspace record holds the planning of earlier runs and is
    /// never replaced; later upstream values are folded in by the caller.
    fn copy_prior_params(&self) {
        let source = self.master_param_file();
        if !source.is_file() {
            debug!("no prior parameter file at {}", source.display());
            return;
        }
        if self.param_file.exists() {
            debug!("keeping workspace record {}", self.param_file.display());
            return;
        }
        if let Err(e) = fs::copy(&source, &self.param_file) {
            warn!(
                "could not copy prior parameters {} to {}: {e}",
                source.display(),
                self.param_file.display()
            );
        }
    }
}

/// Build the trigger for a skymap, deriving its directory name from the file name.
pub fn trigger_for_skymap(
    skymap: &Path,
    trigger_id: &str,
    mjd: f64,
    regime: Regime,
) -> Result<TriggerEvent> {
    Ok(TriggerEvent {
        trigger_id: trigger_id.to_string(),
        trigger_dir: trigger_dir_from_skymap(skymap)?,
        mjd,
        skymap: skymap.to_path_buf(),
        regime,
    })
}

/// The skymap's base name up to its first `.`.
///
/// `/data/GW190814.fits.gz` → `GW190814`.
pub fn trigger_dir_from_skymap(skymap: &Path) -> Result<String> {
    skymap
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .and_then(|n| n.split('.').next())
        .filter(|stem| !stem.is_empty())
        .map(ToOwned::to_owned)
        .ok_or_else(|| WorkspaceError::InvalidSkymap(skymap.to_path_buf()))
}

fn param_file_name(trigger_id: &str) -> String {
    format!("{trigger_id}_params.json")
}

/// Drop a `<skymap>.processing` marker next to the input.
///
/// Signals other consumers that the map is claimed. Not a lock.
fn mark_processing(skymap: &Path) {
    let mut marker = skymap.as_os_str().to_owned();
    marker.push(".processing");
    let marker = PathBuf::from(marker);
    let touched = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&marker);
    if let Err(e) = touched {
        warn!("could not mark {} as processing: {e}", skymap.display());
    }
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|source| WorkspaceError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        master: PathBuf,
        web: PathBuf,
        trigger: TriggerEvent,
    }

    fn fixture(regime: Regime) -> Fixture {
        let dir = TempDir::new().unwrap();
        let incoming = dir.path().join("incoming");
        fs::create_dir_all(&incoming).unwrap();
        let skymap = incoming.join("GW190814.fits");
        fs::write(&skymap, b"SIMPLE  =                    T").unwrap();

        let trigger = trigger_for_skymap(&skymap, "GW190814", 58_709.88, regime).unwrap();
        Fixture {
            master: dir.path().join("master"),
            web: dir.path().join("web"),
            _dir: dir,
            trigger,
        }
    }

    #[test]
    fn derives_trigger_dir_from_file_name() {
        assert_eq!(
            trigger_dir_from_skymap(Path::new("/data/GW190814.fits")).unwrap(),
            "GW190814"
        );
        assert_eq!(
            trigger_dir_from_skymap(Path::new("S200105ae_bayestar.fits.gz")).unwrap(),
            "S200105ae_bayestar"
        );
        assert!(trigger_dir_from_skymap(Path::new("/")).is_err());
    }

    #[test]
    fn layout_follows_regime() {
        let fx = fixture(Regime::NoRemnant);
        let ws = Workspace::prepare(&fx.trigger, &fx.master, &fx.web).unwrap();

        assert_eq!(ws.root, fx.master.join("GW190814").join("norem"));
        assert!(ws.maps_dir.is_dir());
        assert!(ws.skymap_copy.is_file());
        assert_eq!(
            ws.publication.images_dir,
            fx.web.join("Triggers/GW190814/norem/images")
        );
        assert!(ws.publication.images_dir.is_dir());
        assert_eq!(
            ws.json_archive(),
            ws.maps_dir.join("GW190814_GW190814_JSON.zip")
        );
    }

    #[test]
    fn marks_skymap_as_processing() {
        let fx = fixture(Regime::HasRemnant);
        Workspace::prepare(&fx.trigger, &fx.master, &fx.web).unwrap();

        let marker = fx.trigger.skymap.with_file_name("GW190814.fits.processing");
        assert!(marker.exists());
    }

    #[test]
    fn prepare_is_idempotent() {
        let fx = fixture(Regime::HasRemnant);
        let first = Workspace::prepare(&fx.trigger, &fx.master, &fx.web).unwrap();

        let foreign = first.maps_dir.join("GW190814-3-ligo-eq.png");
        fs::write(&foreign, b"png").unwrap();
        let notes = first.root.join("notes.txt");
        fs::write(&notes, b"keep me").unwrap();

        let second = Workspace::prepare(&fx.trigger, &fx.master, &fx.web).unwrap();

        assert_eq!(first, second);
        assert!(foreign.exists());
        assert_eq!(fs::read(&notes).unwrap(), b"keep me");
    }

    #[test]
    fn first_run_without_prior_params_is_tolerated() {
        let fx = fixture(Regime::NoRemnant);
        let ws = Workspace::prepare(&fx.trigger, &fx.master, &fx.web).unwrap();

        assert!(!ws.param_file.exists());
    }

    #[test]
    fn copies_prior_params_from_master_dir() {
        let fx = fixture(Regime::NoRemnant);
        fs::create_dir_all(&fx.master).unwrap();
        fs::write(fx.master.join("GW190814_params.json"), b"{}").unwrap();

        let ws = Workspace::prepare(&fx.trigger, &fx.master, &fx.web).unwrap();
        assert_eq!(fs::read(&ws.param_file).unwrap(), b"{}");
    }

    #[test]
    fn existing_workspace_record_is_not_replaced() {
        let fx = fixture(Regime::NoRemnant);
        fs::create_dir_all(&fx.master).unwrap();
        fs::write(fx.master.join("GW190814_params.json"), b"{}").unwrap();
        let ws = Workspace::prepare(&fx.trigger, &fx.master, &fx.web).unwrap();

        fs::write(&ws.param_file, br#"{"nHexes": 2}"#).unwrap();
        Workspace::prepare(&fx.trigger, &fx.master, &fx.web).unwrap();

        assert_eq!(fs::read(&ws.param_file).unwrap(), br#"{"nHexes": 2}"#);
    }

    #[test]
    fn changed_skymap_is_recopied() {
        let fx = fixture(Regime::NoRemnant);
        let ws = Workspace::prepare(&fx.trigger, &fx.master, &fx.web).unwrap();

        fs::write(&fx.trigger.skymap, b"updated map").unwrap();
        Workspace::prepare(&fx.trigger, &fx.master, &fx.web).unwrap();

        assert_eq!(fs::read(&ws.skymap_copy).unwrap(), b"updated map");
    }

    #[test]
    fn missing_skymap_is_fatal() {
        let fx = fixture(Regime::NoRemnant);
        fs::remove_file(&fx.trigger.skymap).unwrap();

        let err = Workspace::prepare(&fx.trigger, &fx.master, &fx.web).unwrap_err();
        assert!(matches!(err, WorkspaceError::Copy { .. }));
    }

    #[test]
    fn archives_strategy_snapshot() {
        let fx = fixture(Regime::NoRemnant);
        let ws = Workspace::prepare(&fx.trigger, &fx.master, &fx.web).unwrap();

        ws.archive_strategy(&crate::config::sample());
        let snapshot = fs::read_to_string(&ws.strategy_snapshot).unwrap();
        assert!(snapshot.contains("propid_BH"));
    }
}
