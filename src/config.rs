//! Recycler configuration.
//!
//! Loaded from `recycler.toml`. Keys keep the names the observing team already
//! uses (`exposure_length_Rem`, `maxHexesPerSlot_BH`, ...).
//!
//! The file is located through a chain:
//!
//! 1. `--config <path>`: explicit per-command override
//! 2. `RECYCLER_CONFIG` env var
//! 3. `$ROOT_DIR/recycler.toml`: the deployment's checkout
//! 4. `~/.recycler/recycler.toml`

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::model::{ControlFlags, SlotWindow};

/// Errors raised while locating or reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no config file found; pass --config, set RECYCLER_CONFIG, or create {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("missing required config key `{0}`")]
    MissingKey(&'static str),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Recycler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Use `recycler_mjd` instead of the current time as the processing time.
    #[serde(default)]
    pub force_recycler_mjd: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recycler_mjd: Option<f64>,

    #[serde(default)]
    pub debug: bool,

    pub camera: String,

    /// Map resolution handed to the engine.
    pub resolution: u32,

    #[serde(rename = "allSky", default)]
    pub all_sky: bool,

    #[serde(rename = "skipAll", default)]
    pub skip_all: bool,

    /// Skip composing the observing-plot animation.
    #[serde(rename = "skipPlots", default)]
    pub skip_plots: bool,

    pub kasen_fraction: f64,

    pub do_make_maps: bool,
    pub do_make_hexes: bool,
    pub do_make_jsons: bool,
    pub do_make_gifs: bool,

    #[serde(default)]
    pub strategy: bool,

    #[serde(default)]
    pub one_ring: bool,

    // ── Has-remnant branch ──
    #[serde(rename = "exposure_length_Rem", default)]
    pub exposure_length_rem: Option<Vec<f64>>,

    #[serde(rename = "exposure_filter_Rem", default)]
    pub exposure_filter_rem: Option<Vec<String>>,

    #[serde(rename = "maxHexesPerSlot_Rem", default)]
    pub max_hexes_per_slot_rem: Option<u32>,

    #[serde(rename = "exposure_tiling_Rem", default)]
    pub exposure_tiling_rem: Option<Vec<u32>>,

    #[serde(rename = "propid_Rem", default)]
    pub propid_rem: Option<String>,

    // ── No-remnant branch ──
    #[serde(rename = "exposure_length_BH", default)]
    pub exposure_length_bh: Option<Vec<f64>>,

    #[serde(rename = "exposure_filter_BH", default)]
    pub exposure_filter_bh: Option<Vec<String>>,

    #[serde(rename = "maxHexesPerSlot_BH", default)]
    pub max_hexes_per_slot_bh: Option<u32>,

    #[serde(rename = "exposure_tiling_BH", default)]
    pub exposure_tiling_bh: Option<Vec<u32>>,

    #[serde(rename = "propid_BH", default)]
    pub propid_bh: Option<String>,

    pub max_number_of_hexes_to_do: u32,

    pub gif_resolution: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_since_burst: Option<f64>,

    // ── Deployment ──
    /// Root of the public web area. Overridden by `WEB`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_root: Option<PathBuf>,

    /// Base URL the web root is served under, for notices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,

    /// Program implementing the map and hex engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_command: Option<String>,

    /// Program that delivers notices; receives the body on stdin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_command: Option<String>,

    /// Program that renders trigger and index pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_command: Option<String>,

    #[serde(default)]
    pub official_recipients: Vec<String>,

    #[serde(default)]
    pub test_recipients: Vec<String>,
}

impl Config {
    /// Load config from an explicit path or the resolution chain.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = Self::resolve_path(explicit)?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Resolve which config file to read.
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        // 1. Explicit --config flag.
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }

        // 2. RECYCLER_CONFIG environment variable.
        if let Ok(path) = env::var("RECYCLER_CONFIG")
            && !path.is_empty()
        {
            return Ok(PathBuf::from(path));
        }

        // 3. The deployment checkout.
        if let Ok(root) = env::var("ROOT_DIR") {
            let path = Path::new(&root).join("recycler.toml");
            if path.exists() {
                return Ok(path);
            }
        }

        // 4. ~/.recycler/recycler.toml.
        let path = Self::default_path()
            .ok_or_else(|| ConfigError::NotFound(PathBuf::from("~/.recycler/recycler.toml")))?;
        if path.exists() {
            Ok(path)
        } else {
            Err(ConfigError::NotFound(path))
        }
    }

    /// The fallback config file path: `~/.recycler/recycler.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".recycler").join("recycler.toml"))
    }

    /// Resolve the public web root: explicit flag, then `WEB`, then `web_root`.
    pub fn resolve_web_root(&self, explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Ok(web) = env::var("WEB")
            && !web.is_empty()
        {
            return Ok(PathBuf::from(web));
        }
        self.web_root
            .clone()
            .ok_or(ConfigError::MissingKey("web_root"))
    }

    /// Forced processing time, if configured.
    pub fn forced_recycler_mjd(&self) -> Result<Option<f64>, ConfigError> {
        if !self.force_recycler_mjd {
            return Ok(None);
        }
        self.recycler_mjd
            .map(Some)
            .ok_or(ConfigError::MissingKey("recycler_mjd"))
    }

    pub fn control_flags(&self, window: SlotWindow) -> ControlFlags {
        ControlFlags {
            make_maps: self.do_make_maps,
            make_hexes: self.do_make_hexes,
            make_jsons: self.do_make_jsons,
            make_gifs: self.do_make_gifs,
            window,
        }
    }

    /// The resolved configuration as TOML, archived with each workspace.
    pub fn snapshot(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The recipients for a notice.
    pub fn recipients(&self, official: bool) -> &[String] {
        if official {
            &self.official_recipients
        } else {
            &self.test_recipients
        }
    }
}

#[cfg(test)]
pub(crate) const SAMPLE: &str = r#"
camera = "decam"
resolution = 64
allSky = false
kasen_fraction = 50.0
do_make_maps = true
do_make_hexes = true
do_make_jsons = true
do_make_gifs = false
max_number_of_hexes_to_do = 1000
gif_resolution = 0.5
force_recycler_mjd = true
recycler_mjd = 58710.25

exposure_length_Rem = [60.0, 90.0]
exposure_filter_Rem = ["i", "z"]
maxHexesPerSlot_Rem = 6
exposure_tiling_Rem = [0, 1]
propid_Rem = "2019B-0372"

exposure_length_BH = [90]
exposure_filter_BH = ["r"]
maxHexesPerSlot_BH = 18
exposure_tiling_BH = [10]
propid_BH = "2019B-0371"

official_recipients = ["desgw@example.org"]
test_recipients = ["tester@example.org"]
"#;

#[cfg(test)]
pub(crate) fn sample() -> Config {
    Config::parse(SAMPLE).unwrap()
}
