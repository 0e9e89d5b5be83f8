//! Trigger types: the external alert and its physical regime.

use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

/// Whether the merger is expected to leave electromagnetic-bright remnant material.
///
/// Selects the strategy branch and names the workspace subdirectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    #[serde(rename = "hasrem")]
    HasRemnant,

    #[serde(rename = "norem")]
    NoRemnant,
}

impl Regime {
    pub fn from_has_remnant(has_remnant: bool) -> Self {
        if has_remnant {
            Self::HasRemnant
        } else {
            Self::NoRemnant
        }
    }

    /// The workspace subdirectory name: `hasrem` or `norem`.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::HasRemnant => "hasrem",
            Self::NoRemnant => "norem",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A classification string that names neither regime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid classification '{0}': expected hasrem or norem")]
pub struct InvalidClassification(pub String);

impl FromStr for Regime {
    type Err = InvalidClassification;

    /// Accepts `hasrem`/`norem` and the boolean spellings `true`/`false`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hasrem" => Ok(Self::HasRemnant),
            "norem" => Ok(Self::NoRemnant),
            other => other
                .parse::<bool>()
                .map(Self::from_has_remnant)
                .map_err(|_| InvalidClassification(s.to_string())),
        }
    }
}

/// A gravitational-wave alert as seen by one processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Stable external name of the alert.
    pub trigger_id: String,

    /// Derived from the skymap filename; one alert can have several maps.
    pub trigger_dir: String,

    /// Event time as a Modified Julian Date.
    pub mjd: f64,

    /// The sky-localization map being processed.
    pub skymap: PathBuf,

    pub regime: Regime,
}
