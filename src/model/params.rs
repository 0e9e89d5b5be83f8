//! Parameter record: the durable per-trigger state rewritten on every run.
//!
//! Field names on disk follow the keys downstream page generators read
//! (`ETA`, `ChirpMass`, `DESXLIGO_prob`, ...), all at the top level of one
//! flat JSON object. Keys this crate does not model are kept as they are.

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use serde_json::{Map, Value};

use super::Regime;

/// On-disk marker for a value that has never been supplied.
const UNKNOWN_MARKER: &str = "NAN";

/// A quantity that may not be known yet.
///
/// Serialized as the bare value when known and as `"NAN"` when not,
/// so "unknown" never collapses into a computed zero.
#[derive(Debug, Clone, PartialEq)]
pub enum Measured<T> {
    Known(T),
    Unknown,
}

impl<T> Default for Measured<T> {
    fn default() -> Self {
        Self::Unknown
    }
}

impl<T> Measured<T> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Self::Known(v) => Some(v),
            Self::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl<T: Serialize> Serialize for Measured<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(v) => v.serialize(serializer),
            Self::Unknown => serializer.serialize_str(UNKNOWN_MARKER),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Measured<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr<T> {
            Known(T),
            Marker(Option<String>),
        }

        match Repr::<T>::deserialize(deserializer)? {
            Repr::Known(v) => Ok(Self::Known(v)),
            Repr::Marker(None) => Ok(Self::Unknown),
            Repr::Marker(Some(s)) if s == UNKNOWN_MARKER => Ok(Self::Unknown),
            Repr::Marker(Some(s)) => Err(de::Error::custom(format!(
                "expected a value or \"{UNKNOWN_MARKER}\", got \"{s}\""
            ))),
        }
    }
}

/// Class of burst reported with the alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BurstClass {
    /// Compact binary coalescence.
    Cbc,
    /// Unmodelled burst.
    Burst,
    Other(String),
}

impl fmt::Display for BurstClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cbc => f.write_str("CBC"),
            Self::Burst => f.write_str("Burst"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

impl Serialize for BurstClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BurstClass {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "CBC" => Ok(Self::Cbc),
            "Burst" => Ok(Self::Burst),
            // Leave the marker to `Measured`.
            UNKNOWN_MARKER => Err(de::Error::custom("unknown burst class")),
            _ => Ok(Self::Other(s)),
        }
    }
}

/// Astrophysical fields supplied with (or after) the alert.
///
/// The recycler never computes these; it only carries them across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AstroParams {
    #[serde(rename = "ETA")]
    pub eta: Measured<f64>,

    #[serde(rename = "FAR")]
    pub far: Measured<f64>,

    #[serde(rename = "ChirpMass")]
    pub chirp_mass: Measured<f64>,

    #[serde(rename = "MaxDistance")]
    pub max_distance: Measured<f64>,

    #[serde(rename = "M1")]
    pub m1: Measured<f64>,

    #[serde(rename = "M2")]
    pub m2: Measured<f64>,

    pub boc: Measured<BurstClass>,

    #[serde(rename = "CentralFreq")]
    pub central_freq: Measured<f64>,

    #[serde(rename = "probhasns")]
    pub prob_has_ns: Measured<f64>,
}

impl AstroParams {
    /// How many fields hold a measured value.
    pub fn known_fields(&self) -> usize {
        [
            self.eta.is_known(),
            self.far.is_known(),
            self.chirp_mass.is_known(),
            self.max_distance.is_known(),
            self.m1.is_known(),
            self.m2.is_known(),
            self.boc.is_known(),
            self.central_freq.is_known(),
            self.prob_has_ns.is_known(),
        ]
        .into_iter()
        .filter(|known| *known)
        .count()
    }

    /// Take every value `newer` knows, keeping ours where it knows nothing.
    pub fn absorb(&mut self, newer: &Self) {
        fn take<T: Clone>(ours: &mut Measured<T>, theirs: &Measured<T>) {
            if theirs.is_known() {
                ours.clone_from(theirs);
            }
        }

        take(&mut self.eta, &newer.eta);
        take(&mut self.far, &newer.far);
        take(&mut self.chirp_mass, &newer.chirp_mass);
        take(&mut self.max_distance, &newer.max_distance);
        take(&mut self.m1, &newer.m1);
        take(&mut self.m2, &newer.m2);
        take(&mut self.boc, &newer.boc);
        take(&mut self.central_freq, &newer.central_freq);
        take(&mut self.prob_has_ns, &newer.prob_has_ns);
    }
}

/// Planning outputs of the most recent run that selected hexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Planning {
    /// Classification the plan was computed for.
    #[serde(rename = "gethexobstype")]
    pub regime: Regime,

    pub best_slot: i64,
    pub n_slots: i64,
    pub first_slot: i64,

    /// Summed probability over the selected hexes.
    #[serde(rename = "DESXLIGO_prob")]
    pub integrated_probability: f64,

    #[serde(rename = "LIGO_prob")]
    pub ligo_probability: f64,

    #[serde(rename = "nHexes")]
    pub n_hexes: usize,

    pub exposure_times: Vec<f64>,
    pub exposure_filter: Vec<String>,
    pub exposure_tiling: Vec<u32>,

    #[serde(rename = "propid")]
    pub proposal_id: String,

    /// Time budget in hours.
    pub hours: f64,

    /// Distance used by the planner, in Mpc.
    #[serde(rename = "codeDistance")]
    pub code_distance: f64,
}

/// The full durable record for one trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamRecord {
    #[serde(default)]
    pub trigger_id: String,

    /// Event time.
    #[serde(rename = "MJD", default)]
    pub mjd: Measured<f64>,

    /// When this record was last processed.
    #[serde(rename = "time_processed", default)]
    pub recycler_mjd: Measured<f64>,

    /// The skymap the last run processed.
    #[serde(rename = "filename", default, skip_serializing_if = "Option::is_none")]
    pub skymap: Option<PathBuf>,

    #[serde(flatten)]
    pub astro: AstroParams,

    /// Absent until a run has selected hexes.
    #[serde(flatten)]
    pub planning: Option<Planning>,

    /// Keys written by other tools (`SNR`, `distance_sigma`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ParamRecord {
    /// A record where nothing is known yet.
    pub fn unknown(trigger_id: impl Into<String>) -> Self {
        Self {
            trigger_id: trigger_id.into(),
            mjd: Measured::Unknown,
            recycler_mjd: Measured::Unknown,
            skymap: None,
            astro: AstroParams::default(),
            planning: None,
            extra: Map::new(),
        }
    }
}
