//! Run control: which stages run and over which slots.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Maps,
    Hexes,
    Jsons,
    Gifs,
    /// Reading the observing record back after the driver finishes.
    Aggregate,
}

impl Stage {
    /// The gated stages the driver runs, in fixed order.
    pub const PIPELINE: [Stage; 4] = [Stage::Maps, Stage::Hexes, Stage::Jsons, Stage::Gifs];

    pub fn name(self) -> &'static str {
        match self {
            Self::Maps => "maps",
            Self::Hexes => "hexes",
            Self::Jsons => "jsons",
            Self::Gifs => "gifs",
            Self::Aggregate => "aggregate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which slots of the night hex selection covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SlotWindow {
    #[default]
    WholeNight,
    Range { start: u32, count: u32 },
}

impl SlotWindow {
    /// Builds a window from the `(start_slot, slot_count)` pair,
    /// where any negative value means the whole night.
    pub fn from_sentinel(start: i64, count: i64) -> Self {
        match (u32::try_from(start), u32::try_from(count)) {
            (Ok(start), Ok(count)) => Self::Range { start, count },
            _ => Self::WholeNight,
        }
    }

    /// The `(start_slot, slot_count)` pair, `(-1, -1)` for the whole night.
    pub fn as_sentinel(self) -> (i64, i64) {
        match self {
            Self::WholeNight => (-1, -1),
            Self::Range { start, count } => (i64::from(start), i64::from(count)),
        }
    }
}

/// Independently toggleable stages plus the hex window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlags {
    pub make_maps: bool,
    pub make_hexes: bool,
    pub make_jsons: bool,
    pub make_gifs: bool,
    pub window: SlotWindow,
}

impl ControlFlags {
    pub fn enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Maps => self.make_maps,
            Stage::Hexes => self.make_hexes,
            Stage::Jsons => self.make_jsons,
            Stage::Gifs => self.make_gifs,
            Stage::Aggregate => true,
        }
    }
}
