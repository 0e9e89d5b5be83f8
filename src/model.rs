//! Core data model for the recycler.
//!
//! These types describe one trigger's lifecycle:
//! the trigger itself, its durable parameter record, the strategy plan,
//! the engine's observing record, and the control surface of a run.

mod observation;
mod params;
mod run;
mod strategy;
mod trigger;

pub use observation::{ObservationRow, SlotResults, Summary};
pub use params::{AstroParams, BurstClass, Measured, ParamRecord, Planning};
pub use run::{ControlFlags, SlotWindow, Stage};
pub use strategy::StrategyPlan;
pub use trigger::{InvalidClassification, Regime, TriggerEvent};
