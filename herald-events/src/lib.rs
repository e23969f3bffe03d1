//! HERALD Events - Progress and Control Signalling
//!
//! Two channels connect a running campaign to the outside world:
//!
//! - [`ProgressHub`] fans progress events out to any number of observers.
//! - [`ControlSignal`] carries the campaign status to every suspension point
//!   of the dispatch loop, so pause and abort need no per-timer bookkeeping.

pub mod control;
pub mod hub;

pub use control::{ControlHandle, ControlSignal, WaitOutcome};
pub use hub::{ProgressHub, ProgressSink};
