//! Invocation of the external dynamic difficulty engine.
//!
//! The engine is a black box: it is handed one arrangement file at a time and
//! rewrites it (plus optional log and showlights byproducts) next to the
//! original. This crate owns building its command line, bounding how long we
//! wait on it, and translating its exit code into an [`EngineStatus`].

pub mod error;
mod invoke;
mod outcome;
pub mod ramp;

pub use crate::invoke::{Engine, EngineInvoker, Invocation};
pub use crate::outcome::{EngineOutcome, EngineStatus};
pub use crate::ramp::{RampModel, RampModels};
pub use tokio_util::sync::CancellationToken;
