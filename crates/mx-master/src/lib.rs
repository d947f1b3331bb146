//! Final-mastering stage
//!
//! Drives a finished mix to its loudness, loudness-range, true-peak and
//! stereo-width targets under hard numeric caps:
//!
//! - **Gain staging**: pure policy deciding pre-gain, clipper shave and the
//!   limiting the pass may spend
//! - **Loudness-range protection**: simulated trials on disposable copies
//!   before committing a large pre-gain
//! - **Clip, limit, width**: the `mx-dsp` primitives, parameterized here
//! - **Ceiling enforcement**: a final uniform trim that guarantees the
//!   true-peak ceiling
//! - **Tracing**: fresh measurements around every transition, exported as a
//!   serializable trace and report
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mx_master::{MasteringEngine, MasteringTargets};
//!
//! let engine = MasteringEngine::new(MasteringTargets::streaming())?;
//! let outcome = engine.master(buffer)?;
//! println!("{}", serde_json::to_string_pretty(&outcome.report)?);
//! ```

#![warn(missing_docs)]

pub mod ceiling;
pub mod chain;
pub mod lra_guard;
pub mod staging;
pub mod targets;
pub mod trace;

mod error;

pub use chain::{MasteringEngine, MasteringOutcome};
pub use error::{MasterError, MasterResult};
pub use targets::{MasteringTargets, ParsedTargets};
pub use trace::{MasteringReport, MasteringTrace};
