//! Progress reporting and advisory cancellation.
//!
//! Long-running passes report through a [`ProgressMeter`]; the caller picks
//! the implementation ([`ProgressDrain`] swallows everything, [`LogProgress`]
//! reports through the `log` crate at coarse intervals). Cancellation is an
//! [`InterruptFlag`] the passes poll at feature and batch boundaries; it
//! never rolls anything back by itself.

mod interrupt;
mod log_progress;
mod meter;

pub use interrupt::InterruptFlag;
pub use log_progress::LogProgress;
pub use meter::{ProgressDrain, ProgressMeter};
