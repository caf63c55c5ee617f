//! Advisory cancellation flag.

use crate::FusionError;
use anyhow::Result;
use std::sync::{
	Arc,
	atomic::{AtomicBool, Ordering},
};

/// Shared cancellation flag polled by long-running passes.
///
/// Setting the flag does not stop anything by itself; each pass checks it at
/// the start of every feature or batch and returns early with
/// [`FusionError::Interrupted`]. Cleanup of partial output files is the
/// caller's job.
#[derive(Clone, Debug, Default)]
pub struct InterruptFlag {
	flag: Arc<AtomicBool>,
}

impl InterruptFlag {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn interrupt(&self) {
		self.flag.store(true, Ordering::Relaxed);
	}

	pub fn is_interrupted(&self) -> bool {
		self.flag.load(Ordering::Relaxed)
	}

	/// Fail with [`FusionError::Interrupted`] if the flag is set.
	pub fn check(&self) -> Result<()> {
		if self.is_interrupted() {
			Err(FusionError::Interrupted.into())
		} else {
			Ok(())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn check_reports_interrupted() {
		let flag = InterruptFlag::new();
		assert!(flag.check().is_ok());

		let shared = flag.clone();
		shared.interrupt();
		let err = flag.check().unwrap_err();
		assert!(matches!(err.downcast_ref::<FusionError>(), Some(FusionError::Interrupted)));
	}
}
