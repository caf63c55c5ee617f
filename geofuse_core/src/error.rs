//! Error kinds and the soft-error policy shared by the whole pipeline.
//!
//! Every fallible geofuse API returns `anyhow::Result`. The typed kinds in
//! this module ride inside the `anyhow::Error`; callers that need to react
//! to a specific failure class (the selector tolerating a bad attribute
//! row, the presence-mask reader rejecting a corrupt file) downcast to
//! [`FusionError`] instead of matching on message text.

use anyhow::Result;
use thiserror::Error;

/// Failure classes the pipeline distinguishes.
///
/// `InvalidGeometry`, `InvalidAttribute` and `OutOfDomain` are *soft*: they
/// describe a single bad feature and are routed through a
/// [`SoftErrorPolicy`] so a run can tolerate a bounded number of them.
/// Everything else aborts the enclosing pass.
#[derive(Debug, Error)]
pub enum FusionError {
	/// An open/read/write failed.
	#[error("I/O failure: {0}")]
	IoFailure(String),

	/// Bad magic, size mismatch, level out of range.
	#[error("invalid format: {0}")]
	InvalidFormat(String),

	/// Bad subset spec, invalid extents, unknown codec.
	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	/// Empty geode after clipping, degenerate ring.
	#[error("invalid geometry: {0}")]
	InvalidGeometry(String),

	/// Attribute encoding failure or type mismatch.
	#[error("invalid attribute: {0}")]
	InvalidAttribute(String),

	/// Expression compilation or evaluation failure.
	#[error("script error in {location}: {message}")]
	ScriptError { location: String, message: String },

	/// Cancellation observed; not a real failure.
	#[error("interrupted")]
	Interrupted,

	/// Feature bounding box outside the normalized world.
	#[error("out of domain: {0}")]
	OutOfDomain(String),
}

impl FusionError {
	/// Whether this failure describes a single feature and may be tolerated.
	pub fn is_soft(&self) -> bool {
		matches!(
			self,
			FusionError::InvalidGeometry(_) | FusionError::InvalidAttribute(_) | FusionError::OutOfDomain(_)
		)
	}
}

/// Counts tolerated per-feature failures and escalates past a limit.
///
/// A limit of zero makes every soft error fatal, which is what the
/// non-interactive pipeline runs with by default.
#[derive(Debug)]
pub struct SoftErrorPolicy {
	max_allowed: usize,
	errors: Vec<String>,
}

impl SoftErrorPolicy {
	pub fn new(max_allowed: usize) -> Self {
		Self {
			max_allowed,
			errors: Vec::new(),
		}
	}

	/// Record one soft error. Fails once more than `max_allowed` have been seen.
	pub fn handle(&mut self, message: String) -> Result<()> {
		log::warn!("{message}");
		self.errors.push(message);
		if self.errors.len() > self.max_allowed {
			anyhow::bail!(
				"too many soft errors ({} > {} allowed), last: {}",
				self.errors.len(),
				self.max_allowed,
				self.errors.last().unwrap()
			);
		}
		Ok(())
	}

	pub fn count(&self) -> usize {
		self.errors.len()
	}

	pub fn errors(&self) -> &[String] {
		&self.errors
	}
}

/// Route an error: soft errors go to the policy, everything else propagates.
pub fn absorb_soft_error(policy: &mut SoftErrorPolicy, error: anyhow::Error) -> Result<()> {
	match error.downcast_ref::<FusionError>() {
		Some(kind) if kind.is_soft() => policy.handle(format!("{error:#}")),
		_ => Err(error),
	}
}
