//! A progress meter that reports through the `log` crate.

use super::ProgressMeter;

/// Emits a `log::info!` line every `report_every` steps and at the end.
#[derive(Debug)]
pub struct LogProgress {
	message: String,
	position: u64,
	total: u64,
	report_every: u64,
	next_report: u64,
}

impl LogProgress {
	#[must_use]
	pub fn new(report_every: u64) -> Self {
		Self {
			message: String::new(),
			position: 0,
			total: 0,
			report_every: report_every.max(1),
			next_report: report_every.max(1),
		}
	}

	fn report(&self) {
		if self.total > 0 {
			log::info!(
				"{}: {}/{} ({:.1}%)",
				self.message,
				self.position,
				self.total,
				self.position as f64 * 100.0 / self.total as f64
			);
		} else {
			log::info!("{}: {}", self.message, self.position);
		}
	}
}

impl ProgressMeter for LogProgress {
	fn init(&mut self, message: &str, total: u64) {
		self.message = message.to_string();
		self.total = total;
		self.position = 0;
		self.next_report = self.report_every;
	}

	fn inc(&mut self, delta: u64) {
		self.position += delta;
		if self.position >= self.next_report {
			self.report();
			self.next_report = self.position + self.report_every;
		}
	}

	fn set_position(&mut self, position: u64) {
		self.position = position;
	}

	fn finish(&mut self) {
		self.report();
	}
}
