//! One filter of a layer: predicate, display rule, site, spatial index.

use crate::{
	CompiledProgram, CompiledRule, DisplayRule, ExpressionEvaluator, GeoIndex, Record, SharedHeader, Site,
	config::{FilterConfig, MatchLogic},
	geo_index::DEFAULT_OVERSIZE_FACTOR,
};
use anyhow::{Result, bail};
use geofuse_core::{FusionError, Tilespace};
use geofuse_geometry::NormBBox;

/// A filter evaluates records against its predicate and collects the
/// matching features in its own [`GeoIndex`].
#[derive(Debug)]
pub struct Filter {
	id: usize,
	name: String,
	config: FilterConfig,
	rules: Vec<CompiledRule>,
	program: Option<Box<dyn CompiledProgram>>,
	display_rule: DisplayRule,
	site: Site,
	geo_index: GeoIndex,
	tilespace: Tilespace,
	target_level: u32,
}

impl Filter {
	/// Compile a filter against a source's record layout.
	pub fn new(
		config: FilterConfig,
		id: usize,
		header: &SharedHeader,
		context_scripts: &[String],
		evaluator: &dyn ExpressionEvaluator,
		tilespace: Tilespace,
		target_level: u32,
	) -> Result<Self> {
		let rules = config
			.rules
			.iter()
			.map(|r| CompiledRule::compile(r, header))
			.collect::<Result<Vec<_>>>()?;
		let program = if config.match_logic == MatchLogic::Expression {
			Some(
				evaluator
					.compile(&config.match_script, context_scripts, header)
					.map_err(|e| {
						// surface which filter failed to compile
						match e.downcast::<FusionError>() {
							Ok(FusionError::ScriptError { location, message }) => FusionError::ScriptError {
								location: format!("filter {} ({location})", id + 1),
								message,
							}
							.into(),
							Ok(other) => anyhow::Error::new(other),
							Err(e) => e,
						}
					})?,
			)
		} else {
			None
		};
		let display_rule = DisplayRule::new(&config.feature, header)?;
		let site = Site::new(&config.site, header)?;
		Ok(Self {
			id,
			name: config.name.clone(),
			config,
			rules,
			program,
			display_rule,
			site,
			geo_index: GeoIndex::new(tilespace, DEFAULT_OVERSIZE_FACTOR, target_level),
			tilespace,
			target_level,
		})
	}

	pub fn id(&self) -> usize {
		self.id
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn config(&self) -> &FilterConfig {
		&self.config
	}

	pub fn display_rule(&self) -> &DisplayRule {
		&self.display_rule
	}

	pub fn site(&self) -> &Site {
		&self.site
	}

	pub fn geo_index(&self) -> &GeoIndex {
		&self.geo_index
	}

	pub fn geo_index_mut(&mut self) -> &mut GeoIndex {
		&mut self.geo_index
	}

	/// Replace the index wholesale (used when loading selection files).
	pub fn set_geo_index(&mut self, index: GeoIndex) {
		self.geo_index = index;
	}

	/// Move the index out (the coverage engine owns it during a fuse pass),
	/// leaving a fresh empty one behind.
	pub fn take_geo_index(&mut self) -> GeoIndex {
		std::mem::replace(
			&mut self.geo_index,
			GeoIndex::new(self.tilespace, DEFAULT_OVERSIZE_FACTOR, self.target_level),
		)
	}

	/// Evaluate the predicate against one record.
	///
	/// `record` is `None` for sources without attributes; rule and
	/// expression filters then report an attribute error (soft), while a
	/// rule-less `MatchAll` filter matches everything.
	pub fn try_has_match(&self, record: Option<&Record>) -> Result<bool> {
		match self.config.match_logic {
			MatchLogic::MatchAll if self.rules.is_empty() => Ok(true),
			MatchLogic::MatchAll | MatchLogic::MatchAny => {
				let Some(record) = record else {
					bail!(FusionError::InvalidAttribute(
						"filter rules need attributes but the source has none".to_string()
					));
				};
				let mut any = false;
				let mut all = true;
				for rule in &self.rules {
					if rule.eval(record)? {
						any = true;
					} else {
						all = false;
					}
				}
				Ok(match self.config.match_logic {
					MatchLogic::MatchAll => all,
					_ => any,
				})
			}
			MatchLogic::Expression => {
				let Some(record) = record else {
					bail!(FusionError::InvalidAttribute(
						"filter expression needs attributes but the source has none".to_string()
					));
				};
				let program = self.program.as_ref().expect("expression filters carry a program");
				Ok(program.evaluate(record)?.as_bool())
			}
		}
	}

	/// Record a match in the selection index.
	pub fn record_match(&mut self, feature_id: u32, bbox: &NormBBox) {
		self.geo_index.insert(feature_id, *bbox);
	}

	/// Drop all selection state for a new query pass.
	pub fn reset(&mut self) {
		self.geo_index = GeoIndex::new(self.tilespace, DEFAULT_OVERSIZE_FACTOR, self.target_level);
	}

	/// Build the index grid after a query pass.
	pub fn finalize(&mut self) {
		self.geo_index.finalize();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		RecordExprEvaluator,
		config::{FeatureType, RuleOp, SelectRuleConfig},
		record::{FieldSpec, FieldType, RecordHeader, Value},
	};
	use geofuse_core::FUSION_TILESPACE;
	use std::sync::Arc;

	fn header() -> SharedHeader {
		Arc::new(RecordHeader::from_specs(vec![FieldSpec::new("x", FieldType::Int)]))
	}

	fn record(x: i32) -> Record {
		let mut r = header().new_record();
		r.set_field(0, Value::Int(x));
		r
	}

	fn build(config: FilterConfig) -> Result<Filter> {
		Filter::new(config, 0, &header(), &[], &RecordExprEvaluator::new(), FUSION_TILESPACE, 8)
	}

	#[test]
	fn rule_filters_match() -> Result<()> {
		let mut config = FilterConfig::match_all("big", FeatureType::Point);
		config.rules.push(SelectRuleConfig {
			field: "x".into(),
			op: RuleOp::GreaterEqual,
			value: "5".into(),
		});
		let filter = build(config)?;
		assert!(filter.try_has_match(Some(&record(5)))?);
		assert!(!filter.try_has_match(Some(&record(4)))?);

		// rules without a record are soft attribute errors
		let err = filter.try_has_match(None).unwrap_err();
		assert!(matches!(
			err.downcast_ref::<FusionError>(),
			Some(FusionError::InvalidAttribute(_))
		));
		Ok(())
	}

	#[test]
	fn ruleless_match_all_matches_everything() -> Result<()> {
		let filter = build(FilterConfig::match_all("all", FeatureType::Point))?;
		assert!(filter.try_has_match(Some(&record(1)))?);
		assert!(filter.try_has_match(None)?);
		Ok(())
	}

	#[test]
	fn expression_filters_report_their_index() {
		let mut config = FilterConfig::match_all("broken", FeatureType::Point);
		config.match_logic = MatchLogic::Expression;
		config.match_script = "x >= ".into();
		let err = build(config).unwrap_err();
		let text = format!("{err:#}");
		assert!(text.contains("filter 1"), "got: {text}");
	}

	#[test]
	fn match_recording_builds_the_index() -> Result<()> {
		let mut filter = build(FilterConfig::match_all("all", FeatureType::Point))?;
		filter.record_match(3, &NormBBox::new(0.4, 0.41, 0.5, 0.51));
		filter.record_match(9, &NormBBox::new(0.5, 0.51, 0.5, 0.51));
		filter.finalize();
		assert_eq!(filter.geo_index().count(), 2);
		assert_eq!(filter.geo_index().select_all(), vec![3, 9]);

		filter.reset();
		assert_eq!(filter.geo_index().count(), 0);
		Ok(())
	}
}
