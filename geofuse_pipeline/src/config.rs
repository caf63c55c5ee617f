//! Layer and filter configuration.
//!
//! These are the plain-data descriptions a project hands to the pipeline:
//! which filters exist, how each one matches records, and how matched
//! features are displayed and labeled. Everything serializes so project
//! tooling can store and diff configurations.

use serde::{Deserialize, Serialize};

/// The display geometry family a filter produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureType {
	Point,
	Line,
	Polygon,
}

/// How a filter combines its predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchLogic {
	/// Every rule must hold (a filter without rules matches everything).
	MatchAll,
	/// At least one rule must hold.
	MatchAny,
	/// A compiled record expression decides.
	Expression,
}

/// Comparison operator of one structured select rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleOp {
	Equal,
	NotEqual,
	LessThan,
	LessEqual,
	GreaterThan,
	GreaterEqual,
	Contains,
	Matches,
}

/// One structured predicate: `field <op> value`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectRuleConfig {
	pub field: String,
	pub op: RuleOp,
	pub value: String,
}

/// Display settings for a filter's features.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeatureConfig {
	pub feature_type: FeatureType,
	/// Lines drawn as roads join at shared names and drop overlaps.
	pub draw_as_roads: bool,
	/// `{column}` template expanded into the feature label.
	pub label_format: String,
	/// Allowable on-screen error in pixels for simplification.
	pub allowable_pixel_error: f64,
}

impl Default for FeatureConfig {
	fn default() -> Self {
		Self {
			feature_type: FeatureType::Line,
			draw_as_roads: false,
			label_format: String::new(),
			allowable_pixel_error: 0.5,
		}
	}
}

/// Site (label point) settings for a filter.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SiteConfig {
	pub enabled: bool,
	/// `{column}` template for the site label.
	pub label_format: String,
	/// `{column}` template for the popup text.
	pub popup_format: String,
}

/// One filter: predicate plus display rule plus site.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterConfig {
	pub name: String,
	pub match_logic: MatchLogic,
	pub rules: Vec<SelectRuleConfig>,
	/// Record expression, used when `match_logic` is `Expression`.
	pub match_script: String,
	pub feature: FeatureConfig,
	pub site: SiteConfig,
}

impl FilterConfig {
	/// A match-everything filter with default display settings.
	#[must_use]
	pub fn match_all(name: &str, feature_type: FeatureType) -> Self {
		Self {
			name: name.to_string(),
			match_logic: MatchLogic::MatchAll,
			rules: Vec::new(),
			match_script: String::new(),
			feature: FeatureConfig {
				feature_type,
				..FeatureConfig::default()
			},
			site: SiteConfig::default(),
		}
	}
}

/// One layer: its filters and layer-wide evaluation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayerConfig {
	pub filters: Vec<FilterConfig>,
	/// Context scripts prepended to every compiled filter expression.
	pub context_script: String,
	/// Whether one feature may match several filters.
	pub allow_feature_duplication: bool,
}

impl Default for LayerConfig {
	fn default() -> Self {
		Self {
			filters: Vec::new(),
			context_script: String::new(),
			allow_feature_duplication: false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn config_round_trips_through_serde() {
		let mut config = LayerConfig::default();
		config.filters.push(FilterConfig::match_all("roads", FeatureType::Line));
		config.filters[0].rules.push(SelectRuleConfig {
			field: "class".into(),
			op: RuleOp::Equal,
			value: "highway".into(),
		});
		config.filters[0].feature.draw_as_roads = true;

		let json = serde_json::to_string(&config).unwrap();
		let back: LayerConfig = serde_json::from_str(&json).unwrap();
		assert_eq!(back.filters.len(), 1);
		assert_eq!(back.filters[0].name, "roads");
		assert_eq!(back.filters[0].rules[0].op, RuleOp::Equal);
		assert!(back.filters[0].feature.draw_as_roads);
	}
}
