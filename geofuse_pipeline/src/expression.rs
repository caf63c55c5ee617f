//! Record predicates: structured select rules and the pluggable
//! record-expression evaluator.
//!
//! Filter matching comes in two shapes. Structured rules compare one column
//! against a literal with a fixed operator set. Scripted filters go through
//! the [`ExpressionEvaluator`] seam: `compile` turns a script (plus layer
//! context scripts) into a reusable program, `evaluate` runs it against one
//! record. [`RecordExprEvaluator`] is the built-in implementation, a small
//! recursive-descent interpreter over comparisons, boolean connectives and
//! column references; an embedded scripting engine can be plugged in behind
//! the same trait.

use crate::{
	Record, Value,
	config::{RuleOp, SelectRuleConfig},
	record::RecordHeader,
};
use anyhow::{Result, bail};
use geofuse_core::FusionError;
use regex::Regex;
use std::sync::Arc;

/// A compiled, reusable filter program.
pub trait CompiledProgram: std::fmt::Debug + Send + Sync {
	fn evaluate(&self, record: &Record) -> Result<Value>;
}

/// The pluggable record-expression evaluator.
pub trait ExpressionEvaluator: Send + Sync {
	/// Compile `script` against a record layout. `context_scripts` are
	/// prepended definitions shared by all filters of a layer.
	fn compile(
		&self,
		script: &str,
		context_scripts: &[String],
		header: &Arc<RecordHeader>,
	) -> Result<Box<dyn CompiledProgram>>;
}

fn script_error(location: &str, message: String) -> anyhow::Error {
	FusionError::ScriptError {
		location: location.to_string(),
		message,
	}
	.into()
}

// ---------------------------------------------------------------------------
// Structured rules
// ---------------------------------------------------------------------------

/// A select rule resolved against a header: the column index is fixed and
/// `Matches` patterns are compiled once.
#[derive(Debug)]
pub struct CompiledRule {
	field_pos: usize,
	op: RuleOp,
	value: String,
	pattern: Option<Regex>,
}

impl CompiledRule {
	pub fn compile(config: &SelectRuleConfig, header: &RecordHeader) -> Result<Self> {
		let Some(field_pos) = header.field_pos_by_name(&config.field) else {
			bail!(FusionError::InvalidArgument(format!(
				"select rule references unknown column '{}'",
				config.field
			)));
		};
		let pattern = if config.op == RuleOp::Matches {
			Some(Regex::new(&config.value).map_err(|e| {
				FusionError::InvalidArgument(format!("bad pattern '{}': {e}", config.value))
			})?)
		} else {
			None
		};
		Ok(Self {
			field_pos,
			op: config.op,
			value: config.value.clone(),
			pattern,
		})
	}

	/// Evaluate against one record. Comparisons are numeric when both sides
	/// parse as numbers, otherwise textual.
	pub fn eval(&self, record: &Record) -> Result<bool> {
		let Some(field) = record.field(self.field_pos) else {
			bail!(FusionError::InvalidAttribute(format!(
				"record has no field {}",
				self.field_pos
			)));
		};
		Ok(match self.op {
			RuleOp::Contains => field.as_string().contains(&self.value),
			RuleOp::Matches => self.pattern.as_ref().unwrap().is_match(&field.as_string()),
			op => {
				let ordering = match (field.as_double(), self.value.trim().parse::<f64>().ok()) {
					(Some(a), Some(b)) => a.partial_cmp(&b),
					_ => Some(field.as_string().cmp(&self.value)),
				};
				let Some(ordering) = ordering else {
					return Ok(false);
				};
				match op {
					RuleOp::Equal => ordering.is_eq(),
					RuleOp::NotEqual => !ordering.is_eq(),
					RuleOp::LessThan => ordering.is_lt(),
					RuleOp::LessEqual => ordering.is_le(),
					RuleOp::GreaterThan => ordering.is_gt(),
					RuleOp::GreaterEqual => ordering.is_ge(),
					RuleOp::Contains | RuleOp::Matches => unreachable!(),
				}
			}
		})
	}
}

// ---------------------------------------------------------------------------
// Built-in expression interpreter
// ---------------------------------------------------------------------------

/// The built-in record-expression interpreter.
///
/// Supports column references, string/number literals, comparison
/// operators, `&&`, `||` and `!`. Context scripts may define constants as
/// `name = expression;` lines which become additional names visible to the
/// filter expression.
#[derive(Debug, Default)]
pub struct RecordExprEvaluator;

impl RecordExprEvaluator {
	#[must_use]
	pub fn new() -> Self {
		Self
	}
}

impl ExpressionEvaluator for RecordExprEvaluator {
	fn compile(
		&self,
		script: &str,
		context_scripts: &[String],
		header: &Arc<RecordHeader>,
	) -> Result<Box<dyn CompiledProgram>> {
		let mut constants: Vec<(String, Expr)> = Vec::new();
		for context in context_scripts {
			for line in context.split(';') {
				let line = line.trim();
				if line.is_empty() {
					continue;
				}
				let Some((name, body)) = line.split_once('=') else {
					return Err(script_error("context script", format!("expected 'name = expr' in '{line}'")));
				};
				let expr = Parser::new(body, header, &constants)
					.parse()
					.map_err(|e| script_error("context script", e.to_string()))?;
				constants.push((name.trim().to_string(), expr));
			}
		}
		let expr = Parser::new(script, header, &constants)
			.parse()
			.map_err(|e| script_error("filter expression", e.to_string()))?;
		Ok(Box::new(CompiledExpr { expr }))
	}
}

#[derive(Debug)]
struct CompiledExpr {
	expr: Expr,
}

impl CompiledProgram for CompiledExpr {
	fn evaluate(&self, record: &Record) -> Result<Value> {
		self.expr.eval(record)
	}
}

#[derive(Clone, Debug)]
enum Expr {
	Literal(Value),
	Field(usize),
	Not(Box<Expr>),
	And(Box<Expr>, Box<Expr>),
	Or(Box<Expr>, Box<Expr>),
	Compare(CompareOp, Box<Expr>, Box<Expr>),
}

#[derive(Clone, Copy, Debug)]
enum CompareOp {
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
}

impl Expr {
	fn eval(&self, record: &Record) -> Result<Value> {
		Ok(match self {
			Expr::Literal(value) => value.clone(),
			Expr::Field(pos) => record
				.field(*pos)
				.cloned()
				.ok_or_else(|| FusionError::InvalidAttribute(format!("record has no field {pos}")))?,
			Expr::Not(inner) => Value::Bool(!inner.eval(record)?.as_bool()),
			Expr::And(a, b) => Value::Bool(a.eval(record)?.as_bool() && b.eval(record)?.as_bool()),
			Expr::Or(a, b) => Value::Bool(a.eval(record)?.as_bool() || b.eval(record)?.as_bool()),
			Expr::Compare(op, a, b) => {
				let left = a.eval(record)?;
				let right = b.eval(record)?;
				let ordering = match (left.as_double(), right.as_double()) {
					(Some(x), Some(y)) => x.partial_cmp(&y),
					_ => Some(left.as_string().cmp(&right.as_string())),
				};
				let Some(ordering) = ordering else {
					return Ok(Value::Bool(false));
				};
				Value::Bool(match op {
					CompareOp::Eq => ordering.is_eq(),
					CompareOp::Ne => !ordering.is_eq(),
					CompareOp::Lt => ordering.is_lt(),
					CompareOp::Le => ordering.is_le(),
					CompareOp::Gt => ordering.is_gt(),
					CompareOp::Ge => ordering.is_ge(),
				})
			}
		})
	}
}

struct Parser<'a> {
	chars: Vec<char>,
	pos: usize,
	header: &'a RecordHeader,
	constants: &'a [(String, Expr)],
}

impl<'a> Parser<'a> {
	fn new(script: &str, header: &'a RecordHeader, constants: &'a [(String, Expr)]) -> Self {
		Self {
			chars: script.chars().collect(),
			pos: 0,
			header,
			constants,
		}
	}

	fn parse(mut self) -> Result<Expr> {
		let expr = self.parse_or()?;
		self.skip_whitespace();
		if self.pos != self.chars.len() {
			bail!("unexpected input at offset {}", self.pos);
		}
		Ok(expr)
	}

	fn skip_whitespace(&mut self) {
		while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
			self.pos += 1;
		}
	}

	fn eat(&mut self, token: &str) -> bool {
		self.skip_whitespace();
		let token_chars: Vec<char> = token.chars().collect();
		if self.chars[self.pos..].starts_with(&token_chars) {
			self.pos += token_chars.len();
			true
		} else {
			false
		}
	}

	fn parse_or(&mut self) -> Result<Expr> {
		let mut left = self.parse_and()?;
		while self.eat("||") {
			let right = self.parse_and()?;
			left = Expr::Or(Box::new(left), Box::new(right));
		}
		Ok(left)
	}

	fn parse_and(&mut self) -> Result<Expr> {
		let mut left = self.parse_not()?;
		while self.eat("&&") {
			let right = self.parse_not()?;
			left = Expr::And(Box::new(left), Box::new(right));
		}
		Ok(left)
	}

	fn parse_not(&mut self) -> Result<Expr> {
		self.skip_whitespace();
		// a bare '!' but not '!='
		if self.pos < self.chars.len()
			&& self.chars[self.pos] == '!'
			&& self.chars.get(self.pos + 1) != Some(&'=')
		{
			self.pos += 1;
			return Ok(Expr::Not(Box::new(self.parse_not()?)));
		}
		self.parse_compare()
	}

	fn parse_compare(&mut self) -> Result<Expr> {
		let left = self.parse_term()?;
		// two-character operators before their one-character prefixes
		for (token, op) in [
			("==", CompareOp::Eq),
			("!=", CompareOp::Ne),
			("<=", CompareOp::Le),
			(">=", CompareOp::Ge),
			("<", CompareOp::Lt),
			(">", CompareOp::Gt),
		] {
			if self.eat(token) {
				let right = self.parse_term()?;
				return Ok(Expr::Compare(op, Box::new(left), Box::new(right)));
			}
		}
		Ok(left)
	}

	fn parse_term(&mut self) -> Result<Expr> {
		self.skip_whitespace();
		if self.pos >= self.chars.len() {
			bail!("unexpected end of expression");
		}
		let c = self.chars[self.pos];

		if self.eat("(") {
			let inner = self.parse_or()?;
			if !self.eat(")") {
				bail!("missing closing parenthesis");
			}
			return Ok(inner);
		}

		if c == '"' || c == '\'' {
			self.pos += 1;
			let start = self.pos;
			while self.pos < self.chars.len() && self.chars[self.pos] != c {
				self.pos += 1;
			}
			if self.pos >= self.chars.len() {
				bail!("unterminated string literal");
			}
			let text: String = self.chars[start..self.pos].iter().collect();
			self.pos += 1;
			return Ok(Expr::Literal(Value::String(text)));
		}

		if c.is_ascii_digit() || c == '-' || c == '.' {
			let start = self.pos;
			self.pos += 1;
			while self.pos < self.chars.len()
				&& (self.chars[self.pos].is_ascii_digit() || self.chars[self.pos] == '.')
			{
				self.pos += 1;
			}
			let text: String = self.chars[start..self.pos].iter().collect();
			let number: f64 = text.parse().map_err(|_| anyhow::anyhow!("bad number '{text}'"))?;
			return Ok(Expr::Literal(Value::Double(number)));
		}

		if c.is_alphabetic() || c == '_' {
			let start = self.pos;
			while self.pos < self.chars.len()
				&& (self.chars[self.pos].is_alphanumeric() || self.chars[self.pos] == '_')
			{
				self.pos += 1;
			}
			let name: String = self.chars[start..self.pos].iter().collect();
			match name.as_str() {
				"true" => return Ok(Expr::Literal(Value::Bool(true))),
				"false" => return Ok(Expr::Literal(Value::Bool(false))),
				_ => {}
			}
			if let Some((_, expr)) = self.constants.iter().rev().find(|(n, _)| *n == name) {
				return Ok(expr.clone());
			}
			if let Some(pos) = self.header.field_pos_by_name(&name) {
				return Ok(Expr::Field(pos));
			}
			bail!("unknown name '{name}'");
		}

		bail!("unexpected character '{c}' at offset {}", self.pos);
	}
}
