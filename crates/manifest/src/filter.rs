use regex::Regex;

use crate::{List, Manifest};

#[derive(Debug, thiserror::Error)]
#[error("invalid target expression `{expr}`")]
pub struct BadExpression {
	pub expr: String,
	#[source]
	pub source: regex::Error,
}

/// Compiled `<kind>/<name>` target expressions.
///
/// Each expression is matched case-insensitively against the whole string.
/// A leading `!` negates it. A manifest passes when it matches at least one
/// positive expression (or there are none) and no negated one.
#[derive(Debug, Clone, Default)]
pub struct Matchers {
	include: Vec<Regex>,
	exclude: Vec<Regex>,
}

impl Matchers {
	pub fn new<S: AsRef<str>>(exprs: &[S]) -> Result<Self, BadExpression> {
		let mut matchers = Self::default();
		for expr in exprs {
			let expr = expr.as_ref();
			let (negated, body) = match expr.strip_prefix('!') {
				Some(body) => (true, body),
				None => (false, expr),
			};
			let regex = Regex::new(&format!("(?i)^{body}$")).map_err(|source| BadExpression {
				expr: expr.to_string(),
				source,
			})?;
			if negated {
				matchers.exclude.push(regex);
			} else {
				matchers.include.push(regex);
			}
		}
		Ok(matchers)
	}

	pub fn is_empty(&self) -> bool {
		self.include.is_empty() && self.exclude.is_empty()
	}

	pub fn matches(&self, manifest: &Manifest) -> bool {
		let target = manifest.kind_name();
		let included = self.include.is_empty() || self.include.iter().any(|r| r.is_match(&target));
		included && !self.exclude.iter().any(|r| r.is_match(&target))
	}
}

/// Keep the manifests the expressions select, preserving order.
pub fn filter(list: List, matchers: &Matchers) -> List {
	if matchers.is_empty() {
		return list;
	}
	list.into_iter().filter(|m| matchers.matches(m)).collect()
}
