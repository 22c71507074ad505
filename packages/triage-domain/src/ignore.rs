use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::Params;

/// A user-authored predicate that moves matching traces out of the triage view.
///
/// `query` is opaque here; the ignore-rule store owns its matching language and hands back a
/// [`RuleMatcher`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreRule {
	pub id: i64,
	pub author: String,
	pub updated_by: String,
	#[serde(with = "crate::time_serde")]
	pub expires: OffsetDateTime,
	pub query: String,
	pub note: String,
}

/// Evaluates a trace's parameters against the active rule set and returns the rules that matched
/// and whether the trace is ignored.
pub type RuleMatcher = Arc<dyn Fn(&Params) -> (Vec<IgnoreRule>, bool) + Send + Sync>;
