use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::Digest;

/// Parameter key that names the test a trace belongs to.
pub const PRIMARY_KEY_FIELD: &str = "name";
/// Sentinel stored in a trace for commits that produced no result.
pub const MISSING_DIGEST: &str = "";

pub type Params = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
	pub hash: String,
	/// Seconds since the Unix epoch. Zero marks a placeholder slot at the end of a tile.
	pub commit_time: i64,
}
impl Commit {
	pub fn new(hash: impl Into<String>, commit_time: i64) -> Self {
		Self { hash: hash.into(), commit_time }
	}

	fn is_placeholder(&self) -> bool {
		self.hash.is_empty()
	}
}

/// One test instance's results across the commits of a tile.
///
/// `digests()` is aligned with the tile's commit sequence; commits without a result hold
/// [`MISSING_DIGEST`].
pub trait Trace
where
	Self: std::fmt::Debug + Send + Sync,
{
	fn params(&self) -> &Params;

	fn digests(&self) -> &[Digest];

	fn test_name(&self) -> Option<&str> {
		self.params().get(PRIMARY_KEY_FIELD).map(String::as_str)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldenTrace {
	pub params: Params,
	pub values: Vec<Digest>,
}
impl GoldenTrace {
	pub fn new(params: Params, values: Vec<Digest>) -> Self {
		Self { params, values }
	}
}
impl Trace for GoldenTrace {
	fn params(&self) -> &Params {
		&self.params
	}

	fn digests(&self) -> &[Digest] {
		&self.values
	}
}

/// Every parameter value observed, per key. Values are kept sorted and unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSet(BTreeMap<String, BTreeSet<String>>);
impl ParamSet {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_params(&mut self, params: &Params) {
		for (key, value) in params {
			self.0.entry(key.clone()).or_default().insert(value.clone());
		}
	}

	pub fn add_value(&mut self, key: &str, value: &str) {
		self.0.entry(key.to_string()).or_default().insert(value.to_string());
	}

	pub fn contains(&self, key: &str, value: &str) -> bool {
		self.0.get(key).map(|values| values.contains(value)).unwrap_or(false)
	}

	pub fn values(&self, key: &str) -> Option<&BTreeSet<String>> {
		self.0.get(key)
	}
}
impl FromIterator<(String, String)> for ParamSet {
	fn from_iter<I>(iter: I) -> Self
	where
		I: IntoIterator<Item = (String, String)>,
	{
		let mut set = Self::new();

		for (key, value) in iter {
			set.0.entry(key).or_default().insert(value);
		}

		set
	}
}

/// Raw snapshot of every trace over a window of commits. Index 0 is the oldest commit.
#[derive(Debug, Default)]
pub struct Tile {
	pub commits: Vec<Commit>,
	pub traces: BTreeMap<String, Box<dyn Trace>>,
	pub param_set: ParamSet,
}
impl Tile {
	pub fn new(commits: Vec<Commit>) -> Self {
		Self { commits, traces: BTreeMap::new(), param_set: ParamSet::new() }
	}

	pub fn add_trace<T>(&mut self, trace_id: impl Into<String>, trace: T)
	where
		T: Trace + 'static,
	{
		self.param_set.add_params(trace.params());
		self.traces.insert(trace_id.into(), Box::new(trace));
	}

	/// Number of leading commits that carry data; trailing placeholder slots are not counted.
	pub fn len(&self) -> usize {
		self.commits.iter().rposition(|commit| !commit.is_placeholder()).map(|idx| idx + 1).unwrap_or(0)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
