use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use triage_domain::ParamSet;

use crate::{
	Error, Result,
	labeling::{LabeledTile, LabeledTrace},
};

/// Parameter key to the values accepted for it.
pub type ParamQuery = BTreeMap<String, Vec<String>>;

/// Faceted filter over trace parameters plus an optional commit range.
///
/// Constraints are ANDed across keys and ORed within the values of one key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
	#[serde(default)]
	pub params: ParamQuery,
	#[serde(default)]
	pub start_commit: Option<String>,
	#[serde(default)]
	pub end_commit: Option<String>,
	/// Consider only the latest value of each trace when the window reaches the tile head.
	#[serde(default = "default_head")]
	pub head: bool,
	/// Evaluate against the ignored partition instead of the traces of interest.
	#[serde(default)]
	pub include_ignores: bool,
}
impl Query {
	pub fn with_params<I, K, V>(params: I) -> Self
	where
		I: IntoIterator<Item = (K, Vec<V>)>,
		K: Into<String>,
		V: Into<String>,
	{
		let params = params
			.into_iter()
			.map(|(key, values)| (key.into(), values.into_iter().map(Into::into).collect()))
			.collect();

		Self { params, ..Default::default() }
	}

	pub fn with_range(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
		self.start_commit = Some(start.into());
		self.end_commit = Some(end.into());

		self
	}
}
impl Default for Query {
	fn default() -> Self {
		Self {
			params: ParamQuery::new(),
			start_commit: None,
			end_commit: None,
			head: default_head(),
			include_ignores: false,
		}
	}
}

#[derive(Debug)]
pub struct QueryMatch<'a> {
	pub traces: Vec<&'a LabeledTrace>,
	/// First commit index of the window.
	pub start: usize,
	/// Last commit index of the window, inclusive.
	pub end: usize,
	pub includes_head: bool,
	/// The constraints that name known keys and values.
	pub effective: ParamQuery,
}
impl QueryMatch<'_> {
	/// Whether the query selects the whole partition, so precomputed views answer it.
	pub fn is_unfiltered(&self) -> bool {
		self.effective.is_empty() && self.covers_tile()
	}

	pub fn covers_tile(&self) -> bool {
		self.start == 0 && self.includes_head
	}

	pub fn contains_commit(&self, commit_id: usize) -> bool {
		(self.start..=self.end).contains(&commit_id)
	}
}

/// Lookup structure over one [`LabeledTile`].
///
/// Traces are addressed by (test, position) and relabeling never moves them, so an index stays
/// valid across in-place label updates of its tile.
#[derive(Clone, Debug, Default)]
pub struct LabeledTileIndex {
	entries: Vec<(String, usize)>,
	postings: BTreeMap<String, BTreeMap<String, BTreeSet<usize>>>,
	commit_hashes: Vec<String>,
}
impl LabeledTileIndex {
	pub fn new(tile: &LabeledTile) -> Self {
		let mut index = Self {
			commit_hashes: tile.commits.iter().map(|commit| commit.hash.clone()).collect(),
			..Default::default()
		};

		for (test, traces) in &tile.traces {
			for (position, trace) in traces.iter().enumerate() {
				let ordinal = index.entries.len();

				index.entries.push((test.clone(), position));

				for (key, value) in &trace.params {
					index
						.postings
						.entry(key.clone())
						.or_default()
						.entry(value.clone())
						.or_default()
						.insert(ordinal);
				}
			}
		}

		index
	}

	pub fn query<'a>(&self, tile: &'a LabeledTile, query: &Query) -> Result<QueryMatch<'a>> {
		let (start, end) =
			self.resolve_range(query.start_commit.as_deref(), query.end_commit.as_deref())?;
		let effective = self.effective_params(&query.params);
		let traces = self
			.matching(&effective, None)
			.into_iter()
			.filter_map(|ordinal| {
				let (test, position) = &self.entries[ordinal];

				tile.traces.get(test).and_then(|traces| traces.get(*position))
			})
			.collect();
		let includes_head = end + 1 >= self.commit_hashes.len();

		Ok(QueryMatch { traces, start, end, includes_head, effective })
	}

	/// Reduces `params` to the keys and values observed in this partition.
	pub fn effective_params(&self, params: &ParamQuery) -> ParamQuery {
		params
			.iter()
			.filter_map(|(key, values)| {
				let known = self.postings.get(key)?;
				let mut values =
					values.iter().filter(|value| known.contains_key(*value)).cloned().collect::<Vec<_>>();

				values.sort_unstable();
				values.dedup();

				(!values.is_empty()).then(|| (key.clone(), values))
			})
			.collect()
	}

	/// Values observed per key among traces matching every constraint except the one on that key.
	pub fn all_params(&self, params: &ParamQuery) -> ParamSet {
		let effective = self.effective_params(params);
		let mut all = ParamSet::new();

		for (key, values) in &self.postings {
			let candidates = self.matching(&effective, Some(key.as_str()));

			for (value, ordinals) in values {
				if !ordinals.is_disjoint(&candidates) {
					all.add_value(key, value);
				}
			}
		}

		all
	}

	/// Names of the tests with at least one trace matching `params`.
	pub fn test_names(&self, params: &ParamQuery) -> BTreeSet<String> {
		self.matching(&self.effective_params(params), None)
			.into_iter()
			.map(|ordinal| self.entries[ordinal].0.clone())
			.collect()
	}

	fn matching(&self, effective: &ParamQuery, skip_key: Option<&str>) -> BTreeSet<usize> {
		let mut selected: Option<BTreeSet<usize>> = None;

		for (key, values) in effective {
			if Some(key.as_str()) == skip_key {
				continue;
			}

			let Some(postings) = self.postings.get(key) else {
				return BTreeSet::new();
			};
			let allowed = values
				.iter()
				.filter_map(|value| postings.get(value))
				.flatten()
				.copied()
				.collect::<BTreeSet<_>>();

			selected = Some(match selected {
				Some(current) => current.intersection(&allowed).copied().collect(),
				None => allowed,
			});
		}

		selected.unwrap_or_else(|| (0..self.entries.len()).collect())
	}

	/// Missing or unknown hashes fall back to the tile bounds.
	fn resolve_range(&self, start: Option<&str>, end: Option<&str>) -> Result<(usize, usize)> {
		let last = self.commit_hashes.len().saturating_sub(1);
		let find = |hash: Option<&str>| {
			hash.filter(|hash| !hash.is_empty())
				.and_then(|hash| self.commit_hashes.iter().position(|known| known == hash))
		};
		let start = find(start).unwrap_or(0);
		let end = find(end).unwrap_or(last);

		if start > end {
			return Err(Error::InvalidRequest {
				message: "Start commit occurs later than end commit.".to_string(),
			});
		}

		Ok((start, end))
	}
}

fn default_head() -> bool {
	true
}

#[cfg(test)]
mod tests {
	use std::{collections::HashSet, sync::Arc};

	use triage_domain::{Commit, GoldenTrace, Params, RuleMatcher, Tile};

	use super::*;
	use crate::labeling::partition_tile;

	fn params(pairs: &[(&str, &str)]) -> Params {
		pairs.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
	}

	fn labeled_tile() -> LabeledTile {
		let mut tile = Tile::new(vec![
			Commit::new("c0", 10),
			Commit::new("c1", 20),
			Commit::new("c2", 30),
		]);
		let rows = [
			("t1", "T", "phone", "android"),
			("t2", "T", "laptop", "linux"),
			("t3", "U", "laptop", "windows"),
			("t4", "U", "phone", "ios"),
		];

		for (id, name, device, os) in rows {
			tile.add_trace(
				id,
				GoldenTrace::new(params(&[("name", name), ("device", device), ("os", os)]), vec![
					format!("{id}-a"),
					format!("{id}-b"),
					format!("{id}-c"),
				]),
			);
		}

		let matcher: RuleMatcher = Arc::new(|_: &Params| (Vec::new(), false));

		partition_tile(&tile, &matcher, &HashSet::new()).of_interest
	}

	fn ids(found: &QueryMatch<'_>) -> Vec<String> {
		let mut ids = found.traces.iter().map(|trace| trace.id.clone()).collect::<Vec<_>>();

		ids.sort();

		ids
	}

	#[test]
	fn constraints_and_across_keys_and_or_within_a_key() {
		let tile = labeled_tile();
		let index = LabeledTileIndex::new(&tile);
		let query = Query::with_params([("device", vec!["phone"]), ("os", vec!["android", "ios"])]);
		let found = index.query(&tile, &query).expect("Query should succeed.");

		assert_eq!(ids(&found), vec!["t1", "t4"]);

		let query = Query::with_params([("device", vec!["phone"]), ("name", vec!["U"])]);

		assert_eq!(ids(&index.query(&tile, &query).expect("Query should succeed.")), vec!["t4"]);
	}

	#[test]
	fn unknown_keys_and_values_drop_out_of_the_effective_query() {
		let tile = labeled_tile();
		let index = LabeledTileIndex::new(&tile);
		let query = Query::with_params([
			("device", vec!["phone", "watch"]),
			("gpu", vec!["any"]),
			("os", vec!["beos"]),
		]);
		let found = index.query(&tile, &query).expect("Query should succeed.");

		assert_eq!(found.effective, ParamQuery::from([("device".to_string(), vec![
			"phone".to_string()
		])]));
		assert_eq!(ids(&found), vec!["t1", "t4"]);
		assert!(!found.is_unfiltered());

		let found = index.query(&tile, &Query::with_params([("gpu", vec!["any"])])).expect("Query.");

		assert!(found.is_unfiltered());
		assert_eq!(found.traces.len(), 4);
	}

	#[test]
	fn commit_range_resolves_and_clamps() {
		let tile = labeled_tile();
		let index = LabeledTileIndex::new(&tile);
		let found = index.query(&tile, &Query::default().with_range("c1", "")).expect("Query.");

		assert_eq!((found.start, found.end, found.includes_head), (1, 2, true));

		let found = index.query(&tile, &Query::default().with_range("", "c1")).expect("Query.");

		assert_eq!((found.start, found.end, found.includes_head), (0, 1, false));
		assert!(found.contains_commit(1));
		assert!(!found.contains_commit(2));

		let found =
			index.query(&tile, &Query::default().with_range("zzz", "yyy")).expect("Query.");

		assert_eq!((found.start, found.end, found.includes_head), (0, 2, true));
		assert!(found.is_unfiltered());
	}

	#[test]
	fn inverted_range_is_rejected() {
		let tile = labeled_tile();
		let index = LabeledTileIndex::new(&tile);
		let err = index
			.query(&tile, &Query::default().with_range("c2", "c0"))
			.expect_err("Inverted range should fail.");

		assert!(matches!(err, Error::InvalidRequest { .. }));
		assert!(err.to_string().contains("Start commit occurs later than end commit."));
	}

	#[test]
	fn all_params_is_faceted() {
		let tile = labeled_tile();
		let index = LabeledTileIndex::new(&tile);
		let all = index.all_params(&Query::with_params([("device", vec!["phone"])]).params);
		let devices = all.values("device").expect("Device facet should be present.");
		let systems = all.values("os").expect("Os facet should be present.");

		assert_eq!(devices.iter().collect::<Vec<_>>(), vec!["laptop", "phone"]);
		assert_eq!(systems.iter().collect::<Vec<_>>(), vec!["android", "ios"]);
		assert_eq!(index.all_params(&ParamQuery::new()), tile.param_set);
	}

	#[test]
	fn test_names_follow_the_filter() {
		let tile = labeled_tile();
		let index = LabeledTileIndex::new(&tile);

		assert_eq!(
			index.test_names(&Query::with_params([("os", vec!["linux"])]).params),
			BTreeSet::from(["T".to_string()])
		);
		assert_eq!(index.test_names(&ParamQuery::new()).len(), 2);
	}
}
