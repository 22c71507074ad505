//! Partitioning of a raw tile into the traces of interest and the ignored traces, and the
//! classification of every retained observation.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use triage_domain::{
	Commit, Digest, Expectations, IgnoreRule, Label, MISSING_DIGEST, PRIMARY_KEY_FIELD, ParamSet,
	Params, RuleMatcher, Tile, Trace,
};

/// A trace restricted to the commits that produced a present, available digest.
///
/// `commit_ids`, `digests` and `labels` are index-aligned and always have the same length.
/// `commit_ids` is strictly increasing.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LabeledTrace {
	pub id: String,
	pub params: Params,
	pub commit_ids: Vec<usize>,
	pub digests: Vec<Digest>,
	pub labels: Vec<Label>,
	pub ignore_rules: Vec<IgnoreRule>,
}
impl LabeledTrace {
	fn new(id: &str, params: &Params, commit_ids: Vec<usize>, digests: Vec<Digest>) -> Self {
		let labels = vec![Label::Untriaged; digests.len()];

		Self {
			id: id.to_string(),
			params: params.clone(),
			commit_ids,
			digests,
			labels,
			ignore_rules: Vec::new(),
		}
	}

	pub fn test_name(&self) -> &str {
		self.params.get(PRIMARY_KEY_FIELD).map(String::as_str).unwrap_or_default()
	}

	pub fn len(&self) -> usize {
		self.commit_ids.len()
	}

	pub fn is_empty(&self) -> bool {
		self.commit_ids.is_empty()
	}

	/// The most recent observation.
	pub fn head(&self) -> Option<(usize, &str, Label)> {
		let last = self.len().checked_sub(1)?;

		Some((self.commit_ids[last], self.digests[last].as_str(), self.labels[last]))
	}

	/// Sets every label from `expectations`; digests without an entry become untriaged.
	pub fn relabel(&mut self, test: &str, expectations: &Expectations) {
		for (label, digest) in self.labels.iter_mut().zip(&self.digests) {
			*label = expectations.classification(test, digest);
		}
	}

	/// Folds the observations of another raw trace with identical params into this one.
	///
	/// On a commit present in both, the observation already held wins.
	fn merge(&mut self, commit_ids: Vec<usize>, digests: Vec<Digest>) {
		let mut merged = self
			.commit_ids
			.drain(..)
			.zip(self.digests.drain(..))
			.collect::<BTreeMap<usize, Digest>>();

		for (commit_id, digest) in commit_ids.into_iter().zip(digests) {
			merged.entry(commit_id).or_insert(digest);
		}

		(self.commit_ids, self.digests) = merged.into_iter().unzip();
		self.labels = vec![Label::Untriaged; self.digests.len()];
	}

	fn add_ignore_rules(&mut self, rules: Vec<IgnoreRule>) {
		for rule in rules {
			if !self.ignore_rules.iter().any(|known| known.id == rule.id) {
				self.ignore_rules.push(rule);
			}
		}
	}
}

/// One partition of a tile: its commits, traces grouped by test name, and for every test the sorted,
/// duplicate-free commit indices that produced each digest.
#[derive(Clone, Debug, Default, Serialize)]
pub struct LabeledTile {
	pub commits: Vec<Commit>,
	pub traces: BTreeMap<String, Vec<LabeledTrace>>,
	pub commits_by_digest: BTreeMap<String, BTreeMap<Digest, Vec<usize>>>,
	pub param_set: ParamSet,
}
impl LabeledTile {
	pub fn new(commits: Vec<Commit>) -> Self {
		Self { commits, ..Default::default() }
	}

	pub fn trace_count(&self) -> usize {
		self.traces.values().map(Vec::len).sum()
	}

	pub fn iter_traces(&self) -> impl Iterator<Item = &LabeledTrace> {
		self.traces.values().flatten()
	}

	pub fn label_digests(&mut self, expectations: &Expectations) {
		for (test, traces) in &mut self.traces {
			for trace in traces {
				trace.relabel(test, expectations);
			}
		}
	}

	/// Copies of the traces of `test` labeled with `expectations`, leaving this tile untouched.
	pub fn relabeled_test(&self, test: &str, expectations: &Expectations) -> Option<Vec<LabeledTrace>> {
		let mut traces = self.traces.get(test)?.clone();

		for trace in &mut traces {
			trace.relabel(test, expectations);
		}

		Some(traces)
	}

	fn add_observations(
		&mut self,
		trace_id: &str,
		params: &Params,
		commit_ids: Vec<usize>,
		digests: Vec<Digest>,
		rules: Vec<IgnoreRule>,
	) {
		let test = params.get(PRIMARY_KEY_FIELD).cloned().unwrap_or_default();
		let by_digest = self.commits_by_digest.entry(test.clone()).or_default();

		for (commit_id, digest) in commit_ids.iter().zip(&digests) {
			by_digest.entry(digest.clone()).or_default().push(*commit_id);
		}

		self.param_set.add_params(params);

		let traces = self.traces.entry(test).or_default();
		let trace = match traces.iter().position(|trace| trace.params == *params) {
			Some(idx) => {
				traces[idx].merge(commit_ids, digests);

				&mut traces[idx]
			},
			None => {
				traces.push(LabeledTrace::new(trace_id, params, commit_ids, digests));

				let last = traces.len() - 1;

				&mut traces[last]
			},
		};

		trace.add_ignore_rules(rules);
	}

	fn finish(mut self) -> Self {
		for digests in self.commits_by_digest.values_mut() {
			for commit_ids in digests.values_mut() {
				commit_ids.sort_unstable();
				commit_ids.dedup();
			}
		}

		self
	}
}

#[derive(Debug, Default)]
pub struct Partition {
	pub of_interest: LabeledTile,
	pub ignored: LabeledTile,
}

/// Routes every trace of `tile` wholly to one partition, dropping missing and unavailable digests.
///
/// A trace with no retained observation appears in neither partition. All labels start untriaged.
pub fn partition_tile(tile: &Tile, matcher: &RuleMatcher, unavailable: &HashSet<Digest>) -> Partition {
	let tile_len = tile.len();
	let commits = tile.commits[..tile_len].to_vec();
	let mut of_interest = LabeledTile::new(commits.clone());
	let mut ignored = LabeledTile::new(commits);

	for (trace_id, trace) in &tile.traces {
		let (commit_ids, digests): (Vec<usize>, Vec<Digest>) = trace
			.digests()
			.iter()
			.take(tile_len)
			.enumerate()
			.filter(|(_, digest)| digest.as_str() != MISSING_DIGEST && !unavailable.contains(*digest))
			.map(|(commit_id, digest)| (commit_id, digest.clone()))
			.unzip();

		if commit_ids.is_empty() {
			continue;
		}

		let (matched, is_ignored) = matcher(trace.params());

		if is_ignored {
			ignored.add_observations(trace_id, trace.params(), commit_ids, digests, matched);
		} else {
			of_interest.add_observations(trace_id, trace.params(), commit_ids, digests, Vec::new());
		}
	}

	Partition { of_interest: of_interest.finish(), ignored: ignored.finish() }
}
