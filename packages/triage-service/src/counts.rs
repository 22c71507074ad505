use std::{collections::BTreeMap, ops::RangeInclusive};

use serde::Serialize;
use triage_domain::{Commit, Label, ParamSet};

use crate::{index::ParamQuery, labeling::LabeledTrace};

/// Per-commit counts of observations by label.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LabelCounts {
	pub unt: Vec<usize>,
	pub pos: Vec<usize>,
	pub neg: Vec<usize>,
}
impl LabelCounts {
	fn new(len: usize) -> Self {
		Self { unt: vec![0; len], pos: vec![0; len], neg: vec![0; len] }
	}

	fn add(&mut self, commit_id: usize, label: Label) {
		let column = match label {
			Label::Untriaged => &mut self.unt,
			Label::Positive => &mut self.pos,
			Label::Negative => &mut self.neg,
		};

		if let Some(count) = column.get_mut(commit_id) {
			*count += 1;
		}
	}

	fn accumulate(&mut self, other: &Self) {
		for (target, source) in
			[(&mut self.unt, &other.unt), (&mut self.pos, &other.pos), (&mut self.neg, &other.neg)]
		{
			for (total, count) in target.iter_mut().zip(source) {
				*total += count;
			}
		}
	}
}

/// Label counts per test and overall, for every commit of a partition.
///
/// The precomputed copy held by a snapshot is rebuilt only on a full rebuild, so it lags behind
/// triage until the next cycle.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TileCounts {
	pub commits: Vec<Commit>,
	pub aggregated: LabelCounts,
	pub counts: BTreeMap<String, LabelCounts>,
	pub all_params: ParamSet,
	pub query: ParamQuery,
}

/// Counts the observations of `traces` that fall in `window`.
pub fn count_labels<'a, I>(
	commits: &[Commit],
	traces: I,
	window: RangeInclusive<usize>,
	all_params: ParamSet,
) -> TileCounts
where
	I: IntoIterator<Item = &'a LabeledTrace>,
{
	let mut counts = BTreeMap::<String, LabelCounts>::new();
	let mut aggregated = LabelCounts::new(commits.len());

	for trace in traces {
		let acc =
			counts.entry(trace.test_name().to_string()).or_insert_with(|| LabelCounts::new(commits.len()));

		for (commit_id, label) in trace.commit_ids.iter().zip(&trace.labels) {
			if window.contains(commit_id) {
				acc.add(*commit_id, *label);
			}
		}
	}
	for acc in counts.values() {
		aggregated.accumulate(acc);
	}

	TileCounts {
		commits: commits.to_vec(),
		aggregated,
		counts,
		all_params,
		query: ParamQuery::new(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn trace(test: &str, commit_ids: Vec<usize>, labels: Vec<Label>) -> LabeledTrace {
		LabeledTrace {
			id: format!("{test}-{}", commit_ids.len()),
			params: [("name".to_string(), test.to_string())].into(),
			digests: vec!["d".to_string(); commit_ids.len()],
			commit_ids,
			labels,
			ignore_rules: Vec::new(),
		}
	}

	#[test]
	fn counts_per_test_and_overall() {
		let commits = vec![Commit::new("c0", 1), Commit::new("c1", 2), Commit::new("c2", 3)];
		let traces = [
			trace("T", vec![0, 1], vec![Label::Positive, Label::Untriaged]),
			trace("T", vec![1, 2], vec![Label::Untriaged, Label::Negative]),
			trace("U", vec![2], vec![Label::Positive]),
		];
		let counts = count_labels(&commits, &traces, 0..=2, ParamSet::new());

		assert_eq!(counts.counts["T"], LabelCounts {
			unt: vec![0, 2, 0],
			pos: vec![1, 0, 0],
			neg: vec![0, 0, 1]
		});
		assert_eq!(counts.aggregated, LabelCounts {
			unt: vec![0, 2, 0],
			pos: vec![1, 0, 1],
			neg: vec![0, 0, 1]
		});

		let windowed = count_labels(&commits, &traces, 2..=2, ParamSet::new());

		assert_eq!(windowed.aggregated.unt, vec![0, 0, 0]);
		assert_eq!(windowed.aggregated.pos, vec![0, 0, 1]);
	}
}
