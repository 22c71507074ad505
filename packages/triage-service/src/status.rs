use std::collections::BTreeSet;

use serde::Serialize;
use time::OffsetDateTime;
use triage_domain::{Commit, Label};

use crate::labeling::LabeledTile;

/// Triage state at the head of one partition.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PartitionStatus {
	/// Nothing at head is untriaged or negative.
	pub ok: bool,
	pub last_commit: Option<Commit>,
	pub untriaged: usize,
	pub negative: usize,
	pub positive: usize,
	pub untriaged_tests: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct Status {
	#[serde(with = "triage_domain::time_serde")]
	pub built_at: OffsetDateTime,
	pub current: PartitionStatus,
	pub ignored: PartitionStatus,
}

/// Counts distinct (test, digest) pairs among the latest observation of every trace.
pub fn partition_status(tile: &LabeledTile) -> PartitionStatus {
	let mut untriaged = BTreeSet::new();
	let mut negative = BTreeSet::new();
	let mut positive = BTreeSet::new();

	for (test, traces) in &tile.traces {
		for (_, digest, label) in traces.iter().filter_map(|trace| trace.head()) {
			let target = match label {
				Label::Untriaged => &mut untriaged,
				Label::Negative => &mut negative,
				Label::Positive => &mut positive,
			};

			target.insert((test.as_str(), digest));
		}
	}

	let untriaged_tests = untriaged.iter().map(|(test, _)| *test).collect::<BTreeSet<_>>().len();

	PartitionStatus {
		ok: untriaged.is_empty() && negative.is_empty(),
		last_commit: tile.commits.last().cloned(),
		untriaged: untriaged.len(),
		negative: negative.len(),
		positive: positive.len(),
		untriaged_tests,
	}
}
