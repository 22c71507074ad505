//! Per-test triage detail: occurrence summaries for every labeled digest and, for each untriaged
//! digest, its diff metrics against the positive digests of the same test.

use std::{cmp::Ordering, collections::BTreeMap, sync::Arc};

use serde::Serialize;
use tokio::{sync::Semaphore, task::JoinSet};
use triage_domain::{DiffMetric, Digest, Label, Params};

use crate::{DiffStore, PathToUrl, TriageService, labeling::LabeledTrace};

/// Occurrences of a digest within one test, with a histogram of the params that produced it.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DigestInfo {
	pub img_url: String,
	pub count: usize,
	pub param_counts: BTreeMap<String, BTreeMap<String, usize>>,
}
impl DigestInfo {
	fn observe(&mut self, params: &Params) {
		self.count += 1;

		for (key, value) in params {
			*self.param_counts.entry(key.clone()).or_default().entry(value.clone()).or_default() += 1;
		}
	}
}

/// Comparison of an untriaged digest against one positive digest. `metric` is `None` when the
/// diff could not be obtained.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiffEntry {
	pub pos_digest: Digest,
	pub diff_img_url: Option<String>,
	pub metric: Option<DiffMetric>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UntriagedDigest {
	#[serde(flatten)]
	pub info: DigestInfo,
	/// Closest positive digest first.
	pub diffs: Vec<DiffEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TestDetail {
	pub name: String,
	pub untriaged: BTreeMap<Digest, UntriagedDigest>,
	pub positive: BTreeMap<Digest, DigestInfo>,
	pub negative: BTreeMap<Digest, DigestInfo>,
}

impl TriageService {
	/// Builds the detail of every test in `tests`, expanding diffs with one task per test.
	pub(crate) async fn build_test_details<'a, I>(&self, tests: I) -> BTreeMap<String, TestDetail>
	where
		I: IntoIterator<Item = (&'a String, &'a Vec<LabeledTrace>)>,
	{
		let mut details = tests
			.into_iter()
			.map(|(name, traces)| {
				(name.clone(), summarize_test(name, traces, |digest| self.url_for_digest(digest)))
			})
			.collect::<BTreeMap<_, _>>();

		expand_diffs(
			&mut details,
			self.diffs.clone(),
			self.collaborators.path_to_url.clone(),
			self.cfg.max_concurrent_tests,
		)
		.await;

		details
	}
}

pub(crate) fn summarize_test<F>(name: &str, traces: &[LabeledTrace], url_for: F) -> TestDetail
where
	F: Fn(&str) -> String,
{
	let mut detail = TestDetail { name: name.to_string(), ..Default::default() };

	for trace in traces {
		for (digest, label) in trace.digests.iter().zip(&trace.labels) {
			let info = match label {
				Label::Untriaged => &mut detail.untriaged.entry(digest.clone()).or_default().info,
				Label::Positive => detail.positive.entry(digest.clone()).or_default(),
				Label::Negative => detail.negative.entry(digest.clone()).or_default(),
			};

			if info.count == 0 {
				info.img_url = url_for(digest);
			}

			info.observe(&trace.params);
		}
	}

	detail
}

async fn expand_diffs(
	details: &mut BTreeMap<String, TestDetail>,
	diffs: Arc<DiffStore>,
	path_to_url: PathToUrl,
	max_concurrent: usize,
) {
	let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
	let mut tasks = JoinSet::new();

	for detail in details.values() {
		if detail.untriaged.is_empty() || detail.positive.is_empty() {
			continue;
		}

		let name = detail.name.clone();
		let untriaged = detail.untriaged.keys().cloned().collect::<Vec<_>>();
		let positive = detail.positive.keys().cloned().collect::<Vec<_>>();
		let diffs = diffs.clone();
		let path_to_url = path_to_url.clone();
		let permits = permits.clone();

		tasks.spawn(async move {
			let _permit = permits.acquire_owned().await.ok();
			let mut expanded = BTreeMap::new();

			for digest in untriaged {
				let mut entries = Vec::with_capacity(positive.len());

				for pos_digest in &positive {
					let metric = diffs.get(&digest, pos_digest).await;

					entries.push(DiffEntry {
						pos_digest: pos_digest.clone(),
						diff_img_url: metric
							.as_ref()
							.map(|metric| path_to_url(&metric.pixel_diff_file_path)),
						metric,
					});
				}

				sort_diffs(&mut entries);
				expanded.insert(digest, entries);
			}

			(name, expanded)
		});
	}

	while let Some(joined) = tasks.join_next().await {
		match joined {
			Ok((name, expanded)) =>
				if let Some(detail) = details.get_mut(&name) {
					for (digest, entries) in expanded {
						if let Some(untriaged) = detail.untriaged.get_mut(&digest) {
							untriaged.diffs = entries;
						}
					}
				},
			Err(err) => {
				tracing::error!(error = %err, "Diff expansion task failed.");
			},
		}
	}
}

/// Ascending by pixel difference; entries without a metric go last.
pub(crate) fn sort_diffs(entries: &mut [DiffEntry]) {
	entries.sort_by(|left, right| {
		let by_metric = match (&left.metric, &right.metric) {
			(Some(l), Some(r)) => l.pixel_diff_percent.total_cmp(&r.pixel_diff_percent),
			(Some(_), None) => Ordering::Less,
			(None, Some(_)) => Ordering::Greater,
			(None, None) => Ordering::Equal,
		};

		by_metric.then_with(|| left.pos_digest.cmp(&right.pos_digest))
	});
}
