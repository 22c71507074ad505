use std::{collections::BTreeMap, sync::Mutex};

pub const ANALYSIS_RUNS: &str = "analysis.runs";
pub const ANALYSIS_ERRORS: &str = "analysis.errors";
pub const ANALYSIS_TRIAGE: &str = "analysis.triage";
pub const DIFF_COMPUTED: &str = "diff.computed";
pub const DIFF_ERRORS: &str = "diff.errors";
pub const DIFF_CACHE_HITS: &str = "diff.cache_hits";

/// Observability sink for named event counters.
pub trait Counters
where
	Self: Send + Sync,
{
	fn increment(&self, name: &str);

	fn error_increment(&self, name: &str);
}

/// In-process [`Counters`] that can be read back.
#[derive(Debug, Default)]
pub struct CounterRegistry {
	counts: Mutex<BTreeMap<String, u64>>,
}
impl CounterRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, name: &str) -> u64 {
		self.counts.lock().unwrap_or_else(|err| err.into_inner()).get(name).copied().unwrap_or(0)
	}

	fn add(&self, name: &str) {
		let mut counts = self.counts.lock().unwrap_or_else(|err| err.into_inner());

		*counts.entry(name.to_string()).or_default() += 1;
	}
}
impl Counters for CounterRegistry {
	fn increment(&self, name: &str) {
		self.add(name);
	}

	fn error_increment(&self, name: &str) {
		self.add(name);

		tracing::debug!(counter = name, "Error counter incremented.");
	}
}
