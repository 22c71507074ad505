use std::{
	collections::{BTreeMap, BTreeSet, HashMap},
	sync::RwLock,
};

use crate::{
	Result,
	store::{BoxFuture, MetricsStore, index_values},
};

/// Process-local [`MetricsStore`]. Used for embedded deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryMetricsStore {
	state: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
	records: BTreeMap<String, Vec<u8>>,
	digest_index: HashMap<String, BTreeSet<String>>,
}
impl MemoryState {
	fn index(&mut self, id: &str) {
		for digest in index_values(id) {
			self.digest_index.entry(digest).or_default().insert(id.to_string());
		}
	}

	fn remove(&mut self, id: &str) -> bool {
		if self.records.remove(id).is_none() {
			return false;
		}

		for digest in index_values(id) {
			if let Some(ids) = self.digest_index.get_mut(&digest) {
				ids.remove(id);

				if ids.is_empty() {
					self.digest_index.remove(&digest);
				}
			}
		}

		true
	}
}

impl MemoryMetricsStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.state.read().unwrap_or_else(|err| err.into_inner()).records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Ids indexed under `digest`.
	pub fn indexed_ids(&self, digest: &str) -> Vec<String> {
		self.state
			.read()
			.unwrap_or_else(|err| err.into_inner())
			.digest_index
			.get(digest)
			.map(|ids| ids.iter().cloned().collect())
			.unwrap_or_default()
	}
}

impl MetricsStore for MemoryMetricsStore {
	fn read<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
		let record = self.state.read().unwrap_or_else(|err| err.into_inner()).records.get(id).cloned();

		Box::pin(async move { Ok(record) })
	}

	fn write<'a>(&'a self, id: &'a str, record: Vec<u8>) -> BoxFuture<'a, Result<()>> {
		let mut state = self.state.write().unwrap_or_else(|err| err.into_inner());

		state.records.insert(id.to_string(), record);
		state.index(id);

		Box::pin(async move { Ok(()) })
	}

	fn delete<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Result<usize>> {
		let mut state = self.state.write().unwrap_or_else(|err| err.into_inner());
		let removed = ids.iter().filter(|id| state.remove(id)).count();

		Box::pin(async move { Ok(removed) })
	}

	fn purge_digests<'a>(&'a self, digests: &'a [String]) -> BoxFuture<'a, Result<usize>> {
		let mut state = self.state.write().unwrap_or_else(|err| err.into_inner());
		let ids = digests
			.iter()
			.filter_map(|digest| state.digest_index.get(digest))
			.flatten()
			.cloned()
			.collect::<BTreeSet<_>>();
		let removed = ids.iter().filter(|id| state.remove(id)).count();

		Box::pin(async move { Ok(removed) })
	}

	fn list_ids<'a>(&'a self) -> BoxFuture<'a, Result<Vec<String>>> {
		let ids = self
			.state
			.read()
			.unwrap_or_else(|err| err.into_inner())
			.records
			.keys()
			.cloned()
			.collect::<Vec<_>>();

		Box::pin(async move { Ok(ids) })
	}

	fn reindex<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
		let mut state = self.state.write().unwrap_or_else(|err| err.into_inner());
		let ids = state.records.keys().cloned().collect::<Vec<_>>();

		state.digest_index.clear();

		for id in ids {
			state.index(&id);
		}

		Box::pin(async move { Ok(()) })
	}
}
