use std::{future::Future, pin::Pin};

use triage_domain::split_diff_id;

use crate::Result;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Key-value persistence for encoded metric records, with a secondary index from each digest to
/// the ids of the records that mention it.
///
/// Implementations derive the index entries of a record from its id with [`index_values`] on every
/// write, so callers never maintain the index themselves.
pub trait MetricsStore
where
	Self: Send + Sync,
{
	fn read<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>>;

	/// Inserts or replaces the record stored under `id`.
	fn write<'a>(&'a self, id: &'a str, record: Vec<u8>) -> BoxFuture<'a, Result<()>>;

	fn delete<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Result<usize>>;

	/// Removes every record whose id mentions one of `digests`, atomically with the index lookup.
	fn purge_digests<'a>(&'a self, digests: &'a [String]) -> BoxFuture<'a, Result<usize>>;

	fn list_ids<'a>(&'a self) -> BoxFuture<'a, Result<Vec<String>>>;

	/// Rebuilds the digest index from the ids currently stored.
	fn reindex<'a>(&'a self) -> BoxFuture<'a, Result<()>>;
}

/// Digests a record id is indexed under.
pub fn index_values(id: &str) -> Vec<String> {
	match split_diff_id(id) {
		Some((left, right)) if left == right => vec![left.to_string()],
		Some((left, right)) => vec![left.to_string(), right.to_string()],
		None => Vec::new(),
	}
}
