use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::Digest;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
	#[default]
	Untriaged,
	Positive,
	Negative,
}

/// Digest to label for a single test.
pub type TestClassification = BTreeMap<Digest, Label>;

/// The authoritative test -> digest -> label mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectations {
	pub tests: HashMap<String, TestClassification>,
}
impl Expectations {
	pub fn new() -> Self {
		Self::default()
	}

	/// Label of `digest` for `test`; digests without an entry are untriaged.
	pub fn classification(&self, test: &str, digest: &str) -> Label {
		self.tests.get(test).and_then(|digests| digests.get(digest)).copied().unwrap_or_default()
	}

	/// Merges `changes` into these expectations; later labels replace earlier ones.
	pub fn add_digests<'a, I>(&mut self, changes: I)
	where
		I: IntoIterator<Item = (&'a String, &'a TestClassification)>,
	{
		for (test, digests) in changes {
			let entry = self.tests.entry(test.clone()).or_default();

			for (digest, label) in digests {
				entry.insert(digest.clone(), *label);
			}
		}
	}
}
