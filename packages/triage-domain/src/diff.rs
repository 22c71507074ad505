use serde::{Deserialize, Serialize};

/// Separator between the two digests of a diff id.
pub const DIFF_ID_SEPARATOR: char = '-';
/// Separator used by the previous on-disk key layout.
pub const LEGACY_DIFF_ID_SEPARATOR: char = ':';

/// Pixel-level difference between two digests, as produced by the pixel-diff collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffMetric {
	pub num_diff_pixels: i64,
	pub pixel_diff_percent: f32,
	/// Maximum per-channel difference, in RGBA order.
	pub max_rgba_diffs: Vec<i32>,
	pub pixel_diff_file_path: String,
}

/// Whether `digest` can be part of a diff id. Only ASCII alphanumerics are accepted, so neither
/// separator can occur inside a digest and every id names exactly one pair.
pub fn is_valid_digest(digest: &str) -> bool {
	!digest.is_empty() && digest.bytes().all(|byte| byte.is_ascii_alphanumeric())
}

/// Canonical, order-independent id for the pair `(left, right)`.
pub fn diff_id(left: &str, right: &str) -> String {
	let (low, high) = if left <= right { (left, right) } else { (right, left) };

	format!("{low}{DIFF_ID_SEPARATOR}{high}")
}

/// Recovers both digests from an id in either the current or the legacy layout. Returns `None`
/// unless both halves are valid digests.
pub fn split_diff_id(id: &str) -> Option<(&str, &str)> {
	let (left, right) = id
		.split_once(LEGACY_DIFF_ID_SEPARATOR)
		.or_else(|| id.split_once(DIFF_ID_SEPARATOR))?;

	if !is_valid_digest(left) || !is_valid_digest(right) {
		return None;
	}

	Some((left, right))
}

pub fn is_legacy_diff_id(id: &str) -> bool {
	id.contains(LEGACY_DIFF_ID_SEPARATOR)
}
