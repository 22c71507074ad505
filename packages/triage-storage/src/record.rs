//! On-disk layout of cached metrics.
//!
//! Current records wrap the encoded metric in `diff_metrics`. Records written by the previous
//! layout stored the metric fields inline next to the id and left no `diff_metrics` payload.

use serde::{Deserialize, Serialize};
use triage_domain::DiffMetric;

use crate::Result;

const RGBA_CHANNELS: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsRecord {
	pub id: String,
	#[serde(default)]
	pub diff_metrics: Vec<u8>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LegacyMetricsRecord {
	#[serde(default)]
	num_diff_pixels: i64,
	#[serde(default)]
	pixel_diff_percent: f32,
	#[serde(default)]
	max_rgba_diffs: Vec<i32>,
	#[serde(default)]
	pixel_diff_file_path: String,
}
impl LegacyMetricsRecord {
	/// Returns the metric when the record plausibly holds one.
	pub(crate) fn into_metric(self) -> Option<DiffMetric> {
		if self.max_rgba_diffs.len() != RGBA_CHANNELS {
			return None;
		}

		Some(DiffMetric {
			num_diff_pixels: self.num_diff_pixels,
			pixel_diff_percent: self.pixel_diff_percent,
			max_rgba_diffs: self.max_rgba_diffs,
			pixel_diff_file_path: self.pixel_diff_file_path,
		})
	}
}

pub fn encode_record(id: &str, metric: &DiffMetric) -> Result<Vec<u8>> {
	let record = MetricsRecord { id: id.to_string(), diff_metrics: serde_json::to_vec(metric)? };

	Ok(serde_json::to_vec(&record)?)
}

pub fn decode_record(raw: &[u8]) -> Result<MetricsRecord> {
	Ok(serde_json::from_slice(raw)?)
}

pub fn decode_metric(payload: &[u8]) -> Result<DiffMetric> {
	Ok(serde_json::from_slice(payload)?)
}

pub(crate) fn decode_legacy(raw: &[u8]) -> Result<LegacyMetricsRecord> {
	Ok(serde_json::from_slice(raw)?)
}
