pub mod diff;
pub mod expectations;
pub mod ignore;
pub mod tile;
pub mod time_serde;

pub use diff::{DiffMetric, diff_id, is_valid_digest, split_diff_id};
pub use expectations::{Expectations, Label, TestClassification};
pub use ignore::{IgnoreRule, RuleMatcher};
pub use tile::{Commit, GoldenTrace, MISSING_DIGEST, PRIMARY_KEY_FIELD, ParamSet, Params, Tile, Trace};

/// Content hash of a rendered image.
pub type Digest = String;
