use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub analysis: Analysis,
	pub storage: Storage,
	#[serde(default)]
	pub cache: Cache,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

/// Scheduling and fan-out limits for the rebuild loop and the per-test diff expansion.
#[derive(Debug, Clone, Deserialize)]
pub struct Analysis {
	pub rebuild_interval_ms: u64,
	pub tile_timeout_ms: u64,
	pub expectations_timeout_ms: u64,
	pub diff_timeout_ms: u64,
	/// Bounds every ignore-rule store call, including matcher construction during a rebuild.
	pub ignores_timeout_ms: u64,
	#[serde(default = "default_max_concurrent_tests")]
	pub max_concurrent_tests: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cache {
	/// Walk the whole metric store once at startup and rewrite records still in the old layout.
	#[serde(default)]
	pub migrate_legacy_on_start: bool,
}

fn default_max_concurrent_tests() -> usize {
	32
}
