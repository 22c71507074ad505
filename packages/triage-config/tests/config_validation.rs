use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use triage_config::{Config, Error};

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_toml_with(section: &str, key: &str, value: Value) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");
	let mut table = root.as_table_mut().expect("Template config must be a table.");

	for part in section.split('.') {
		table = table
			.get_mut(part)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Template config must include [{section}]."));
	}

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render template config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("triage_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_payload(payload: String) -> triage_config::Result<Config> {
	let path = write_temp_config(payload);
	let result = triage_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn expect_validation(payload: String, expected: &str) {
	let err = load_payload(payload).expect_err("Expected a validation error.");
	let message = err.to_string();

	assert!(matches!(err, Error::Validation { .. }), "Unexpected error kind: {err:?}");
	assert!(message.contains(expected), "Unexpected error message: {message}");
}

#[test]
fn sample_config_loads() {
	let cfg = load_payload(SAMPLE_CONFIG_TEMPLATE_TOML.to_string())
		.expect("Sample config should load.");

	assert_eq!(cfg.service.log_level, "info");
	assert_eq!(cfg.analysis.rebuild_interval_ms, 300_000);
	assert_eq!(cfg.analysis.max_concurrent_tests, 32);
	assert_eq!(cfg.storage.postgres.pool_max_conns, 8);
	assert!(!cfg.cache.migrate_legacy_on_start);
}

#[test]
fn rebuild_interval_must_be_positive() {
	expect_validation(
		sample_toml_with("analysis", "rebuild_interval_ms", Value::Integer(0)),
		"analysis.rebuild_interval_ms must be greater than zero.",
	);
}

#[test]
fn diff_timeout_must_be_positive() {
	expect_validation(
		sample_toml_with("analysis", "diff_timeout_ms", Value::Integer(0)),
		"analysis.diff_timeout_ms must be greater than zero.",
	);
}

#[test]
fn ignores_timeout_must_be_positive() {
	expect_validation(
		sample_toml_with("analysis", "ignores_timeout_ms", Value::Integer(0)),
		"analysis.ignores_timeout_ms must be greater than zero.",
	);
}

#[test]
fn max_concurrent_tests_must_be_positive() {
	expect_validation(
		sample_toml_with("analysis", "max_concurrent_tests", Value::Integer(0)),
		"analysis.max_concurrent_tests must be greater than zero.",
	);
}

#[test]
fn postgres_dsn_must_be_non_empty() {
	expect_validation(
		sample_toml_with("storage.postgres", "dsn", Value::String("   ".to_string())),
		"storage.postgres.dsn must be non-empty.",
	);
}

#[test]
fn log_level_is_trimmed() {
	let cfg = load_payload(sample_toml_with(
		"service",
		"log_level",
		Value::String("  debug ".to_string()),
	))
	.expect("Config should load.");

	assert_eq!(cfg.service.log_level, "debug");
}

#[test]
fn blank_log_level_is_rejected() {
	expect_validation(
		sample_toml_with("service", "log_level", Value::String(" ".to_string())),
		"service.log_level must be non-empty.",
	);
}

#[test]
fn missing_cache_section_defaults() {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");

	root.as_table_mut().expect("Template config must be a table.").remove("cache");

	let cfg = load_payload(toml::to_string(&root).expect("Failed to render template config."))
		.expect("Config without [cache] should load.");

	assert!(!cfg.cache.migrate_legacy_on_start);
}

#[test]
fn missing_file_is_read_error() {
	let mut path = env::temp_dir();

	path.push("triage_config_test_missing_file.toml");

	let err = triage_config::load(&path).expect_err("Expected a read error.");

	assert!(matches!(err, Error::ReadConfig { .. }));
}
