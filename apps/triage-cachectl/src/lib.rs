use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use triage_storage::{MetricsCache, db::Db, pg::PgMetricsStore};

#[derive(Debug, Parser)]
#[command(version, about = "Maintenance for the persistent diff metric cache.", rename_all = "kebab")]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Rewrite every record still in the legacy layout, then rebuild the digest index.
	Migrate,
	/// Remove every cached metric that involves one of the given digests.
	Purge {
		#[arg(long = "digest", value_name = "DIGEST", required = true)]
		digests: Vec<String>,
	},
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = triage_config::load(&args.config)?;
	init_tracing(&config);
	let db = Db::connect(&config.storage.postgres).await?;
	db.ensure_schema().await?;
	let cache = MetricsCache::new(Arc::new(PgMetricsStore::new(db)));

	match args.command {
		Command::Migrate => {
			let report = cache.migrate_all().await?;
			tracing::info!(
				scanned = report.scanned,
				unreadable = report.unreadable,
				"Metric cache migration finished."
			);
		},
		Command::Purge { digests } => {
			let removed = cache.purge(&digests).await?;
			tracing::info!(digests = digests.len(), removed, "Metric cache purge finished.");
		},
	}

	Ok(())
}

fn init_tracing(config: &triage_config::Config) {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt().with_env_filter(filter).init();
}
