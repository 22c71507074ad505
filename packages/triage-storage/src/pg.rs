use crate::{
	Result,
	db::Db,
	store::{BoxFuture, MetricsStore, index_values},
};

/// [`MetricsStore`] backed by the `diff_metrics` and `diff_metric_digests` tables.
pub struct PgMetricsStore {
	db: Db,
}
impl PgMetricsStore {
	pub fn new(db: Db) -> Self {
		Self { db }
	}

	pub fn db(&self) -> &Db {
		&self.db
	}

	async fn read_record(&self, id: &str) -> Result<Option<Vec<u8>>> {
		let record = sqlx::query_scalar::<_, Vec<u8>>(
			"SELECT record FROM diff_metrics WHERE diff_id = $1",
		)
		.bind(id)
		.fetch_optional(&self.db.pool)
		.await?;

		Ok(record)
	}

	async fn write_record(&self, id: &str, record: Vec<u8>) -> Result<()> {
		let digests = index_values(id);
		let mut tx = self.db.pool.begin().await?;

		sqlx::query(
			"\
INSERT INTO diff_metrics (diff_id, record, updated_at)
VALUES ($1, $2, now())
ON CONFLICT (diff_id) DO UPDATE
SET record = EXCLUDED.record, updated_at = EXCLUDED.updated_at",
		)
		.bind(id)
		.bind(record)
		.execute(&mut *tx)
		.await?;

		for digest in digests {
			sqlx::query(
				"\
INSERT INTO diff_metric_digests (digest, diff_id)
VALUES ($1, $2)
ON CONFLICT DO NOTHING",
			)
			.bind(digest)
			.bind(id)
			.execute(&mut *tx)
			.await?;
		}

		tx.commit().await?;

		Ok(())
	}

	async fn delete_records(&self, ids: &[String]) -> Result<usize> {
		if ids.is_empty() {
			return Ok(0);
		}

		let result = sqlx::query("DELETE FROM diff_metrics WHERE diff_id = ANY($1)")
			.bind(ids)
			.execute(&self.db.pool)
			.await?;

		Ok(result.rows_affected() as usize)
	}

	async fn purge(&self, digests: &[String]) -> Result<usize> {
		if digests.is_empty() {
			return Ok(0);
		}

		let mut tx = self.db.pool.begin().await?;
		let ids: Vec<String> = sqlx::query_scalar(
			"SELECT DISTINCT diff_id FROM diff_metric_digests WHERE digest = ANY($1)",
		)
		.bind(digests)
		.fetch_all(&mut *tx)
		.await?;

		if ids.is_empty() {
			tx.commit().await?;

			return Ok(0);
		}

		// Index rows go with their records through ON DELETE CASCADE.
		let result = sqlx::query("DELETE FROM diff_metrics WHERE diff_id = ANY($1)")
			.bind(&ids)
			.execute(&mut *tx)
			.await?;

		tx.commit().await?;

		Ok(result.rows_affected() as usize)
	}

	async fn all_ids(&self) -> Result<Vec<String>> {
		let ids = sqlx::query_scalar("SELECT diff_id FROM diff_metrics ORDER BY diff_id")
			.fetch_all(&self.db.pool)
			.await?;

		Ok(ids)
	}

	async fn rebuild_index(&self) -> Result<()> {
		let mut tx = self.db.pool.begin().await?;

		sqlx::query("DELETE FROM diff_metric_digests").execute(&mut *tx).await?;

		let ids: Vec<String> =
			sqlx::query_scalar("SELECT diff_id FROM diff_metrics").fetch_all(&mut *tx).await?;
		let mut digests = Vec::with_capacity(ids.len() * 2);
		let mut diff_ids = Vec::with_capacity(ids.len() * 2);

		for id in &ids {
			for digest in index_values(id) {
				digests.push(digest);
				diff_ids.push(id.clone());
			}
		}

		if !digests.is_empty() {
			sqlx::query(
				"\
INSERT INTO diff_metric_digests (digest, diff_id)
SELECT * FROM UNNEST($1::text[], $2::text[])
ON CONFLICT DO NOTHING",
			)
			.bind(&digests)
			.bind(&diff_ids)
			.execute(&mut *tx)
			.await?;
		}

		tx.commit().await?;

		Ok(())
	}
}

impl MetricsStore for PgMetricsStore {
	fn read<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
		Box::pin(self.read_record(id))
	}

	fn write<'a>(&'a self, id: &'a str, record: Vec<u8>) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.write_record(id, record))
	}

	fn delete<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Result<usize>> {
		Box::pin(self.delete_records(ids))
	}

	fn purge_digests<'a>(&'a self, digests: &'a [String]) -> BoxFuture<'a, Result<usize>> {
		Box::pin(self.purge(digests))
	}

	fn list_ids<'a>(&'a self) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(self.all_ids())
	}

	fn reindex<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.rebuild_index())
	}
}
