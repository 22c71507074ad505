use std::time::Duration;

use triage_domain::IgnoreRule;

use crate::{Error, Result, TriageService, with_timeout};

impl TriageService {
	pub async fn list_ignore_rules(&self) -> Result<Vec<IgnoreRule>> {
		with_timeout("ignore rules", self.ignores_timeout(), self.collaborators.ignores.list())
			.await?
			.map_err(|err| Error::IgnoreStore { message: err.to_string() })
	}

	/// Stores `rule` and rebuilds so matching traces move to the ignored partition.
	pub async fn add_ignore_rule(&self, rule: IgnoreRule) -> Result<()> {
		let rule_id = rule.id;

		with_timeout(
			"ignore rule create",
			self.ignores_timeout(),
			self.collaborators.ignores.create(rule),
		)
		.await?
		.map_err(|err| Error::IgnoreStore { message: err.to_string() })?;

		tracing::info!(rule_id, "Ignore rule added.");

		self.rebuild_after_rule_change(rule_id).await;

		Ok(())
	}

	/// Deletes the rule and rebuilds when anything was removed. Returns the number of removed rules.
	pub async fn delete_ignore_rule(&self, id: i64, actor: &str) -> Result<usize> {
		let removed = with_timeout(
			"ignore rule delete",
			self.ignores_timeout(),
			self.collaborators.ignores.delete(id, actor),
		)
		.await?
		.map_err(|err| Error::IgnoreStore { message: err.to_string() })?;

		if removed > 0 {
			tracing::info!(rule_id = id, actor, "Ignore rule deleted.");

			self.rebuild_after_rule_change(id).await;
		}

		Ok(removed)
	}

	fn ignores_timeout(&self) -> Duration {
		Duration::from_millis(self.cfg.ignores_timeout_ms)
	}

	async fn rebuild_after_rule_change(&self, rule_id: i64) {
		if self.rebuild().await.is_err() {
			tracing::warn!(rule_id, "Ignore rule change takes effect on the next successful rebuild.");
		}
	}
}
