use serde::Deserialize;
use time::OffsetDateTime;

use inbox_storage::{
	models::{BlacklistEntry, WriteOutcome},
	queries,
};

use crate::{AgentContext, Error, InboxService, Result, conversations::require_id};

#[derive(Debug, Clone, Deserialize)]
pub struct BlockUserRequest {
	pub user_id: String,
	#[serde(default)]
	pub username: String,
}

impl InboxService {
	pub async fn blacklist(&self) -> Result<Vec<BlacklistEntry>> {
		Ok(queries::list_blacklist(&self.db).await?)
	}

	/// Blocks a user from the conversation list. Blocking twice keeps the first entry.
	pub async fn block_user(&self, ctx: &AgentContext, req: BlockUserRequest) -> Result<WriteOutcome> {
		let user_id = require_id(&req.user_id, "user_id")?;
		let entry = BlacklistEntry {
			user_id: user_id.to_string(),
			username: req.username.trim().to_string(),
			blocked_by: ctx.agent.clone(),
			blocked_at: OffsetDateTime::now_utc(),
		};
		let outcome = queries::insert_blacklist(&self.db, &entry).await?;

		tracing::info!(user_id, agent = %ctx.agent, ?outcome, "User blocked.");

		Ok(outcome)
	}

	pub async fn unblock_user(&self, ctx: &AgentContext, user_id: &str) -> Result<()> {
		let user_id = require_id(user_id, "user_id")?;

		if !queries::delete_blacklist(&self.db, user_id).await? {
			return Err(Error::NotFound { message: format!("User {user_id:?} is not blocked.") });
		}

		tracing::info!(user_id, agent = %ctx.agent, "User unblocked.");

		Ok(())
	}
}
