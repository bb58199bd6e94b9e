use serde::Deserialize;
use time::OffsetDateTime;

use inbox_storage::{
	models::{AdComment, CommentFilter, CommentFlag, CommentStats, ResponseRecord},
	queries,
};

use crate::{
	AgentContext, Error, InboxService, OutboundOutcome, Result,
	conversations::{require_id, require_text},
};

pub const DEFAULT_COMMENT_LIMIT: i64 = 50;
pub const MAX_COMMENT_LIMIT: i64 = 500;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentListRequest {
	#[serde(default)]
	pub open_only: bool,
	pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentReplyRequest {
	pub text: String,
}

impl InboxService {
	/// Visible comments, open ones first, then by sentiment urgency and recency.
	pub async fn list_comments(&self, req: CommentListRequest) -> Result<Vec<AdComment>> {
		let limit = req.limit.unwrap_or(DEFAULT_COMMENT_LIMIT);

		if !(1..=MAX_COMMENT_LIMIT).contains(&limit) {
			return Err(Error::InvalidRequest {
				message: format!("limit must be between 1 and {MAX_COMMENT_LIMIT}."),
			});
		}

		let filter = CommentFilter { open_only: req.open_only, limit };

		Ok(queries::list_comments(&self.db, &filter).await?)
	}

	pub async fn comment_stats(&self) -> Result<CommentStats> {
		Ok(queries::comment_stats(&self.db).await?)
	}

	pub async fn reply_to_comment(
		&self,
		ctx: &AgentContext,
		comment_id: &str,
		req: CommentReplyRequest,
	) -> Result<OutboundOutcome> {
		let comment_id = require_id(comment_id, "comment_id")?;
		let text = require_text(&req.text)?;

		self.visible_comment(comment_id).await?;

		let reply_id =
			match self.providers.vendor.reply_to_comment(&self.cfg.meta, comment_id, text).await {
				Ok(reply_id) => reply_id,
				Err(err) => {
					tracing::warn!(comment_id, agent = %ctx.agent, error = %err, "Comment reply failed.");

					return Ok(OutboundOutcome::failed(err.to_string()));
				},
			};
		let response = ResponseRecord { text, agent: &ctx.agent, at: OffsetDateTime::now_utc() };

		queries::record_comment_response(&self.db, comment_id, &response, true).await?;

		tracing::info!(comment_id, reply_id = %reply_id, agent = %ctx.agent, "Comment reply posted.");

		Ok(OutboundOutcome::ok(format!("Reply {reply_id} posted.")))
	}

	/// Records a response the agent posted elsewhere, without calling the vendor.
	pub async fn save_comment_response(
		&self,
		ctx: &AgentContext,
		comment_id: &str,
		req: CommentReplyRequest,
	) -> Result<()> {
		let comment_id = require_id(comment_id, "comment_id")?;
		let text = require_text(&req.text)?;
		let response = ResponseRecord { text, agent: &ctx.agent, at: OffsetDateTime::now_utc() };

		queries::record_comment_response(&self.db, comment_id, &response, false).await?;

		tracing::info!(comment_id, agent = %ctx.agent, "Comment response saved.");

		Ok(())
	}

	pub async fn mark_comment_done(&self, ctx: &AgentContext, comment_id: &str) -> Result<()> {
		let comment_id = require_id(comment_id, "comment_id")?;

		queries::mark_comment_done(&self.db, comment_id).await?;

		tracing::info!(comment_id, agent = %ctx.agent, "Comment marked done.");

		Ok(())
	}

	pub async fn hide_comment(&self, ctx: &AgentContext, comment_id: &str) -> Result<()> {
		let comment_id = require_id(comment_id, "comment_id")?;

		if !queries::set_comment_flag(&self.db, comment_id, CommentFlag::Hidden).await? {
			return Err(Error::NotFound { message: format!("Unknown comment {comment_id:?}.") });
		}

		tracing::info!(comment_id, agent = %ctx.agent, "Comment hidden from the dashboard.");

		Ok(())
	}

	pub async fn like_comment(
		&self,
		ctx: &AgentContext,
		comment_id: &str,
	) -> Result<OutboundOutcome> {
		let comment_id = require_id(comment_id, "comment_id")?;
		let comment = self.visible_comment(comment_id).await?;

		if comment.is_liked {
			return Ok(OutboundOutcome::ok("Already liked."));
		}
		if let Err(err) = self.providers.vendor.like_comment(&self.cfg.meta, comment_id).await {
			tracing::warn!(comment_id, agent = %ctx.agent, error = %err, "Comment like failed.");

			return Ok(OutboundOutcome::failed(err.to_string()));
		}

		queries::mark_comment_liked(&self.db, comment_id).await?;

		tracing::info!(comment_id, agent = %ctx.agent, "Comment liked.");

		Ok(OutboundOutcome::ok("Liked."))
	}

	/// Loads a comment that can still be acted on at the vendor.
	async fn visible_comment(&self, comment_id: &str) -> Result<AdComment> {
		let comment = queries::get_comment(&self.db, comment_id).await?;

		if comment.is_deleted || comment.is_hidden {
			return Err(Error::Conflict {
				message: format!("Comment {comment_id:?} is deleted or hidden."),
			});
		}

		Ok(comment)
	}
}
