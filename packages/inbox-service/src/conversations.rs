use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use inbox_storage::{
	models::{ConversationFilter, ConversationSummary, InboundMessage, ResponseRecord},
	queries,
};

use crate::{AgentContext, Error, InboxService, OutboundOutcome, Result};

pub const DEFAULT_CONVERSATION_LIMIT: i64 = 200;
pub const MAX_CONVERSATION_LIMIT: i64 = 1_000;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversationListRequest {
	#[serde(default)]
	pub unanswered_only: bool,
	#[serde(default)]
	pub tags: Vec<String>,
	pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationDetail {
	pub customer_id: String,
	pub sender_name: String,
	pub messages: Vec<InboundMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationReplyRequest {
	pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkDoneRequest {
	pub customer_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkDoneResponse {
	pub updated: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetTagsRequest {
	pub tags: Vec<String>,
}

impl InboxService {
	pub async fn list_conversations(
		&self,
		req: ConversationListRequest,
	) -> Result<Vec<ConversationSummary>> {
		let limit = req.limit.unwrap_or(DEFAULT_CONVERSATION_LIMIT);

		if !(1..=MAX_CONVERSATION_LIMIT).contains(&limit) {
			return Err(Error::InvalidRequest {
				message: format!("limit must be between 1 and {MAX_CONVERSATION_LIMIT}."),
			});
		}

		let filter = ConversationFilter {
			unanswered_only: req.unanswered_only,
			tags: clean_tags(&req.tags),
			limit,
		};

		Ok(queries::list_conversations(&self.db, &self.cfg.meta.own_account_id, &filter).await?)
	}

	/// Full history of one customer, oldest first, with a resolved display name.
	pub async fn conversation(&self, customer_id: &str) -> Result<ConversationDetail> {
		let customer_id = require_id(customer_id, "customer_id")?;
		let messages = queries::conversation_messages(&self.db, customer_id).await?;

		if messages.is_empty() {
			return Err(Error::NotFound {
				message: format!("No conversation with customer {customer_id:?}."),
			});
		}

		let sender_name = self.resolve_sender_name(customer_id).await?;

		Ok(ConversationDetail { customer_id: customer_id.to_string(), sender_name, messages })
	}

	pub async fn reply_to_conversation(
		&self,
		ctx: &AgentContext,
		customer_id: &str,
		req: ConversationReplyRequest,
	) -> Result<OutboundOutcome> {
		let customer_id = require_id(customer_id, "customer_id")?;
		let text = require_text(&req.text)?;

		if let Err(err) =
			self.providers.vendor.send_message(&self.cfg.meta, customer_id, text).await
		{
			tracing::warn!(customer_id, agent = %ctx.agent, error = %err, "Direct message send failed.");

			return Ok(OutboundOutcome::failed(err.to_string()));
		}

		let Some(message_id) = queries::latest_incoming_message_id(&self.db, customer_id).await?
		else {
			tracing::info!(customer_id, "Reply sent to a conversation without incoming messages.");

			return Ok(OutboundOutcome::ok("Sent; no incoming message to record against."));
		};
		let response = ResponseRecord { text, agent: &ctx.agent, at: OffsetDateTime::now_utc() };

		queries::record_message_response(&self.db, &message_id, &response).await?;

		tracing::info!(customer_id, message_id = %message_id, agent = %ctx.agent, "Direct message reply sent.");

		Ok(OutboundOutcome::ok("Sent."))
	}

	pub async fn mark_conversation_done(
		&self,
		ctx: &AgentContext,
		customer_id: &str,
	) -> Result<MarkDoneResponse> {
		let customer_id = require_id(customer_id, "customer_id")?;

		self.mark_conversations_done(ctx, MarkDoneRequest {
			customer_ids: vec![customer_id.to_string()],
		})
		.await
	}

	pub async fn mark_conversations_done(
		&self,
		ctx: &AgentContext,
		req: MarkDoneRequest,
	) -> Result<MarkDoneResponse> {
		let ids = req
			.customer_ids
			.iter()
			.map(|id| id.trim())
			.filter(|id| !id.is_empty())
			.map(str::to_string)
			.collect::<BTreeSet<_>>()
			.into_iter()
			.collect::<Vec<_>>();

		if ids.is_empty() {
			return Err(Error::InvalidRequest {
				message: "customer_ids must contain at least one id.".to_string(),
			});
		}

		let updated =
			queries::mark_conversations_done(&self.db, &ids, &ctx.agent, OffsetDateTime::now_utc())
				.await?;

		tracing::info!(requested = ids.len(), updated, agent = %ctx.agent, "Conversations marked done.");

		Ok(MarkDoneResponse { updated })
	}

	pub async fn set_conversation_tags(
		&self,
		customer_id: &str,
		req: SetTagsRequest,
	) -> Result<u64> {
		let customer_id = require_id(customer_id, "customer_id")?;
		let tags = clean_tags(&req.tags).join(",");
		let updated = queries::set_conversation_tags(&self.db, customer_id, &tags).await?;

		if updated == 0 {
			return Err(Error::NotFound {
				message: format!("No conversation with customer {customer_id:?}."),
			});
		}

		Ok(updated)
	}

	/// Keyword table tags, the fallback tag, and every tag agents have applied, sorted.
	pub async fn known_tags(&self) -> Result<Vec<String>> {
		let mut tags = self.classifier.tag_names().into_iter().collect::<BTreeSet<_>>();

		tags.insert(self.classifier.fallback_tag().to_string());
		tags.extend(queries::tags_in_use(&self.db).await?);

		Ok(tags.into_iter().collect())
	}

	pub(crate) async fn resolve_sender_name(&self, customer_id: &str) -> Result<String> {
		if let Some(name) = queries::stored_sender_name(&self.db, customer_id).await? {
			return Ok(name);
		}

		let profile = match self.providers.vendor.fetch_profile(&self.cfg.meta, customer_id).await
		{
			Ok(profile) => profile,
			Err(err) => {
				tracing::warn!(customer_id, error = %err, "Profile lookup failed.");

				return Ok(fallback_name(customer_id));
			},
		};
		let Some(name) = profile.display_name() else {
			return Ok(fallback_name(customer_id));
		};
		let filled = queries::fill_sender_name(&self.db, customer_id, name).await?;

		tracing::debug!(customer_id, filled, "Sender name stored.");

		Ok(name.to_string())
	}
}

pub fn fallback_name(customer_id: &str) -> String {
	let chars = customer_id.chars().collect::<Vec<_>>();
	let tail = chars[chars.len().saturating_sub(6)..].iter().collect::<String>();

	format!("Kunde #{tail}")
}

pub(crate) fn require_id<'a>(value: &'a str, field: &str) -> Result<&'a str> {
	let value = value.trim();

	if value.is_empty() {
		return Err(Error::InvalidRequest { message: format!("{field} must be non-empty.") });
	}

	Ok(value)
}

pub(crate) fn require_text(value: &str) -> Result<&str> {
	let value = value.trim();

	if value.is_empty() {
		return Err(Error::InvalidRequest { message: "text must be non-empty.".to_string() });
	}

	Ok(value)
}

fn clean_tags(tags: &[String]) -> Vec<String> {
	let mut out = Vec::new();

	for tag in tags.iter().map(|tag| tag.trim()).filter(|tag| !tag.is_empty()) {
		if !out.iter().any(|seen: &String| seen == tag) {
			out.push(tag.to_string());
		}
	}

	out
}
