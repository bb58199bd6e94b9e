use serde::Serialize;
use serde_json::{Value, json};
use time::OffsetDateTime;

use inbox_domain::{classify::Priority, vendor_time};
use inbox_providers::meta::{AdMedia, VendorComment, VendorConversation, VendorMessage};
use inbox_storage::{
	models::{AdComment, InboundMessage, WriteOutcome},
	queries,
};

use crate::{Error, InboxService, Result, conversations::require_id};

pub const HISTORY_CATEGORY: &str = "historie";
pub const SYNCED_STATUS: &str = "synced";

const OUR_REPLY_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistorySyncReport {
	pub conversations: u32,
	pub inserted: u32,
	pub existing: u32,
	pub skipped: u32,
	pub failed: u32,
}
impl HistorySyncReport {
	fn absorb(&mut self, other: &Self) {
		self.conversations += other.conversations;
		self.inserted += other.inserted;
		self.existing += other.existing;
		self.skipped += other.skipped;
		self.failed += other.failed;
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommentSyncReport {
	pub new_comments: u32,
	pub updated_comments: u32,
	pub media_with_comments: u32,
}

impl InboxService {
	/// Backfills one customer's thread. Messages before `since` and bare story reactions are
	/// skipped; already stored ids are left untouched.
	pub async fn sync_conversation(
		&self,
		customer_id: &str,
		conversation_id: Option<&str>,
		since: Option<OffsetDateTime>,
	) -> Result<HistorySyncReport> {
		let customer_id = require_id(customer_id, "customer_id")?;
		let conversation_id = match conversation_id.map(str::trim).filter(|id| !id.is_empty()) {
			Some(id) => id.to_string(),
			None => self.find_conversation(customer_id).await?.id,
		};

		self.sync_thread(customer_id, &conversation_id, since).await
	}

	pub async fn sync_all_conversations(
		&self,
		since: Option<OffsetDateTime>,
	) -> Result<HistorySyncReport> {
		let own_id = self.cfg.meta.own_account_id.as_str();
		let conversations = self
			.providers
			.vendor
			.list_conversations(&self.cfg.meta, self.cfg.meta.conversation_limit)
			.await?;
		let mut report = HistorySyncReport::default();

		for conversation in &conversations {
			let Some(customer) =
				conversation.participants.iter().find(|participant| participant.id != own_id)
			else {
				tracing::debug!(conversation_id = %conversation.id, "Skipping conversation without a customer.");

				continue;
			};

			match self.sync_thread(&customer.id, &conversation.id, since).await {
				Ok(thread) => report.absorb(&thread),
				Err(err) => {
					tracing::warn!(
						conversation_id = %conversation.id,
						customer_id = %customer.id,
						error = %err,
						"Conversation sync failed."
					);

					report.failed += 1;
				},
			}
		}

		tracing::info!(
			conversations = report.conversations,
			inserted = report.inserted,
			existing = report.existing,
			skipped = report.skipped,
			failed = report.failed,
			"History sync finished."
		);

		Ok(report)
	}

	/// Pulls comments for every ad creative, including dark posts, and stores new ones or
	/// refreshes reply state on known ones. Own comments and comments without text are skipped.
	pub async fn sync_ad_comments(
		&self,
		since: Option<OffsetDateTime>,
	) -> Result<CommentSyncReport> {
		let media = self.providers.vendor.list_ad_media(&self.cfg.meta).await?;
		let since = since.map(OffsetDateTime::unix_timestamp);
		let now = OffsetDateTime::now_utc();
		let mut report = CommentSyncReport::default();

		for item in &media {
			let comments = match self
				.providers
				.vendor
				.fetch_comments(
					&self.cfg.meta,
					&item.media_id,
					self.cfg.meta.comment_limit,
					since,
				)
				.await
			{
				Ok(comments) => comments,
				Err(err) => {
					tracing::warn!(media_id = %item.media_id, error = %err, "Comment fetch failed.");

					continue;
				},
			};

			if comments.is_empty() {
				continue;
			}

			report.media_with_comments += 1;

			for comment in &comments {
				if comment.from_id == self.cfg.meta.own_account_id
					|| comment.text.trim().is_empty()
				{
					continue;
				}

				let record = self.synced_comment(item, comment, now);

				match queries::upsert_comment_replies(&self.db, &record).await {
					Ok(WriteOutcome::Inserted) => report.new_comments += 1,
					Ok(WriteOutcome::Duplicate) => report.updated_comments += 1,
					Err(err) => {
						tracing::warn!(comment_id = %record.comment_id, error = %err, "Failed to store synced comment.");
					},
				}
			}
		}

		tracing::info!(
			media = media.len(),
			media_with_comments = report.media_with_comments,
			new_comments = report.new_comments,
			updated_comments = report.updated_comments,
			"Ad comment sync finished."
		);

		Ok(report)
	}

	async fn find_conversation(&self, customer_id: &str) -> Result<VendorConversation> {
		let conversations = self
			.providers
			.vendor
			.list_conversations(&self.cfg.meta, self.cfg.meta.conversation_limit)
			.await?;

		conversations
			.into_iter()
			.find(|conversation| conversation.has_participant(customer_id))
			.ok_or_else(|| Error::NotFound {
				message: format!("No vendor conversation with customer {customer_id:?}."),
			})
	}

	async fn sync_thread(
		&self,
		customer_id: &str,
		conversation_id: &str,
		since: Option<OffsetDateTime>,
	) -> Result<HistorySyncReport> {
		let messages = self.providers.vendor.fetch_thread(&self.cfg.meta, conversation_id).await?;
		let now = OffsetDateTime::now_utc();
		let mut report = HistorySyncReport { conversations: 1, ..Default::default() };

		for message in &messages {
			let sent_at = message.created_time.as_deref().and_then(vendor_time::parse);

			if message.is_story_reaction()
				|| since.zip(sent_at).is_some_and(|(since, sent_at)| sent_at < since)
			{
				report.skipped += 1;

				continue;
			}

			let record = self.synced_message(customer_id, message, sent_at, now);

			match self.writer.write_message(&record).await {
				Ok(WriteOutcome::Inserted) => report.inserted += 1,
				Ok(WriteOutcome::Duplicate) => report.existing += 1,
				Err(err) => {
					tracing::warn!(message_id = %record.message_id, error = %err, "Failed to store synced message.");

					report.failed += 1;
				},
			}
		}

		tracing::info!(
			customer_id,
			conversation_id,
			inserted = report.inserted,
			skipped = report.skipped,
			"Conversation synced."
		);

		Ok(report)
	}

	fn synced_message(
		&self,
		customer_id: &str,
		message: &VendorMessage,
		sent_at: Option<OffsetDateTime>,
		now: OffsetDateTime,
	) -> InboundMessage {
		let own_id = self.cfg.meta.own_account_id.as_str();
		let outgoing = message.from_id == own_id;
		let (sender_id, recipient_id, direction, sender_name) = if outgoing {
			(own_id.to_string(), customer_id.to_string(), "outgoing", String::new())
		} else {
			(message.from_id.clone(), own_id.to_string(), "incoming", message.from_username.clone())
		};

		InboundMessage {
			message_id: message.id.clone(),
			sender_id,
			recipient_id,
			sender_name,
			direction: direction.to_string(),
			message_text: message.text.clone(),
			has_attachments: !message.attachment_types.is_empty(),
			attachment_types: message.attachment_types.clone(),
			is_story_reply: message.has_story,
			categories: vec![HISTORY_CATEGORY.to_string()],
			primary_category: HISTORY_CATEGORY.to_string(),
			priority: Priority::Normal.as_str().to_string(),
			sentiment: None,
			keyword_version: String::new(),
			tags: HISTORY_CATEGORY.to_string(),
			status: SYNCED_STATUS.to_string(),
			response_text: None,
			responded_at: None,
			responded_by: None,
			sent_at,
			received_at: sent_at.unwrap_or(now),
		}
	}

	fn synced_comment(
		&self,
		media: &AdMedia,
		comment: &VendorComment,
		now: OffsetDateTime,
	) -> AdComment {
		let own_id = self.cfg.meta.own_account_id.as_str();
		let replies = comment
			.replies
			.iter()
			.map(|reply| {
				json!({
					"id": reply.id,
					"username": reply.username,
					"text": reply.text,
					"timestamp": reply.timestamp,
					"is_own": reply.from_id == own_id,
				})
			})
			.collect::<Vec<_>>();
		// The earliest own reply is the answer shown on the dashboard.
		let our_reply_text = comment
			.replies
			.iter()
			.find(|reply| reply.from_id == own_id)
			.map(|reply| reply.text.chars().take(OUR_REPLY_MAX_CHARS).collect::<String>());
		let sentiment = self.classifier.sentiment(&comment.text);

		AdComment {
			comment_id: comment.id.clone(),
			post_id: media.media_id.clone(),
			parent_comment_id: None,
			post_shortcode: media.shortcode.clone(),
			post_type: "ad".to_string(),
			ad_id: media.ad_id.clone(),
			ad_name: media.ad_name.clone(),
			commenter_id: if comment.from_id.is_empty() {
				"unknown".to_string()
			} else {
				comment.from_id.clone()
			},
			commenter_name: if comment.username.is_empty() {
				crate::webhook::UNKNOWN_COMMENTER.to_string()
			} else {
				comment.username.clone()
			},
			comment_text: comment.text.clone(),
			sentiment: sentiment.sentiment.as_str().to_string(),
			sentiment_score: sentiment.score,
			is_question: sentiment.is_question,
			contains_complaint: sentiment.contains_complaint,
			priority: sentiment.comment_priority().as_str().to_string(),
			keyword_version: self.classifier.version().to_string(),
			status: SYNCED_STATUS.to_string(),
			has_our_reply: our_reply_text.is_some(),
			our_reply_text,
			replies: Value::Array(replies),
			is_done: false,
			is_liked: false,
			is_deleted: false,
			is_hidden: false,
			response_text: None,
			responded_at: None,
			responded_by: None,
			created_at: comment.timestamp.as_deref().and_then(vendor_time::parse).unwrap_or(now),
			received_at: now,
		}
	}
}
