use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::OffsetDateTime;

use inbox_domain::{
	classify::{Priority, Sentiment},
	signature::{self, SignatureCheck},
	vendor_time,
};
use inbox_storage::models::{AdComment, CommentFlag, InboundMessage, WriteOutcome};

use crate::{Error, InboxService, Result};

pub const STATUS_RECEIVED: &str = "received";
pub const STATUS_IGNORED: &str = "ignored";
pub const UNKNOWN_COMMENTER: &str = "Unbekannt";

const ACCEPTED_OBJECTS: [&str; 2] = ["instagram", "page"];
const COMMENT_FIELDS: [&str; 2] = ["comments", "feed"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookReport {
	pub status: String,
	pub processed_messages: u32,
	pub processed_comments: u32,
}
impl WebhookReport {
	fn ignored() -> Self {
		Self { status: STATUS_IGNORED.to_string(), processed_messages: 0, processed_comments: 0 }
	}
}

#[derive(Debug, Default, Deserialize)]
struct IdRef {
	#[serde(default)]
	id: String,
}

#[derive(Debug, Deserialize)]
struct MessagingEvent {
	#[serde(default)]
	sender: IdRef,
	#[serde(default)]
	recipient: IdRef,
	#[serde(default)]
	timestamp: Option<Value>,
	#[serde(default)]
	message: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
	#[serde(default)]
	mid: String,
	#[serde(default)]
	text: Option<String>,
	#[serde(default)]
	attachments: Vec<AttachmentPayload>,
	#[serde(default)]
	reply_to: Option<Value>,
	#[serde(default)]
	is_echo: bool,
}

#[derive(Debug, Deserialize)]
struct AttachmentPayload {
	#[serde(default, rename = "type")]
	kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Change {
	#[serde(default)]
	field: String,
	#[serde(default)]
	value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommentAction {
	Add,
	Remove(CommentFlag),
}

impl InboxService {
	/// Answers the vendor's subscription handshake with the challenge.
	pub fn verify_subscription(
		&self,
		mode: Option<&str>,
		token: Option<&str>,
		challenge: Option<&str>,
	) -> Result<String> {
		if mode == Some("subscribe")
			&& token == Some(self.cfg.security.webhook_verify_token.as_str())
		{
			tracing::info!("Webhook subscription verified.");

			return Ok(challenge.unwrap_or_default().to_string());
		}

		tracing::warn!(mode = mode.unwrap_or_default(), "Webhook verification rejected.");

		Err(Error::Forbidden { message: "Verification token mismatch.".to_string() })
	}

	pub fn check_signature(&self, body: &[u8], header: Option<&str>) -> Result<()> {
		match signature::verify(self.cfg.security.app_secret.as_deref(), body, header) {
			SignatureCheck::Valid => Ok(()),
			SignatureCheck::Skipped => {
				tracing::warn!("Webhook signature check skipped because no app secret is configured.");

				Ok(())
			},
			SignatureCheck::Invalid => {
				tracing::warn!(has_header = header.is_some(), "Webhook signature rejected.");

				Err(Error::Forbidden { message: "Invalid webhook signature.".to_string() })
			},
		}
	}

	/// Verifies, classifies, and persists one webhook delivery.
	///
	/// Individual events that fail to decode or persist are logged and skipped; the counts only
	/// include records that were written or already present.
	pub async fn ingest_webhook(&self, body: &[u8], signature: Option<&str>) -> Result<WebhookReport> {
		self.check_signature(body, signature)?;

		let payload: Value = serde_json::from_slice(body)
			.map_err(|err| Error::MalformedPayload { message: format!("Body is not JSON: {err}.") })?;
		let Some(envelope) = payload.as_object() else {
			return Err(Error::MalformedPayload {
				message: "Webhook envelope must be a JSON object.".to_string(),
			});
		};
		let object = envelope.get("object").and_then(Value::as_str).unwrap_or_default();

		if !ACCEPTED_OBJECTS.contains(&object) {
			tracing::info!(object, "Ignoring webhook for unrecognized object type.");

			return Ok(WebhookReport::ignored());
		}

		let entries = envelope.get("entry").and_then(Value::as_array).cloned().unwrap_or_default();
		let now = OffsetDateTime::now_utc();
		let mut report = WebhookReport {
			status: STATUS_RECEIVED.to_string(),
			processed_messages: 0,
			processed_comments: 0,
		};

		for entry in &entries {
			let events = entry
				.get("messaging")
				.or_else(|| entry.get("messages"))
				.and_then(Value::as_array)
				.cloned()
				.unwrap_or_default();

			for event in events {
				if self.ingest_messaging_event(event, now).await {
					report.processed_messages += 1;
				}
			}

			let entry_id = entry.get("id").map(id_string).unwrap_or_default();
			let changes =
				entry.get("changes").and_then(Value::as_array).cloned().unwrap_or_default();

			for change in changes {
				if self.ingest_change(&entry_id, change, now).await {
					report.processed_comments += 1;
				}
			}
		}

		tracing::info!(
			object,
			processed_messages = report.processed_messages,
			processed_comments = report.processed_comments,
			"Webhook processed."
		);

		Ok(report)
	}

	async fn ingest_messaging_event(&self, event: Value, now: OffsetDateTime) -> bool {
		let event: MessagingEvent = match serde_json::from_value(event) {
			Ok(event) => event,
			Err(err) => {
				tracing::warn!(error = %err, "Skipping undecodable messaging event.");

				return false;
			},
		};
		let Some(message) = self.build_message(event, now) else {
			return false;
		};

		match self.writer.write_message(&message).await {
			Ok(outcome) => {
				tracing::info!(
					message_id = %message.message_id,
					direction = %message.direction,
					primary_category = %message.primary_category,
					priority = %message.priority,
					duplicate = outcome == WriteOutcome::Duplicate,
					"Message stored."
				);

				true
			},
			Err(err) => {
				tracing::warn!(message_id = %message.message_id, error = %err, "Failed to store message.");

				false
			},
		}
	}

	async fn ingest_change(&self, entry_id: &str, change: Value, now: OffsetDateTime) -> bool {
		let change: Change = match serde_json::from_value(change) {
			Ok(change) => change,
			Err(err) => {
				tracing::warn!(error = %err, "Skipping undecodable change.");

				return false;
			},
		};

		if !COMMENT_FIELDS.contains(&change.field.as_str()) {
			tracing::debug!(field = %change.field, "Skipping change for unhandled field.");

			return false;
		}

		let Some(action) = comment_action(&change.value) else {
			return false;
		};

		match action {
			CommentAction::Add => self.ingest_comment(entry_id, &change.value, now).await,
			CommentAction::Remove(flag) => {
				let comment_id = comment_id(&change.value);

				if comment_id.is_empty() {
					return false;
				}

				match self.writer.mark_comment_removed(&comment_id, flag).await {
					Ok(updated) => {
						tracing::info!(comment_id = %comment_id, ?flag, updated, "Comment removal recorded.");
					},
					Err(err) => {
						tracing::warn!(comment_id = %comment_id, error = %err, "Failed to record comment removal.");
					},
				}

				false
			},
		}
	}

	async fn ingest_comment(&self, entry_id: &str, value: &Value, now: OffsetDateTime) -> bool {
		let Some(comment) = self.build_comment(entry_id, value, now) else {
			return false;
		};

		match self.writer.write_comment(&comment).await {
			Ok(outcome) => {
				if comment.sentiment == Sentiment::Negative.as_str() {
					tracing::warn!(
						comment_id = %comment.comment_id,
						post_id = %comment.post_id,
						"Negative ad comment received."
					);
				}

				tracing::info!(
					comment_id = %comment.comment_id,
					sentiment = %comment.sentiment,
					priority = %comment.priority,
					duplicate = outcome == WriteOutcome::Duplicate,
					"Comment stored."
				);

				true
			},
			Err(err) => {
				tracing::warn!(comment_id = %comment.comment_id, error = %err, "Failed to store comment.");

				false
			},
		}
	}

	fn build_message(&self, event: MessagingEvent, now: OffsetDateTime) -> Option<InboundMessage> {
		let message = event.message?;

		if message.mid.is_empty() {
			return None;
		}

		let text = message.text.unwrap_or_default();
		let attachment_types = message
			.attachments
			.iter()
			.map(|attachment| attachment.kind.clone().unwrap_or_else(|| "unknown".to_string()))
			.collect::<Vec<_>>();
		let is_story_reply =
			message.reply_to.as_ref().and_then(|reply_to| reply_to.get("story")).is_some();
		let sent_at = event.timestamp.as_ref().and_then(timestamp_value);
		let mut record = InboundMessage {
			message_id: message.mid,
			sender_id: event.sender.id,
			recipient_id: event.recipient.id,
			sender_name: String::new(),
			direction: "incoming".to_string(),
			message_text: text,
			has_attachments: !attachment_types.is_empty(),
			attachment_types,
			is_story_reply,
			categories: Vec::new(),
			primary_category: String::new(),
			priority: Priority::Normal.as_str().to_string(),
			sentiment: None,
			keyword_version: String::new(),
			tags: String::new(),
			status: "new".to_string(),
			response_text: None,
			responded_at: None,
			responded_by: None,
			sent_at,
			received_at: now,
		};

		if message.is_echo {
			record.direction = "outgoing".to_string();
			record.status = "sent".to_string();

			return Some(record);
		}

		let tags = self.classifier.tag_message(&record.message_text, is_story_reply);
		let sentiment = self.classifier.sentiment(&record.message_text);

		record.tags = tags.joined();
		record.primary_category = tags.primary_category;
		record.categories = tags.categories;
		record.priority = tags.priority.as_str().to_string();
		record.sentiment = Some(sentiment.sentiment.as_str().to_string());
		record.keyword_version = self.classifier.version().to_string();

		Some(record)
	}

	fn build_comment(&self, entry_id: &str, value: &Value, now: OffsetDateTime) -> Option<AdComment> {
		let comment_id = comment_id(value);

		if comment_id.is_empty() {
			tracing::warn!("Skipping comment change without an id.");

			return None;
		}

		let from = value.get("from");
		let commenter_id = from.and_then(|from| from.get("id")).map(id_string).unwrap_or_default();

		if !commenter_id.is_empty() && commenter_id == self.cfg.meta.own_account_id {
			tracing::debug!(comment_id = %comment_id, "Skipping comment authored by our own account.");

			return None;
		}

		let media = value.get("media");
		let post_id = first_non_empty([
			value.get("post_id").map(id_string),
			value.get("media_id").map(id_string),
			media.and_then(|media| media.get("id")).map(id_string),
			Some(entry_id.to_string()),
		]);
		let text = first_non_empty([
			value.get("message").map(id_string),
			value.get("text").map(id_string),
		]);
		let commenter_name = first_non_empty([
			from.and_then(|from| from.get("name")).map(id_string),
			from.and_then(|from| from.get("username")).map(id_string),
			Some(UNKNOWN_COMMENTER.to_string()),
		]);
		let created_at = value
			.get("created_time")
			.or_else(|| value.get("timestamp"))
			.and_then(timestamp_value)
			.unwrap_or(now);
		let parent_comment_id =
			value.get("parent_id").map(id_string).filter(|parent| !parent.is_empty());
		let sentiment = self.classifier.sentiment(&text);

		Some(AdComment {
			comment_id,
			post_id,
			parent_comment_id,
			post_shortcode: media
				.and_then(|media| media.get("shortcode"))
				.map(id_string)
				.unwrap_or_default(),
			post_type: "ad".to_string(),
			ad_id: String::new(),
			ad_name: String::new(),
			commenter_id: if commenter_id.is_empty() { "unknown".to_string() } else { commenter_id },
			commenter_name,
			comment_text: text,
			sentiment: sentiment.sentiment.as_str().to_string(),
			sentiment_score: sentiment.score,
			is_question: sentiment.is_question,
			contains_complaint: sentiment.contains_complaint,
			priority: sentiment.comment_priority().as_str().to_string(),
			keyword_version: self.classifier.version().to_string(),
			status: "new".to_string(),
			replies: json!([]),
			has_our_reply: false,
			our_reply_text: None,
			is_done: false,
			is_liked: false,
			is_deleted: false,
			is_hidden: false,
			response_text: None,
			responded_at: None,
			responded_by: None,
			created_at,
			received_at: now,
		})
	}
}

/// Instagram `comments` changes carry no item or verb and are additions.
fn comment_action(value: &Value) -> Option<CommentAction> {
	if let Some(item) = value.get("item").and_then(Value::as_str)
		&& item != "comment"
	{
		return None;
	}

	match value.get("verb").and_then(Value::as_str) {
		None | Some("add") | Some("created") => Some(CommentAction::Add),
		Some("remove") => Some(CommentAction::Remove(CommentFlag::Deleted)),
		Some("hide") => Some(CommentAction::Remove(CommentFlag::Hidden)),
		Some(verb) => {
			tracing::debug!(verb, "Skipping comment change with unhandled verb.");

			None
		},
	}
}

fn comment_id(value: &Value) -> String {
	first_non_empty([value.get("comment_id").map(id_string), value.get("id").map(id_string)])
}

/// Vendor ids arrive as strings or numbers depending on the product.
fn id_string(value: &Value) -> String {
	match value {
		Value::String(raw) => raw.trim().to_string(),
		Value::Number(number) => number.to_string(),
		_ => String::new(),
	}
}

fn timestamp_value(value: &Value) -> Option<OffsetDateTime> {
	match value {
		Value::Number(number) => number.as_i64().and_then(vendor_time::from_epoch),
		Value::String(raw) => vendor_time::parse(raw),
		_ => None,
	}
}

fn first_non_empty<const N: usize>(candidates: [Option<String>; N]) -> String {
	candidates.into_iter().flatten().find(|value| !value.is_empty()).unwrap_or_default()
}
