use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
	Inserted,
	/// The natural id already existed. Upserts report this after updating reply fields.
	Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentFlag {
	Deleted,
	Hidden,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InboundMessage {
	pub message_id: String,
	pub sender_id: String,
	pub recipient_id: String,
	pub sender_name: String,
	pub direction: String,
	pub message_text: String,
	pub has_attachments: bool,
	pub attachment_types: Vec<String>,
	pub is_story_reply: bool,
	pub categories: Vec<String>,
	pub primary_category: String,
	pub priority: String,
	pub sentiment: Option<String>,
	pub keyword_version: String,
	pub tags: String,
	pub status: String,
	pub response_text: Option<String>,
	#[serde(with = "time::serde::rfc3339::option")]
	pub responded_at: Option<OffsetDateTime>,
	pub responded_by: Option<String>,
	#[serde(with = "time::serde::rfc3339::option")]
	pub sent_at: Option<OffsetDateTime>,
	#[serde(with = "time::serde::rfc3339")]
	pub received_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AdComment {
	pub comment_id: String,
	pub post_id: String,
	pub parent_comment_id: Option<String>,
	pub post_shortcode: String,
	pub post_type: String,
	pub ad_id: String,
	pub ad_name: String,
	pub commenter_id: String,
	pub commenter_name: String,
	pub comment_text: String,
	pub sentiment: String,
	pub sentiment_score: f32,
	pub is_question: bool,
	pub contains_complaint: bool,
	pub priority: String,
	pub keyword_version: String,
	pub status: String,
	pub replies: Value,
	pub has_our_reply: bool,
	pub our_reply_text: Option<String>,
	pub is_done: bool,
	pub is_liked: bool,
	pub is_deleted: bool,
	pub is_hidden: bool,
	pub response_text: Option<String>,
	#[serde(with = "time::serde::rfc3339::option")]
	pub responded_at: Option<OffsetDateTime>,
	pub responded_by: Option<String>,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub received_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BlacklistEntry {
	pub user_id: String,
	pub username: String,
	pub blocked_by: String,
	#[serde(with = "time::serde::rfc3339")]
	pub blocked_at: OffsetDateTime,
}

/// One row per customer, keyed by the counterpart of our own account id.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ConversationSummary {
	pub customer_id: String,
	pub sender_name: String,
	pub message_count: i64,
	#[serde(with = "time::serde::rfc3339")]
	pub last_message_at: OffsetDateTime,
	pub has_unanswered: bool,
	pub tags: String,
	pub last_message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
	pub unanswered_only: bool,
	/// Matches conversations whose latest incoming message carries any of these tags.
	pub tags: Vec<String>,
	pub limit: i64,
}

#[derive(Debug, Clone, Default)]
pub struct CommentFilter {
	pub open_only: bool,
	pub limit: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CommentStats {
	pub total: i64,
	pub open: i64,
	pub answered: i64,
	pub negative: i64,
	pub questions: i64,
}

/// Agent audit fields written next to a response.
#[derive(Debug, Clone)]
pub struct ResponseRecord<'a> {
	pub text: &'a str,
	pub agent: &'a str,
	pub at: OffsetDateTime,
}
