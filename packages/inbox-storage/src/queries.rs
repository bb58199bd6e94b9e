use time::OffsetDateTime;

use crate::{
	Error, Result,
	db::Db,
	models::{
		AdComment, BlacklistEntry, CommentFilter, CommentFlag, CommentStats, ConversationFilter,
		ConversationSummary, InboundMessage, ResponseRecord, WriteOutcome,
	},
};

/// Marker written as the response of conversations closed without a reply.
pub const DONE_MARKER: &str = "[Als erledigt markiert]";

fn outcome(rows_affected: u64) -> WriteOutcome {
	if rows_affected > 0 { WriteOutcome::Inserted } else { WriteOutcome::Duplicate }
}

fn require_row(rows_affected: u64, what: &str, id: &str) -> Result<()> {
	if rows_affected == 0 {
		return Err(Error::NotFound(format!("{what} {id:?}")));
	}

	Ok(())
}

pub async fn insert_message(db: &Db, message: &InboundMessage) -> Result<WriteOutcome> {
	let result = sqlx::query(
		"\
INSERT INTO inbound_messages (
	message_id,
	sender_id,
	recipient_id,
	sender_name,
	direction,
	message_text,
	has_attachments,
	attachment_types,
	is_story_reply,
	categories,
	primary_category,
	priority,
	sentiment,
	keyword_version,
	tags,
	status,
	response_text,
	responded_at,
	responded_by,
	sent_at,
	received_at
)
VALUES (
	$1,
	$2,
	$3,
	$4,
	$5,
	$6,
	$7,
	$8,
	$9,
	$10,
	$11,
	$12,
	$13,
	$14,
	$15,
	$16,
	$17,
	$18,
	$19,
	$20,
	$21
)
ON CONFLICT (message_id) DO NOTHING",
	)
	.bind(message.message_id.as_str())
	.bind(message.sender_id.as_str())
	.bind(message.recipient_id.as_str())
	.bind(message.sender_name.as_str())
	.bind(message.direction.as_str())
	.bind(message.message_text.as_str())
	.bind(message.has_attachments)
	.bind(&message.attachment_types)
	.bind(message.is_story_reply)
	.bind(&message.categories)
	.bind(message.primary_category.as_str())
	.bind(message.priority.as_str())
	.bind(message.sentiment.as_deref())
	.bind(message.keyword_version.as_str())
	.bind(message.tags.as_str())
	.bind(message.status.as_str())
	.bind(message.response_text.as_deref())
	.bind(message.responded_at)
	.bind(message.responded_by.as_deref())
	.bind(message.sent_at)
	.bind(message.received_at)
	.execute(&db.pool)
	.await?;

	Ok(outcome(result.rows_affected()))
}

pub async fn conversation_messages(db: &Db, customer_id: &str) -> Result<Vec<InboundMessage>> {
	let rows = sqlx::query_as::<_, InboundMessage>(
		"\
SELECT
	message_id,
	sender_id,
	recipient_id,
	sender_name,
	direction,
	message_text,
	has_attachments,
	attachment_types,
	is_story_reply,
	categories,
	primary_category,
	priority,
	sentiment,
	keyword_version,
	tags,
	status,
	response_text,
	responded_at,
	responded_by,
	sent_at,
	received_at
FROM inbound_messages
WHERE sender_id = $1 OR recipient_id = $1
ORDER BY received_at ASC, message_id ASC",
	)
	.bind(customer_id)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

/// The newest `limit` messages of a conversation, oldest first.
pub async fn recent_messages(
	db: &Db,
	customer_id: &str,
	limit: i64,
) -> Result<Vec<InboundMessage>> {
	if limit <= 0 {
		return Err(Error::InvalidArgument("limit must be greater than zero.".to_string()));
	}

	let mut rows = sqlx::query_as::<_, InboundMessage>(
		"\
SELECT
	message_id,
	sender_id,
	recipient_id,
	sender_name,
	direction,
	message_text,
	has_attachments,
	attachment_types,
	is_story_reply,
	categories,
	primary_category,
	priority,
	sentiment,
	keyword_version,
	tags,
	status,
	response_text,
	responded_at,
	responded_by,
	sent_at,
	received_at
FROM inbound_messages
WHERE sender_id = $1 OR recipient_id = $1
ORDER BY received_at DESC, message_id DESC
LIMIT $2",
	)
	.bind(customer_id)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	rows.reverse();

	Ok(rows)
}

pub async fn list_conversations(
	db: &Db,
	own_account_id: &str,
	filter: &ConversationFilter,
) -> Result<Vec<ConversationSummary>> {
	if filter.limit <= 0 {
		return Err(Error::InvalidArgument("limit must be greater than zero.".to_string()));
	}

	let rows = sqlx::query_as::<_, ConversationSummary>(
		"\
WITH conversation_messages AS (
	SELECT
		CASE WHEN sender_id = $1 THEN recipient_id ELSE sender_id END AS customer_id,
		sender_name,
		message_text,
		tags,
		response_text,
		received_at,
		direction
	FROM inbound_messages
	WHERE sender_id <> $1 OR recipient_id <> $1
),
latest_activity AS (
	SELECT
		customer_id,
		count(*) AS message_count,
		max(received_at) AS last_message_at,
		max(NULLIF(sender_name, '')) FILTER (WHERE direction = 'incoming') AS sender_name
	FROM conversation_messages
	GROUP BY customer_id
),
latest_incoming AS (
	SELECT DISTINCT ON (customer_id)
		customer_id,
		message_text,
		tags,
		response_text
	FROM conversation_messages
	WHERE direction = 'incoming'
	ORDER BY customer_id, received_at DESC
)
SELECT
	la.customer_id,
	COALESCE(la.sender_name, '') AS sender_name,
	la.message_count,
	la.last_message_at,
	(li.customer_id IS NOT NULL AND COALESCE(li.response_text, '') = '') AS has_unanswered,
	COALESCE(li.tags, '') AS tags,
	COALESCE(li.message_text, '') AS last_message
FROM latest_activity la
LEFT JOIN latest_incoming li ON li.customer_id = la.customer_id
WHERE la.customer_id <> ''
	AND left(la.customer_id, 5) NOT IN ('demo_', 'test_')
	AND NOT EXISTS (SELECT 1 FROM blacklist b WHERE b.user_id = la.customer_id)
	AND (NOT $2 OR (li.customer_id IS NOT NULL AND COALESCE(li.response_text, '') = ''))
	AND (
		cardinality($3::text[]) = 0
		OR string_to_array(COALESCE(li.tags, ''), ',') && $3::text[]
	)
ORDER BY has_unanswered DESC, la.last_message_at DESC
LIMIT $4",
	)
	.bind(own_account_id)
	.bind(filter.unanswered_only)
	.bind(&filter.tags)
	.bind(filter.limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn latest_incoming_message_id(db: &Db, customer_id: &str) -> Result<Option<String>> {
	let id = sqlx::query_scalar::<_, String>(
		"\
SELECT message_id
FROM inbound_messages
WHERE sender_id = $1 AND direction = 'incoming'
ORDER BY received_at DESC, message_id DESC
LIMIT 1",
	)
	.bind(customer_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(id)
}

pub async fn record_message_response(
	db: &Db,
	message_id: &str,
	response: &ResponseRecord<'_>,
) -> Result<()> {
	let result = sqlx::query(
		"\
UPDATE inbound_messages
SET
	response_text = $2,
	responded_at = $3,
	responded_by = $4
WHERE message_id = $1",
	)
	.bind(message_id)
	.bind(response.text)
	.bind(response.at)
	.bind(response.agent)
	.execute(&db.pool)
	.await?;

	require_row(result.rows_affected(), "message", message_id)
}

/// Writes [`DONE_MARKER`] on the latest incoming message of each customer that has no response.
pub async fn mark_conversations_done(
	db: &Db,
	customer_ids: &[String],
	agent: &str,
	at: OffsetDateTime,
) -> Result<u64> {
	if customer_ids.is_empty() {
		return Ok(0);
	}

	let result = sqlx::query(
		"\
UPDATE inbound_messages m
SET
	response_text = $2,
	responded_at = $3,
	responded_by = $4
FROM (
	SELECT DISTINCT ON (sender_id) message_id
	FROM inbound_messages
	WHERE sender_id = ANY($1) AND direction = 'incoming'
	ORDER BY sender_id, received_at DESC
) latest
WHERE m.message_id = latest.message_id
	AND COALESCE(m.response_text, '') = ''",
	)
	.bind(customer_ids)
	.bind(DONE_MARKER)
	.bind(at)
	.bind(agent)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected())
}

pub async fn set_conversation_tags(db: &Db, customer_id: &str, tags: &str) -> Result<u64> {
	let result = sqlx::query(
		"\
UPDATE inbound_messages
SET tags = $2
WHERE sender_id = $1 OR recipient_id = $1",
	)
	.bind(customer_id)
	.bind(tags)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected())
}

pub async fn tags_in_use(db: &Db) -> Result<Vec<String>> {
	let tags = sqlx::query_scalar::<_, String>(
		"\
SELECT DISTINCT btrim(tag)
FROM inbound_messages, unnest(string_to_array(tags, ',')) AS tag
WHERE btrim(tag) <> ''",
	)
	.fetch_all(&db.pool)
	.await?;

	Ok(tags)
}

pub async fn stored_sender_name(db: &Db, customer_id: &str) -> Result<Option<String>> {
	let name = sqlx::query_scalar::<_, String>(
		"\
SELECT sender_name
FROM inbound_messages
WHERE sender_id = $1 AND sender_name <> ''
ORDER BY received_at DESC
LIMIT 1",
	)
	.bind(customer_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(name)
}

pub async fn fill_sender_name(db: &Db, customer_id: &str, name: &str) -> Result<u64> {
	let result = sqlx::query(
		"\
UPDATE inbound_messages
SET sender_name = $2
WHERE sender_id = $1 AND sender_name = ''",
	)
	.bind(customer_id)
	.bind(name)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected())
}

pub async fn insert_comment(db: &Db, comment: &AdComment) -> Result<WriteOutcome> {
	let result = sqlx::query(
		"\
INSERT INTO ad_comments (
	comment_id,
	post_id,
	parent_comment_id,
	post_shortcode,
	post_type,
	ad_id,
	ad_name,
	commenter_id,
	commenter_name,
	comment_text,
	sentiment,
	sentiment_score,
	is_question,
	contains_complaint,
	priority,
	keyword_version,
	status,
	replies,
	has_our_reply,
	our_reply_text,
	created_at,
	received_at
)
VALUES (
	$1,
	$2,
	$3,
	$4,
	$5,
	$6,
	$7,
	$8,
	$9,
	$10,
	$11,
	$12,
	$13,
	$14,
	$15,
	$16,
	$17,
	$18,
	$19,
	$20,
	$21,
	$22
)
ON CONFLICT (comment_id) DO NOTHING",
	)
	.bind(comment.comment_id.as_str())
	.bind(comment.post_id.as_str())
	.bind(comment.parent_comment_id.as_deref())
	.bind(comment.post_shortcode.as_str())
	.bind(comment.post_type.as_str())
	.bind(comment.ad_id.as_str())
	.bind(comment.ad_name.as_str())
	.bind(comment.commenter_id.as_str())
	.bind(comment.commenter_name.as_str())
	.bind(comment.comment_text.as_str())
	.bind(comment.sentiment.as_str())
	.bind(comment.sentiment_score)
	.bind(comment.is_question)
	.bind(comment.contains_complaint)
	.bind(comment.priority.as_str())
	.bind(comment.keyword_version.as_str())
	.bind(comment.status.as_str())
	.bind(&comment.replies)
	.bind(comment.has_our_reply)
	.bind(comment.our_reply_text.as_deref())
	.bind(comment.created_at)
	.bind(comment.received_at)
	.execute(&db.pool)
	.await?;

	Ok(outcome(result.rows_affected()))
}

/// Inserts a synced comment or refreshes only the vendor reply columns of an existing one.
pub async fn upsert_comment_replies(db: &Db, comment: &AdComment) -> Result<WriteOutcome> {
	let inserted = sqlx::query_scalar::<_, bool>(
		"\
INSERT INTO ad_comments (
	comment_id,
	post_id,
	parent_comment_id,
	post_shortcode,
	post_type,
	ad_id,
	ad_name,
	commenter_id,
	commenter_name,
	comment_text,
	sentiment,
	sentiment_score,
	is_question,
	contains_complaint,
	priority,
	keyword_version,
	status,
	replies,
	has_our_reply,
	our_reply_text,
	created_at,
	received_at
)
VALUES (
	$1,
	$2,
	$3,
	$4,
	$5,
	$6,
	$7,
	$8,
	$9,
	$10,
	$11,
	$12,
	$13,
	$14,
	$15,
	$16,
	$17,
	$18,
	$19,
	$20,
	$21,
	$22
)
ON CONFLICT (comment_id) DO UPDATE
SET
	has_our_reply = ad_comments.has_our_reply OR EXCLUDED.has_our_reply,
	our_reply_text = COALESCE(EXCLUDED.our_reply_text, ad_comments.our_reply_text),
	replies = EXCLUDED.replies
RETURNING (xmax = 0)",
	)
	.bind(comment.comment_id.as_str())
	.bind(comment.post_id.as_str())
	.bind(comment.parent_comment_id.as_deref())
	.bind(comment.post_shortcode.as_str())
	.bind(comment.post_type.as_str())
	.bind(comment.ad_id.as_str())
	.bind(comment.ad_name.as_str())
	.bind(comment.commenter_id.as_str())
	.bind(comment.commenter_name.as_str())
	.bind(comment.comment_text.as_str())
	.bind(comment.sentiment.as_str())
	.bind(comment.sentiment_score)
	.bind(comment.is_question)
	.bind(comment.contains_complaint)
	.bind(comment.priority.as_str())
	.bind(comment.keyword_version.as_str())
	.bind(comment.status.as_str())
	.bind(&comment.replies)
	.bind(comment.has_our_reply)
	.bind(comment.our_reply_text.as_deref())
	.bind(comment.created_at)
	.bind(comment.received_at)
	.fetch_one(&db.pool)
	.await?;

	Ok(if inserted { WriteOutcome::Inserted } else { WriteOutcome::Duplicate })
}

pub async fn set_comment_flag(db: &Db, comment_id: &str, flag: CommentFlag) -> Result<bool> {
	let sql = match flag {
		CommentFlag::Deleted => "UPDATE ad_comments SET is_deleted = true WHERE comment_id = $1",
		CommentFlag::Hidden => "UPDATE ad_comments SET is_hidden = true WHERE comment_id = $1",
	};
	let result = sqlx::query(sql).bind(comment_id).execute(&db.pool).await?;

	Ok(result.rows_affected() > 0)
}

pub async fn get_comment(db: &Db, comment_id: &str) -> Result<AdComment> {
	sqlx::query_as::<_, AdComment>(
		"\
SELECT
	comment_id,
	post_id,
	parent_comment_id,
	post_shortcode,
	post_type,
	ad_id,
	ad_name,
	commenter_id,
	commenter_name,
	comment_text,
	sentiment,
	sentiment_score,
	is_question,
	contains_complaint,
	priority,
	keyword_version,
	status,
	replies,
	has_our_reply,
	our_reply_text,
	is_done,
	is_liked,
	is_deleted,
	is_hidden,
	response_text,
	responded_at,
	responded_by,
	created_at,
	received_at
FROM ad_comments
WHERE comment_id = $1",
	)
	.bind(comment_id)
	.fetch_optional(&db.pool)
	.await?
	.ok_or_else(|| Error::NotFound(format!("comment {comment_id:?}")))
}

/// Open comments first, then negative, question, positive, then newest.
pub async fn list_comments(db: &Db, filter: &CommentFilter) -> Result<Vec<AdComment>> {
	if filter.limit <= 0 {
		return Err(Error::InvalidArgument("limit must be greater than zero.".to_string()));
	}

	let rows = sqlx::query_as::<_, AdComment>(
		"\
SELECT
	comment_id,
	post_id,
	parent_comment_id,
	post_shortcode,
	post_type,
	ad_id,
	ad_name,
	commenter_id,
	commenter_name,
	comment_text,
	sentiment,
	sentiment_score,
	is_question,
	contains_complaint,
	priority,
	keyword_version,
	status,
	replies,
	has_our_reply,
	our_reply_text,
	is_done,
	is_liked,
	is_deleted,
	is_hidden,
	response_text,
	responded_at,
	responded_by,
	created_at,
	received_at
FROM ad_comments
WHERE NOT is_deleted
	AND NOT is_hidden
	AND (NOT $1 OR (NOT has_our_reply AND NOT is_done AND response_text IS NULL))
ORDER BY
	(NOT has_our_reply AND NOT is_done AND response_text IS NULL) DESC,
	CASE sentiment WHEN 'negative' THEN 0 WHEN 'question' THEN 1 ELSE 2 END,
	created_at DESC
LIMIT $2",
	)
	.bind(filter.open_only)
	.bind(filter.limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn comment_stats(db: &Db) -> Result<CommentStats> {
	let stats = sqlx::query_as::<_, CommentStats>(
		"\
SELECT
	count(*) AS total,
	count(*) FILTER (
		WHERE NOT has_our_reply AND NOT is_done AND response_text IS NULL
	) AS open,
	count(*) FILTER (WHERE has_our_reply OR response_text IS NOT NULL) AS answered,
	count(*) FILTER (WHERE sentiment = 'negative') AS negative,
	count(*) FILTER (WHERE is_question) AS questions
FROM ad_comments
WHERE NOT is_deleted AND NOT is_hidden",
	)
	.fetch_one(&db.pool)
	.await?;

	Ok(stats)
}

/// Records a response. With `sent` the reply also counts as posted on the vendor side.
pub async fn record_comment_response(
	db: &Db,
	comment_id: &str,
	response: &ResponseRecord<'_>,
	sent: bool,
) -> Result<()> {
	let result = sqlx::query(
		"\
UPDATE ad_comments
SET
	response_text = $2,
	responded_at = $3,
	responded_by = $4,
	has_our_reply = has_our_reply OR $5,
	our_reply_text = CASE WHEN $5 THEN $2 ELSE our_reply_text END
WHERE comment_id = $1",
	)
	.bind(comment_id)
	.bind(response.text)
	.bind(response.at)
	.bind(response.agent)
	.bind(sent)
	.execute(&db.pool)
	.await?;

	require_row(result.rows_affected(), "comment", comment_id)
}

pub async fn mark_comment_done(db: &Db, comment_id: &str) -> Result<()> {
	let result = sqlx::query("UPDATE ad_comments SET is_done = true WHERE comment_id = $1")
		.bind(comment_id)
		.execute(&db.pool)
		.await?;

	require_row(result.rows_affected(), "comment", comment_id)
}

pub async fn mark_comment_liked(db: &Db, comment_id: &str) -> Result<()> {
	let result = sqlx::query("UPDATE ad_comments SET is_liked = true WHERE comment_id = $1")
		.bind(comment_id)
		.execute(&db.pool)
		.await?;

	require_row(result.rows_affected(), "comment", comment_id)
}

pub async fn list_blacklist(db: &Db) -> Result<Vec<BlacklistEntry>> {
	let rows = sqlx::query_as::<_, BlacklistEntry>(
		"\
SELECT user_id, username, blocked_by, blocked_at
FROM blacklist
ORDER BY blocked_at DESC, user_id ASC",
	)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn insert_blacklist(db: &Db, entry: &BlacklistEntry) -> Result<WriteOutcome> {
	let result = sqlx::query(
		"\
INSERT INTO blacklist (user_id, username, blocked_by, blocked_at)
VALUES ($1, $2, $3, $4)
ON CONFLICT (user_id) DO NOTHING",
	)
	.bind(entry.user_id.as_str())
	.bind(entry.username.as_str())
	.bind(entry.blocked_by.as_str())
	.bind(entry.blocked_at)
	.execute(&db.pool)
	.await?;

	Ok(outcome(result.rows_affected()))
}

pub async fn delete_blacklist(db: &Db, user_id: &str) -> Result<bool> {
	let result = sqlx::query("DELETE FROM blacklist WHERE user_id = $1")
		.bind(user_id)
		.execute(&db.pool)
		.await?;

	Ok(result.rows_affected() > 0)
}
