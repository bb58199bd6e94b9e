use axum::{
	Json, Router,
	body::{Body, Bytes},
	extract::{FromRequestParts, Path, Query, Request, State},
	http::{HeaderMap, StatusCode, header::AUTHORIZATION, request::Parts},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use inbox_domain::{
	signature::{SIGNATURE_HEADER, tokens_match},
	vendor_time,
};
use inbox_service::{
	AgentContext, BlockUserRequest, CommentListRequest, CommentReplyRequest, CommentSyncReport,
	ConversationDetail, ConversationListRequest, ConversationReplyRequest, DraftResponse,
	Error as ServiceError, HistorySyncReport, MarkDoneRequest, MarkDoneResponse, OutboundOutcome,
	SetTagsRequest, WebhookReport,
};
use inbox_storage::models::{
	AdComment, BlacklistEntry, CommentStats, ConversationSummary, WriteOutcome,
};

use crate::state::AppState;

pub const HEADER_AGENT: &str = "X-Inbox-Agent";

pub fn router(state: AppState) -> Router {
	let webhook = get(verify_webhook).post(receive_webhook);
	let dashboard = Router::new()
		.route("/conversations", get(list_conversations))
		.route("/conversations/bulk_done", post(mark_conversations_done))
		.route("/conversations/{customer_id}", get(conversation))
		.route("/conversations/{customer_id}/reply", post(reply_to_conversation))
		.route("/conversations/{customer_id}/done", post(mark_conversation_done))
		.route("/conversations/{customer_id}/tags", put(set_conversation_tags))
		.route("/conversations/{customer_id}/draft", post(draft_conversation_reply))
		.route("/conversations/{customer_id}/sync", post(sync_conversation))
		.route("/tags", get(known_tags))
		.route("/comments", get(list_comments))
		.route("/comments/stats", get(comment_stats))
		.route("/comments/{comment_id}/reply", post(reply_to_comment))
		.route("/comments/{comment_id}/response", post(save_comment_response))
		.route("/comments/{comment_id}/done", post(mark_comment_done))
		.route("/comments/{comment_id}/hide", post(hide_comment))
		.route("/comments/{comment_id}/like", post(like_comment))
		.route("/comments/{comment_id}/draft", post(draft_comment_reply))
		.route("/blacklist", get(blacklist).post(block_user))
		.route("/blacklist/{user_id}", delete(unblock_user))
		.route("/sync/history", post(sync_history))
		.route("/sync/comments", post(sync_comments))
		.route_layer(middleware::from_fn_with_state(state.clone(), dashboard_auth));

	Router::new()
		.route("/", webhook.clone())
		.route("/webhook", webhook)
		.route("/health", get(health))
		.nest("/v1", dashboard)
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct VerifyQuery {
	#[serde(rename = "hub.mode")]
	mode: Option<String>,
	#[serde(rename = "hub.verify_token")]
	verify_token: Option<String>,
	#[serde(rename = "hub.challenge")]
	challenge: Option<String>,
}

async fn verify_webhook(
	State(state): State<AppState>,
	Query(query): Query<VerifyQuery>,
) -> Result<String, ApiError> {
	let challenge = state.service.verify_subscription(
		query.mode.as_deref(),
		query.verify_token.as_deref(),
		query.challenge.as_deref(),
	)?;

	Ok(challenge)
}

async fn receive_webhook(
	State(state): State<AppState>,
	headers: HeaderMap,
	body: Bytes,
) -> Result<Json<WebhookReport>, ApiError> {
	let signature = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
	let report = state.service.ingest_webhook(&body, signature).await?;

	Ok(Json(report))
}

/// Request-scoped agent identity taken from the `X-Inbox-Agent` header.
pub struct Agent(pub AgentContext);

impl FromRequestParts<AppState> for Agent {
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
		let agent = parts.headers.get(HEADER_AGENT).and_then(|value| value.to_str().ok());

		Ok(Self(state.service.agent_context(agent)?))
	}
}

async fn dashboard_auth(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
	if let Some(expected) = state.service.cfg.security.api_auth_token.as_deref()
		&& !read_bearer_token(req.headers()).is_some_and(|token| tokens_match(expected, token))
	{
		return json_error(
			StatusCode::UNAUTHORIZED,
			"UNAUTHORIZED",
			"A valid Bearer token is required.",
			None,
		)
		.into_response();
	}

	let agent = req.headers().get(HEADER_AGENT).and_then(|value| value.to_str().ok());

	if let Err(err) = state.service.agent_context(agent) {
		return ApiError::from(err).into_response();
	}

	next.run(req).await
}

fn read_bearer_token(headers: &HeaderMap) -> Option<&str> {
	let raw = headers.get(AUTHORIZATION)?;
	let value = raw.to_str().ok()?.trim();
	let token = value.strip_prefix("Bearer ")?.trim();

	if token.is_empty() { None } else { Some(token) }
}

#[derive(Debug, Deserialize)]
struct ConversationQuery {
	#[serde(default)]
	unanswered_only: bool,
	/// Comma separated.
	tags: Option<String>,
	limit: Option<i64>,
}

async fn list_conversations(
	State(state): State<AppState>,
	Query(query): Query<ConversationQuery>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
	let req = ConversationListRequest {
		unanswered_only: query.unanswered_only,
		tags: query
			.tags
			.as_deref()
			.unwrap_or_default()
			.split(',')
			.map(str::to_string)
			.collect(),
		limit: query.limit,
	};

	Ok(Json(state.service.list_conversations(req).await?))
}

async fn conversation(
	State(state): State<AppState>,
	Path(customer_id): Path<String>,
) -> Result<Json<ConversationDetail>, ApiError> {
	Ok(Json(state.service.conversation(&customer_id).await?))
}

async fn reply_to_conversation(
	State(state): State<AppState>,
	Agent(ctx): Agent,
	Path(customer_id): Path<String>,
	Json(payload): Json<ConversationReplyRequest>,
) -> Result<Json<OutboundOutcome>, ApiError> {
	Ok(Json(state.service.reply_to_conversation(&ctx, &customer_id, payload).await?))
}

async fn mark_conversation_done(
	State(state): State<AppState>,
	Agent(ctx): Agent,
	Path(customer_id): Path<String>,
) -> Result<Json<MarkDoneResponse>, ApiError> {
	Ok(Json(state.service.mark_conversation_done(&ctx, &customer_id).await?))
}

async fn mark_conversations_done(
	State(state): State<AppState>,
	Agent(ctx): Agent,
	Json(payload): Json<MarkDoneRequest>,
) -> Result<Json<MarkDoneResponse>, ApiError> {
	Ok(Json(state.service.mark_conversations_done(&ctx, payload).await?))
}

#[derive(Debug, Serialize)]
struct UpdatedBody {
	updated: u64,
}

async fn set_conversation_tags(
	State(state): State<AppState>,
	Path(customer_id): Path<String>,
	Json(payload): Json<SetTagsRequest>,
) -> Result<Json<UpdatedBody>, ApiError> {
	let updated = state.service.set_conversation_tags(&customer_id, payload).await?;

	Ok(Json(UpdatedBody { updated }))
}

async fn draft_conversation_reply(
	State(state): State<AppState>,
	Path(customer_id): Path<String>,
) -> Result<Json<DraftResponse>, ApiError> {
	Ok(Json(state.service.draft_conversation_reply(&customer_id).await?))
}

async fn sync_conversation(
	State(state): State<AppState>,
	Path(customer_id): Path<String>,
) -> Result<Json<HistorySyncReport>, ApiError> {
	Ok(Json(state.service.sync_conversation(&customer_id, None, None).await?))
}

async fn known_tags(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
	Ok(Json(state.service.known_tags().await?))
}

async fn list_comments(
	State(state): State<AppState>,
	Query(query): Query<CommentListRequest>,
) -> Result<Json<Vec<AdComment>>, ApiError> {
	Ok(Json(state.service.list_comments(query).await?))
}

async fn comment_stats(State(state): State<AppState>) -> Result<Json<CommentStats>, ApiError> {
	Ok(Json(state.service.comment_stats().await?))
}

async fn reply_to_comment(
	State(state): State<AppState>,
	Agent(ctx): Agent,
	Path(comment_id): Path<String>,
	Json(payload): Json<CommentReplyRequest>,
) -> Result<Json<OutboundOutcome>, ApiError> {
	Ok(Json(state.service.reply_to_comment(&ctx, &comment_id, payload).await?))
}

async fn save_comment_response(
	State(state): State<AppState>,
	Agent(ctx): Agent,
	Path(comment_id): Path<String>,
	Json(payload): Json<CommentReplyRequest>,
) -> Result<StatusCode, ApiError> {
	state.service.save_comment_response(&ctx, &comment_id, payload).await?;

	Ok(StatusCode::NO_CONTENT)
}

async fn mark_comment_done(
	State(state): State<AppState>,
	Agent(ctx): Agent,
	Path(comment_id): Path<String>,
) -> Result<StatusCode, ApiError> {
	state.service.mark_comment_done(&ctx, &comment_id).await?;

	Ok(StatusCode::NO_CONTENT)
}

async fn hide_comment(
	State(state): State<AppState>,
	Agent(ctx): Agent,
	Path(comment_id): Path<String>,
) -> Result<StatusCode, ApiError> {
	state.service.hide_comment(&ctx, &comment_id).await?;

	Ok(StatusCode::NO_CONTENT)
}

async fn like_comment(
	State(state): State<AppState>,
	Agent(ctx): Agent,
	Path(comment_id): Path<String>,
) -> Result<Json<OutboundOutcome>, ApiError> {
	Ok(Json(state.service.like_comment(&ctx, &comment_id).await?))
}

async fn draft_comment_reply(
	State(state): State<AppState>,
	Path(comment_id): Path<String>,
) -> Result<Json<DraftResponse>, ApiError> {
	Ok(Json(state.service.draft_comment_reply(&comment_id).await?))
}

async fn blacklist(State(state): State<AppState>) -> Result<Json<Vec<BlacklistEntry>>, ApiError> {
	Ok(Json(state.service.blacklist().await?))
}

#[derive(Debug, Serialize)]
struct BlockUserBody {
	user_id: String,
	already_blocked: bool,
}

async fn block_user(
	State(state): State<AppState>,
	Agent(ctx): Agent,
	Json(payload): Json<BlockUserRequest>,
) -> Result<Json<BlockUserBody>, ApiError> {
	let user_id = payload.user_id.trim().to_string();
	let outcome = state.service.block_user(&ctx, payload).await?;

	Ok(Json(BlockUserBody { user_id, already_blocked: outcome == WriteOutcome::Duplicate }))
}

async fn unblock_user(
	State(state): State<AppState>,
	Agent(ctx): Agent,
	Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
	state.service.unblock_user(&ctx, &user_id).await?;

	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct SinceQuery {
	/// `YYYY-MM-DD`, interpreted as midnight UTC.
	since: Option<String>,
}
impl SinceQuery {
	fn parse(&self) -> Result<Option<OffsetDateTime>, ApiError> {
		let Some(raw) = self.since.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) else {
			return Ok(None);
		};

		vendor_time::parse_date(raw).map(Some).ok_or_else(|| {
			json_error(
				StatusCode::BAD_REQUEST,
				"INVALID_REQUEST",
				"since must be a YYYY-MM-DD date.",
				Some(vec!["$.since".to_string()]),
			)
		})
	}
}

async fn sync_history(
	State(state): State<AppState>,
	Query(query): Query<SinceQuery>,
) -> Result<Json<HistorySyncReport>, ApiError> {
	Ok(Json(state.service.sync_all_conversations(query.parse()?).await?))
}

async fn sync_comments(
	State(state): State<AppState>,
	Query(query): Query<SinceQuery>,
) -> Result<Json<CommentSyncReport>, ApiError> {
	Ok(Json(state.service.sync_ad_comments(query.parse()?).await?))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidRequest { message } =>
				json_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message, None),
			ServiceError::MalformedPayload { message } =>
				json_error(StatusCode::BAD_REQUEST, "MALFORMED_PAYLOAD", message, None),
			ServiceError::Unauthorized { message } =>
				json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message, None),
			ServiceError::Forbidden { message } =>
				json_error(StatusCode::FORBIDDEN, "FORBIDDEN", message, None),
			ServiceError::NotFound { message } =>
				json_error(StatusCode::NOT_FOUND, "NOT_FOUND", message, None),
			ServiceError::Conflict { message } =>
				json_error(StatusCode::CONFLICT, "CONFLICT", message, None),
			ServiceError::Provider { message } =>
				json_error(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", message, None),
			ServiceError::Storage { message } => {
				tracing::error!(error = %message, "Storage failure.");

				json_error(
					StatusCode::INTERNAL_SERVER_ERROR,
					"STORAGE_ERROR",
					"Storage request failed.",
					None,
				)
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}
