pub mod blacklist;
pub mod comments;
pub mod conversations;
pub mod drafting;
pub mod sync;
pub mod webhook;

mod error;

pub use blacklist::BlockUserRequest;
pub use comments::{CommentListRequest, CommentReplyRequest};
pub use conversations::{
	ConversationDetail, ConversationListRequest, ConversationReplyRequest, MarkDoneRequest,
	MarkDoneResponse, SetTagsRequest,
};
pub use drafting::DraftResponse;
pub use error::{Error, Result};
pub use sync::{CommentSyncReport, HistorySyncReport};
pub use webhook::WebhookReport;

use std::{future::Future, pin::Pin, sync::Arc};

use serde::Serialize;

use inbox_config::{Config, LlmProviderConfig, Meta};
use inbox_domain::classify::Classifier;
use inbox_providers::{
	drafter,
	meta::{self, AdMedia, VendorComment, VendorConversation, VendorMessage, VendorProfile},
};
use inbox_storage::{
	db::Db,
	models::{AdComment, CommentFlag, InboundMessage, WriteOutcome},
	queries,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outbound calls to the messaging vendor.
pub trait VendorApi
where
	Self: Send + Sync,
{
	fn send_message<'a>(
		&'a self,
		cfg: &'a Meta,
		recipient_id: &'a str,
		text: &'a str,
	) -> BoxFuture<'a, inbox_providers::Result<()>>;

	fn reply_to_comment<'a>(
		&'a self,
		cfg: &'a Meta,
		comment_id: &'a str,
		text: &'a str,
	) -> BoxFuture<'a, inbox_providers::Result<String>>;

	fn like_comment<'a>(
		&'a self,
		cfg: &'a Meta,
		comment_id: &'a str,
	) -> BoxFuture<'a, inbox_providers::Result<()>>;

	fn fetch_thread<'a>(
		&'a self,
		cfg: &'a Meta,
		conversation_id: &'a str,
	) -> BoxFuture<'a, inbox_providers::Result<Vec<VendorMessage>>>;

	fn list_conversations<'a>(
		&'a self,
		cfg: &'a Meta,
		limit: u32,
	) -> BoxFuture<'a, inbox_providers::Result<Vec<VendorConversation>>>;

	fn fetch_profile<'a>(
		&'a self,
		cfg: &'a Meta,
		user_id: &'a str,
	) -> BoxFuture<'a, inbox_providers::Result<VendorProfile>>;

	fn list_ad_media<'a>(
		&'a self,
		cfg: &'a Meta,
	) -> BoxFuture<'a, inbox_providers::Result<Vec<AdMedia>>>;

	fn fetch_comments<'a>(
		&'a self,
		cfg: &'a Meta,
		media_id: &'a str,
		limit: u32,
		since: Option<i64>,
	) -> BoxFuture<'a, inbox_providers::Result<Vec<VendorComment>>>;
}

pub trait ReplyDrafter
where
	Self: Send + Sync,
{
	fn draft<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		system_prompt: &'a str,
		user_prompt: &'a str,
	) -> BoxFuture<'a, inbox_providers::Result<String>>;
}

/// Persists classified webhook records keyed by their natural id.
pub trait RecordWriter
where
	Self: Send + Sync,
{
	fn write_message<'a>(
		&'a self,
		message: &'a InboundMessage,
	) -> BoxFuture<'a, inbox_storage::Result<WriteOutcome>>;

	fn write_comment<'a>(
		&'a self,
		comment: &'a AdComment,
	) -> BoxFuture<'a, inbox_storage::Result<WriteOutcome>>;

	fn mark_comment_removed<'a>(
		&'a self,
		comment_id: &'a str,
		flag: CommentFlag,
	) -> BoxFuture<'a, inbox_storage::Result<bool>>;
}

#[derive(Clone)]
pub struct Providers {
	pub vendor: Arc<dyn VendorApi>,
	pub drafter: Arc<dyn ReplyDrafter>,
}
impl Providers {
	pub fn new(vendor: Arc<dyn VendorApi>, drafter: Arc<dyn ReplyDrafter>) -> Self {
		Self { vendor, drafter }
	}
}
impl Default for Providers {
	fn default() -> Self {
		Self { vendor: Arc::new(DefaultProviders), drafter: Arc::new(DefaultProviders) }
	}
}

/// Identity of the agent issuing a dashboard command, built per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentContext {
	pub agent: String,
}
impl AgentContext {
	pub fn new(cfg: &Config, agent: Option<&str>) -> Result<Self> {
		let agent = agent.map(str::trim).unwrap_or_default();

		if agent.is_empty() {
			return Err(Error::Unauthorized { message: "Agent code is required.".to_string() });
		}
		if !cfg.security.agents.is_empty()
			&& !cfg.security.agents.iter().any(|allowed| allowed == agent)
		{
			return Err(Error::Forbidden { message: format!("Agent {agent:?} is not allowed.") });
		}

		Ok(Self { agent: agent.to_string() })
	}
}

/// Result of a vendor-side action. Vendor failures are reported here, not raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundOutcome {
	pub ok: bool,
	pub detail: String,
}
impl OutboundOutcome {
	pub fn ok(detail: impl Into<String>) -> Self {
		Self { ok: true, detail: detail.into() }
	}

	pub fn failed(detail: impl Into<String>) -> Self {
		Self { ok: false, detail: detail.into() }
	}
}

pub struct PgRecordWriter {
	db: Db,
}
impl PgRecordWriter {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}

impl RecordWriter for PgRecordWriter {
	fn write_message<'a>(
		&'a self,
		message: &'a InboundMessage,
	) -> BoxFuture<'a, inbox_storage::Result<WriteOutcome>> {
		Box::pin(queries::insert_message(&self.db, message))
	}

	fn write_comment<'a>(
		&'a self,
		comment: &'a AdComment,
	) -> BoxFuture<'a, inbox_storage::Result<WriteOutcome>> {
		Box::pin(queries::insert_comment(&self.db, comment))
	}

	fn mark_comment_removed<'a>(
		&'a self,
		comment_id: &'a str,
		flag: CommentFlag,
	) -> BoxFuture<'a, inbox_storage::Result<bool>> {
		Box::pin(queries::set_comment_flag(&self.db, comment_id, flag))
	}
}

pub struct InboxService {
	pub cfg: Config,
	pub db: Db,
	pub classifier: Classifier,
	pub providers: Providers,
	pub writer: Arc<dyn RecordWriter>,
}
impl InboxService {
	pub fn new(cfg: Config, db: Db) -> Self {
		Self::with_providers(cfg, db, Providers::default())
	}

	pub fn with_providers(cfg: Config, db: Db, providers: Providers) -> Self {
		let classifier = Classifier::new(&cfg.keywords);
		let writer = Arc::new(PgRecordWriter::new(db.clone()));

		Self { cfg, db, classifier, providers, writer }
	}

	pub fn with_writer(mut self, writer: Arc<dyn RecordWriter>) -> Self {
		self.writer = writer;

		self
	}

	pub fn agent_context(&self, agent: Option<&str>) -> Result<AgentContext> {
		AgentContext::new(&self.cfg, agent)
	}
}

struct DefaultProviders;

impl VendorApi for DefaultProviders {
	fn send_message<'a>(
		&'a self,
		cfg: &'a Meta,
		recipient_id: &'a str,
		text: &'a str,
	) -> BoxFuture<'a, inbox_providers::Result<()>> {
		Box::pin(meta::send_message(cfg, recipient_id, text))
	}

	fn reply_to_comment<'a>(
		&'a self,
		cfg: &'a Meta,
		comment_id: &'a str,
		text: &'a str,
	) -> BoxFuture<'a, inbox_providers::Result<String>> {
		Box::pin(meta::reply_to_comment(cfg, comment_id, text))
	}

	fn like_comment<'a>(
		&'a self,
		cfg: &'a Meta,
		comment_id: &'a str,
	) -> BoxFuture<'a, inbox_providers::Result<()>> {
		Box::pin(meta::like_comment(cfg, comment_id))
	}

	fn fetch_thread<'a>(
		&'a self,
		cfg: &'a Meta,
		conversation_id: &'a str,
	) -> BoxFuture<'a, inbox_providers::Result<Vec<VendorMessage>>> {
		Box::pin(meta::fetch_thread(cfg, conversation_id))
	}

	fn list_conversations<'a>(
		&'a self,
		cfg: &'a Meta,
		limit: u32,
	) -> BoxFuture<'a, inbox_providers::Result<Vec<VendorConversation>>> {
		Box::pin(meta::list_conversations(cfg, limit))
	}

	fn fetch_profile<'a>(
		&'a self,
		cfg: &'a Meta,
		user_id: &'a str,
	) -> BoxFuture<'a, inbox_providers::Result<VendorProfile>> {
		Box::pin(meta::fetch_profile(cfg, user_id))
	}

	fn list_ad_media<'a>(
		&'a self,
		cfg: &'a Meta,
	) -> BoxFuture<'a, inbox_providers::Result<Vec<AdMedia>>> {
		Box::pin(meta::list_ad_media(cfg))
	}

	fn fetch_comments<'a>(
		&'a self,
		cfg: &'a Meta,
		media_id: &'a str,
		limit: u32,
		since: Option<i64>,
	) -> BoxFuture<'a, inbox_providers::Result<Vec<VendorComment>>> {
		Box::pin(meta::fetch_comments(cfg, media_id, limit, since))
	}
}

impl ReplyDrafter for DefaultProviders {
	fn draft<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		system_prompt: &'a str,
		user_prompt: &'a str,
	) -> BoxFuture<'a, inbox_providers::Result<String>> {
		Box::pin(drafter::draft(cfg, system_prompt, user_prompt))
	}
}
