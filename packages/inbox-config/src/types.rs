use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub meta: Meta,
	pub security: Security,
	pub classifier: Classifier,
	pub drafting: Drafting,
	/// Filled by [`crate::load`] from `classifier.keywords_path`.
	#[serde(skip)]
	pub keywords: KeywordTable,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Meta {
	/// Base for DM, conversation, and profile calls, e.g. `https://graph.instagram.com/v21.0`.
	pub instagram_api_base: String,
	/// Base for comment, like, and ad calls, e.g. `https://graph.facebook.com/v21.0`.
	pub graph_api_base: String,
	/// Our own Instagram business account id. Messages from this id are outgoing.
	pub own_account_id: String,
	pub ad_account_id: Option<String>,
	pub instagram_access_token: Option<String>,
	pub page_access_token: Option<String>,
	pub timeout_ms: u64,
	pub sync_timeout_ms: u64,
	#[serde(default = "default_conversation_limit")]
	pub conversation_limit: u32,
	#[serde(default = "default_comment_limit")]
	pub comment_limit: u32,
}

#[derive(Debug, Deserialize)]
pub struct Security {
	pub webhook_verify_token: String,
	/// Meta app secret. When unset the webhook signature check is skipped with a warning.
	pub app_secret: Option<String>,
	pub api_auth_token: Option<String>,
	/// Agent short codes allowed in the `X-Inbox-Agent` header. Empty allows any code.
	#[serde(default)]
	pub agents: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Classifier {
	pub keywords_path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct Drafting {
	pub enabled: bool,
	#[serde(default = "default_history_messages")]
	pub history_messages: u32,
	pub message_system_prompt: String,
	pub comment_system_prompt: String,
	pub message_fallback: String,
	pub comment_fallback: String,
	pub provider: LlmProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Versioned keyword data driving message tagging and sentiment.
#[derive(Debug, Default, Deserialize)]
pub struct KeywordTable {
	pub version: String,
	pub fallback_tag: String,
	pub story_reply_tag: String,
	/// Scanned in order; the first match becomes the primary category.
	#[serde(default)]
	pub tags: Vec<TagKeywords>,
	#[serde(default)]
	pub sentiment: SentimentKeywords,
}

#[derive(Debug, Deserialize)]
pub struct TagKeywords {
	pub name: String,
	pub priority: String,
	pub keywords: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SentimentKeywords {
	pub negative: Vec<String>,
	pub question: Vec<String>,
}

fn default_conversation_limit() -> u32 {
	200
}

fn default_comment_limit() -> u32 {
	100
}

fn default_history_messages() -> u32 {
	3
}
