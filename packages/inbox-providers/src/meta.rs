use std::{collections::HashSet, time::Duration};

use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::{Error, Result};

const THREAD_FIELDS: &str = "messages{id,message,created_time,from,story,attachments}";
const CONVERSATION_FIELDS: &str = "participants,id,updated_time";
const COMMENT_FIELDS: &str = "id,text,timestamp,username,from,replies{id,text,timestamp,username,from}";
const MAX_AD_PAGES: usize = 4;
const CREATIVE_BATCH: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
	pub id: String,
	pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VendorConversation {
	pub id: String,
	pub participants: Vec<Participant>,
	pub updated_time: Option<String>,
}
impl VendorConversation {
	pub fn has_participant(&self, user_id: &str) -> bool {
		self.participants.iter().any(|participant| participant.id == user_id)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VendorMessage {
	pub id: String,
	pub text: String,
	pub created_time: Option<String>,
	pub from_id: String,
	pub from_username: String,
	pub has_story: bool,
	pub attachment_types: Vec<String>,
}
impl VendorMessage {
	/// A quick story reaction carries neither text nor attachments.
	pub fn is_story_reaction(&self) -> bool {
		self.text.trim().is_empty() && self.has_story && self.attachment_types.is_empty()
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VendorProfile {
	pub name: Option<String>,
	pub username: Option<String>,
}
impl VendorProfile {
	pub fn display_name(&self) -> Option<&str> {
		[self.username.as_deref(), self.name.as_deref()]
			.into_iter()
			.flatten()
			.map(str::trim)
			.find(|value| !value.is_empty())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdMedia {
	pub media_id: String,
	pub ad_id: String,
	pub ad_name: String,
	pub shortcode: String,
	pub permalink: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VendorReply {
	pub id: String,
	pub text: String,
	pub timestamp: Option<String>,
	pub username: String,
	pub from_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VendorComment {
	pub id: String,
	pub text: String,
	pub timestamp: Option<String>,
	pub username: String,
	pub from_id: String,
	pub replies: Vec<VendorReply>,
}

pub async fn send_message(cfg: &inbox_config::Meta, recipient_id: &str, text: &str) -> Result<()> {
	let client = client(cfg.timeout_ms)?;
	let url = format!("{}/me/messages", cfg.instagram_api_base);
	let body = json!({
		"recipient": { "id": recipient_id },
		"message": { "text": text },
	});
	let res = client
		.post(&url)
		.headers(crate::auth_headers(instagram_token(cfg)?, &Map::new())?)
		.json(&body)
		.send()
		.await?;

	crate::read_json(res).await?;

	Ok(())
}

/// Posts a public reply and returns the new comment id.
pub async fn reply_to_comment(
	cfg: &inbox_config::Meta,
	comment_id: &str,
	text: &str,
) -> Result<String> {
	let client = client(cfg.timeout_ms)?;
	let url = format!("{}/{comment_id}/replies", cfg.graph_api_base);
	let res = client
		.post(&url)
		.headers(crate::auth_headers(page_token(cfg)?, &Map::new())?)
		.json(&json!({ "message": text }))
		.send()
		.await?;
	let json = crate::read_json(res).await?;

	Ok(str_field(&json, "id"))
}

pub async fn like_comment(cfg: &inbox_config::Meta, comment_id: &str) -> Result<()> {
	let client = client(cfg.timeout_ms)?;
	let url = format!("{}/{comment_id}/likes", cfg.graph_api_base);
	let res = client
		.post(&url)
		.headers(crate::auth_headers(page_token(cfg)?, &Map::new())?)
		.send()
		.await?;
	let json = crate::read_json(res).await?;

	if json.get("success").and_then(Value::as_bool) != Some(true) {
		return Err(Error::InvalidResponse {
			message: "Like request did not report success.".to_string(),
		});
	}

	Ok(())
}

pub async fn fetch_profile(cfg: &inbox_config::Meta, user_id: &str) -> Result<VendorProfile> {
	let client = client(cfg.timeout_ms)?;
	let url = format!("{}/{user_id}", cfg.instagram_api_base);
	let res = client
		.get(&url)
		.headers(crate::auth_headers(instagram_token(cfg)?, &Map::new())?)
		.query(&[("fields", "username,name")])
		.send()
		.await?;
	let json = crate::read_json(res).await?;

	Ok(VendorProfile { name: opt_str_field(&json, "name"), username: opt_str_field(&json, "username") })
}

/// Lists conversations, following `paging.next` until `limit` are collected.
pub async fn list_conversations(
	cfg: &inbox_config::Meta,
	limit: u32,
) -> Result<Vec<VendorConversation>> {
	let client = client(cfg.sync_timeout_ms)?;
	let headers = crate::auth_headers(instagram_token(cfg)?, &Map::new())?;
	let limit_param = limit.to_string();
	let mut out = Vec::new();
	let first = client
		.get(format!("{}/me/conversations", cfg.instagram_api_base))
		.headers(headers.clone())
		.query(&[
			("platform", "instagram"),
			("fields", CONVERSATION_FIELDS),
			("limit", limit_param.as_str()),
		])
		.send()
		.await?;
	let mut page = crate::read_json(first).await?;

	loop {
		out.extend(parse_conversations(&page));

		let Some(next) = next_page(&page) else {
			break;
		};

		if out.len() >= limit as usize {
			break;
		}

		let res = client.get(next).headers(headers.clone()).send().await?;

		page = crate::read_json(res).await?;
	}

	out.truncate(limit as usize);

	Ok(out)
}

pub async fn fetch_thread(
	cfg: &inbox_config::Meta,
	conversation_id: &str,
) -> Result<Vec<VendorMessage>> {
	let client = client(cfg.sync_timeout_ms)?;
	let url = format!("{}/{conversation_id}", cfg.instagram_api_base);
	let res = client
		.get(&url)
		.headers(crate::auth_headers(instagram_token(cfg)?, &Map::new())?)
		.query(&[("fields", THREAD_FIELDS)])
		.send()
		.await?;
	let json = crate::read_json(res).await?;

	Ok(parse_thread(&json))
}

/// Resolves the Instagram media behind every ad of the ad account, dark posts included.
pub async fn list_ad_media(cfg: &inbox_config::Meta) -> Result<Vec<AdMedia>> {
	let Some(ad_account_id) = cfg.ad_account_id.as_deref() else {
		return Err(Error::InvalidConfig {
			message: "meta.ad_account_id is not configured.".to_string(),
		});
	};
	let account = if ad_account_id.starts_with("act_") {
		ad_account_id.to_string()
	} else {
		format!("act_{ad_account_id}")
	};
	let client = client(cfg.sync_timeout_ms)?;
	let headers = crate::auth_headers(page_token(cfg)?, &Map::new())?;
	let first = client
		.get(format!("{}/{account}/ads", cfg.graph_api_base))
		.headers(headers.clone())
		.query(&[("fields", "id,name,status,creative"), ("limit", "500")])
		.send()
		.await?;
	let mut page = crate::read_json(first).await?;
	let mut ads = Vec::new();

	for page_index in 1..=MAX_AD_PAGES {
		ads.extend(parse_ads(&page));

		let Some(next) = next_page(&page) else {
			break;
		};

		if page_index == MAX_AD_PAGES {
			tracing::warn!(pages = MAX_AD_PAGES, "Ad listing truncated.");

			break;
		}

		let res = client.get(next).headers(headers.clone()).send().await?;

		page = crate::read_json(res).await?;
	}

	let ads = unique_creatives(ads);
	let mut seen_media = HashSet::new();
	let mut media = Vec::new();

	for batch in ads.chunks(CREATIVE_BATCH) {
		let ids = batch.iter().map(|ad| ad.creative_id.as_str()).collect::<Vec<_>>().join(",");
		let res = client
			.get(format!("{}/", cfg.graph_api_base))
			.headers(headers.clone())
			.query(&[
				("ids", ids.as_str()),
				("fields", "id,effective_instagram_media_id,instagram_permalink_url"),
			])
			.send()
			.await?;
		let creatives = crate::read_json(res).await?;

		media.extend(resolve_creatives(batch, &creatives, &mut seen_media));
	}

	Ok(media)
}

/// Top-level comments on one media with their replies. `since` is a unix timestamp cut-off.
pub async fn fetch_comments(
	cfg: &inbox_config::Meta,
	media_id: &str,
	limit: u32,
	since: Option<i64>,
) -> Result<Vec<VendorComment>> {
	let client = client(cfg.sync_timeout_ms)?;
	let url = format!("{}/{media_id}/comments", cfg.graph_api_base);
	let mut query = vec![("fields", COMMENT_FIELDS.to_string()), ("limit", limit.to_string())];

	if let Some(since) = since {
		query.push(("since", since.to_string()));
	}

	let res = client
		.get(&url)
		.headers(crate::auth_headers(page_token(cfg)?, &Map::new())?)
		.query(&query)
		.send()
		.await?;
	let json = crate::read_json(res).await?;

	Ok(parse_comments(&json))
}

pub fn parse_conversations(json: &Value) -> Vec<VendorConversation> {
	data_items(json)
		.iter()
		.filter_map(|item| {
			let id = str_field(item, "id");

			if id.is_empty() {
				return None;
			}

			let participants = item
				.get("participants")
				.map(data_items)
				.unwrap_or_default()
				.iter()
				.map(|participant| Participant {
					id: str_field(participant, "id"),
					username: str_field(participant, "username"),
				})
				.collect();

			Some(VendorConversation {
				id,
				participants,
				updated_time: opt_str_field(item, "updated_time"),
			})
		})
		.collect()
}

pub fn parse_thread(json: &Value) -> Vec<VendorMessage> {
	json.get("messages")
		.map(data_items)
		.unwrap_or_default()
		.iter()
		.filter_map(|item| {
			let id = str_field(item, "id");

			if id.is_empty() {
				return None;
			}

			let from = item.get("from");
			let has_story = item
				.get("story")
				.map(|story| !(story.is_null() || story.as_object().is_some_and(Map::is_empty)))
				.unwrap_or(false);
			let attachment_types = item
				.get("attachments")
				.map(data_items)
				.unwrap_or_default()
				.iter()
				.map(attachment_type)
				.collect();

			Some(VendorMessage {
				id,
				text: str_field(item, "message"),
				created_time: opt_str_field(item, "created_time"),
				from_id: from.map(|from| str_field(from, "id")).unwrap_or_default(),
				from_username: from.map(|from| str_field(from, "username")).unwrap_or_default(),
				has_story,
				attachment_types,
			})
		})
		.collect()
}

pub fn parse_comments(json: &Value) -> Vec<VendorComment> {
	data_items(json)
		.iter()
		.filter_map(|item| {
			let reply = parse_reply(item)?;
			let replies = item
				.get("replies")
				.map(data_items)
				.unwrap_or_default()
				.iter()
				.filter_map(parse_reply)
				.collect();

			Some(VendorComment {
				id: reply.id,
				text: reply.text,
				timestamp: reply.timestamp,
				username: reply.username,
				from_id: reply.from_id,
				replies,
			})
		})
		.collect()
}

/// Extracts the post shortcode from a `/p/` or `/reel/` permalink.
pub fn shortcode_from_permalink(permalink: &str) -> String {
	for marker in ["/p/", "/reel/"] {
		if let Some((_, rest)) = permalink.split_once(marker) {
			return rest.split(['/', '?']).next().unwrap_or_default().to_string();
		}
	}

	String::new()
}

#[derive(Debug, Clone)]
struct AdCreative {
	ad_id: String,
	ad_name: String,
	creative_id: String,
}

fn parse_ads(json: &Value) -> Vec<AdCreative> {
	data_items(json)
		.iter()
		.filter_map(|ad| {
			let creative_id = ad.get("creative").map(|creative| str_field(creative, "id"))?;

			if creative_id.is_empty() {
				return None;
			}

			Some(AdCreative { ad_id: str_field(ad, "id"), ad_name: str_field(ad, "name"), creative_id })
		})
		.collect()
}

/// Keeps the first ad per creative; variants sharing a creative resolve to the same media.
fn unique_creatives(ads: Vec<AdCreative>) -> Vec<AdCreative> {
	let mut seen = HashSet::new();

	ads.into_iter().filter(|ad| seen.insert(ad.creative_id.clone())).collect()
}

/// Media already in `seen` is skipped, so several ads promoting one post yield one entry.
fn resolve_creatives(
	batch: &[AdCreative],
	creatives: &Value,
	seen: &mut HashSet<String>,
) -> Vec<AdMedia> {
	batch
		.iter()
		.filter_map(|ad| {
			let creative = creatives.get(&ad.creative_id)?;
			let media_id = str_field(creative, "effective_instagram_media_id");

			if media_id.is_empty() || !seen.insert(media_id.clone()) {
				return None;
			}

			let permalink = str_field(creative, "instagram_permalink_url");

			Some(AdMedia {
				media_id,
				ad_id: ad.ad_id.clone(),
				ad_name: ad.ad_name.clone(),
				shortcode: shortcode_from_permalink(&permalink),
				permalink,
			})
		})
		.collect()
}

fn parse_reply(item: &Value) -> Option<VendorReply> {
	let id = str_field(item, "id");

	if id.is_empty() {
		return None;
	}

	let from = item.get("from");
	let username = match str_field(item, "username") {
		name if name.is_empty() =>
			from.map(|from| str_field(from, "username")).unwrap_or_default(),
		name => name,
	};

	Some(VendorReply {
		id,
		text: str_field(item, "text"),
		timestamp: opt_str_field(item, "timestamp"),
		username,
		from_id: from.map(|from| str_field(from, "id")).unwrap_or_default(),
	})
}

fn attachment_type(attachment: &Value) -> String {
	if let Some(kind) = attachment.get("type").and_then(Value::as_str) {
		return kind.to_string();
	}

	for (key, kind) in [("image_data", "image"), ("video_data", "video"), ("audio_data", "audio")] {
		if attachment.get(key).is_some() {
			return kind.to_string();
		}
	}

	"file".to_string()
}

fn data_items(json: &Value) -> Vec<Value> {
	json.get("data").and_then(Value::as_array).cloned().unwrap_or_default()
}

fn next_page(json: &Value) -> Option<String> {
	json.get("paging")
		.and_then(|paging| paging.get("next"))
		.and_then(Value::as_str)
		.filter(|next| !next.is_empty())
		.map(str::to_string)
}

fn str_field(json: &Value, key: &str) -> String {
	json.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn opt_str_field(json: &Value, key: &str) -> Option<String> {
	json.get(key).and_then(Value::as_str).filter(|value| !value.is_empty()).map(str::to_string)
}

fn client(timeout_ms: u64) -> Result<Client> {
	Ok(Client::builder().timeout(Duration::from_millis(timeout_ms)).build()?)
}

fn instagram_token(cfg: &inbox_config::Meta) -> Result<&str> {
	cfg.instagram_access_token.as_deref().ok_or_else(|| Error::InvalidConfig {
		message: "meta.instagram_access_token is not configured.".to_string(),
	})
}

fn page_token(cfg: &inbox_config::Meta) -> Result<&str> {
	cfg.page_access_token.as_deref().ok_or_else(|| Error::InvalidConfig {
		message: "meta.page_access_token is not configured.".to_string(),
	})
}
