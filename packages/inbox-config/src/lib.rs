mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Classifier, Config, Drafting, KeywordTable, LlmProviderConfig, Meta, Postgres,
	SentimentKeywords, Security, Service, Storage, TagKeywords,
};

use std::{env, fs, path::Path};

pub const PRIORITIES: [&str; 3] = ["high", "normal", "low"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	apply_env_overrides(&mut cfg, |name| env::var(name).ok());
	normalize(&mut cfg);

	let keywords_path = match path.parent() {
		Some(dir) if cfg.classifier.keywords_path.is_relative() =>
			dir.join(&cfg.classifier.keywords_path),
		_ => cfg.classifier.keywords_path.clone(),
	};

	cfg.keywords = load_keywords(&keywords_path)?;

	validate(&cfg)?;

	Ok(cfg)
}

pub fn load_keywords(path: &Path) -> Result<KeywordTable> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse_keywords(&raw).map_err(|err| match err {
		Error::ParseConfig { source, .. } => Error::ParseConfig { path: path.to_path_buf(), source },
		other => other,
	})
}

/// Parses and normalises a keyword table. Keywords are lower-cased and blank entries dropped.
pub fn parse_keywords(raw: &str) -> Result<KeywordTable> {
	let mut table: KeywordTable = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: "<inline>".into(), source: err })?;

	for tag in &mut table.tags {
		tag.name = tag.name.trim().to_string();
		tag.priority = tag.priority.trim().to_lowercase();
		normalize_keywords(&mut tag.keywords);
	}

	normalize_keywords(&mut table.sentiment.negative);
	normalize_keywords(&mut table.sentiment.question);

	table.fallback_tag = table.fallback_tag.trim().to_string();
	table.story_reply_tag = table.story_reply_tag.trim().to_string();

	validate_keywords(&table)?;

	Ok(table)
}

/// Secrets arrive through the environment in deployment; file values are for local runs.
pub fn apply_env_overrides<F>(cfg: &mut Config, lookup: F)
where
	F: Fn(&str) -> Option<String>,
{
	if let Some(value) = lookup("INBOX_WEBHOOK_VERIFY_TOKEN") {
		cfg.security.webhook_verify_token = value;
	}
	if let Some(value) = lookup("INBOX_META_APP_SECRET") {
		cfg.security.app_secret = Some(value);
	}
	if let Some(value) = lookup("INBOX_API_AUTH_TOKEN") {
		cfg.security.api_auth_token = Some(value);
	}
	if let Some(value) = lookup("INBOX_INSTAGRAM_ACCESS_TOKEN") {
		cfg.meta.instagram_access_token = Some(value);
	}
	if let Some(value) = lookup("INBOX_PAGE_ACCESS_TOKEN") {
		cfg.meta.page_access_token = Some(value);
	}
	if let Some(value) = lookup("INBOX_DRAFTING_API_KEY") {
		cfg.drafting.provider.api_key = value;
	}
	if let Some(value) = lookup("INBOX_PG_DSN") {
		cfg.storage.postgres.dsn = value;
	}
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.security.webhook_verify_token.trim().is_empty() {
		return Err(Error::Validation {
			message: "security.webhook_verify_token must be non-empty.".to_string(),
		});
	}

	for (label, value) in [
		("meta.instagram_api_base", &cfg.meta.instagram_api_base),
		("meta.graph_api_base", &cfg.meta.graph_api_base),
		("meta.own_account_id", &cfg.meta.own_account_id),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.meta.timeout_ms == 0 || cfg.meta.sync_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "meta.timeout_ms and meta.sync_timeout_ms must be greater than zero."
				.to_string(),
		});
	}
	if cfg.security.agents.iter().any(|agent| agent.trim().is_empty()) {
		return Err(Error::Validation {
			message: "security.agents must not contain blank codes.".to_string(),
		});
	}
	if cfg.drafting.enabled {
		if cfg.drafting.provider.api_key.trim().is_empty() {
			return Err(Error::Validation {
				message: "drafting.provider.api_key must be non-empty when drafting is enabled."
					.to_string(),
			});
		}
		if !cfg.drafting.provider.temperature.is_finite() {
			return Err(Error::Validation {
				message: "drafting.provider.temperature must be a finite number.".to_string(),
			});
		}
	}
	if cfg.drafting.history_messages == 0 {
		return Err(Error::Validation {
			message: "drafting.history_messages must be greater than zero.".to_string(),
		});
	}

	validate_keywords(&cfg.keywords)
}

pub fn validate_keywords(table: &KeywordTable) -> Result<()> {
	if table.version.trim().is_empty() {
		return Err(Error::Validation { message: "keywords.version must be non-empty.".to_string() });
	}
	if table.fallback_tag.is_empty() || table.story_reply_tag.is_empty() {
		return Err(Error::Validation {
			message: "keywords.fallback_tag and keywords.story_reply_tag must be non-empty."
				.to_string(),
		});
	}
	if table.tags.is_empty() {
		return Err(Error::Validation { message: "keywords.tags must be non-empty.".to_string() });
	}

	for tag in &table.tags {
		if tag.name.is_empty() {
			return Err(Error::Validation {
				message: "keywords.tags.name must be non-empty.".to_string(),
			});
		}
		if tag.name.contains(',') {
			return Err(Error::Validation {
				message: format!("Tag {:?} must not contain a comma.", tag.name),
			});
		}
		if !PRIORITIES.contains(&tag.priority.as_str()) {
			return Err(Error::Validation {
				message: format!(
					"Tag {:?} priority must be one of high, normal, or low.",
					tag.name
				),
			});
		}
		if tag.keywords.is_empty() {
			return Err(Error::Validation {
				message: format!("Tag {:?} must list at least one keyword.", tag.name),
			});
		}
	}

	if table.sentiment.negative.is_empty() || table.sentiment.question.is_empty() {
		return Err(Error::Validation {
			message: "keywords.sentiment.negative and keywords.sentiment.question must be non-empty."
				.to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	for slot in [
		&mut cfg.security.app_secret,
		&mut cfg.security.api_auth_token,
		&mut cfg.meta.ad_account_id,
		&mut cfg.meta.instagram_access_token,
		&mut cfg.meta.page_access_token,
	] {
		if slot.as_deref().map(|value| value.trim().is_empty()).unwrap_or(false) {
			*slot = None;
		}
	}

	cfg.security.agents = cfg.security.agents.iter().map(|agent| agent.trim().to_string()).collect();
}

fn normalize_keywords(keywords: &mut Vec<String>) {
	*keywords = keywords
		.iter()
		.map(|keyword| keyword.trim().to_lowercase())
		.filter(|keyword| !keyword.is_empty())
		.collect();
}
