use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

/// Asks an OpenAI-compatible chat completions endpoint for one reply draft.
pub async fn draft(
	cfg: &inbox_config::LlmProviderConfig,
	system_prompt: &str,
	user_prompt: &str,
) -> Result<String> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": [
			{ "role": "system", "content": system_prompt },
			{ "role": "user", "content": user_prompt },
		],
	});
	let res = client
		.post(&url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json = crate::read_json(res).await?;

	parse_draft(&json)
}

fn parse_draft(json: &Value) -> Result<String> {
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.map(str::trim)
		.unwrap_or_default();

	if content.is_empty() {
		return Err(Error::InvalidResponse {
			message: "Draft response is missing message content.".to_string(),
		});
	}

	Ok(content.trim_matches('"').trim().to_string())
}
