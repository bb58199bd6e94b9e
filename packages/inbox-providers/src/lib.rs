pub mod drafter;
pub mod meta;

mod error;

pub use error::{Error, Result};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// Reads the `{error: {message, code}}` envelope Graph and OpenAI-style APIs return.
pub fn api_error(status: u16, body: &Value) -> Error {
	let error = body.get("error");
	let message = error
		.and_then(|error| error.get("message"))
		.and_then(Value::as_str)
		.unwrap_or("Unknown error.")
		.to_string();
	let code = error.and_then(|error| error.get("code")).and_then(Value::as_i64);

	Error::Api { status, code, message }
}

async fn read_json(res: reqwest::Response) -> Result<Value> {
	let status = res.status();
	let body = res.text().await?;
	let json = if body.trim().is_empty() {
		Value::Null
	} else {
		serde_json::from_str(&body).unwrap_or(Value::String(body))
	};

	if !status.is_success() {
		return Err(api_error(status.as_u16(), &json));
	}

	Ok(json)
}
