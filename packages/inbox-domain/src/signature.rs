use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
	Valid,
	Invalid,
	/// No app secret is configured, so authenticity was not checked.
	Skipped,
}

/// Checks an `X-Hub-Signature-256` header against HMAC-SHA256 of the raw body.
///
/// The digest comparison runs in constant time.
pub fn verify(secret: Option<&str>, body: &[u8], header: Option<&str>) -> SignatureCheck {
	let Some(secret) = secret.filter(|secret| !secret.trim().is_empty()) else {
		return SignatureCheck::Skipped;
	};
	let Some(digest) = header.and_then(|header| header.trim().strip_prefix(SIGNATURE_PREFIX))
	else {
		return SignatureCheck::Invalid;
	};
	let Ok(expected) = hex::decode(digest) else {
		return SignatureCheck::Invalid;
	};
	let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
		return SignatureCheck::Invalid;
	};

	mac.update(body);

	match mac.verify_slice(&expected) {
		Ok(()) => SignatureCheck::Valid,
		Err(_) => SignatureCheck::Invalid,
	}
}

/// Renders the header value the vendor would send for `body`.
pub fn sign(secret: &str, body: &[u8]) -> String {
	let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
		Ok(mac) => mac,
		Err(_) => return String::new(),
	};

	mac.update(body);

	format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Compares a presented API token with the configured one in constant time.
///
/// Both sides are hashed first so the comparison does not leak the token length.
pub fn tokens_match(expected: &str, presented: &str) -> bool {
	let expected = Sha256::digest(expected.as_bytes());
	let presented = Sha256::digest(presented.as_bytes());

	expected.iter().zip(presented.iter()).fold(0_u8, |acc, (a, b)| acc | (a ^ b)) == 0
}
