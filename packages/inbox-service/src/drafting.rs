use serde::Serialize;

use inbox_storage::{models::InboundMessage, queries};

use crate::{
	Error, InboxService, Result,
	conversations::{fallback_name, require_id},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftResponse {
	pub text: String,
	/// False when the configured canned reply was returned instead of a model draft.
	pub generated: bool,
}

impl InboxService {
	pub async fn draft_conversation_reply(&self, customer_id: &str) -> Result<DraftResponse> {
		let customer_id = require_id(customer_id, "customer_id")?;
		let history_len = i64::from(self.cfg.drafting.history_messages.max(1));
		let history = queries::recent_messages(&self.db, customer_id, history_len).await?;
		let Some(current) = history.iter().rev().find(|message| message.direction == "incoming")
		else {
			return Err(Error::NotFound {
				message: format!("No incoming message from customer {customer_id:?}."),
			});
		};
		let sender_name = queries::stored_sender_name(&self.db, customer_id)
			.await?
			.unwrap_or_else(|| fallback_name(customer_id));
		let prompt = message_prompt(&sender_name, &history, current);

		Ok(self
			.draft_or_fallback(
				&self.cfg.drafting.message_system_prompt,
				&prompt,
				&self.cfg.drafting.message_fallback,
			)
			.await)
	}

	pub async fn draft_comment_reply(&self, comment_id: &str) -> Result<DraftResponse> {
		let comment_id = require_id(comment_id, "comment_id")?;
		let comment = queries::get_comment(&self.db, comment_id).await?;
		let prompt = format!(
			"Kommentar von {}:\n\"{}\"\n\nSentiment: {}",
			comment.commenter_name, comment.comment_text, comment.sentiment
		);

		Ok(self
			.draft_or_fallback(
				&self.cfg.drafting.comment_system_prompt,
				&prompt,
				&self.cfg.drafting.comment_fallback,
			)
			.await)
	}

	async fn draft_or_fallback(
		&self,
		system_prompt: &str,
		user_prompt: &str,
		fallback: &str,
	) -> DraftResponse {
		let canned = DraftResponse { text: fallback.to_string(), generated: false };

		if !self.cfg.drafting.enabled {
			return canned;
		}

		match self
			.providers
			.drafter
			.draft(&self.cfg.drafting.provider, system_prompt, user_prompt)
			.await
		{
			Ok(text) => DraftResponse { text, generated: true },
			Err(err) => {
				tracing::warn!(
					provider_id = %self.cfg.drafting.provider.provider_id,
					error = %err,
					"Reply drafting failed. Using the canned reply."
				);

				canned
			},
		}
	}
}

fn message_prompt(sender_name: &str, history: &[InboundMessage], current: &InboundMessage) -> String {
	let lines = history
		.iter()
		.filter(|message| !message.message_text.trim().is_empty())
		.map(|message| {
			let speaker = if message.direction == "incoming" { "Kunde" } else { "Wir" };

			format!("{speaker}: {}", message.message_text.trim())
		})
		.collect::<Vec<_>>()
		.join("\n");

	format!(
		"Kunde: {sender_name}\nLetzte Nachrichten:\n{lines}\n\nAktuelle Nachricht:\n\"{}\"",
		current.message_text.trim()
	)
}
