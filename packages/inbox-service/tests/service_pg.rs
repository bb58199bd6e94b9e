use std::{
	collections::HashMap,
	path::PathBuf,
	sync::{Arc, Mutex},
};

use serde_json::json;

use inbox_config::{Config, LlmProviderConfig, Meta};
use inbox_providers::meta::{
	AdMedia, VendorComment, VendorConversation, VendorMessage, VendorProfile, VendorReply,
};
use time::macros::datetime;

use inbox_service::{
	BlockUserRequest, BoxFuture, CommentReplyRequest, ConversationReplyRequest, Error, InboxService,
	Providers, ReplyDrafter, VendorApi,
};
use inbox_storage::{db::Db, models::WriteOutcome, queries};

const OWN_ID: &str = "17841400000000000";

#[derive(Default)]
struct ScriptedVendor {
	profile: Option<VendorProfile>,
	media: Vec<AdMedia>,
	comments: HashMap<String, Vec<VendorComment>>,
	calls: Mutex<Vec<String>>,
}
impl ScriptedVendor {
	fn record(&self, call: String) {
		self.calls.lock().expect("Lock poisoned.").push(call);
	}
}

fn not_scripted<T>() -> inbox_providers::Result<T> {
	Err(inbox_providers::Error::InvalidConfig { message: "Not scripted.".to_string() })
}

impl VendorApi for ScriptedVendor {
	fn send_message<'a>(
		&'a self,
		_cfg: &'a Meta,
		recipient_id: &'a str,
		_text: &'a str,
	) -> BoxFuture<'a, inbox_providers::Result<()>> {
		Box::pin(async move {
			self.record(format!("send:{recipient_id}"));

			Ok(())
		})
	}

	fn reply_to_comment<'a>(
		&'a self,
		_cfg: &'a Meta,
		comment_id: &'a str,
		_text: &'a str,
	) -> BoxFuture<'a, inbox_providers::Result<String>> {
		Box::pin(async move {
			self.record(format!("reply:{comment_id}"));

			Ok(format!("{comment_id}_reply"))
		})
	}

	fn like_comment<'a>(
		&'a self,
		_cfg: &'a Meta,
		comment_id: &'a str,
	) -> BoxFuture<'a, inbox_providers::Result<()>> {
		Box::pin(async move {
			self.record(format!("like:{comment_id}"));

			Ok(())
		})
	}

	fn fetch_thread<'a>(
		&'a self,
		_cfg: &'a Meta,
		_conversation_id: &'a str,
	) -> BoxFuture<'a, inbox_providers::Result<Vec<VendorMessage>>> {
		Box::pin(async { not_scripted() })
	}

	fn list_conversations<'a>(
		&'a self,
		_cfg: &'a Meta,
		_limit: u32,
	) -> BoxFuture<'a, inbox_providers::Result<Vec<VendorConversation>>> {
		Box::pin(async { not_scripted() })
	}

	fn fetch_profile<'a>(
		&'a self,
		_cfg: &'a Meta,
		_user_id: &'a str,
	) -> BoxFuture<'a, inbox_providers::Result<VendorProfile>> {
		Box::pin(async move { self.profile.clone().map_or_else(not_scripted, Ok) })
	}

	fn list_ad_media<'a>(
		&'a self,
		_cfg: &'a Meta,
	) -> BoxFuture<'a, inbox_providers::Result<Vec<AdMedia>>> {
		Box::pin(async move { Ok(self.media.clone()) })
	}

	fn fetch_comments<'a>(
		&'a self,
		_cfg: &'a Meta,
		media_id: &'a str,
		_limit: u32,
		since: Option<i64>,
	) -> BoxFuture<'a, inbox_providers::Result<Vec<VendorComment>>> {
		Box::pin(async move {
			self.record(format!("comments:{media_id}:{since:?}"));

			self.comments.get(media_id).cloned().map_or_else(not_scripted, Ok)
		})
	}
}

struct NoDrafter;

impl ReplyDrafter for NoDrafter {
	fn draft<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		_system_prompt: &'a str,
		_user_prompt: &'a str,
	) -> BoxFuture<'a, inbox_providers::Result<String>> {
		Box::pin(async { not_scripted() })
	}
}

async fn service(dsn: String, vendor: Arc<ScriptedVendor>) -> InboxService {
	let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
		.join("../inbox-config/tests/fixtures/sample_config.toml");
	let mut cfg: Config = inbox_config::load(&path).expect("Failed to load sample config.");

	cfg.storage.postgres.dsn = dsn;

	let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	InboxService::with_providers(cfg, db, Providers::new(vendor, Arc::new(NoDrafter)))
}

async fn deliver(service: &InboxService, payload: serde_json::Value) {
	service
		.ingest_webhook(payload.to_string().as_bytes(), None)
		.await
		.expect("Ingest must succeed.");
}

fn dm(mid: &str, sender: &str, text: &str) -> serde_json::Value {
	json!({
		"object": "instagram",
		"entry": [{
			"id": OWN_ID,
			"messaging": [{
				"sender": { "id": sender },
				"recipient": { "id": OWN_ID },
				"timestamp": 1714557600000_i64,
				"message": { "mid": mid, "text": text }
			}]
		}]
	})
}

fn ad_comment(id: &str, text: &str) -> serde_json::Value {
	json!({
		"object": "instagram",
		"entry": [{
			"id": "media_1",
			"changes": [{
				"field": "comments",
				"value": { "id": id, "text": text, "from": { "id": "fan_1", "username": "fan" } }
			}]
		}]
	})
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set INBOX_PG_DSN to run."]
async fn conversation_names_are_resolved_once_and_replies_are_audited() {
	let Some(base_dsn) = inbox_testkit::env_dsn() else {
		eprintln!("Skipping conversation_names_are_resolved_once; set INBOX_PG_DSN to run.");

		return;
	};

	inbox_testkit::with_test_db(&base_dsn, |test_db| {
		let dsn = test_db.dsn().to_string();

		async move {
			let vendor = Arc::new(ScriptedVendor {
				profile: Some(VendorProfile { name: None, username: Some("lena.k".to_string()) }),
				..Default::default()
			});
			let service = service(dsn, vendor.clone()).await;

			deliver(&service, dm("mid.a", "customer_a", "Wann kommt meine Bestellung?")).await;
			deliver(&service, dm("mid.b", "customer_b", "Hallo")).await;

			let detail = service.conversation("customer_a").await.expect("Lookup must succeed.");

			assert_eq!(detail.sender_name, "lena.k");
			assert_eq!(detail.messages.len(), 1);
			assert_eq!(
				queries::stored_sender_name(&service.db, "customer_a")
					.await
					.expect("Query must succeed.")
					.as_deref(),
				Some("lena.k")
			);

			let ctx = service.agent_context(Some("AK")).expect("AK must be allowed.");
			let outcome = service
				.reply_to_conversation(&ctx, "customer_a", ConversationReplyRequest {
					text: "Morgen ist sie da!".to_string(),
				})
				.await
				.expect("Reply must succeed.");

			assert!(outcome.ok);

			let messages =
				queries::conversation_messages(&service.db, "customer_a").await.expect("Query failed.");

			assert_eq!(messages[0].response_text.as_deref(), Some("Morgen ist sie da!"));
			assert_eq!(messages[0].responded_by.as_deref(), Some("AK"));

			let done = service
				.mark_conversation_done(&ctx, "customer_b")
				.await
				.expect("Mark done must succeed.");

			assert_eq!(done.updated, 1);

			let tags = service.known_tags().await.expect("Tags must load.");

			assert!(tags.contains(&"Bestellung".to_string()));
			assert!(tags.contains(&"Kundenservice".to_string()));

			Ok(())
		}
	})
	.await
	.expect("Test database run failed.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set INBOX_PG_DSN to run."]
async fn hidden_comments_cannot_be_answered_and_likes_are_recorded() {
	let Some(base_dsn) = inbox_testkit::env_dsn() else {
		eprintln!("Skipping hidden_comments_cannot_be_answered; set INBOX_PG_DSN to run.");

		return;
	};

	inbox_testkit::with_test_db(&base_dsn, |test_db| {
		let dsn = test_db.dsn().to_string();

		async move {
			let vendor = Arc::new(ScriptedVendor::default());
			let service = service(dsn, vendor.clone()).await;
			let ctx = service.agent_context(Some("LM")).expect("LM must be allowed.");

			deliver(&service, ad_comment("c_open", "Wie fällt die Größe aus?")).await;
			deliver(&service, ad_comment("c_hidden", "Spam")).await;

			service.hide_comment(&ctx, "c_hidden").await.expect("Hide must succeed.");

			let err = service
				.reply_to_comment(&ctx, "c_hidden", CommentReplyRequest { text: "Hi".to_string() })
				.await
				.expect_err("Expected conflict.");

			assert!(matches!(err, Error::Conflict { .. }), "Unexpected error: {err}");

			let outcome = service
				.reply_to_comment(&ctx, "c_open", CommentReplyRequest {
					text: "Fällt normal aus!".to_string(),
				})
				.await
				.expect("Reply must succeed.");

			assert!(outcome.ok);

			let liked = service.like_comment(&ctx, "c_open").await.expect("Like must succeed.");
			let again = service.like_comment(&ctx, "c_open").await.expect("Like must succeed.");

			assert!(liked.ok && again.ok);
			assert_eq!(*vendor.calls.lock().expect("Lock poisoned."), vec![
				"reply:c_open".to_string(),
				"like:c_open".to_string(),
			]);

			let comment = queries::get_comment(&service.db, "c_open").await.expect("Query failed.");

			assert!(comment.has_our_reply && comment.is_liked);
			assert_eq!(comment.our_reply_text.as_deref(), Some("Fällt normal aus!"));
			assert_eq!(comment.responded_by.as_deref(), Some("LM"));

			let visible = service.list_comments(Default::default()).await.expect("List failed.");

			assert_eq!(visible.len(), 1);

			Ok(())
		}
	})
	.await
	.expect("Test database run failed.");
}

fn reply(id: &str, from_id: &str, text: &str) -> VendorReply {
	VendorReply {
		id: id.to_string(),
		text: text.to_string(),
		timestamp: Some("2025-01-02T10:00:00+0000".to_string()),
		username: if from_id == OWN_ID { "shop".to_string() } else { "fan".to_string() },
		from_id: from_id.to_string(),
	}
}

fn vendor_comment(id: &str, from_id: &str, text: &str, replies: Vec<VendorReply>) -> VendorComment {
	VendorComment {
		id: id.to_string(),
		text: text.to_string(),
		timestamp: Some("2025-01-02T09:00:00+0000".to_string()),
		username: "fan".to_string(),
		from_id: from_id.to_string(),
		replies,
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set INBOX_PG_DSN to run."]
async fn ad_comment_sync_stores_new_comments_and_refreshes_known_ones() {
	let Some(base_dsn) = inbox_testkit::env_dsn() else {
		eprintln!("Skipping ad_comment_sync_stores_new_comments; set INBOX_PG_DSN to run.");

		return;
	};

	inbox_testkit::with_test_db(&base_dsn, |test_db| {
		let dsn = test_db.dsn().to_string();

		async move {
			let media = |media_id: &str, ad_id: &str| AdMedia {
				media_id: media_id.to_string(),
				ad_id: ad_id.to_string(),
				ad_name: "Sommer A".to_string(),
				shortcode: "Cx1".to_string(),
				permalink: "https://www.instagram.com/p/Cx1/".to_string(),
			};
			let comments = HashMap::from([
				("media_1".to_string(), vec![
					vendor_comment("c_question", "fan_1", "Gibt es das in Blau?", vec![
						reply("r_fan", "fan_2", "Würde mich auch interessieren"),
						reply("r_first", OWN_ID, "Ja, ab Montag!"),
						reply("r_second", OWN_ID, "Link in der Bio."),
					]),
					vendor_comment("c_plain", "fan_3", "Schön", Vec::new()),
					vendor_comment("c_own", OWN_ID, "Danke euch allen!", Vec::new()),
					vendor_comment("c_blank", "fan_4", "   ", Vec::new()),
				]),
				("media_2".to_string(), Vec::new()),
			]);
			let vendor = Arc::new(ScriptedVendor {
				media: vec![media("media_1", "ad_1"), media("media_2", "ad_2")],
				comments,
				..Default::default()
			});
			let service = service(dsn, vendor.clone()).await;
			let since = datetime!(2025-01-01 00:00 UTC);
			let first = service.sync_ad_comments(Some(since)).await.expect("Sync must succeed.");

			assert_eq!(first.new_comments, 2);
			assert_eq!(first.updated_comments, 0);
			assert_eq!(first.media_with_comments, 1);

			let second = service.sync_ad_comments(None).await.expect("Sync must succeed.");

			assert_eq!(second.new_comments, 0);
			assert_eq!(second.updated_comments, 2);
			assert_eq!(second.media_with_comments, 1);
			assert!(
				vendor
					.calls
					.lock()
					.expect("Lock poisoned.")
					.contains(&"comments:media_1:Some(1735689600)".to_string())
			);

			for skipped in ["c_own", "c_blank"] {
				let err = queries::get_comment(&service.db, skipped)
					.await
					.expect_err("Skipped comments must not be stored.");

				assert!(
					matches!(err, inbox_storage::Error::NotFound(_)),
					"Unexpected error: {err}"
				);
			}

			let answered =
				queries::get_comment(&service.db, "c_question").await.expect("Query failed.");

			assert!(answered.has_our_reply);
			assert_eq!(answered.our_reply_text.as_deref(), Some("Ja, ab Montag!"));
			assert_eq!(answered.post_id, "media_1");
			assert_eq!(answered.ad_name, "Sommer A");

			let own_flags = answered
				.replies
				.as_array()
				.expect("Replies must be an array.")
				.iter()
				.map(|reply| reply["is_own"].as_bool())
				.collect::<Vec<_>>();

			assert_eq!(own_flags, vec![Some(false), Some(true), Some(true)]);

			let plain = queries::get_comment(&service.db, "c_plain").await.expect("Query failed.");

			assert!(!plain.has_our_reply);
			assert_eq!(plain.our_reply_text, None);

			Ok(())
		}
	})
	.await
	.expect("Test database run failed.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set INBOX_PG_DSN to run."]
async fn blocking_is_idempotent() {
	let Some(base_dsn) = inbox_testkit::env_dsn() else {
		eprintln!("Skipping blocking_is_idempotent; set INBOX_PG_DSN to run.");

		return;
	};

	inbox_testkit::with_test_db(&base_dsn, |test_db| {
		let dsn = test_db.dsn().to_string();

		async move {
			let service = service(dsn, Arc::new(ScriptedVendor::default())).await;
			let ctx = service.agent_context(Some("AK")).expect("AK must be allowed.");
			let request =
				|| BlockUserRequest { user_id: "spammer".to_string(), username: "spam".to_string() };

			assert_eq!(
				service.block_user(&ctx, request()).await.expect("Block failed."),
				WriteOutcome::Inserted
			);
			assert_eq!(
				service.block_user(&ctx, request()).await.expect("Block failed."),
				WriteOutcome::Duplicate
			);
			assert_eq!(service.blacklist().await.expect("List failed.").len(), 1);

			service.unblock_user(&ctx, "spammer").await.expect("Unblock failed.");

			let err = service.unblock_user(&ctx, "spammer").await.expect_err("Expected not found.");

			assert!(matches!(err, Error::NotFound { .. }), "Unexpected error: {err}");

			Ok(())
		}
	})
	.await
	.expect("Test database run failed.");
}
