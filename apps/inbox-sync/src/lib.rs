use std::path::PathBuf;

use clap::{Parser, Subcommand};
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

use inbox_service::InboxService;
use inbox_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = inbox_cli::VERSION,
	rename_all = "kebab",
	styles = inbox_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Backfill direct message history from the vendor conversation list.
	History {
		/// Skip messages sent before this day (UTC).
		#[arg(long, value_name = "YYYY-MM-DD", value_parser = parse_since)]
		since: Option<OffsetDateTime>,
		/// Sync a single customer instead of every conversation.
		#[arg(long, value_name = "ID")]
		customer: Option<String>,
	},
	/// Pull comments on every ad creative, including dark posts.
	Comments {
		/// Only fetch comments posted since this day (UTC).
		#[arg(long, value_name = "YYYY-MM-DD", value_parser = parse_since)]
		since: Option<OffsetDateTime>,
	},
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = inbox_config::load(&args.config)?;

	init_tracing(&config)?;

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let service = InboxService::new(config, db);

	tracing::info!(command = ?args.command, "Starting sync.");

	let report = match args.command {
		Command::History { since, customer: Some(customer) } => {
			let report = service.sync_conversation(&customer, None, since).await?;

			serde_json::to_string_pretty(&report)?
		},
		Command::History { since, customer: None } =>
			serde_json::to_string_pretty(&service.sync_all_conversations(since).await?)?,
		Command::Comments { since } =>
			serde_json::to_string_pretty(&service.sync_ad_comments(since).await?)?,
	};

	println!("{report}");

	Ok(())
}

fn parse_since(raw: &str) -> Result<OffsetDateTime, String> {
	inbox_domain::vendor_time::parse_date(raw)
		.ok_or_else(|| format!("{raw:?} is not a YYYY-MM-DD date."))
}

fn init_tracing(config: &inbox_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_writer(std::io::stderr).with_env_filter(filter).init();

	Ok(())
}
