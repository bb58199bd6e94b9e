use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = inbox_sync::Args::parse();

	inbox_sync::run(args).await
}
