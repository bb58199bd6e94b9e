use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = inbox_api::Args::parse();

	inbox_api::run(args).await
}
