use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = triage_cachectl::Args::parse();
	triage_cachectl::run(args).await
}
