use anyhow::Result;
use clap::Parser;
use patent_fee_watch::{
    app::FeeWatchApp,
    cli::Cli,
    config,
    infrastructure::{cancel, directories, logging},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let config = config::load_config()?;
    let paths = directories::ensure_directories(&config.directories)?;
    logging::init_tracing(&config, &paths)?;

    let (cancel, _) = cancel::CancelSignal::new();
    cancel::install_signal_handlers(cancel.clone());

    let app = FeeWatchApp::initialize(config, paths, cancel)?;
    app.run(cli.command).await
}
