use clap::Parser;
use linkaudit::error::Error;
use linkaudit::{Replayer, Scan, open_store, output};
use std::sync::Arc;

mod args;
use args::Args;

#[tokio::main]
async fn main() {
    env_logger::init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        ::log::error!("fatal: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let replay = args.replay;
    let config = args.into_config()?;
    config.validate()?;

    let links = Scan::with_config(config.clone()).discover().await?;
    ::log::info!("discovered {} unique actions", links.len());

    let filename = output::out_filename(&config.out_file, config.out_format);
    let file = std::fs::File::create(&filename)?;
    output::write_links(&links, config.out_format, file)?;
    ::log::info!("wrote {filename}");

    for endpoint in links.distinct_endpoints() {
        ::log::info!("endpoint: {endpoint}");
    }

    if replay {
        let minimized = links.summarize();
        ::log::info!(
            "replaying {} representative actions of {} discovered",
            minimized.len(),
            links.len()
        );

        let store = open_store(&config).await?;
        let summary = Replayer::new(Arc::new(config), store)
            .run(&minimized)
            .await?;
        ::log::info!(
            "replay complete: {} replayed, {} failed",
            summary.replayed,
            summary.failed
        );
    }

    Ok(())
}
