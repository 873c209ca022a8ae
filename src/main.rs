use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use torii::archive::mux::FfmpegMuxer;
use torii::catalog::http::HttpCatalog;
use torii::cli::{Cli, Command};
use torii::common::http::HttpClient;
use torii::configs::Config;
use torii::context::Context;
use torii::hls::fetcher::{HttpSegmentFetcher, RetryPolicy};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Exit code 2 marks unexpected errors; everything user-facing exits 1.
    std::panic::set_hook(Box::new(|info| {
        eprintln!("unexpected error: {}", info);
        std::process::exit(2);
    }));

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("could not read torii.toml: {}", err);
            std::process::exit(1);
        }
    };
    torii::common::logger::init(&config);

    let cli = Cli::parse();

    let client = match HttpClient::new(
        config.http.user_agent.as_deref(),
        config.http_timeout(),
        cli.proxy.as_deref().or(config.http.proxy.as_deref()),
    ) {
        Ok(client) => client,
        Err(err) => {
            error!("{}", err);
            std::process::exit(1);
        }
    };

    let base_url = config
        .catalog
        .base_url
        .clone()
        .unwrap_or_else(|| "https://api.example.tv".to_string());
    let token = config
        .catalog
        .token
        .clone()
        .or_else(|| std::env::var("TORII_TOKEN").ok());

    let cancel = CancellationToken::new();
    spawn_interrupt_watcher(cancel.clone());

    let retry = RetryPolicy {
        attempts: config.download.retry_attempts.unwrap_or(3),
        delay_unit: Duration::from_secs(config.download.retry_delay_secs.unwrap_or(5)),
    };

    let ctx = Context {
        catalog: Arc::new(HttpCatalog::new(client.clone(), base_url, token)),
        fetcher: Arc::new(HttpSegmentFetcher::new(client)),
        muxer: Arc::new(FfmpegMuxer::new(config.ffmpeg.executable.clone())),
        parallelism: cli
            .command
            .parallelism()
            .unwrap_or_else(|| config.parallelism()),
        retry,
        scratch_base: config.scratch_base(),
        cancel: cancel.clone(),
    };

    let result = match cli.command {
        Command::Download(cmd) => cmd.execute(ctx).await,
        Command::Archive(cmd) => cmd.execute(ctx).await,
    };

    if let Err(err) = result {
        error!("{}", err);
        std::process::exit(1);
    }
}

/// First interrupt cancels the pipeline and lets cleanup run; a second one
/// gives up on cleanup and exits on the spot.
fn spawn_interrupt_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("interrupt received, cleaning up (interrupt again to exit immediately)");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(1);
        }
    });
}
