//! cache-tools - inspect and maintain the scaffolding tool cache
//!
//! Configuration limits come from `CACHE_*` environment variables; the
//! action comes from the command-line flags.

use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scaffold_cache::cli::{self, CacheToolsArgs};
use scaffold_cache::CacheConfig;

fn main() -> ExitCode {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scaffold_cache=info,cache_tools=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CacheToolsArgs::parse();
    let config = CacheConfig::from_env();
    debug!(?config, action = ?args.action(), "running cache-tools");

    match cli::run(&args, config) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
