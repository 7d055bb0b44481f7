use std::sync::Arc;

use clap::Args;
use meetpoll_core::{AutoFinalizer, Config};
use tracing::info;

use crate::context::{poll_service, print_json, CliResult};

#[derive(Args)]
pub struct SweepArgs {
    /// Run a single sweep and exit
    #[arg(long)]
    pub once: bool,
}

pub async fn run(args: SweepArgs) -> CliResult {
    let config = Config::load()?;
    let service = Arc::new(poll_service(&config)?);
    let mut finalizer = AutoFinalizer::new(service, config.polls.sweep_interval());

    if args.once {
        return print_json(&finalizer.sweep_once().await);
    }

    finalizer.start().await?;
    info!("sweeping until interrupted (Ctrl-C)");
    tokio::signal::ctrl_c().await?;
    finalizer.stop().await?;
    Ok(())
}
