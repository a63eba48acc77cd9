//! Ceremony harness - Main entry point

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ceremony_cli::commands::{config_path, init_config, load_or_create};
use ceremony_cli::{Cli, Commands, HarnessRunner};
use ceremony_core::RunContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "ceremony_harness=info,ceremony_cli=info,ceremony_orchestrator=info,ceremony_core=info"
                        .into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let path = config_path(cli.config.as_deref());

    match cli.command {
        Commands::InitConfig { force } => init_config(&path, force),
        Commands::Run(args) => {
            info!("Starting ceremony harness v{}", env!("CARGO_PKG_VERSION"));

            let mut config = load_or_create(&path)?;
            args.apply(&mut config);

            let ctx = RunContext::with_timeout(config.timeout());
            let interrupt = ctx.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Received shutdown signal, cancelling run");
                    interrupt.cancel();
                }
            });

            let summary = HarnessRunner::new(config).run(ctx).await?;
            print!("{}", summary.render());

            if !summary.is_success() {
                anyhow::bail!("{} instance(s) failed", summary.failures());
            }
            Ok(())
        }
    }
}
