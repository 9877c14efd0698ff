use clap::Parser;
use coinflip_client::{
    client,
    config::{
        AppConfig,
        CliArgs,
    },
    wallets,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use std::{
    path::Path,
    sync::OnceLock,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn init_tracing(log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("failed to create log directory {}", log_dir.display()))?;
    let appender = rolling::daily(log_dir, "coinflip.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = CliArgs::parse();
    let config = AppConfig::from_cli(&cli)?;
    if cli.print_config {
        println!("{config}");
        return Ok(());
    }
    init_tracing(&config.log_dir)?;
    tracing::info!("starting coinflip client");

    let signer = match &config.wallet {
        Some(wallet) => {
            let dir = wallets::resolve_wallet_dir(wallet.dir.as_deref())?;
            let descriptor = wallets::find_wallet(&dir, &wallet.name)?;
            Some(wallets::unlock_wallet(&descriptor)?)
        }
        None => {
            tracing::info!("no wallet selected, running read-only");
            None
        }
    };
    client::run_app(config, signer).await
}
