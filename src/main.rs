use anyhow::Context;
use camrelay::{Config, ConfigError, RelayServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::load() {
        Ok(config) => config,
        // --help, --version and usage errors print themselves
        Err(ConfigError::Cli(e)) => e.exit(),
        Err(e) => return Err(e.into()),
    };

    config.log.init();

    let (server_config, supervisor_config) = config.build().context("invalid configuration")?;

    tracing::info!(
        bind = %server_config.bind_addr,
        source = %supervisor_config.command.redacted_source(),
        width = supervisor_config.command.width,
        height = supervisor_config.command.height,
        fps = supervisor_config.command.fps,
        "Starting camrelay"
    );

    RelayServer::new(server_config, supervisor_config)
        .run_until(shutdown_signal())
        .await
        .context("relay server failed")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
