//! Fake Stratum - Main Application
//!
//! Listens for mining clients and serves the static block template.

use fake_stratum::{stratum::StratumServer, Config, Result, APP_NAME, APP_VERSION};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().await?;

    fake_stratum::utils::init_logging(config.log_level.into(), config.log_format);

    if let Err(e) = config.validate() {
        error!("{}", e);
        return Err(e);
    }

    if config.print_config {
        print_configuration(&config)?;
        return Ok(());
    }

    info!("Starting {} v{}", APP_NAME, APP_VERSION);

    let addr = config.socket_addr()?;
    let ctx = match config.session_context().await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("{}", e);
            return Err(e);
        }
    };

    let server = match StratumServer::bind(addr, ctx).await {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            return Err(e);
        }
    };

    info!(
        "Fake Stratum listening on {} ({}, difficulty={})",
        server.local_addr()?,
        config.mode_description(),
        config.difficulty
    );
    if let Some(response) = config.response {
        info!("All submits will be {}", response);
    } else if let Some(nonce) = config.accept_nonce {
        info!("Only nonce {:08x} will be accepted", nonce);
    }

    server.run().await
}

/// Print current configuration
fn print_configuration(config: &Config) -> Result<()> {
    let config_yaml = serde_yaml::to_string(config)?;
    println!("{}", config_yaml);
    Ok(())
}
