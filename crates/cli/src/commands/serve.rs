//! `runbox serve`: start the HTTP task API.

use runbox_config::{AppConfig, IsolationMode};

pub async fn run(
    host: Option<String>,
    port: Option<u16>,
    isolation: Option<IsolationMode>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }
    if let Some(isolation) = isolation {
        config.supervisor.isolation = isolation;
    }

    eprintln!("Runbox API");
    eprintln!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    eprintln!("   Isolation: {:?}", config.supervisor.isolation);
    eprintln!(
        "   Defaults:  {} / {}",
        config.agent.default_provider, config.agent.default_model
    );

    runbox_gateway::start(config).await?;

    Ok(())
}
