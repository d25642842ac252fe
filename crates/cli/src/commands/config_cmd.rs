//! `runbox config`: configuration management commands.

use std::path::PathBuf;

use runbox_config::AppConfig;

/// Replaces every configured API key with a marker.
fn redacted(config: &AppConfig) -> AppConfig {
    let mut config = config.clone();
    for section in config.providers.values_mut() {
        if section.api_key.is_some() {
            section.api_key = Some("[REDACTED]".into());
        }
    }
    config
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&redacted(&config))?;
    println!("{toml_str}");
    Ok(())
}

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");

            let settings = config.resolve_provider(&Default::default());
            if settings.api_key.as_deref().is_none_or(str::is_empty) {
                println!(
                    "   Warning: no API key for '{}' (set {}_API_KEY or RUNBOX_API_KEY)",
                    settings.provider,
                    settings.provider.to_uppercase()
                );
            }

            println!();
            println!("   Provider:   {}", settings.provider);
            println!("   Model:      {}", settings.model);
            println!("   Max steps:  {}", config.agent.max_steps);
            println!(
                "   Gateway:    {}:{}",
                config.gateway.host, config.gateway.port
            );
            println!("   Isolation:  {:?}", config.supervisor.isolation);
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

pub async fn init(output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let toml_str = AppConfig::default_toml();
    match output {
        Some(path) => {
            if path.exists() {
                return Err(format!("{} already exists", path.display()).into());
            }
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, toml_str).await?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{toml_str}"),
    }
    Ok(())
}
