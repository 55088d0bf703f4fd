//! Config commands

use crate::config::{mask_token, Config};
use crate::ConfigCommands;
use anyhow::{bail, Result};

pub fn handle(action: ConfigCommands, profile: Option<&str>) -> Result<()> {
    match action {
        ConfigCommands::Init => {
            let path = Config::default().save(profile)?;
            println!("Configuration initialized at {}", path.display());
        }
        ConfigCommands::Set { key, value } => {
            let mut config = Config::load(profile)?;
            match key.as_str() {
                "api_url" => config.api_url = Some(value),
                "token" => config.token = Some(value),
                "default_format" => config.default_format = Some(value),
                _ => bail!("Unknown config key: {}", key),
            }
            config.save(profile)?;
            println!("Set {} successfully", key);
        }
        ConfigCommands::Get { key } => {
            let config = Config::load(profile)?;
            let value = match key.as_str() {
                "api_url" => config.api_url,
                "token" => config.token.as_deref().map(mask_token),
                "default_format" => config.default_format,
                _ => bail!("Unknown config key: {}", key),
            };
            println!("{}: {}", key, value.unwrap_or_else(|| "(not set)".into()));
        }
        ConfigCommands::List => {
            let config = Config::load(profile)?;
            let unset = || "(not set)".to_string();
            println!("api_url: {}", config.api_url.unwrap_or_else(unset));
            println!("token: {}", config.token.as_deref().map(mask_token).unwrap_or_else(unset));
            println!("default_format: {}", config.default_format.unwrap_or_else(unset));
        }
    }
    Ok(())
}
