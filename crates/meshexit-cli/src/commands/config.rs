//! `meshexit config` subcommands.

use crate::credentials::{
    self, Credentials, ENV_ACCESS_TOKEN, ENV_API_URL, FileConfig,
};
use anyhow::{Result, bail};
use clap::{Args, Subcommand};

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigCommand {
    /// Show the current configuration and where each value comes from
    Show,

    /// Save API credentials to the config file
    Set(SetArgs),
}

#[derive(Debug, Clone, Args)]
pub struct SetArgs {
    /// Control-plane API URL (e.g. https://api.example.com)
    #[arg(long)]
    pub api_url: String,

    /// API access token
    #[arg(long)]
    pub access_token: String,
}

pub fn execute(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => show(),
        ConfigCommand::Set(args) => set(args),
    }
}

fn show() -> Result<()> {
    let file = FileConfig::load();

    println!("Configuration file:");
    match FileConfig::path() {
        Some(path) => println!(
            "  {} ({})",
            path.display(),
            if path.exists() { "exists" } else { "missing" }
        ),
        None => println!("  no user config directory available"),
    }
    println!();

    let env_url = std::env::var(ENV_API_URL).ok();
    let env_token = std::env::var(ENV_ACCESS_TOKEN).ok();

    match env_url.as_deref().or(file.api_url.as_deref()) {
        Some(url) => println!(
            "API URL: {} (from {})",
            url,
            if env_url.is_some() { "environment" } else { "config file" }
        ),
        None => println!("API URL: not configured"),
    }

    match env_token.as_deref().or(file.access_token.as_deref()) {
        Some(token) => println!(
            "Access token: {} (from {})",
            credentials::mask_token(token),
            if env_token.is_some() { "environment" } else { "config file" }
        ),
        None => println!("Access token: not configured"),
    }

    println!();
    match Credentials::resolve() {
        Ok(_) => println!("Configuration is complete"),
        Err(_) => println!("Configuration is incomplete; run 'meshexit config set'"),
    }
    Ok(())
}

fn set(args: SetArgs) -> Result<()> {
    if !args.api_url.starts_with("http://") && !args.api_url.starts_with("https://") {
        bail!("API URL must start with http:// or https://");
    }

    let config = FileConfig {
        api_url: Some(args.api_url.trim_end_matches('/').to_string()),
        access_token: Some(args.access_token.clone()),
    };
    let path = config.save()?;

    println!("Configuration saved to {}", path.display());
    println!("  API URL: {}", config.api_url.as_deref().unwrap_or_default());
    println!(
        "  Access token: {}",
        credentials::mask_token(&args.access_token)
    );
    Ok(())
}
