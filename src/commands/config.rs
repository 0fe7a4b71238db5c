use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;
use zzzcal_core::config::Config;
use zzzcal_core::constants::DEFAULT_CONFIG_FILE;

pub fn run(config: &Config, path: Option<&Path>) -> Result<()> {
    let source = match path {
        Some(p) => p.display().to_string(),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => DEFAULT_CONFIG_FILE.to_string(),
        None => "defaults".to_string(),
    };

    eprintln!("{} {}", "# Loaded from".dimmed(), source.dimmed());
    print!("{}", config.to_toml()?);

    Ok(())
}
