//! Configuration parsing from CLI arguments and environment variables

use crate::{
    cli::Cli,
    config::env::EnvManager,
    error::{AppError, Result},
    models::Config,
};
use std::path::PathBuf;

/// Configuration parser that combines CLI arguments with environment variables
pub struct ConfigParser {
    cli: Cli,
    env_file: PathBuf,
}

impl ConfigParser {
    /// Create a new configuration parser with CLI arguments
    pub fn new(cli: Cli) -> Self {
        Self {
            cli,
            env_file: PathBuf::from(".env"),
        }
    }

    /// Read defaults from a different env file
    pub fn with_env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = path.into();
        self
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        self.cli.validate().map_err(AppError::validation)?;

        let mut config = Config::default();

        for warning in self.env_file_warnings()? {
            eprintln!("Warning: {}", warning);
        }
        EnvManager::load_env_file(&self.env_file, self.cli.debug)?;
        config.merge_from_env()?;
        self.apply_cli_overrides(&mut config)?;

        config.validate()?;

        Ok(config)
    }

    /// Lines of the env file whose values would be rejected
    pub fn env_file_warnings(&self) -> Result<Vec<String>> {
        Ok(EnvManager::check_env_file(&self.env_file)?.unwrap_or_default())
    }

    /// Apply CLI argument overrides to configuration
    fn apply_cli_overrides(&self, config: &mut Config) -> Result<()> {
        let cli = &self.cli;

        if let Some(server) = &cli.server {
            config.server = Some(server.trim().to_string());
        }
        if let Some(streams) = cli.streams {
            config.streams = streams;
        }
        if let Some(duration) = cli.duration {
            config.duration_ms = duration;
        }
        if let Some(cc) = &cli.cc {
            config.cc = cc.parse()?;
        }
        if let Some(scheme) = &cli.scheme {
            config.scheme = scheme.parse()?;
        }
        if let Some(limit) = cli.byte_limit {
            config.byte_limit = limit;
        }
        if let Some(name) = &cli.client_name {
            config.client_name = name.clone();
        }
        if let Some(version) = &cli.client_version {
            config.client_version = version.clone();
        }
        if let Some(locate_url) = &cli.locate_url {
            config.locate_url = locate_url.clone();
        }
        if let Some(phases) = cli.phases() {
            config.phases = phases;
        }

        config
            .metadata
            .extend(cli.metadata_pairs().map_err(AppError::validation)?);

        if cli.no_color {
            config.enable_color = false;
        }

        // CLI-only flags
        config.verbose = cli.verbose;
        config.debug = cli.debug;

        if config.debug {
            eprintln!("Applied CLI overrides to configuration");
            eprintln!(
                "Final config: streams={}, duration={}ms, cc={}, phases={:?}",
                config.streams, config.duration_ms, config.cc, config.phases
            );
        }

        Ok(())
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let mut summary = Vec::new();

    summary.push(format!(
        "Server: {}",
        config.server.as_deref().unwrap_or("(locate)")
    ));
    if config.server.is_none() {
        summary.push(format!("Locate URL: {}", config.locate_url));
    }
    summary.push(format!("Streams: {}", config.streams));
    summary.push(format!("Duration: {}ms", config.duration_ms));
    summary.push(format!("Congestion Control: {}", config.cc));
    summary.push(format!("Scheme: {}", config.scheme));
    summary.push(format!(
        "Byte Limit: {}",
        if config.byte_limit == 0 {
            "unlimited".to_string()
        } else {
            config.byte_limit.to_string()
        }
    ));
    summary.push(format!("Phases: {:?}", config.phases));
    if !config.metadata.is_empty() {
        let metadata: Vec<String> = config
            .metadata
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        summary.push(format!("Metadata: {}", metadata.join(", ")));
    }
    summary.push(format!("Client: {} {}", config.client_name, config.client_version));
    summary.push(format!("Color Output: {}", config.enable_color));
    summary.push(format!("Verbose: {}", config.verbose));
    summary.push(format!("Debug: {}", config.debug));

    summary.join("\n")
}
