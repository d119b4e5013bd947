//! CLI argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::config::LoggingConfig;

/// Command-line arguments for the bridge.
#[derive(Parser, Debug, Clone)]
#[command(about = "MQTT bridge for nvidia-smi dmon telemetry")]
pub struct BridgeArgs {
    /// Path to the JSON5 configuration file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override the configured log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl BridgeArgs {
    /// Parse CLI arguments, falling back to a default config path when
    /// `--config` is not given.
    pub fn parse_with_default(default_config: &'static str) -> Self {
        let matches = <Self as clap::CommandFactory>::command()
            .mut_arg("config", |arg| arg.default_value(default_config))
            .get_matches();

        <Self as clap::FromArgMatches>::from_arg_matches(&matches)
            .expect("Failed to parse arguments")
    }

    /// Apply the CLI log-level override on top of the file-loaded logging
    /// configuration.
    pub fn logging(&self, base: &LoggingConfig) -> LoggingConfig {
        let mut logging = base.clone();
        if let Some(level) = &self.log_level {
            logging.level = level.clone();
        }
        logging
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_override() {
        let args = BridgeArgs {
            config: PathBuf::from("nvsmi.json5"),
            log_level: Some("debug".to_string()),
        };

        let logging = args.logging(&LoggingConfig::default());
        assert_eq!(logging.level, "debug");
    }

    #[test]
    fn test_no_override_keeps_configured_level() {
        let args = BridgeArgs {
            config: PathBuf::from("nvsmi.json5"),
            log_level: None,
        };

        let logging = args.logging(&LoggingConfig::default());
        assert_eq!(logging.level, "info");
    }
}
