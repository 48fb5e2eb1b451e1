//! Configuration: optional TOML file, CLI flags on top (flags win).
//!
//! ```toml
//! [bind]
//! host = "0.0.0.0"
//! port = 34122
//!
//! [paths]
//! state_dir = "~/.local/share/atelier"
//!
//! [runner]
//! url = "http://127.0.0.1:2010"
//! timeout_secs = 600
//!
//! [sidecar]
//! command = "node"
//! args = ["src/server.ts"]
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

/// The atelier image-generation MCP server
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "ATELIER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "ATELIER_PORT")]
    pub port: Option<u16>,

    /// Directory for artifacts and other state
    #[arg(short, long, env = "ATELIER_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Base URL of the diffusion inference runner
    #[arg(long, env = "ATELIER_RUNNER_URL")]
    pub runner_url: Option<String>,

    /// Command line for the sidecar tool server (e.g. "node src/server.ts")
    #[arg(long, env = "ATELIER_SIDECAR")]
    pub sidecar: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AtelierConfig {
    pub bind: BindConfig,
    pub paths: PathsConfig,
    pub runner: RunnerConfig,
    pub sidecar: Option<SidecarConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BindConfig {
    pub host: String,
    pub port: u16,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 34122,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub state_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:2010".to_string(),
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SidecarConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl SidecarConfig {
    /// Parse a `--sidecar "node src/server.ts"` style command line.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut parts = spec.split_whitespace().map(str::to_string);
        let command = parts
            .next()
            .context("sidecar command line must not be empty")?;
        Ok(Self {
            command,
            args: parts.collect(),
        })
    }
}

impl AtelierConfig {
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("failed to parse config file {}", path.display()))?
            }
            None => AtelierConfig::default(),
        };

        if let Some(port) = cli.port {
            config.bind.port = port;
        }
        if let Some(dir) = &cli.state_dir {
            config.paths.state_dir = Some(dir.clone());
        }
        if let Some(url) = &cli.runner_url {
            config.runner.url = url.clone();
        }
        if let Some(spec) = &cli.sidecar {
            config.sidecar = Some(SidecarConfig::parse(spec)?);
        }

        Ok(config)
    }

    /// The state directory, defaulting to a per-user location.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(dir) = &self.paths.state_dir {
            return dir.clone();
        }
        match std::env::var("HOME") {
            Ok(home) => PathBuf::from(home).join(".local/share/atelier"),
            Err(_) => PathBuf::from("./atelier-state"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_deployment() {
        let config = AtelierConfig::default();
        assert_eq!(config.bind.port, 34122);
        assert_eq!(config.runner.url, "http://127.0.0.1:2010");
        assert!(config.sidecar.is_none());
    }

    #[test]
    fn parses_full_file() {
        let config: AtelierConfig = toml::from_str(
            r#"
            [bind]
            port = 9000

            [runner]
            url = "http://127.0.0.1:7777"

            [sidecar]
            command = "node"
            args = ["src/server.ts"]
            "#,
        )
        .unwrap();
        assert_eq!(config.bind.port, 9000);
        assert_eq!(config.bind.host, "0.0.0.0");
        assert_eq!(config.runner.url, "http://127.0.0.1:7777");
        assert_eq!(config.sidecar.unwrap().args, vec!["src/server.ts"]);
    }

    #[test]
    fn sidecar_spec_splits_on_whitespace() {
        let sidecar = SidecarConfig::parse("node src/server.ts --quiet").unwrap();
        assert_eq!(sidecar.command, "node");
        assert_eq!(sidecar.args, vec!["src/server.ts", "--quiet"]);
        assert!(SidecarConfig::parse("   ").is_err());
    }
}
