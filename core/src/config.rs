//! Configuration
//!
//! Sources, lowest priority first:
//! 1. Built-in defaults
//! 2. TOML file (`weft.toml` in the working directory, or an explicit path)
//! 3. `WEFT_*` environment variables, `__` between sections
//!    (e.g. `WEFT_RUNTIME__MAX_CALL_DEPTH=256`); `.env` is loaded first
//! 4. Overrides set on the builder (CLI flags)

use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub runtime: RuntimeSettings,
    pub debug: DebugSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Frames one worker's control stack may hold
    pub max_call_depth: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    pub enabled: bool,
    pub handshake_timeout_secs: u64,
    /// `<source>:<line>` entries
    pub breakpoints: Vec<String>,
    /// Serve the debug protocol over TCP on this port
    pub port: Option<u16>,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            handshake_timeout_secs: 30,
            breakpoints: Vec::new(),
            port: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Load from the default sources
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettingsBuilder {
    config_path: Option<PathBuf>,
    debug_enabled: Option<bool>,
    debug_port: Option<u16>,
    breakpoints: Vec<String>,
    max_call_depth: Option<usize>,
    skip_env: bool,
}

impl SettingsBuilder {
    /// Explicit config file; it must exist
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn debug_enabled(mut self, enabled: Option<bool>) -> Self {
        self.debug_enabled = enabled;
        self
    }

    pub fn debug_port(mut self, port: Option<u16>) -> Self {
        self.debug_port = port;
        self
    }

    /// Appended to the configured breakpoints
    pub fn breakpoints(mut self, breakpoints: Vec<String>) -> Self {
        self.breakpoints = breakpoints;
        self
    }

    pub fn max_call_depth(mut self, depth: Option<usize>) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Ignore `.env` and `WEFT_*` variables
    pub fn skip_env(mut self) -> Self {
        self.skip_env = true;
        self
    }

    pub fn build(self) -> Result<Settings> {
        let mut builder = config::Config::builder();

        builder = match &self.config_path {
            Some(path) => builder.add_source(File::from(path.as_path()).required(true)),
            None => builder.add_source(File::with_name("weft").required(false)),
        };

        if !self.skip_env {
            let _ = dotenvy::dotenv();
            builder = builder.add_source(
                Environment::with_prefix("WEFT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("debug.breakpoints"),
            );
        }

        let mut settings: Settings = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        if let Some(enabled) = self.debug_enabled {
            settings.debug.enabled = enabled;
        }
        if let Some(port) = self.debug_port {
            settings.debug.port = Some(port);
            settings.debug.enabled = true;
        }
        if !self.breakpoints.is_empty() {
            settings.debug.breakpoints.extend(self.breakpoints);
        }
        if let Some(depth) = self.max_call_depth {
            settings.runtime.max_call_depth = depth;
        }

        if settings.runtime.max_call_depth == 0 {
            anyhow::bail!("runtime.max_call_depth must be at least 1");
        }
        Ok(settings)
    }
}
