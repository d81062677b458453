//! Runtime configuration
//!
//! Every path and tunable comes from a command-line flag, an environment
//! variable, or a default relative to the user's home directory, in that
//! order of precedence.

use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Default handshake timeout (10 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default `mcpServers` entry name
pub const DEFAULT_SERVER_NAME: &str = "analytics-mcp";

/// Arguments the server entry is expected to carry
pub const DEFAULT_EXPECTED_ARGS: [&str; 2] = ["-m", "analytics_mcp.server"];

pub const SETTINGS_ENV: &str = "GA_MCP_SETTINGS";
pub const GCLOUD_DIR_ENV: &str = "CLOUDSDK_CONFIG";
pub const SERVER_NAME_ENV: &str = "GA_MCP_SERVER_NAME";
pub const EXPECTED_COMMAND_ENV: &str = "GA_MCP_EXPECTED_COMMAND";
pub const EXPECTED_ARGS_ENV: &str = "GA_MCP_EXPECTED_ARGS";
pub const TIMEOUT_ENV: &str = "GA_MCP_TIMEOUT";

/// File name gcloud gives the default ADC file
pub const DEFAULT_ADC_FILE: &str = "application_default_credentials.json";

/// Suffix of per-project OAuth client files in the gcloud directory
pub const CREDENTIALS_SUFFIX: &str = "_credentials.json";

/// Suffix of per-project ADC files written by `fix`
pub const ADC_SUFFIX: &str = "_adc.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Gemini CLI settings file
    pub settings_path: PathBuf,
    /// gcloud configuration directory holding credential files
    pub gcloud_dir: PathBuf,
    /// Name of the server entry under `mcpServers`
    pub server_name: String,
    /// Exact command the server entry must use, if pinned
    pub expected_command: Option<String>,
    pub expected_args: Vec<String>,
    pub handshake_timeout: Duration,
    /// Exit non-zero when the report fails
    pub strict: bool,
}

/// Options shared by every subcommand, as given on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonArgs {
    pub settings: Option<PathBuf>,
    pub gcloud_dir: Option<PathBuf>,
    pub server_name: Option<String>,
    pub timeout: Option<String>,
    pub strict: bool,
}

impl CommonArgs {
    /// Try to consume a shared option at `args[*i]`.
    ///
    /// Returns `Ok(true)` and advances `i` past any value when the argument
    /// was recognised.
    pub fn take(&mut self, args: &[String], i: &mut usize) -> Result<bool> {
        let flag = args[*i].as_str();
        let mut value = || -> Result<String> {
            *i += 1;
            args.get(*i)
                .cloned()
                .ok_or_else(|| anyhow!("{} requires a value", flag))
        };

        match flag {
            "--settings" => self.settings = Some(PathBuf::from(value()?)),
            "--gcloud-dir" => self.gcloud_dir = Some(PathBuf::from(value()?)),
            "--server" => self.server_name = Some(value()?),
            "--timeout" => self.timeout = Some(value()?),
            "--strict" => self.strict = true,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn parse_timeout(raw: &str) -> Result<Duration> {
    let timeout = humantime::parse_duration(raw.trim())
        .with_context(|| format!("Invalid timeout: {:?} (expected e.g. \"10s\")", raw))?;
    if timeout.is_zero() {
        bail!("Timeout must be greater than zero");
    }
    Ok(timeout)
}

impl Config {
    /// Resolve configuration from the process environment
    pub fn resolve(args: CommonArgs) -> Result<Self> {
        Self::resolve_with(args, |key| std::env::var(key).ok(), dirs::home_dir)
    }

    /// Resolve configuration from explicit lookups
    pub fn resolve_with(
        args: CommonArgs,
        env: impl Fn(&str) -> Option<String>,
        home: impl Fn() -> Option<PathBuf>,
    ) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let home_relative = |rel: &str| -> Result<PathBuf> {
            home()
                .map(|h| h.join(rel))
                .context("Could not determine home directory; set the path explicitly")
        };

        let settings_path = match args.settings.or_else(|| env(SETTINGS_ENV).map(PathBuf::from)) {
            Some(path) => path,
            None => home_relative(".gemini/settings.json")?,
        };

        let gcloud_dir = match args.gcloud_dir.or_else(|| env(GCLOUD_DIR_ENV).map(PathBuf::from)) {
            Some(path) => path,
            None => home_relative(".config/gcloud")?,
        };

        let server_name = args
            .server_name
            .or_else(|| env(SERVER_NAME_ENV))
            .unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string());

        let expected_args = env(EXPECTED_ARGS_ENV)
            .map(|raw| raw.split_whitespace().map(str::to_string).collect())
            .unwrap_or_else(|| DEFAULT_EXPECTED_ARGS.iter().map(|a| a.to_string()).collect());

        let handshake_timeout = match args.timeout.or_else(|| env(TIMEOUT_ENV)) {
            Some(raw) => parse_timeout(&raw)?,
            None => DEFAULT_TIMEOUT,
        };

        Ok(Self {
            settings_path,
            gcloud_dir,
            server_name,
            expected_command: env(EXPECTED_COMMAND_ENV),
            expected_args,
            handshake_timeout,
            strict: args.strict,
        })
    }

    /// Path gcloud writes default Application Default Credentials to
    pub fn default_adc_path(&self) -> PathBuf {
        self.gcloud_dir.join(DEFAULT_ADC_FILE)
    }

    /// OAuth client descriptor for a named project
    pub fn project_credentials_path(&self, project: &str) -> PathBuf {
        self.gcloud_dir.join(format!("{project}{CREDENTIALS_SUFFIX}"))
    }

    /// ADC file generated for a named project
    pub fn project_adc_path(&self, project: &str) -> PathBuf {
        self.gcloud_dir.join(format!("{project}{ADC_SUFFIX}"))
    }
}
