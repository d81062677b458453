//! Subcommand check sequences
//!
//! Each check catches its own failures, prints a diagnostic through the
//! reporter and hands back a plain boolean (or an `Option`). Nothing here
//! returns an error to the caller.

pub mod fix;
pub mod project;
pub mod setup;

use std::io::Write;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::{CheckError, CheckResult};
use crate::probe::HandshakeProbe;
use crate::report::Reporter;
use crate::settings::{SettingsDocument, CREDENTIALS_ENV};

/// Load the configured settings file
pub fn load_settings(config: &Config) -> CheckResult<SettingsDocument> {
    SettingsDocument::load(&config.settings_path)
}

/// Credentials the server will use: the settings entry's path, or the
/// default ADC file when the settings do not name one.
pub fn effective_credentials_path(config: &Config, settings: Option<&SettingsDocument>) -> PathBuf {
    settings
        .and_then(|s| s.server(&config.server_name).ok())
        .and_then(|server| server.credentials_path().ok())
        .unwrap_or_else(|| config.default_adc_path())
}

/// Build the handshake for the configured server entry
pub fn handshake_probe(config: &Config, settings: &SettingsDocument) -> CheckResult<HandshakeProbe> {
    let server = settings.server(&config.server_name)?;
    let command = server.command()?;
    // A server entry may legitimately omit `args`
    let args = server.args().unwrap_or_default();
    let credentials = effective_credentials_path(config, Some(settings));

    Ok(HandshakeProbe::new(command, args)
        .envs(server.env())
        .env(CREDENTIALS_ENV, credentials.to_string_lossy())
        .timeout(config.handshake_timeout))
}

/// Run the handshake and report it.
///
/// `pass_msg` and `fail_msg` let each subcommand phrase the outcome.
pub async fn check_handshake<W: Write>(
    config: &Config,
    settings: Result<&SettingsDocument, &CheckError>,
    report: &mut Reporter<W>,
    pass_msg: &str,
    fail_msg: &str,
) -> bool {
    let probe = match settings.map_err(|e| e.to_string()).and_then(|s| {
        handshake_probe(config, s).map_err(|e| e.to_string())
    }) {
        Ok(probe) => probe,
        Err(e) => {
            report.fail(format_args!("{fail_msg}: {e}"));
            return false;
        }
    };

    match probe.run().await {
        Ok(_) => {
            report.pass(pass_msg);
            true
        }
        Err(e) => {
            report.fail(format_args!("{fail_msg}: {e}"));
            false
        }
    }
}
