//! `setup`: end-to-end check of the local analytics MCP installation

use std::io::Write;
use std::path::Path;

use crate::config::Config;
use crate::error::CheckError;
use crate::probe;
use crate::report::{Reporter, Summary};
use crate::settings::SettingsDocument;

use super::{check_handshake, effective_credentials_path, load_settings};

/// Console entry point installed by the analytics MCP package
pub const SERVER_EXECUTABLE: &str = "google-analytics-mcp";

pub const GEMINI_EXECUTABLE: &str = "gemini";

/// Python minor versions the server supports (3.9 through 3.13)
const SUPPORTED_PYTHON_MINORS: std::ops::RangeInclusive<u32> = 9..=13;

const SUMMARY: Summary<'static> = Summary {
    success: "🎉 All checks passed! Your setup is ready.",
    next_steps: &[
        "Launch Gemini CLI: gemini",
        "Type '/mcp' to see available MCP servers",
        "You should see analytics-mcp listed and connected (green)",
        "Try: 'what can the analytics-mcp server do?'",
    ],
    failure: "❌ Some checks failed. Please review the setup instructions.",
    remediation: "Re-run with RUST_LOG=debug for details, then follow the server's setup guide.",
};

pub async fn run<W: Write>(config: &Config, report: &mut Reporter<W>) -> bool {
    report.line("🔍 Checking Google Analytics MCP Server Setup...\n");

    let settings = load_settings(config);
    let settings = settings.as_ref();

    let ok = check_server_runtime(config, settings, report).await;
    report.record(ok);
    let ok = check_server_executable(report);
    report.record(ok);
    let ok = check_gemini_cli(config, report).await;
    report.record(ok);
    let ok = check_settings(config, settings, report);
    report.record(ok);
    let ok = check_credentials_file(config, settings.ok(), report);
    report.record(ok);
    let ok = check_handshake(
        config,
        settings,
        report,
        "MCP server responds correctly",
        "MCP server failed to respond properly",
    )
    .await;
    report.record(ok);

    report.summary(&SUMMARY)
}

/// Parse `Python 3.11.4` (or `Python 3.13.0rc1`) into its numeric parts
pub fn parse_python_version(text: &str) -> Option<(u32, u32, u32)> {
    let version = text.trim().strip_prefix("Python")?.trim();
    let mut parts = version.splitn(3, '.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts
        .next()
        .map(|p| {
            let digits: String = p.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        })
        .unwrap_or(0);
    Some((major, minor, patch))
}

fn is_python_interpreter(command: &str) -> bool {
    Path::new(command)
        .file_name()
        .map(|name| name.to_string_lossy().starts_with("python"))
        .unwrap_or(false)
}

/// The server runs on the interpreter named in its settings entry
async fn check_server_runtime<W: Write>(
    config: &Config,
    settings: Result<&SettingsDocument, &CheckError>,
    report: &mut Reporter<W>,
) -> bool {
    let command = match settings.map_err(|e| e.to_string()).and_then(|s| {
        s.server(&config.server_name)
            .and_then(|server| server.command().map(str::to_string))
            .map_err(|e| e.to_string())
    }) {
        Ok(command) => command,
        Err(e) => {
            report.fail(format_args!("Cannot determine server runtime: {e}"));
            return false;
        }
    };

    if !is_python_interpreter(&command) {
        report.pass(format_args!(
            "Server command {command} is not a Python interpreter, version not checked"
        ));
        return true;
    }

    let text = match probe::version_output(&command, config.handshake_timeout).await {
        Ok(text) => text,
        Err(e) => {
            report.fail(format_args!("Could not run {command} --version: {e}"));
            return false;
        }
    };

    match parse_python_version(&text) {
        Some((3, minor, patch)) if SUPPORTED_PYTHON_MINORS.contains(&minor) => {
            report.pass(format_args!("Python version 3.{minor}.{patch} is compatible"));
            true
        }
        Some((major, minor, patch)) => {
            report.fail(format_args!(
                "Python version {major}.{minor}.{patch} is not compatible (requires 3.9-3.13)"
            ));
            false
        }
        None => {
            report.fail(format_args!("Unrecognised Python version output: {text:?}"));
            false
        }
    }
}

fn check_server_executable<W: Write>(report: &mut Reporter<W>) -> bool {
    match which::which(SERVER_EXECUTABLE) {
        Ok(path) => {
            report.pass(format_args!(
                "Google Analytics MCP server found at: {}",
                path.display()
            ));
            true
        }
        Err(_) => {
            report.fail("Google Analytics MCP server not found");
            false
        }
    }
}

async fn check_gemini_cli<W: Write>(config: &Config, report: &mut Reporter<W>) -> bool {
    let path = match which::which(GEMINI_EXECUTABLE) {
        Ok(path) => path,
        Err(_) => {
            report.fail("Gemini CLI not found");
            return false;
        }
    };

    match probe::version_output(&path, config.handshake_timeout).await {
        Ok(version) => {
            report.pass(format_args!("Gemini CLI version: {version}"));
            true
        }
        Err(e) => {
            report.fail(format_args!("Gemini CLI found but not working: {e}"));
            false
        }
    }
}

/// The server entry launches the expected command with the expected args
pub fn check_settings<W: Write>(
    config: &Config,
    settings: Result<&SettingsDocument, &CheckError>,
    report: &mut Reporter<W>,
) -> bool {
    let settings = match settings {
        Ok(settings) => settings,
        Err(CheckError::FileNotFound { path }) => {
            report.fail(format_args!("Gemini settings file not found: {}", path.display()));
            return false;
        }
        Err(CheckError::InvalidJson { reason, .. }) => {
            report.fail(format_args!("Invalid JSON in Gemini settings file: {reason}"));
            return false;
        }
        Err(e) => {
            report.fail(e);
            return false;
        }
    };

    let server = match settings.server(&config.server_name) {
        Ok(server) => server,
        Err(_) => {
            report.fail(format_args!("{} not found in Gemini settings", config.server_name));
            return false;
        }
    };

    let command = server.command().ok();
    let args = server.args().ok();

    let command_ok = match (&config.expected_command, command) {
        (Some(expected), Some(actual)) => expected == actual,
        (None, Some(actual)) => which::which(actual).is_ok(),
        (_, None) => false,
    };
    let args_ok = args.as_deref() == Some(config.expected_args.as_slice());

    if command_ok && args_ok {
        report.pass(format_args!(
            "Gemini settings configured correctly for {}",
            config.server_name
        ));
        return true;
    }

    report.fail("Gemini settings mismatch:");
    match &config.expected_command {
        Some(expected) => report.detail(format_args!("Expected command: {expected}")),
        None => report.detail("Expected command: an executable on PATH or an existing path"),
    }
    report.detail(format_args!("Actual command: {}", command.unwrap_or("<missing>")));
    report.detail(format_args!("Expected args: {:?}", config.expected_args));
    match &args {
        Some(args) => report.detail(format_args!("Actual args: {:?}", args)),
        None => report.detail("Actual args: <missing>"),
    }
    false
}

fn check_credentials_file<W: Write>(
    config: &Config,
    settings: Option<&SettingsDocument>,
    report: &mut Reporter<W>,
) -> bool {
    let path = effective_credentials_path(config, settings);
    if path.is_file() {
        report.pass(format_args!(
            "Google Cloud credentials found at: {}",
            path.display()
        ));
        true
    } else {
        report.fail(format_args!(
            "Google Cloud credentials not found at: {}",
            path.display()
        ));
        false
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_python_version() {
        assert_eq!(parse_python_version("Python 3.11.4"), Some((3, 11, 4)));
        assert_eq!(parse_python_version("Python 3.13.0rc1\n"), Some((3, 13, 0)));
        assert_eq!(parse_python_version("Python 3.9"), Some((3, 9, 0)));
        assert_eq!(parse_python_version("pypy 7.3"), None);
        assert_eq!(parse_python_version("Python three"), None);
    }

    #[test]
    fn test_python_interpreter_detection() {
        assert!(is_python_interpreter("/opt/venv/bin/python"));
        assert!(is_python_interpreter("python3.12"));
        assert!(!is_python_interpreter("/usr/bin/uvx"));
        assert!(!is_python_interpreter("/opt/python/bin/node"));
    }

    fn settings_report(config: &Config) -> (bool, String) {
        let settings = load_settings(config);
        let mut report = Reporter::new(Vec::new());
        let ok = check_settings(config, settings.as_ref(), &mut report);
        (ok, rendered(report))
    }

    #[test]
    fn test_settings_match_with_expected_args() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        fs::write(
            &config.settings_path,
            r#"{"mcpServers":{"analytics-mcp":{"command":"sh","args":["-m","analytics_mcp.server"]}}}"#,
        )
        .unwrap();

        let (ok, text) = settings_report(&config);
        assert!(ok, "{text}");
        assert!(text.contains("configured correctly"));
    }

    #[test]
    fn test_settings_mismatch_lists_expected_and_actual() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.expected_command = Some("/opt/venv/bin/python".to_string());
        fs::write(
            &config.settings_path,
            r#"{"mcpServers":{"analytics-mcp":{"command":"python3","args":["server.py"]}}}"#,
        )
        .unwrap();

        let (ok, text) = settings_report(&config);
        assert!(!ok);
        assert!(text.contains("Expected command: /opt/venv/bin/python"));
        assert!(text.contains("Actual command: python3"));
        assert!(text.contains("Actual args: [\"server.py\"]"));
    }

    #[test]
    fn test_settings_missing_entry_and_bad_json() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let (ok, text) = settings_report(&config);
        assert!(!ok);
        assert!(text.contains("settings file not found"));

        fs::write(&config.settings_path, r#"{"mcpServers":{}}"#).unwrap();
        let (ok, text) = settings_report(&config);
        assert!(!ok);
        assert!(text.contains("analytics-mcp not found in Gemini settings"));

        fs::write(&config.settings_path, "{").unwrap();
        let (ok, text) = settings_report(&config);
        assert!(!ok);
        assert!(text.contains("Invalid JSON"));
    }

    #[test]
    fn test_credentials_file_check() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let creds = dir.path().join("creds.json");
        write_sh_server(&config, "true", Some(creds.as_path()));
        let settings = load_settings(&config).unwrap();

        let mut report = Reporter::new(Vec::new());
        assert!(!check_credentials_file(&config, Some(&settings), &mut report));

        fs::write(&creds, "{}").unwrap();
        assert!(check_credentials_file(&config, Some(&settings), &mut report));
    }

    #[tokio::test]
    async fn test_runtime_check_skips_non_python_command() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        write_sh_server(&config, "true", None);
        let settings = load_settings(&config);

        let mut report = Reporter::new(Vec::new());
        assert!(check_server_runtime(&config, settings.as_ref(), &mut report).await);
        assert!(rendered(report).contains("not a Python interpreter"));
    }

    #[tokio::test]
    async fn test_full_run_fails_without_settings() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let mut report = Reporter::new(Vec::new());
        assert!(!run(&config, &mut report).await);
        assert_eq!(report.recorded(), 6);
        assert!(rendered(report).contains("Some checks failed"));
    }
}
