//! `project`: which Google Cloud project is the server running against

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::config::{Config, CREDENTIALS_SUFFIX};
use crate::credentials::{classify, load_credentials, CredentialVariant};
use crate::error::CheckError;
use crate::report::Reporter;
use crate::settings::SettingsDocument;

use super::{check_handshake, effective_credentials_path, load_settings};

pub async fn run<W: Write>(config: &Config, report: &mut Reporter<W>) -> bool {
    report.banner("🔍 Testing Google Cloud Project ID");

    let settings = load_settings(config);
    let settings = settings.as_ref();

    let project_id = inspect_credentials(config, settings, report);

    // Without a settings path the server falls back to the default ADC file
    let credentials = effective_credentials_path(config, settings.ok());
    let pass_msg = format!(
        "MCP server is working with credentials from {}",
        credentials.display()
    );

    report.section("🧪 Testing MCP server connection...");
    let mcp_working =
        check_handshake(config, settings, report, &pass_msg, "MCP server failed to start").await;

    list_available_projects(&config.gcloud_dir, report);

    report.record(project_id.is_some());
    report.record(mcp_working);

    report.line("");
    report.rule();
    match &project_id {
        Some(id) => report.pass(format_args!("Currently using project: {id}")),
        None => report.warn("Could not determine current project ID"),
    }
    if mcp_working {
        report.pass("MCP server is working correctly");
    } else {
        report.fail("MCP server has issues");
    }

    report.section("💡 To switch projects, use:");
    report.detail("ga-mcp-doctor fix --project <project_name>");

    report.passed()
}

/// Report the credentials the settings point at and return their project id
pub fn inspect_credentials<W: Write>(
    config: &Config,
    settings: Result<&SettingsDocument, &CheckError>,
    report: &mut Reporter<W>,
) -> Option<String> {
    let settings = match settings {
        Ok(settings) => settings,
        Err(CheckError::FileNotFound { .. }) => {
            report.fail("Gemini settings file not found");
            return None;
        }
        Err(CheckError::InvalidJson { .. }) => {
            report.fail("Invalid JSON in Gemini settings file");
            return None;
        }
        Err(e) => {
            report.fail(e);
            return None;
        }
    };

    let path = match settings
        .server(&config.server_name)
        .and_then(|server| server.credentials_path())
    {
        Ok(path) => path,
        Err(_) => {
            report.fail("No credentials path found in Gemini settings");
            return None;
        }
    };

    report.field("📁", "Current credentials file", path.display());

    let creds = match load_credentials(&path) {
        Ok(creds) => creds,
        Err(CheckError::FileNotFound { path }) => {
            report.fail(format_args!("Credentials file not found: {}", path.display()));
            return None;
        }
        Err(e) => {
            report.fail(e);
            return None;
        }
    };

    let summary = classify(&creds);
    if summary.variant == CredentialVariant::Unknown {
        report.warn(CheckError::UnknownCredentialVariant { path });
        return None;
    }

    report.field("🔑", "Credential type", summary.variant);
    if summary.variant != CredentialVariant::ServiceAccount {
        report.field("🆔", "Client ID", summary.client_id.as_deref().unwrap_or("N/A"));
    }

    match &summary.project_id {
        Some(project_id) => report.field("📊", "Project ID", project_id),
        None => report.warn("No project_id found in credentials"),
    }

    summary.project_id
}

/// Project names with a `<name>_credentials.json` file in `dir`, sorted
pub fn available_projects(dir: &Path) -> io::Result<Vec<String>> {
    let mut projects: Vec<String> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            name.strip_suffix(CREDENTIALS_SUFFIX)
                .filter(|project| !project.is_empty())
                .map(str::to_string)
        })
        .collect();
    projects.sort();
    Ok(projects)
}

fn list_available_projects<W: Write>(dir: &Path, report: &mut Reporter<W>) {
    report.section("📋 Available project credentials:");
    report.rule();

    match available_projects(dir) {
        Ok(projects) if projects.is_empty() => {
            report.line(format_args!("No *{CREDENTIALS_SUFFIX} files in {}", dir.display()));
        }
        Ok(projects) => {
            for project in projects {
                report.line(format_args!("• {project}"));
            }
        }
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "Could not list gcloud directory");
            report.line(format_args!("No gcloud directory found at {}", dir.display()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use tempfile::TempDir;

    fn inspect(config: &Config) -> (Option<String>, String) {
        let settings = load_settings(config);
        let mut report = Reporter::new(Vec::new());
        let project = inspect_credentials(config, settings.as_ref(), &mut report);
        (project, rendered(report))
    }

    #[test]
    fn test_inspect_installed_credentials() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let creds = dir.path().join("creds.json");
        fs::write(
            &creds,
            r#"{"installed":{"client_id":"X","client_secret":"Y","project_id":"proj-123"}}"#,
        )
        .unwrap();
        write_sh_server(&config, "true", Some(creds.as_path()));

        let (project, text) = inspect(&config);
        assert_eq!(project.as_deref(), Some("proj-123"));
        assert!(text.contains("🔑 Credential type: OAuth 2.0 Desktop Client"));
        assert!(text.contains("🆔 Client ID: X"));
        assert!(text.contains("📊 Project ID: proj-123"));
    }

    #[test]
    fn test_inspect_service_account_has_no_client_line() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let creds = dir.path().join("sa.json");
        fs::write(&creds, r#"{"type":"service_account","project_id":"svc"}"#).unwrap();
        write_sh_server(&config, "true", Some(creds.as_path()));

        let (project, text) = inspect(&config);
        assert_eq!(project.as_deref(), Some("svc"));
        assert!(text.contains("Service Account"));
        assert!(!text.contains("Client ID"));
    }

    #[test]
    fn test_inspect_reports_each_failure() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let (project, text) = inspect(&config);
        assert_eq!(project, None);
        assert!(text.contains("Gemini settings file not found"));

        write_sh_server(&config, "true", None);
        let (project, text) = inspect(&config);
        assert_eq!(project, None);
        assert!(text.contains("No credentials path found"));

        let creds = dir.path().join("creds.json");
        write_sh_server(&config, "true", Some(creds.as_path()));
        let (_, text) = inspect(&config);
        assert!(text.contains("Credentials file not found"));

        fs::write(&creds, "not json").unwrap();
        let (project, text) = inspect(&config);
        assert_eq!(project, None);
        assert!(text.contains("invalid JSON"));

        fs::write(&creds, r#"{"type":"external_account"}"#).unwrap();
        let (project, text) = inspect(&config);
        assert_eq!(project, None);
        assert!(text.contains("could not determine credential type"));
    }

    #[test]
    fn test_available_projects() {
        let dir = TempDir::new().unwrap();
        for name in [
            "zeta_credentials.json",
            "alpha_credentials.json",
            "alpha_adc.json",
            "application_default_credentials.json",
            "_credentials.json",
        ] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }

        let projects = available_projects(dir.path()).unwrap();
        assert_eq!(projects, vec!["alpha", "application_default", "zeta"]);

        assert!(available_projects(&dir.path().join("missing")).is_err());
    }

    #[tokio::test]
    async fn test_full_run_with_working_server() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let creds = dir.path().join("creds.json");
        fs::write(&creds, r#"{"client_id":"c","quota_project_id":"quota-proj"}"#).unwrap();
        fs::write(config.gcloud_dir.join("other_credentials.json"), "{}").unwrap();
        write_sh_server(
            &config,
            "cat >/dev/null; echo 'Google Analytics Server'",
            Some(creds.as_path()),
        );

        let mut report = Reporter::new(Vec::new());
        assert!(run(&config, &mut report).await);

        let text = rendered(report);
        assert!(text.contains("Currently using project: quota-proj"));
        assert!(text.contains("• other"));
        assert!(text.contains("MCP server is working correctly"));
        assert!(text.contains(&format!(
            "MCP server is working with credentials from {}",
            creds.display()
        )));
    }

    #[tokio::test]
    async fn test_handshake_line_names_default_adc_fallback() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        write_sh_server(
            &config,
            r#"cat >/dev/null; case "$GOOGLE_APPLICATION_CREDENTIALS" in *application_default_credentials.json) echo 'Google Analytics Server' ;; esac"#,
            None,
        );

        let mut report = Reporter::new(Vec::new());
        assert!(!run(&config, &mut report).await);

        let text = rendered(report);
        assert!(text.contains("No credentials path found"));
        assert!(text.contains(&format!(
            "MCP server is working with credentials from {}",
            config.default_adc_path().display()
        )));
        assert!(!text.contains("working with current credentials"));
    }
}
