//! `fix`: repoint the server at usable Application Default Credentials

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::credentials::{load_credentials, AdcCredentials};
use crate::error::CheckError;
use crate::report::{Reporter, Summary};

use super::load_settings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixMode {
    /// Derive `<project>_adc.json` from `<project>_credentials.json`
    Project(String),
    /// Use the ADC file left by an earlier `gcloud auth application-default login`
    DefaultAdc,
}

const FAILURE: &str = "❌ Could not fix credentials automatically.";
const REMEDIATION: &str = "Please try the manual authentication process.";

pub fn run<W: Write>(config: &Config, mode: &FixMode, report: &mut Reporter<W>) -> bool {
    match mode {
        FixMode::Project(project) => {
            report.banner(&format!("🔧 Fixing Google Cloud Credentials for {project}"));

            let created = create_adc_credentials(config, project, report);
            let ok = match &created {
                Some(adc_path) => update_settings(config, adc_path, report),
                None => false,
            };
            report.record(ok);

            let login = format!(
                "Authenticate manually: gcloud auth application-default login --client-id-file={}",
                config.project_credentials_path(project).display()
            );
            report.summary(&Summary {
                success: "🎉 Credentials created successfully!",
                next_steps: &[
                    "Note: the generated file has no refresh token yet.",
                    login.as_str(),
                ],
                failure: FAILURE,
                remediation: REMEDIATION,
            })
        }
        FixMode::DefaultAdc => {
            report.banner("🔧 Pointing settings at the default Application Default Credentials");

            let adc_path = config.default_adc_path();
            let ok = if adc_path.is_file() {
                update_settings(config, &adc_path, report)
            } else {
                report.fail(format_args!(
                    "Default ADC file not found: {}",
                    adc_path.display()
                ));
                report.detail("Run `gcloud auth application-default login` first.");
                false
            };
            report.record(ok);

            report.summary(&Summary {
                success: "🎉 Credentials fixed successfully!",
                next_steps: &["You can now use Gemini CLI with your project."],
                failure: FAILURE,
                remediation: REMEDIATION,
            })
        }
    }
}

/// Write `<project>_adc.json` built from the project's OAuth client file
pub fn create_adc_credentials<W: Write>(
    config: &Config,
    project: &str,
    report: &mut Reporter<W>,
) -> Option<PathBuf> {
    let source = config.project_credentials_path(project);

    let creds = match load_credentials(&source) {
        Ok(creds) => creds,
        Err(CheckError::FileNotFound { path }) => {
            report.fail(format_args!("OAuth credentials file not found: {}", path.display()));
            return None;
        }
        Err(e) => {
            report.fail(format_args!("Error creating ADC credentials: {e}"));
            return None;
        }
    };

    let adc = match AdcCredentials::from_client(&source, &creds) {
        Ok(adc) => adc,
        Err(CheckError::UnknownCredentialVariant { .. }) => {
            report.fail("No 'installed' or 'web' client found in OAuth file");
            return None;
        }
        Err(e) => {
            report.fail(format_args!("Error creating ADC credentials: {e}"));
            return None;
        }
    };

    let target = config.project_adc_path(project);
    let written = adc
        .to_json_pretty()
        .map_err(|e| e.to_string())
        .and_then(|json| fs::write(&target, json + "\n").map_err(|e| e.to_string()));
    if let Err(e) = written {
        report.fail(format_args!(
            "Error writing ADC credentials to {}: {e}",
            target.display()
        ));
        return None;
    }

    info!(path = %target.display(), project = %adc.quota_project_id, "Wrote ADC file");
    report.pass(format_args!("Created ADC credentials file: {}", target.display()));
    report.field("📊", "Project ID", &adc.quota_project_id);
    Some(target)
}

/// Point the server entry's credentials variable at `credentials`
pub fn update_settings<W: Write>(config: &Config, credentials: &Path, report: &mut Reporter<W>) -> bool {
    let result = load_settings(config).and_then(|mut settings| {
        settings.set_credentials_path(&config.server_name, credentials)?;
        settings.save()
    });

    match result {
        Ok(()) => {
            report.pass(format_args!(
                "Updated Gemini settings to use: {}",
                credentials.display()
            ));
            true
        }
        Err(e) => {
            report.fail(format_args!("Error updating Gemini settings: {e}"));
            false
        }
    }
}
