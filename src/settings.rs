//! Gemini CLI settings file access
//!
//! The settings file registers MCP servers under `mcpServers.<name>` with a
//! `command`, its `args` and an `env` map. Only the entry for the analytics
//! server is interpreted; the rest of the document is carried through
//! untouched when the file is rewritten.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{CheckError, CheckResult};

/// Environment variable the server reads its credentials path from
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

const SERVERS_KEY: &str = "mcpServers";

/// Read a file that must hold a JSON object.
///
/// Absent files map to `FileNotFound`; anything that is not a JSON object
/// maps to `InvalidJson`.
pub fn read_json_object(path: &Path) -> CheckResult<Map<String, Value>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(CheckError::FileNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(CheckError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    debug!(path = %path.display(), bytes = content.len(), "Read JSON file");

    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(CheckError::InvalidJson {
            path: path.to_path_buf(),
            reason: format!("expected an object, found {}", json_kind(&other)),
        }),
        Err(e) => Err(CheckError::InvalidJson {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A loaded settings file
#[derive(Debug, Clone)]
pub struct SettingsDocument {
    path: PathBuf,
    root: Map<String, Value>,
}

impl SettingsDocument {
    /// Load and parse the settings file at `path`
    pub fn load(path: impl Into<PathBuf>) -> CheckResult<Self> {
        let path = path.into();
        let root = read_json_object(&path)?;
        Ok(Self { path, root })
    }

    /// Look up the server entry registered under `name`
    pub fn server(&self, name: &str) -> CheckResult<ServerEntry<'_>> {
        let entry = self
            .root
            .get(SERVERS_KEY)
            .and_then(Value::as_object)
            .and_then(|servers| servers.get(name))
            .and_then(Value::as_object)
            .ok_or_else(|| CheckError::missing_key(&self.path, format!("{SERVERS_KEY}.{name}")))?;

        Ok(ServerEntry {
            path: &self.path,
            name: name.to_string(),
            entry,
        })
    }

    /// Point the server entry's credentials variable at `credentials`.
    ///
    /// The entry must already exist; its `env` object is created if needed.
    pub fn set_credentials_path(&mut self, name: &str, credentials: &Path) -> CheckResult<()> {
        let path = self.path.clone();
        let entry = self
            .root
            .get_mut(SERVERS_KEY)
            .and_then(Value::as_object_mut)
            .and_then(|servers| servers.get_mut(name))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| CheckError::missing_key(&path, format!("{SERVERS_KEY}.{name}")))?;

        let env = entry.entry("env").or_insert_with(|| json!({}));
        if !env.is_object() {
            *env = json!({});
        }
        env[CREDENTIALS_ENV] = Value::String(credentials.to_string_lossy().into_owned());

        Ok(())
    }

    /// Write the document back to the file it was loaded from
    pub fn save(&self) -> CheckResult<()> {
        let mut content = serde_json::to_string_pretty(&self.root).map_err(|e| {
            CheckError::InvalidJson {
                path: self.path.clone(),
                reason: e.to_string(),
            }
        })?;
        content.push('\n');

        fs::write(&self.path, content).map_err(|source| CheckError::Io {
            path: self.path.clone(),
            source,
        })?;

        info!(path = %self.path.display(), "Wrote settings file");
        Ok(())
    }
}

/// Borrowed view of one `mcpServers` entry
#[derive(Debug, Clone)]
pub struct ServerEntry<'a> {
    path: &'a Path,
    name: String,
    entry: &'a Map<String, Value>,
}

impl ServerEntry<'_> {
    fn key(&self, field: &str) -> String {
        format!("{SERVERS_KEY}.{}.{field}", self.name)
    }

    /// Executable that launches the server
    pub fn command(&self) -> CheckResult<&str> {
        self.entry
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| CheckError::missing_key(self.path, self.key("command")))
    }

    /// Arguments passed to the command.
    ///
    /// Non-string array elements make the whole value unusable.
    pub fn args(&self) -> CheckResult<Vec<String>> {
        self.entry
            .get("args")
            .and_then(Value::as_array)
            .and_then(|args| {
                args.iter()
                    .map(|a| a.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| CheckError::missing_key(self.path, self.key("args")))
    }

    /// String-valued entries of the server's `env` object
    pub fn env(&self) -> BTreeMap<String, String> {
        self.entry
            .get("env")
            .and_then(Value::as_object)
            .map(|env| {
                env.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Value of `env.GOOGLE_APPLICATION_CREDENTIALS`
    pub fn credentials_path(&self) -> CheckResult<PathBuf> {
        self.entry
            .get("env")
            .and_then(|env| env.get(CREDENTIALS_ENV))
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .ok_or_else(|| CheckError::missing_key(self.path, self.key(&format!("env.{CREDENTIALS_ENV}"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_settings(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("settings.json");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_reads_credentials_path() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(
            &dir,
            r#"{"mcpServers":{"analytics-mcp":{"env":{"GOOGLE_APPLICATION_CREDENTIALS":"/tmp/creds.json"}}}}"#,
        );

        let settings = SettingsDocument::load(&path).unwrap();
        let server = settings.server("analytics-mcp").unwrap();
        assert_eq!(server.credentials_path().unwrap(), PathBuf::from("/tmp/creds.json"));
    }

    #[test]
    fn test_missing_server_entry_is_missing_key() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(&dir, r#"{"mcpServers":{"other":{}}}"#);

        let settings = SettingsDocument::load(&path).unwrap();
        match settings.server("analytics-mcp") {
            Err(CheckError::MissingKey { key, .. }) => assert_eq!(key, "mcpServers.analytics-mcp"),
            other => panic!("expected MissingKey, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_command_is_missing_key() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(&dir, r#"{"mcpServers":{"analytics-mcp":{"args":[]}}}"#);

        let settings = SettingsDocument::load(&path).unwrap();
        let server = settings.server("analytics-mcp").unwrap();
        assert!(matches!(server.command(), Err(CheckError::MissingKey { .. })));
        assert_eq!(server.args().unwrap(), Vec::<String>::new());
        assert!(matches!(server.credentials_path(), Err(CheckError::MissingKey { .. })));
    }

    #[test]
    fn test_reads_command_args_and_env() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(
            &dir,
            r#"{"mcpServers":{"analytics-mcp":{
                "command":"/opt/venv/bin/python",
                "args":["-m","analytics_mcp.server"],
                "env":{"GOOGLE_APPLICATION_CREDENTIALS":"/c.json","GOOGLE_PROJECT_ID":"p","N":3}
            }}}"#,
        );

        let settings = SettingsDocument::load(&path).unwrap();
        let server = settings.server("analytics-mcp").unwrap();
        assert_eq!(server.command().unwrap(), "/opt/venv/bin/python");
        assert_eq!(server.args().unwrap(), vec!["-m", "analytics_mcp.server"]);

        let env = server.env();
        assert_eq!(env.len(), 2);
        assert_eq!(env["GOOGLE_PROJECT_ID"], "p");
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = SettingsDocument::load(dir.path().join("absent.json"));
        assert!(matches!(result, Err(CheckError::FileNotFound { .. })));
    }

    #[test]
    fn test_malformed_file_is_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(&dir, "{ not json");
        assert!(matches!(
            SettingsDocument::load(&path),
            Err(CheckError::InvalidJson { .. })
        ));

        let path = write_settings(&dir, "[1, 2]");
        assert!(matches!(
            SettingsDocument::load(&path),
            Err(CheckError::InvalidJson { .. })
        ));
    }

    #[test]
    fn test_set_credentials_path_preserves_other_keys() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(
            &dir,
            r#"{"theme":"dark","mcpServers":{"analytics-mcp":{"command":"python"},"other":{"command":"x"}}}"#,
        );

        let mut settings = SettingsDocument::load(&path).unwrap();
        settings
            .set_credentials_path("analytics-mcp", Path::new("/new/adc.json"))
            .unwrap();
        settings.save().unwrap();

        let reloaded = SettingsDocument::load(&path).unwrap();
        let server = reloaded.server("analytics-mcp").unwrap();
        assert_eq!(server.credentials_path().unwrap(), PathBuf::from("/new/adc.json"));
        assert_eq!(server.command().unwrap(), "python");
        assert_eq!(reloaded.server("other").unwrap().command().unwrap(), "x");

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"theme\": \"dark\""));
        assert!(raw.contains("\n  \"mcpServers\""));
    }

    #[test]
    fn test_set_credentials_path_requires_entry() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(&dir, r#"{"mcpServers":{}}"#);

        let mut settings = SettingsDocument::load(&path).unwrap();
        let result = settings.set_credentials_path("analytics-mcp", Path::new("/x.json"));
        assert!(matches!(result, Err(CheckError::MissingKey { .. })));
    }
}
