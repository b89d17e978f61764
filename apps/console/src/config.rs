use std::{fs, path::Path};

use anyhow::{ensure, Context};
use client_core::{Endpoints, DEFAULT_DIRECTORY_LIMIT};
use serde::Deserialize;
use shared::protocol::DEFAULT_PAGE_LIMIT;

const DEFAULT_BASE_URL: &str = "http://localhost";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub groups_url: String,
    pub users_url: String,
    pub things_url: String,
    pub channels_url: String,
    pub token: Option<String>,
    pub page_limit: u64,
    pub directory_limit: u64,
    /// URL prefixes that never receive the token and whose 401/403 answers do
    /// not count as an expired session.
    pub auth_bypass_prefixes: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut settings = Self {
            groups_url: String::new(),
            users_url: String::new(),
            things_url: String::new(),
            channels_url: String::new(),
            token: None,
            page_limit: DEFAULT_PAGE_LIMIT,
            directory_limit: DEFAULT_DIRECTORY_LIMIT,
            auth_bypass_prefixes: Vec::new(),
        };
        settings.set_base_url(DEFAULT_BASE_URL);
        settings
    }
}

impl Settings {
    pub fn set_base_url(&mut self, base: &str) {
        let base = base.trim().trim_end_matches('/');
        self.groups_url = format!("{base}/groups");
        self.users_url = format!("{base}/users");
        self.things_url = format!("{base}/things");
        self.channels_url = format!("{base}/channels");
    }

    pub fn endpoints(&self) -> anyhow::Result<Endpoints> {
        Endpoints::new(
            &self.groups_url,
            &self.users_url,
            &self.things_url,
            &self.channels_url,
        )
        .context("invalid service url in settings")
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    base_url: Option<String>,
    groups_url: Option<String>,
    users_url: Option<String>,
    things_url: Option<String>,
    channels_url: Option<String>,
    token: Option<String>,
    page_limit: Option<u64>,
    directory_limit: Option<u64>,
    #[serde(default)]
    auth_bypass_prefixes: Vec<String>,
}

pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    load_settings_with(path, |key| std::env::var(key).ok())
}

pub fn load_settings_with(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
        let file_cfg: FileSettings = toml::from_str(&raw)
            .with_context(|| format!("failed to parse settings file '{}'", path.display()))?;
        apply_file(&mut settings, file_cfg);
    }

    apply_env(&mut settings, env)?;
    ensure!(settings.page_limit > 0, "page_limit must be a positive integer, got 0");
    ensure!(
        settings.directory_limit > 0,
        "directory_limit must be a positive integer, got 0"
    );
    Ok(settings)
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.base_url {
        settings.set_base_url(&v);
    }
    if let Some(v) = file_cfg.groups_url {
        settings.groups_url = v;
    }
    if let Some(v) = file_cfg.users_url {
        settings.users_url = v;
    }
    if let Some(v) = file_cfg.things_url {
        settings.things_url = v;
    }
    if let Some(v) = file_cfg.channels_url {
        settings.channels_url = v;
    }
    if file_cfg.token.is_some() {
        settings.token = file_cfg.token;
    }
    if let Some(v) = file_cfg.page_limit {
        settings.page_limit = v;
    }
    if let Some(v) = file_cfg.directory_limit {
        settings.directory_limit = v;
    }
    if !file_cfg.auth_bypass_prefixes.is_empty() {
        settings.auth_bypass_prefixes = file_cfg.auth_bypass_prefixes;
    }
}

/// First match wins between the `GROUPCTL_` and `APP__` spellings.
fn lookup(env: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    env(&format!("GROUPCTL_{name}")).or_else(|| env(&format!("APP__{name}")))
}

fn apply_env(settings: &mut Settings, env: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
    if let Some(v) = lookup(&env, "BASE_URL") {
        settings.set_base_url(&v);
    }
    if let Some(v) = lookup(&env, "GROUPS_URL") {
        settings.groups_url = v;
    }
    if let Some(v) = lookup(&env, "USERS_URL") {
        settings.users_url = v;
    }
    if let Some(v) = lookup(&env, "THINGS_URL") {
        settings.things_url = v;
    }
    if let Some(v) = lookup(&env, "CHANNELS_URL") {
        settings.channels_url = v;
    }
    if let Some(v) = lookup(&env, "TOKEN") {
        settings.token = Some(v);
    }
    if let Some(v) = lookup(&env, "PAGE_LIMIT") {
        settings.page_limit = v
            .parse()
            .with_context(|| format!("PAGE_LIMIT must be a positive integer, got '{v}'"))?;
    }
    if let Some(v) = lookup(&env, "DIRECTORY_LIMIT") {
        settings.directory_limit = v
            .parse()
            .with_context(|| format!("DIRECTORY_LIMIT must be a positive integer, got '{v}'"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn temp_settings_file(contents: &str) -> std::path::PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let dir = env::temp_dir().join(format!("groupctl_settings_test_{suffix}"));
        fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("groupctl.toml");
        fs::write(&path, contents).expect("write settings");
        path
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_when_file_is_missing() {
        let settings =
            load_settings_with(Path::new("/nonexistent/groupctl.toml"), no_env).expect("load");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.groups_url, "http://localhost/groups");
        assert!(settings.endpoints().is_ok());
    }

    #[test]
    fn file_overrides_defaults() {
        let path = temp_settings_file(
            r#"
base_url = "https://console.example.com/api/"
things_url = "https://things.example.com/things"
token = "file-token"
page_limit = 50
auth_bypass_prefixes = ["https://console.example.com/api/bootstrap"]
"#,
        );

        let settings = load_settings_with(&path, no_env).expect("load");

        assert_eq!(settings.groups_url, "https://console.example.com/api/groups");
        assert_eq!(settings.things_url, "https://things.example.com/things");
        assert_eq!(settings.token.as_deref(), Some("file-token"));
        assert_eq!(settings.page_limit, 50);
        assert_eq!(settings.directory_limit, DEFAULT_DIRECTORY_LIMIT);
        assert_eq!(settings.auth_bypass_prefixes.len(), 1);

        fs::remove_dir_all(path.parent().expect("parent")).expect("cleanup");
    }

    #[test]
    fn environment_overrides_file() {
        let path = temp_settings_file("token = \"file-token\"\npage_limit = 50\n");
        let vars: HashMap<&str, &str> = HashMap::from([
            ("GROUPCTL_TOKEN", "env-token"),
            ("APP__PAGE_LIMIT", "15"),
            ("APP__USERS_URL", "http://users.internal/users"),
        ]);

        let settings =
            load_settings_with(&path, |key| vars.get(key).map(|v| v.to_string())).expect("load");

        assert_eq!(settings.token.as_deref(), Some("env-token"));
        assert_eq!(settings.page_limit, 15);
        assert_eq!(settings.users_url, "http://users.internal/users");

        fs::remove_dir_all(path.parent().expect("parent")).expect("cleanup");
    }

    #[test]
    fn rejects_non_numeric_limits() {
        let err = load_settings_with(Path::new("/nonexistent/groupctl.toml"), |key| {
            (key == "GROUPCTL_DIRECTORY_LIMIT").then(|| "lots".to_string())
        })
        .expect_err("should fail");
        assert!(err.to_string().contains("DIRECTORY_LIMIT"));
    }

    #[test]
    fn zero_limits_are_rejected() {
        let path = temp_settings_file("page_limit = 0\n");
        let err = load_settings_with(&path, no_env).expect_err("zero page limit");
        assert!(err.to_string().contains("page_limit"));
        fs::remove_dir_all(path.parent().expect("parent")).expect("cleanup");

        let err = load_settings_with(Path::new("/nonexistent/groupctl.toml"), |key| {
            (key == "APP__DIRECTORY_LIMIT").then(|| "0".to_string())
        })
        .expect_err("zero directory limit");
        assert!(err.to_string().contains("directory_limit"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = temp_settings_file("page_limit = \"twenty\"");
        assert!(load_settings_with(&path, no_env).is_err());
        fs::remove_dir_all(path.parent().expect("parent")).expect("cleanup");
    }
}
