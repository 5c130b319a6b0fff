use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub accounts: Vec<String>,
    pub catalog_path: PathBuf,
    pub custom_service: Option<String>,
    pub channel_capacity: usize,
    pub log_filter: String,
    pub refresh_after_ms: Option<u64>,
    pub linger_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            catalog_path: PathBuf::from("catalog.toml"),
            custom_service: None,
            channel_capacity: 64,
            log_filter: "info".into(),
            refresh_after_ms: None,
            linger_ms: 250,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    accounts: Option<Vec<String>>,
    catalog_path: Option<PathBuf>,
    custom_service: Option<String>,
    channel_capacity: Option<usize>,
    log_filter: Option<String>,
    refresh_after_ms: Option<u64>,
    linger_ms: Option<u64>,
}

/// Defaults, then the TOML file at `path` when it exists, then environment variables.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
        let file_cfg: FileSettings = toml::from_str(&raw)
            .with_context(|| format!("invalid settings file '{}'", path.display()))?;
        apply_file(&mut settings, file_cfg);
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.accounts {
        settings.accounts = v;
    }
    if let Some(v) = file_cfg.catalog_path {
        settings.catalog_path = v;
    }
    if let Some(v) = file_cfg.custom_service {
        settings.custom_service = Some(v);
    }
    if let Some(v) = file_cfg.channel_capacity {
        settings.channel_capacity = v;
    }
    if let Some(v) = file_cfg.log_filter {
        settings.log_filter = v;
    }
    if let Some(v) = file_cfg.refresh_after_ms {
        settings.refresh_after_ms = Some(v);
    }
    if let Some(v) = file_cfg.linger_ms {
        settings.linger_ms = v;
    }
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    let first = |keys: &[&str]| keys.iter().find_map(|key| lookup(*key));

    if let Some(v) = first(&["APP__ACCOUNTS", "ROOM_BROWSER_ACCOUNTS"]) {
        settings.accounts = split_list(&v);
    }
    if let Some(v) = first(&["APP__CATALOG_PATH", "ROOM_BROWSER_CATALOG"]) {
        settings.catalog_path = PathBuf::from(v);
    }
    if let Some(v) = first(&["APP__CUSTOM_SERVICE", "ROOM_BROWSER_CUSTOM_SERVICE"]) {
        settings.custom_service = Some(v);
    }
    if let Some(v) = first(&["APP__CHANNEL_CAPACITY", "ROOM_BROWSER_CHANNEL_CAPACITY"]) {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.channel_capacity = parsed;
        }
    }
    if let Some(v) = first(&["APP__LOG_FILTER", "ROOM_BROWSER_LOG"]) {
        settings.log_filter = v;
    }
    if let Some(v) = first(&["APP__REFRESH_AFTER_MS", "ROOM_BROWSER_REFRESH_AFTER_MS"]) {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.refresh_after_ms = Some(parsed);
        }
    }
    if let Some(v) = first(&["APP__LINGER_MS", "ROOM_BROWSER_LINGER_MS"]) {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.linger_ms = parsed;
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn file_values_override_defaults() {
        let file_cfg: FileSettings = toml::from_str(
            r#"
accounts = ["alice@example.org", "bob@jabber.test"]
catalog_path = "demo/catalog.toml"
channel_capacity = 8
"#,
        )
        .expect("parse");
        let mut settings = Settings::default();
        apply_file(&mut settings, file_cfg);

        assert_eq!(settings.accounts.len(), 2);
        assert_eq!(settings.catalog_path, PathBuf::from("demo/catalog.toml"));
        assert_eq!(settings.channel_capacity, 8);
        assert_eq!(settings.log_filter, "info");
    }

    #[test]
    fn environment_overrides_file_and_prefers_app_prefix() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("APP__ACCOUNTS", "carol@example.net, ,dave@example.net"),
            ("ROOM_BROWSER_ACCOUNTS", "ignored@example.net"),
            ("ROOM_BROWSER_CUSTOM_SERVICE", "rooms.example.net"),
            ("APP__CHANNEL_CAPACITY", "not-a-number"),
            ("ROOM_BROWSER_REFRESH_AFTER_MS", "1500"),
        ]);
        let mut settings = Settings {
            channel_capacity: 16,
            ..Settings::default()
        };
        apply_env(&mut settings, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(
            settings.accounts,
            vec!["carol@example.net".to_string(), "dave@example.net".to_string()]
        );
        assert_eq!(settings.custom_service.as_deref(), Some("rooms.example.net"));
        assert_eq!(settings.channel_capacity, 16);
        assert_eq!(settings.refresh_after_ms, Some(1500));
    }

    #[test]
    fn unknown_keys_in_settings_file_are_rejected() {
        assert!(toml::from_str::<FileSettings>("acounts = []").is_err());
    }

    #[test]
    fn missing_settings_file_yields_defaults() {
        let path = std::env::temp_dir().join("room_browser_settings_that_do_not_exist.toml");
        let settings = load_settings(&path).expect("defaults");
        assert_eq!(settings.catalog_path, Settings::default().catalog_path);
    }
}
