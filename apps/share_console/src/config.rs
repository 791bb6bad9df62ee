use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use shared::domain::Scope;

pub const SETTINGS_FILE: &str = "share_console.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub seed_path: PathBuf,
    pub page_scope: Option<String>,
    pub confirmation_timeout_secs: u64,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            seed_path: PathBuf::from("./data/cases.toml"),
            page_scope: None,
            confirmation_timeout_secs: 300,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn scope(&self) -> Scope {
        match &self.page_scope {
            Some(key) => Scope::page(key.clone()),
            None => Scope::new_page(),
        }
    }

    /// Zero disables the confirmation timeout.
    pub fn confirmation_timeout(&self) -> Option<Duration> {
        (self.confirmation_timeout_secs > 0)
            .then(|| Duration::from_secs(self.confirmation_timeout_secs))
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    seed_path: Option<PathBuf>,
    page_scope: Option<String>,
    confirmation_timeout_secs: Option<u64>,
    log_filter: Option<String>,
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the settings file if it parses, then environment overrides.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(file_cfg) = toml::from_str::<FileSettings>(&raw) {
            if let Some(v) = file_cfg.seed_path {
                settings.seed_path = v;
            }
            if let Some(v) = file_cfg.page_scope {
                settings.page_scope = Some(v);
            }
            if let Some(v) = file_cfg.confirmation_timeout_secs {
                settings.confirmation_timeout_secs = v;
            }
            if let Some(v) = file_cfg.log_filter {
                settings.log_filter = v;
            }
        }
    }

    if let Some(v) = env("SHARE_SEED_PATH") {
        settings.seed_path = PathBuf::from(v);
    }
    if let Some(v) = env("APP__SEED_PATH") {
        settings.seed_path = PathBuf::from(v);
    }

    if let Some(v) = env("APP__PAGE_SCOPE") {
        settings.page_scope = Some(v);
    }

    if let Some(v) = env("APP__CONFIRMATION_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.confirmation_timeout_secs = parsed;
        }
    }

    if let Some(v) = env("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
