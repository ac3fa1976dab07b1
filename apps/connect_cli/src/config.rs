use std::{collections::HashMap, fs, path::Path};

use anyhow::Context;
use connect_core::{
    config::{DEFAULT_BASE_URL, DEFAULT_RESERVED_SCHEME},
    ConnectConfig,
};
use serde::Deserialize;

pub const SETTINGS_FILE: &str = "connect.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub base_url: String,
    pub reserved_scheme: String,
    pub client_secret: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            reserved_scheme: DEFAULT_RESERVED_SCHEME.into(),
            client_secret: None,
        }
    }
}

impl Settings {
    pub fn connect_config(&self) -> anyhow::Result<ConnectConfig> {
        ConnectConfig::new(&self.base_url, &self.reserved_scheme)
            .with_context(|| format!("invalid connect settings for base url '{}'", self.base_url))
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(Path::new(SETTINGS_FILE)) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) else {
        tracing::warn!(file = SETTINGS_FILE, "ignoring unparseable settings file");
        return;
    };

    if let Some(v) = file_cfg.get("base_url") {
        settings.base_url = v.clone();
    }
    if let Some(v) = file_cfg.get("reserved_scheme") {
        settings.reserved_scheme = v.clone();
    }
    if let Some(v) = file_cfg.get("client_secret") {
        settings.client_secret = Some(v.clone());
    }
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("CONNECT_BASE_URL") {
        settings.base_url = v;
    }
    if let Some(v) = var("APP__BASE_URL") {
        settings.base_url = v;
    }

    if let Some(v) = var("CONNECT_SCHEME") {
        settings.reserved_scheme = v;
    }
    if let Some(v) = var("APP__RESERVED_SCHEME") {
        settings.reserved_scheme = v;
    }

    if let Some(v) = var("CONNECT_CLIENT_SECRET") {
        settings.client_secret = Some(v);
    }
    if let Some(v) = var("APP__CLIENT_SECRET") {
        settings.client_secret = Some(v);
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
