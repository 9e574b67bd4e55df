use std::{collections::HashMap, fmt, fs, io::ErrorKind, path::Path, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::warn;
use url::Url;

pub const SETTINGS_FILE: &str = "mint.toml";

#[derive(Clone)]
pub struct Settings {
    pub allowlist_api_url: String,
    pub allowlist_auth_token: String,
    pub candy_machine_id: String,
    pub config_account: String,
    pub treasury: String,
    pub start_date: Option<DateTime<Utc>>,
    pub tx_timeout_ms: u64,
    pub confirmation_poll_interval_ms: u64,
    pub alert_auto_hide_ms: u64,
    pub live_tick_interval_ms: u64,
    pub sale_state_max_age_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            allowlist_api_url: "http://127.0.0.1:5000".into(),
            allowlist_auth_token: String::new(),
            candy_machine_id: String::new(),
            config_account: String::new(),
            treasury: String::new(),
            start_date: None,
            tx_timeout_ms: 30_000,
            confirmation_poll_interval_ms: 500,
            alert_auto_hide_ms: 6_000,
            live_tick_interval_ms: 1_000,
            sale_state_max_age_ms: 10_000,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("allowlist_api_url", &self.allowlist_api_url)
            .field("allowlist_auth_token", &"<redacted>")
            .field("candy_machine_id", &self.candy_machine_id)
            .field("config_account", &self.config_account)
            .field("treasury", &self.treasury)
            .field("start_date", &self.start_date)
            .field("tx_timeout_ms", &self.tx_timeout_ms)
            .field("confirmation_poll_interval_ms", &self.confirmation_poll_interval_ms)
            .field("alert_auto_hide_ms", &self.alert_auto_hide_ms)
            .field("live_tick_interval_ms", &self.live_tick_interval_ms)
            .field("sale_state_max_age_ms", &self.sale_state_max_age_ms)
            .finish()
    }
}

impl Settings {
    pub fn tx_timeout(&self) -> Duration {
        Duration::from_millis(self.tx_timeout_ms)
    }

    pub fn confirmation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_interval_ms)
    }

    pub fn live_tick_interval(&self) -> Duration {
        Duration::from_millis(self.live_tick_interval_ms)
    }

    pub fn alert_auto_hide(&self) -> chrono::Duration {
        chrono_millis(self.alert_auto_hide_ms)
    }

    pub fn sale_state_max_age(&self) -> chrono::Duration {
        chrono_millis(self.sale_state_max_age_ms)
    }
}

pub fn load_settings() -> Result<Settings> {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Settings> {
    let mut settings = Settings::default();

    match fs::read_to_string(path) {
        Ok(raw) => {
            let file_cfg = toml::from_str::<HashMap<String, toml::Value>>(&raw)
                .with_context(|| format!("failed to parse settings file '{}'", path.display()))?;
            apply_overrides(&mut settings, |key| {
                file_cfg.get(key).map(|value| match value {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
            });
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read settings file '{}'", path.display()))
        }
    }

    apply_overrides(&mut settings, |key| {
        env(&format!("MINT_{}", key.to_ascii_uppercase()))
            .or_else(|| env(&format!("APP__{}", key.to_ascii_uppercase())))
    });

    Url::parse(&settings.allowlist_api_url).with_context(|| {
        format!(
            "invalid allowlist_api_url '{}'",
            settings.allowlist_api_url
        )
    })?;

    Ok(settings)
}

fn apply_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("allowlist_api_url") {
        settings.allowlist_api_url = v;
    }
    if let Some(v) = lookup("allowlist_auth_token") {
        settings.allowlist_auth_token = v;
    }
    if let Some(v) = lookup("candy_machine_id") {
        settings.candy_machine_id = v;
    }
    if let Some(v) = lookup("config_account") {
        settings.config_account = v;
    }
    if let Some(v) = lookup("treasury") {
        settings.treasury = v;
    }
    if let Some(v) = lookup("start_date") {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&v) {
            settings.start_date = Some(parsed.with_timezone(&Utc));
        }
    }

    // (key, target, zero allowed)
    let millis = [
        ("tx_timeout_ms", &mut settings.tx_timeout_ms, true),
        (
            "confirmation_poll_interval_ms",
            &mut settings.confirmation_poll_interval_ms,
            false,
        ),
        ("alert_auto_hide_ms", &mut settings.alert_auto_hide_ms, true),
        ("live_tick_interval_ms", &mut settings.live_tick_interval_ms, false),
        ("sale_state_max_age_ms", &mut settings.sale_state_max_age_ms, true),
    ];
    for (key, target, zero_allowed) in millis {
        let Some(v) = lookup(key) else {
            continue;
        };
        match v.trim().parse::<u64>() {
            Ok(0) if !zero_allowed => {
                warn!(key, "settings: zero period ignored; keeping default");
            }
            Ok(parsed) => *target = parsed,
            Err(_) => {
                warn!(key, value = %v, "settings: invalid number ignored; keeping default");
            }
        }
    }
}

fn chrono_millis(ms: u64) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
