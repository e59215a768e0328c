// src/config/app.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

pub const ENV_CONFIG_PATH: &str = "RPS_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/rps.toml";

fn default_site_url() -> String {
    "https://ucalgary.sona-systems.com".to_string()
}
fn default_login_path() -> String {
    "/Default.aspx?ReturnUrl=%2f".to_string()
}
fn default_notify_path() -> String {
    "/default.aspx".to_string()
}
fn default_poll_interval_mins() -> u64 {
    30
}
fn default_epoch_mins() -> u64 {
    21
}
fn default_uptime_checkpoint_mins() -> u64 {
    60
}
fn default_true() -> bool {
    true
}
fn default_record_path() -> PathBuf {
    PathBuf::from(crate::record::DEFAULT_RECORD_PATH)
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_webhook_timeout_secs() -> u64 {
    5
}
fn default_site_timeout_secs() -> u64 {
    30
}

/// Process configuration. Loaded once at startup, immutable afterwards.
/// Secret fields accept the literal `"ENV"`, meaning: read from the matching
/// `RPS_*` environment variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub test_webhook_url: Option<String>,

    #[serde(default = "default_site_url")]
    pub site_url: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Link target shown in the notification.
    #[serde(default = "default_notify_path")]
    pub notify_path: String,

    #[serde(default = "default_poll_interval_mins")]
    pub poll_interval_mins: u64,
    #[serde(default = "default_epoch_mins")]
    pub epoch_mins: u64,
    #[serde(default = "default_uptime_checkpoint_mins")]
    pub uptime_checkpoint_mins: u64,

    #[serde(default = "default_true")]
    pub send_notification: bool,
    #[serde(default)]
    pub record_studies: bool,
    #[serde(default)]
    pub local_testing: bool,
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,
    #[serde(default = "default_record_path")]
    pub record_path: PathBuf,

    /// Per-iteration attempts before a poll failure is logged and skipped.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,
    /// Per-request timeout against the study site.
    #[serde(default = "default_site_timeout_secs")]
    pub site_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            webhook_url: String::new(),
            test_webhook_url: None,
            site_url: default_site_url(),
            login_path: default_login_path(),
            notify_path: default_notify_path(),
            poll_interval_mins: default_poll_interval_mins(),
            epoch_mins: default_epoch_mins(),
            uptime_checkpoint_mins: default_uptime_checkpoint_mins(),
            send_notification: default_true(),
            record_studies: false,
            local_testing: false,
            fixture_path: None,
            record_path: default_record_path(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            webhook_timeout_secs: default_webhook_timeout_secs(),
            site_timeout_secs: default_site_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Parse, resolve `ENV` placeholders, apply env overrides, sanitize.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s).context("parsing config toml")?;
        cfg.resolve_env()?;
        cfg.apply_env_overrides()?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    /// Load using env var + fallbacks:
    /// 1) $RPS_CONFIG_PATH (must exist)
    /// 2) config/rps.toml
    /// 3) defaults + environment only
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            return Self::load_from_file(&pb);
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from_file(&default_p);
        }
        // No file: every field comes from defaults, secrets from env.
        Self::from_toml_str(
            r#"
username = "ENV"
password = "ENV"
webhook_url = "ENV"
"#,
        )
    }

    /// Fail early on settings the selected mode cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.local_testing {
            if self.fixture_path.is_none() {
                bail!("local_testing requires fixture_path");
            }
            if self.send_notification && self.active_webhook().trim().is_empty() {
                bail!("send_notification is on but no webhook is set (test_webhook_url or webhook_url)");
            }
            return Ok(());
        }
        if self.username.trim().is_empty() || self.password.is_empty() {
            bail!("missing credentials (set username/password or RPS_USERNAME/RPS_PASSWORD)");
        }
        if self.send_notification && self.webhook_url.trim().is_empty() {
            bail!("send_notification is on but webhook_url is empty");
        }
        Ok(())
    }

    pub fn login_url(&self) -> String {
        join_url(&self.site_url, &self.login_path)
    }

    pub fn notify_url(&self) -> String {
        join_url(&self.site_url, &self.notify_path)
    }

    /// Webhook used by the current mode (local testing prefers the test target).
    pub fn active_webhook(&self) -> &str {
        match (&self.test_webhook_url, self.local_testing) {
            (Some(t), true) if !t.is_empty() => t,
            _ => &self.webhook_url,
        }
    }

    fn resolve_env(&mut self) -> Result<()> {
        resolve_secret(&mut self.username, "RPS_USERNAME")?;
        resolve_secret(&mut self.password, "RPS_PASSWORD")?;
        resolve_secret(&mut self.webhook_url, "RPS_WEBHOOK_URL")?;
        if let Some(t) = self.test_webhook_url.as_mut() {
            resolve_secret(t, "RPS_TEST_WEBHOOK_URL")?;
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_flag("RPS_SEND_NOTIFICATION")? {
            self.send_notification = v;
        }
        if let Some(v) = env_flag("RPS_RECORD_STUDIES")? {
            self.record_studies = v;
        }
        if let Some(v) = env_flag("RPS_LOCAL_TESTING")? {
            self.local_testing = v;
        }
        Ok(())
    }

    fn sanitize(&mut self) {
        self.poll_interval_mins = self.poll_interval_mins.max(1);
        self.max_attempts = self.max_attempts.max(1);
        self.site_url = self.site_url.trim_end_matches('/').to_string();
    }
}

/// `"ENV"` (any case) → value of `var`; a missing var leaves the field empty
/// so that `validate` can report it for the mode that actually needs it.
fn resolve_secret(field: &mut String, var: &str) -> Result<()> {
    if field.trim().eq_ignore_ascii_case("env") {
        *field = match env::var(var) {
            Ok(v) => v,
            Err(env::VarError::NotPresent) => String::new(),
            Err(e) => return Err(anyhow!("{var}: {e}")),
        };
    }
    Ok(())
}

fn env_flag(var: &str) -> Result<Option<bool>> {
    let Ok(raw) = env::var(var) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        other => bail!("{var}: expected a boolean, got {other:?}"),
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
