//! Configuration
//!
//! Settings come from a JSON file (path in `PHARMATABLE_CONFIG`, default
//! `pharmatable.json`; a missing file means all defaults) followed by a few
//! environment overrides. Every field is optional; accessors supply the
//! defaults.

use crate::api::{Backend, RouteStyle};
use crate::error::TableError;
use crate::http::{HttpRecordApi, DEFAULT_SESSION_PATH};
use crate::memory::MemoryRecordApi;
use crate::mutation::MutationMode;
use crate::permissions::PermissionTable;
use crate::render::{Formatter, DEFAULT_CURRENCY_SYMBOL, DEFAULT_DATE_FORMAT};
use log::info;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "PHARMATABLE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "pharmatable.json";

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const MAX_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub api_base: Option<String>,
    pub route_style: Option<RouteStyle>,
    pub session_path: Option<String>,
    #[serde(alias = "timeout")]
    pub request_timeout_secs: Option<u64>,
    pub page_size: Option<usize>,
    pub search_debounce_ms: Option<u64>,
    pub session_check_secs: Option<u64>,
    pub currency_symbol: Option<String>,
    pub date_format: Option<String>,
    pub mutation_mode: Option<MutationMode>,
    pub demo: Option<bool>,
    pub permissions: Option<PermissionTable>,
}

pub fn config_path() -> PathBuf {
    env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn load_config(path: &Path, allow_missing: bool) -> Result<Settings, TableError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str::<Settings>(&contents).map_err(|e| {
            TableError::Config(format!("failed to parse config '{}': {}", path.display(), e))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && allow_missing => Ok(Settings::default()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(TableError::Config(format!(
            "config file not found '{}'",
            path.display()
        ))),
        Err(e) => Err(TableError::Config(format!(
            "failed to read config '{}': {}",
            path.display(),
            e
        ))),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Settings {
    /// Loads the config file named by the environment, then applies
    /// environment overrides.
    pub fn load() -> Result<Self, TableError> {
        let path = config_path();
        let settings = load_config(&path, true)?.with_env(|key| env::var(key).ok())?;
        info!("configuration loaded from '{}'", path.display());
        Ok(settings)
    }

    /// Applies `HOST`, `PORT`, `PHARMATABLE_API_BASE` and `PHARMATABLE_DEMO`
    /// as looked up by `var`.
    pub fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, TableError> {
        if let Some(host) = var("HOST") {
            self.host = Some(host);
        }
        if let Some(port) = var("PORT") {
            let port = port
                .trim()
                .parse::<u16>()
                .map_err(|_| TableError::Config(format!("invalid PORT '{}'", port)))?;
            self.port = Some(port);
        }
        if let Some(base) = var("PHARMATABLE_API_BASE") {
            self.api_base = Some(base);
        }
        if let Some(demo) = var("PHARMATABLE_DEMO") {
            let flag = parse_flag(&demo)
                .ok_or_else(|| TableError::Config(format!("invalid PHARMATABLE_DEMO '{}'", demo)))?;
            self.demo = Some(flag);
        }
        Ok(self)
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or("127.0.0.1")
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(8080)
    }

    pub fn is_demo(&self) -> bool {
        self.demo.unwrap_or(false)
    }

    /// Clamped to 1..=120 seconds
    pub fn request_timeout(&self) -> Duration {
        let secs = self
            .request_timeout_secs
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .clamp(1, MAX_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    /// Overrides the schema's page size when set
    pub fn page_size(&self) -> Option<usize> {
        self.page_size.filter(|&n| n > 0)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms.unwrap_or(300))
    }

    pub fn session_check_interval(&self) -> Duration {
        Duration::from_secs(self.session_check_secs.unwrap_or(300).max(1))
    }

    pub fn mutation_mode(&self) -> MutationMode {
        self.mutation_mode.unwrap_or_default()
    }

    pub fn formatter(&self) -> Formatter {
        Formatter::new(
            self.currency_symbol.as_deref().unwrap_or(DEFAULT_CURRENCY_SYMBOL),
            self.date_format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT),
        )
    }

    pub fn permissions(&self) -> PermissionTable {
        self.permissions
            .clone()
            .unwrap_or_else(PermissionTable::pharmacy_defaults)
    }

    /// Demo mode uses the in-process backend; otherwise `api_base` is required.
    pub fn backend(&self) -> Result<Backend, TableError> {
        if self.is_demo() {
            info!("demo mode: using in-memory backend");
            return Ok(Backend::Memory(MemoryRecordApi::demo()));
        }
        let base = self
            .api_base
            .as_deref()
            .ok_or_else(|| TableError::Config("api_base is required unless demo mode is enabled".into()))?;
        let api = HttpRecordApi::new(base, self.route_style.unwrap_or_default(), self.request_timeout())?
            .with_session_path(self.session_path.as_deref().unwrap_or(DEFAULT_SESSION_PATH));
        Ok(Backend::Http(api))
    }
}
