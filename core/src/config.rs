use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::core::scanner::MAX_CONCURRENCY;
use crate::core::RequestType;
use crate::error::{Result, XssMapError};

/// The only config file version understood.
pub const CONFIG_JSON_VERSION: f64 = 1.0;
pub const DEFAULT_RENDER_ADDRESS: &str = "http://127.0.0.1:8888";
pub const DEFAULT_RENDER_TIMEOUT: u64 = 30;
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Everything one assessment needs, built from a config file or CLI flags.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentConfig {
    pub request_type: RequestType,
    pub request_url: String,
    pub request_body: Option<String>,
    pub do_reflect: bool,
    pub do_xss: bool,
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
    pub render_address: String,
    /// Seconds per render call.
    pub render_timeout: u64,
    pub concurrency: usize,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            request_type: RequestType::Get,
            request_url: String::new(),
            request_body: None,
            do_reflect: true,
            do_xss: true,
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            render_address: DEFAULT_RENDER_ADDRESS.to_string(),
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// `{"name": ..., "value": ...}` entry used for headers and cookies.
#[derive(Debug, Clone, Deserialize)]
struct NamedValue {
    name: String,
    #[serde(default)]
    value: String,
}

/// On-disk JSON config layout.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    json_version: Option<f64>,
    request_type: Option<String>,
    request_url: Option<String>,
    request_body: Option<String>,
    do_reflect: Option<bool>,
    do_xss: Option<bool>,
    headers: Option<Vec<NamedValue>>,
    cookies: Option<Vec<NamedValue>>,
    render_address: Option<String>,
    render_timeout: Option<u64>,
    concurrency: Option<usize>,
}

fn named_values_to_map(entries: Option<Vec<NamedValue>>) -> BTreeMap<String, String> {
    entries
        .unwrap_or_default()
        .into_iter()
        .map(|e| (e.name, e.value))
        .collect()
}

impl AssessmentConfig {
    pub fn new(request_url: &str) -> Self {
        Self {
            request_url: request_url.to_string(),
            ..Default::default()
        }
    }

    /// Parses a JSON config document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(text)
            .map_err(|e| XssMapError::Config(format!("Invalid JSON config file: {}", e)))?;

        if let Some(version) = file.json_version {
            if (version - CONFIG_JSON_VERSION).abs() > f64::EPSILON {
                return Err(XssMapError::Config(format!(
                    "Supported JSON version is {:.2}, got {}",
                    CONFIG_JSON_VERSION, version
                )));
            }
        }

        let request_url = match file.request_url {
            Some(url) if !url.trim().is_empty() => url,
            _ => {
                return Err(XssMapError::Config(
                    "Missing \"request_url\" param field in JSON config file.".to_string(),
                ))
            }
        };

        let mut config = Self::new(&request_url);
        if let Some(t) = file.request_type {
            config.request_type = t.parse()?;
        }
        config.request_body = file.request_body;
        if let Some(v) = file.do_reflect {
            config.do_reflect = v;
        }
        if let Some(v) = file.do_xss {
            config.do_xss = v;
        }
        config.headers = named_values_to_map(file.headers);
        config.cookies = named_values_to_map(file.cookies);
        if let Some(addr) = file.render_address {
            config.render_address = addr;
        }
        if let Some(t) = file.render_timeout {
            config.render_timeout = t;
        }
        if let Some(c) = file.concurrency {
            config.concurrency = c;
        }

        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            XssMapError::Config(format!("Unable to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    /// Worker count for the verification loop, between one and
    /// `MAX_CONCURRENCY`.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }

    /// Checks the settings that do not depend on the target itself.
    pub fn check(&self) -> Result<()> {
        if self.request_url.trim().is_empty() {
            return Err(XssMapError::Config("No target URL given.".to_string()));
        }
        if self.render_timeout == 0 {
            return Err(XssMapError::Config("Render timeout must be at least one second.".to_string()));
        }
        Ok(())
    }
}

/// Whether a CLI target names a config file rather than a URL.
pub fn is_config_path(target: &str) -> bool {
    let lowered = target.to_ascii_lowercase();
    if lowered.starts_with("http://") || lowered.starts_with("https://") {
        return false;
    }
    lowered.ends_with(".json") || lowered.ends_with(".conf")
}

/// Parses `name=value` pairs, splitting on the first `=` only.
pub fn parse_key_values(raw: &[String]) -> Result<BTreeMap<String, String>> {
    raw.iter()
        .map(|entry| match entry.split_once('=') {
            Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
            _ => Err(XssMapError::Config(format!(
                "Expected name=value, got '{}'",
                entry
            ))),
        })
        .collect()
}
